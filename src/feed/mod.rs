//! Feed parsing for RSS 0.9x/1.0/2.0 and Atom 0.3 documents.
//!
//! This module turns a raw, frequently malformed feed document into a
//! uniform [`Feed`] with an ordered list of [`Item`]s:
//!
//! - **Parsing**: feed-type detection and per-field fallback extraction
//! - **Content**: HTML vs. plain-text disambiguation of item bodies
//! - **Fields**: a fixed lookup table of item fields for sorting and display
//! - **Fetching**: conditional HTTP retrieval with an on-disk cache
//!
//! # Architecture
//!
//! - [`xml`] - owned element tree over `quick-xml` with an encoding hook
//! - `parser` - the feed model builder
//! - `content` - item body extraction
//! - `fields` - [`ItemField`] lookup table
//! - `fetcher` - HTTP collaborator used by the binary
//!
//! # Example
//!
//! ```
//! use feedmend::feed::{parse_feed, FeedKind};
//!
//! let feed = parse_feed(br#"<rss version="2.0"><channel>
//!     <title> Example </title>
//!     <item><title>First</title><link>https://example.com/1</link></item>
//! </channel></rss>"#)?;
//!
//! assert_eq!(feed.kind(), FeedKind::Rss);
//! assert_eq!(feed.title(), Some("Example"));
//! assert_eq!(feed.items()[0].link(), Some("https://example.com/1"));
//! # Ok::<(), feedmend::feed::ParseError>(())
//! ```

mod content;
mod fetcher;
mod fields;
mod parser;
pub mod xml;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;

pub use content::extract_content;
pub use fetcher::{fetch_cached, FetchError, Fetched};
pub use fields::{ItemField, UnknownFieldError};
pub use parser::{parse_feed, repair_ampersands};

/// Errors that abort parsing of a whole document. No partial feed is produced.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The root is neither an RSS channel holder nor an Atom `feed`.
    #[error("unrecognized feed type: expected an RSS channel or an Atom feed root")]
    UnknownFeedType,

    /// The markup is broken beyond the ampersand repair.
    #[error("malformed feed markup at byte {position}: {message}")]
    Malformed { position: u64, message: String },
}

impl From<xml::XmlError> for ParseError {
    fn from(e: xml::XmlError) -> Self {
        ParseError::Malformed {
            position: e.position,
            message: e.message,
        }
    }
}

/// Syndication format of a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Atom,
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedKind::Rss => "rss",
            FeedKind::Atom => "atom",
        })
    }
}

/// A media attachment on an RSS item. Each attribute is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Enclosure {
    pub url: Option<String>,
    pub length: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

/// One parsed feed document.
///
/// Built once by [`parse_feed`] and read-only afterwards. Every text field is
/// UTF-8 with boundary whitespace trimmed; a field is `None` when no element
/// matched, which is distinct from `Some("")`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feed {
    kind: FeedKind,
    encoding: String,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    creator: Option<String>,
    items: Vec<Item>,
}

impl Feed {
    /// Parses a complete feed document. See [`parse_feed`].
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        parse_feed(bytes)
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Encoding label declared by the document, `UTF-8` if none was declared.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// Items in document order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }
}

impl FromStr for Feed {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_feed(s.as_bytes())
    }
}

/// One entry of a feed.
///
/// RSS and Atom items share this shape; `kind` records which extraction rules
/// built it. `enclosures` is always empty for Atom items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    kind: FeedKind,
    title: Option<String>,
    link: Option<String>,
    content: Option<String>,
    #[serde(serialize_with = "serialize_rfc3339")]
    date: Option<DateTime<FixedOffset>>,
    creator: Option<String>,
    subject: Option<String>,
    category: Option<String>,
    enclosures: Vec<Enclosure>,
}

/// Same text as [`ItemField::Date`]: `+00:00` rather than `Z` for UTC.
fn serialize_rfc3339<S: serde::Serializer>(
    date: &Option<DateTime<FixedOffset>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match date {
        Some(date) => serializer.serialize_str(&date.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

impl Item {
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Item body as HTML.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Publication date with the offset the source gave.
    pub fn date(&self) -> Option<&DateTime<FixedOffset>> {
        self.date.as_ref()
    }

    /// Item author, or the feed's author when the item names none.
    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn enclosures(&self) -> &[Enclosure] {
        &self.enclosures
    }
}

/// Compact listing of every field, one per line; absent fields print empty.
impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<&str>| v.unwrap_or_default().to_owned();
        writeln!(f, "Type: {}", self.kind)?;
        writeln!(f, "Encoding: {}", self.encoding)?;
        writeln!(f, "Title: {}", opt(self.title()))?;
        writeln!(f, "Link: {}", opt(self.link()))?;
        writeln!(f, "Description: {}", opt(self.description()))?;
        writeln!(f, "Creator: {}", opt(self.creator()))?;
        writeln!(f)?;
        for item in &self.items {
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<&str>| v.unwrap_or_default().to_owned();
        writeln!(f, "--------------------------------")?;
        writeln!(f, "Title: {}", opt(self.title()))?;
        writeln!(f, "Link: {}", opt(self.link()))?;
        writeln!(
            f,
            "Date: {}",
            self.date.map(|d| d.to_rfc3339()).unwrap_or_default()
        )?;
        writeln!(f, "Creator: {}", opt(self.creator()))?;
        writeln!(f, "Subject: {}", opt(self.subject()))?;
        writeln!(f, "Category: {}", opt(self.category()))?;
        writeln!(f, "Content:\n{}", opt(self.content()))?;
        if !self.enclosures.is_empty() {
            writeln!(f, "Enclosures:")?;
            for enclosure in &self.enclosures {
                let parts = [&enclosure.url, &enclosure.length, &enclosure.media_type];
                let line: Vec<&str> = parts.iter().map(|p| p.as_deref().unwrap_or("")).collect();
                writeln!(f, "{}", line.join(" "))?;
            }
        }
        Ok(())
    }
}
