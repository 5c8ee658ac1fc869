//! Transcript renderers for parsed feeds.
//!
//! Every renderer reads a [`Feed`] and produces a `String`; none of them
//! touch the terminal. Item selection (sorting, limit) and content shaping
//! (truncation, tag stripping, date layout) come from [`RenderOptions`].

use std::borrow::Cow;
use std::fmt::Write;

use chrono::{DateTime, FixedOffset};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::feed::{Feed, FeedKind, Item, ItemField};
use crate::util::{html_to_text, strip_control_chars, strip_tags, truncate_chars};

/// strftime layout used for item dates unless configured otherwise.
pub const DEFAULT_DATE_FORMAT: &str = "%A, %B %d, %Y";

const ITEM_SEPARATOR: &str = "****************************************";

/// Output formats offered by the command-line tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain-text transcript with HTML flattened.
    #[default]
    Text,
    /// Minimal HTML page.
    Html,
    /// The feed model as pretty-printed JSON.
    Json,
    /// One `Field: value` line per field.
    Summary,
}

/// Controls which items are shown and how their content is shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// strftime layout for item dates.
    pub date_format: String,
    /// Content is cut after this many characters and marked with ` ...`. 0 = unlimited.
    pub max_content_length: usize,
    /// Strip tags from item content.
    pub no_html: bool,
    /// Render at most this many items. 0 = all.
    pub limit: usize,
    /// Sort items by this field before applying `limit`. `None` keeps document order.
    pub sort_by: Option<ItemField>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            max_content_length: 0,
            no_html: false,
            limit: 0,
            sort_by: None,
        }
    }
}

/// Renders `feed` in `format`.
///
/// # Errors
///
/// Only [`OutputFormat::Json`] can fail, if serialization does.
pub fn render(
    feed: &Feed,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, serde_json::Error> {
    Ok(match format {
        OutputFormat::Text => to_text(feed, options),
        OutputFormat::Html => to_html(feed, options),
        OutputFormat::Json => to_json(feed, options)?,
        OutputFormat::Summary => to_summary(feed),
    })
}

/// Items to render: stably sorted by `sort_by` if set, then cut to `limit`.
pub fn select_items<'a>(feed: &'a Feed, options: &RenderOptions) -> Vec<&'a Item> {
    let mut items: Vec<&Item> = feed.items().iter().collect();
    if let Some(field) = options.sort_by {
        items.sort_by(|a, b| field.compare(a, b));
    }
    if options.limit > 0 {
        items.truncate(options.limit);
    }
    items
}

/// Item content after truncation and optional tag stripping.
pub fn item_content<'a>(item: &'a Item, options: &RenderOptions) -> Option<Cow<'a, str>> {
    let content = truncate_chars(item.content()?, options.max_content_length);
    if options.no_html {
        return Some(Cow::Owned(strip_tags(&content).into_owned()));
    }
    Some(content)
}

/// Formats `date` with a strftime layout; falls back to RFC 2822 when the
/// layout contains an unknown specifier.
pub fn format_date(date: &DateTime<FixedOffset>, layout: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(layout)).is_err() {
        tracing::debug!(layout, "Invalid date layout, using RFC 2822");
        return date.to_rfc2822();
    }
    out
}

/// Plain-text transcript. Control characters are stripped from the result.
pub fn to_text(feed: &Feed, options: &RenderOptions) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "Type: {}", feed.kind());
    let _ = writeln!(s, "Encoding: {}", feed.encoding());
    let _ = writeln!(s, "Title: {}", feed.title().unwrap_or_default());
    let _ = writeln!(s, "Link: {}", feed.link().unwrap_or_default());
    match feed.description() {
        Some(description) => {
            let _ = writeln!(s, "Description: {}", html_to_text(description));
        }
        None => s.push_str("Description:\n"),
    }
    let _ = writeln!(s, "Creator: {}", feed.creator().unwrap_or_default());
    s.push('\n');

    for item in select_items(feed, options) {
        s.push('\n');
        s.push_str(ITEM_SEPARATOR);
        s.push('\n');
        s.push_str(&item_text(feed, item, options));
    }

    strip_control_chars(&s).into_owned()
}

fn item_text(feed: &Feed, item: &Item, options: &RenderOptions) -> String {
    let mut s = String::new();
    s.push_str("Feed: ");
    push_title_link(&mut s, feed.title(), feed.link());
    s.push_str("\nItem: ");
    push_title_link(&mut s, item.title(), item.link());
    s.push('\n');

    if let Some(date) = item.date() {
        let _ = write!(s, "\nDate: {}", format_date(date, &options.date_format));
    }
    for (label, value) in [
        ("Author", item.creator()),
        ("Subject", item.subject()),
        ("Category", item.category()),
    ] {
        if let Some(value) = value {
            let _ = write!(s, "\n{label}: {value}");
        }
    }
    s.push_str("\n\n");

    if let Some(content) = item_content(item, options) {
        s.push_str(&html_to_text(&content));
    }
    s
}

fn push_title_link(s: &mut String, title: Option<&str>, link: Option<&str>) {
    if let Some(title) = title {
        s.push_str(title);
        s.push(' ');
    }
    if let Some(link) = link {
        let _ = write!(s, "<{link}>");
    }
}

/// Minimal HTML page. Titles and metadata are escaped; descriptions and
/// content are already HTML and are embedded as they are.
pub fn to_html(feed: &Feed, options: &RenderOptions) -> String {
    let esc = |v: Option<&str>| escape(v.unwrap_or_default()).into_owned();

    let mut s = String::from("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">");
    let _ = write!(s, "<title>{}</title>", esc(feed.title()));
    s.push_str("</head>\n<body>\n");
    let _ = writeln!(s, "<p>Type: {}<br>", feed.kind());
    let _ = writeln!(s, "Encoding: {}<br>", esc(Some(feed.encoding())));
    let _ = writeln!(s, "Title: {}<br>", esc(feed.title()));
    let _ = writeln!(s, "Link: {}<br>", esc(feed.link()));
    let _ = writeln!(s, "Description: {}<br>", feed.description().unwrap_or_default());
    let _ = writeln!(s, "Creator: {}</p>", esc(feed.creator()));

    for item in select_items(feed, options) {
        s.push_str("\n<hr/>\n<p>Feed: ");
        push_anchor(&mut s, feed.title(), feed.link());
        s.push_str("<br/>\nItem: ");
        push_anchor(&mut s, item.title(), item.link());
        s.push('\n');
        if let Some(date) = item.date() {
            let _ = writeln!(
                s,
                "<br/>Date: {}",
                escape(format_date(date, &options.date_format).as_str())
            );
        }
        for (label, value) in [
            ("Author", item.creator()),
            ("Subject", item.subject()),
            ("Category", item.category()),
        ] {
            if value.is_some() {
                let _ = writeln!(s, "<br/>{label}: {}", esc(value));
            }
        }
        s.push_str("</p>\n");
        if let Some(content) = item_content(item, options) {
            s.push_str(&content);
            s.push('\n');
        }
    }

    s.push_str("</body>\n</html>\n");
    s
}

fn push_anchor(s: &mut String, title: Option<&str>, link: Option<&str>) {
    let title = escape(title.unwrap_or_default());
    match link {
        Some(link) => {
            let _ = writeln!(s, "<a href=\"{}\">{title}</a>", escape(link));
        }
        None => {
            let _ = writeln!(s, "{title}");
        }
    }
}

/// Compact `Field: value` listing of the whole feed, enclosures included.
pub fn to_summary(feed: &Feed) -> String {
    strip_control_chars(&feed.to_string()).into_owned()
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    kind: FeedKind,
    encoding: &'a str,
    title: Option<&'a str>,
    link: Option<&'a str>,
    description: Option<&'a str>,
    creator: Option<&'a str>,
    items: Vec<&'a Item>,
}

/// Pretty-printed JSON of the feed with the selected items.
pub fn to_json(feed: &Feed, options: &RenderOptions) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonFeed {
        kind: feed.kind(),
        encoding: feed.encoding(),
        title: feed.title(),
        link: feed.link(),
        description: feed.description(),
        creator: feed.creator(),
        items: select_items(feed, options),
    })
}
