//! Named access to item fields.
//!
//! Sorting and field selection take field names from users (`--sort-by
//! date`), so the set of recognised names is a fixed table rather than
//! anything derived at runtime.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use super::Item;

/// A field of an [`Item`] that can be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ItemField {
    Title,
    Link,
    Content,
    Date,
    Creator,
    Subject,
    Category,
}

/// The name was not one of [`ItemField::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown item field '{0}' (expected one of: title, link, content, date, creator, subject, category)")]
pub struct UnknownFieldError(pub String);

const FIELD_NAMES: [(&str, ItemField); 7] = [
    ("title", ItemField::Title),
    ("link", ItemField::Link),
    ("content", ItemField::Content),
    ("date", ItemField::Date),
    ("creator", ItemField::Creator),
    ("subject", ItemField::Subject),
    ("category", ItemField::Category),
];

impl ItemField {
    pub const ALL: [ItemField; 7] = [
        ItemField::Title,
        ItemField::Link,
        ItemField::Content,
        ItemField::Date,
        ItemField::Creator,
        ItemField::Subject,
        ItemField::Category,
    ];

    pub fn name(self) -> &'static str {
        FIELD_NAMES
            .iter()
            .find(|(_, field)| *field == self)
            .map(|(name, _)| *name)
            .unwrap_or_default()
    }

    /// The field's value on `item` as text. Dates render as RFC 3339.
    pub fn value(self, item: &Item) -> Option<Cow<'_, str>> {
        let text = match self {
            ItemField::Title => item.title(),
            ItemField::Link => item.link(),
            ItemField::Content => item.content(),
            ItemField::Creator => item.creator(),
            ItemField::Subject => item.subject(),
            ItemField::Category => item.category(),
            ItemField::Date => return item.date().map(|d| Cow::Owned(d.to_rfc3339())),
        };
        text.map(Cow::Borrowed)
    }

    /// Orders two items by this field. Dates compare chronologically, text
    /// compares by code point, and items lacking the field sort last.
    pub fn compare(self, a: &Item, b: &Item) -> Ordering {
        match self {
            ItemField::Date => absent_last(a.date(), b.date()),
            _ => absent_last(self.value(a), self.value(b)),
        }
    }
}

fn absent_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl FromStr for ItemField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FIELD_NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s.trim()))
            .map(|(_, field)| *field)
            .ok_or_else(|| UnknownFieldError(s.to_owned()))
    }
}

impl TryFrom<String> for ItemField {
    type Error = UnknownFieldError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
