//! A forgiving feed parser for RSS 0.9x/1.0/2.0 and Atom 0.3.
//!
//! Real-world feeds are routinely broken: bare `&` characters, encodings that
//! lie, HTML escaped twice, dates in whatever layout the author liked.
//! [`feed::parse_feed`] repairs what it can and hands back one uniform,
//! UTF-8 clean [`feed::Feed`].
//!
//! - [`feed`] - document model, parsing and the HTTP fetch helper
//! - [`util`] - encoding, text and date normalization
//! - [`render`] - text, HTML, JSON and summary transcripts
//! - [`config`] - TOML configuration for the command-line tool

pub mod config;
pub mod feed;
pub mod render;
pub mod util;

pub use feed::{parse_feed, Enclosure, Feed, FeedKind, Item, ParseError};
