//! Text, date and URL helpers shared by the parser and the renderers.
//!
//! - **Encoding**: coercing feed bytes into UTF-8 whatever the document claims
//! - **Text**: trimming, HTML/plain-text classification and conversion
//! - **Dates**: best-effort parsing of the many date layouts feeds use
//! - **URL validation**: SSRF guard for feed sources given on the command line
//!
//! # Examples
//!
//! ```
//! use feedmend::util::{normalize, resolve_date, to_html, trim_ws};
//!
//! let text = normalize(b"  Caf\xe9  ", "ISO-8859-1");
//! assert_eq!(trim_ws(&text), "Café");
//!
//! assert_eq!(to_html("one\n\ntwo"), "<p>one</p>\n<p>two</p>");
//! assert!(resolve_date("Tue, 10 Jun 2003 09:41:01 GMT").is_some());
//! ```

mod date;
mod encoding;
mod text;
mod url_validator;

pub use date::{resolve_date, resolve_with_format, DateFormat};
pub use encoding::{normalize, normalize_cow, CANONICAL_ENCODING};
pub use text::{
    autolink, classify, decode_entities, html_to_text, strip_control_chars, strip_tags, to_html, trim_ws,
    truncate_chars, unescape_html, TextKind,
};
pub use url_validator::{validate_url, UrlValidationError};
