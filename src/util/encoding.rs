//! Coercion of feed text into UTF-8.
//!
//! Feeds lie about their encoding all the time: a document declared as
//! `ISO-8859-1` is frequently UTF-8 already, and a document declared as
//! UTF-8 sometimes carries stray Latin-1 bytes. [`normalize`] never fails;
//! it picks the most plausible reading and always hands back a `String`.

use std::borrow::Cow;

/// The encoding every extracted string is normalized to.
pub const CANONICAL_ENCODING: &str = "utf-8";

/// Converts raw text bytes that claim to be in `claimed_encoding` into UTF-8.
///
/// - Claimed UTF-8 (`utf-8` or `utf8`, any casing): the bytes are taken as
///   they are, with invalid sequences replaced.
/// - Otherwise, if the bytes already decode as UTF-8 and re-encode to the
///   identical sequence, the label was wrong and the text is returned unchanged.
/// - Otherwise every byte is promoted to the code point of the same value
///   (ISO-8859-1 style), which is lossy for other legacy charsets but never
///   fails.
///
/// # Examples
///
/// ```
/// use feedmend::util::normalize;
///
/// // Latin-1 "café" mislabeled or not, the result is valid UTF-8
/// assert_eq!(normalize(b"caf\xe9", "iso-8859-1"), "café");
///
/// // Already UTF-8 despite the claim
/// assert_eq!(normalize("café".as_bytes(), "iso-8859-1"), "café");
/// ```
pub fn normalize(raw: &[u8], claimed_encoding: &str) -> String {
    normalize_cow(raw, claimed_encoding).into_owned()
}

/// Borrowing variant of [`normalize`]; only allocates when bytes had to be rewritten.
pub fn normalize_cow<'a>(raw: &'a [u8], claimed_encoding: &str) -> Cow<'a, str> {
    if is_canonical(claimed_encoding) {
        // Claimed UTF-8 but not valid: keep what decodes, substitute the rest
        return String::from_utf8_lossy(raw);
    }

    if let Some(text) = reinterpret_as_canonical(raw) {
        return Cow::Borrowed(text);
    }

    tracing::trace!(
        claimed = claimed_encoding,
        len = raw.len(),
        "Promoting single-byte text to UTF-8"
    );
    Cow::Owned(promote_bytes(raw))
}

/// `utf-8` in any casing, plus the common hyphenless `utf8` alias.
fn is_canonical(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case(CANONICAL_ENCODING) || label.eq_ignore_ascii_case("utf8")
}

/// Returns the bytes as `&str` if they are UTF-8 that survives a decode/encode round trip.
fn reinterpret_as_canonical(raw: &[u8]) -> Option<&str> {
    let text = std::str::from_utf8(raw).ok()?;
    (text.as_bytes() == raw).then_some(text)
}

/// Maps each byte to the Unicode scalar with the same value. Cannot fail.
fn promote_bytes(raw: &[u8]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}
