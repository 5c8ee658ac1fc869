use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// How a text fragment pulled out of a feed should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Contains raw markup (`<p>`, `<br>`, `</a>`, `<img ...>`).
    Html,
    /// Contains markup that was entity-escaped one time too many (`&lt;p&gt;`).
    EscapedHtml,
    /// Anything else.
    Plain,
}

#[allow(clippy::expect_used)]
static HTML_SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<p>|</p>|<br\s*/?\s*>|</a>|<img.*>").expect("valid regex")
});

#[allow(clippy::expect_used)]
static ESCAPED_HTML_SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&lt;img src=|&lt;a href=|&lt;br(?:/| /|)&gt;|&lt;p&gt;").expect("valid regex")
});

/// Runs of blank lines separating paragraphs.
#[allow(clippy::expect_used)]
static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n(?:\s*\n)+\s*").expect("valid regex"));

/// Absolute http/https/ftp URI candidates. The character class is the RFC 3986
/// set (unreserved, reserved and `%`); candidates are confirmed with `url::Url`.
#[allow(clippy::expect_used)]
static URI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:https?|ftp)://[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+")
        .expect("valid regex")
});

/// Replacements applied by [`unescape_html`], in order.
const HTML_ESCAPES: [(&str, &str); 8] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&apos;", "'"),
    ("&quot;", "\""),
    ("&amp;", "&"),
    ("&#39;", "'"),
    ("&#038;", "&"),
    ("&#38;", "&"),
];

/// Removes leading and trailing ASCII whitespace, newlines included.
///
/// Non-breaking spaces and other Unicode spaces are kept; they are content in
/// most feeds that use them.
pub fn trim_ws(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii_whitespace() || c == '\u{0b}')
}

/// Classifies a fragment as HTML, over-escaped HTML, or plain text.
pub fn classify(s: &str) -> TextKind {
    if HTML_SIGNATURE_RE.is_match(s) {
        TextKind::Html
    } else if ESCAPED_HTML_SIGNATURE_RE.is_match(s) {
        TextKind::EscapedHtml
    } else {
        TextKind::Plain
    }
}

/// Converts a raw feed fragment into HTML.
///
/// HTML passes through untouched, escaped HTML is unescaped, and plain text
/// becomes paragraphs with autolinked URIs. Not idempotent on plain text:
/// call it exactly once per raw fragment.
///
/// # Examples
///
/// ```
/// use feedmend::util::to_html;
///
/// assert_eq!(to_html("hello\n\nworld"), "<p>hello</p>\n<p>world</p>");
/// assert_eq!(to_html("<p>already</p>"), "<p>already</p>");
/// assert_eq!(to_html("&lt;p&gt;escaped&lt;/p&gt;"), "<p>escaped</p>");
/// ```
pub fn to_html(s: &str) -> String {
    match classify(s) {
        TextKind::Html => s.to_owned(),
        TextKind::EscapedHtml => unescape_html(s),
        TextKind::Plain => plain_to_html(s),
    }
}

/// Undoes one level of HTML entity escaping for the five standard entities
/// and the numeric apostrophe/ampersand forms.
pub fn unescape_html(s: &str) -> String {
    HTML_ESCAPES
        .iter()
        .fold(s.to_owned(), |acc, (entity, ch)| acc.replace(entity, ch))
}

fn plain_to_html(s: &str) -> String {
    let wrapped = format!("<p>{}</p>", trim_ws(s));
    let paragraphs = PARAGRAPH_BREAK_RE.replace_all(&wrapped, "</p>\n<p>");
    autolink(&paragraphs).into_owned()
}

/// Wraps every bare URI in an anchor.
pub fn autolink(s: &str) -> Cow<'_, str> {
    URI_RE.replace_all(s, |caps: &Captures<'_>| {
        let candidate = &caps[0];
        match url::Url::parse(candidate) {
            Ok(_) => format!("<a href=\"{candidate}\">{candidate}</a>"),
            Err(_) => candidate.to_owned(),
        }
    })
}

/// Resolves XML, numeric and HTML5 named entity references.
///
/// References that name no known entity are left in place one at a time,
/// so `Caf&eacute; &bogus; &amp;` still decodes its neighbours.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(s)
}

// ============================================================================
// HTML to plain text (transcript rendering)
// ============================================================================

#[allow(clippy::expect_used)]
static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").expect("valid regex")
});

#[allow(clippy::expect_used)]
static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid regex"));

#[allow(clippy::expect_used)]
static BLOCK_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|div|h[1-6]|blockquote|pre|ul|ol|table)\s*>").expect("valid regex")
});

#[allow(clippy::expect_used)]
static ROW_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:li|tr|dt|dd)\s*>").expect("valid regex"));

#[allow(clippy::expect_used)]
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li(?:\s[^>]*)?>").expect("valid regex"));

#[allow(clippy::expect_used)]
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a\s*>"#)
        .expect("valid regex")
});

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

#[allow(clippy::expect_used)]
static SPACE_AROUND_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("valid regex"));

#[allow(clippy::expect_used)]
static EXTRA_NEWLINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Flattens an HTML fragment into readable plain text.
///
/// Block-level closes become paragraph breaks, `<br>` becomes a newline,
/// anchors keep their target as `text <href>`, every other tag is dropped
/// and entities are resolved.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE_RE.replace_all(html, "");
    let text = ANCHOR_RE.replace_all(&text, |caps: &Captures<'_>| {
        let href = &caps[1];
        let label = TAG_RE.replace_all(&caps[2], "");
        let label = trim_ws(&label);
        if label.is_empty() || label == href {
            href.to_owned()
        } else {
            // Escaped so the tag pass below leaves the target alone
            format!("{label} &lt;{href}&gt;")
        }
    });
    let text = LINE_BREAK_RE.replace_all(&text, "\n");
    let text = BLOCK_END_RE.replace_all(&text, "\n\n");
    let text = ROW_END_RE.replace_all(&text, "\n");
    let text = LIST_ITEM_RE.replace_all(&text, "* ");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);
    let text = SPACE_AROUND_NEWLINE_RE.replace_all(trim_ws(&text), "\n");
    EXTRA_NEWLINES_RE.replace_all(&text, "\n\n").into_owned()
}

/// Removes every tag, leaving text and entities as they are.
pub fn strip_tags(html: &str) -> Cow<'_, str> {
    TAG_RE.replace_all(html, "")
}


/// Cuts `s` after `max_chars` characters and marks the cut with ` ...`.
///
/// `max_chars == 0` means unlimited.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed(s);
    }
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{} ...", &s[..cut])),
        None => Cow::Borrowed(s),
    }
}

// ============================================================================
// Terminal safety
// ============================================================================

/// CSI sequences, OSC sequences, then any remaining control byte except tab/LF/CR.
#[allow(clippy::expect_used)]
static CONTROL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[\x30-\x3f]*[\x20-\x2f]*[\x40-\x7e]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?|[\x00-\x08\x0b\x0c\x0e-\x1f\x7f\x1b]",
    )
    .expect("valid regex")
});

/// SEC-001: Strips ANSI escape sequences and control characters from feed text
/// before it is written to a terminal.
///
/// Returns `Cow::Borrowed` when there is nothing to strip.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    CONTROL_RE.replace_all(s, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_trim_ws() {
        assert_eq!(trim_ws("  \n\thello world \r\n"), "hello world");
        assert_eq!(trim_ws("\n\n"), "");
        assert_eq!(trim_ws("\u{a0}kept\u{a0}"), "\u{a0}kept\u{a0}");
    }

    #[test]
    fn test_classify_html() {
        assert_eq!(classify("<p>para</p>"), TextKind::Html);
        assert_eq!(classify("line<br>line"), TextKind::Html);
        assert_eq!(classify("line<br />line"), TextKind::Html);
        assert_eq!(classify("<a href=\"x\">x</a>"), TextKind::Html);
        assert_eq!(classify("<img src=\"x.png\">"), TextKind::Html);
    }

    #[test]
    fn test_classify_escaped_html() {
        assert_eq!(classify("&lt;p&gt;para&lt;/p&gt;"), TextKind::EscapedHtml);
        assert_eq!(classify("&lt;img src=\"x\"&gt;"), TextKind::EscapedHtml);
        assert_eq!(classify("&lt;a href=\"x\"&gt;"), TextKind::EscapedHtml);
        assert_eq!(classify("a&lt;br/&gt;b"), TextKind::EscapedHtml);
        assert_eq!(classify("a&lt;br /&gt;b"), TextKind::EscapedHtml);
    }

    #[test]
    fn test_classify_plain() {
        assert_eq!(classify("just words"), TextKind::Plain);
        assert_eq!(classify("1 &lt; 2"), TextKind::Plain);
        assert_eq!(classify("<b>bold only</b>"), TextKind::Plain);
    }

    #[test]
    fn test_plain_text_paragraphs() {
        assert_eq!(to_html("hello\n\nworld"), "<p>hello</p>\n<p>world</p>");
        assert_eq!(
            to_html("one\n  \n\n two\nstill two"),
            "<p>one</p>\n<p>two\nstill two</p>"
        );
    }

    #[test]
    fn test_html_is_returned_unchanged() {
        let html = "<p>hello</p>\n\n<p>world</p>";
        assert_eq!(to_html(html), html);
    }

    #[test]
    fn test_escaped_html_is_unescaped() {
        assert_eq!(
            to_html("&lt;p&gt;Tom&apos;s &quot;cafe&quot; &amp; bar&lt;/p&gt;"),
            "<p>Tom's \"cafe\" & bar</p>"
        );
        assert_eq!(unescape_html("it&#39;s &#38; &#038;"), "it's & &");
    }

    #[test]
    fn test_autolink() {
        assert_eq!(
            to_html("see http://example.com/a?b=1 now"),
            "<p>see <a href=\"http://example.com/a?b=1\">http://example.com/a?b=1</a> now</p>"
        );
        assert_eq!(
            to_html("ftp://files.example.org/x.tar.gz"),
            "<p><a href=\"ftp://files.example.org/x.tar.gz\">ftp://files.example.org/x.tar.gz</a></p>"
        );
    }

    #[test]
    fn test_autolink_ignores_other_schemes() {
        assert_eq!(to_html("mailto:me@example.com"), "<p>mailto:me@example.com</p>");
    }

    #[test]
    fn test_uri_stops_at_paragraph_boundary() {
        assert_eq!(
            to_html("https://a.example\n\nnext"),
            "<p><a href=\"https://a.example\">https://a.example</a></p>\n<p>next</p>"
        );
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>First <b>para</b></p><p>Second<br/>line</p><ul><li>one</li><li>two</li></ul>";
        assert_eq!(html_to_text(html), "First para\n\nSecond\nline\n\n* one\n* two");
    }

    #[test]
    fn test_html_to_text_links_and_entities() {
        let html = r#"<p>Read <a href="https://example.com">the post</a> &amp; more&nbsp;here</p>"#;
        assert_eq!(
            html_to_text(html),
            "Read the post <https://example.com> & more\u{a0}here"
        );
    }

    #[test]
    fn test_decode_entities_one_reference_at_a_time() {
        assert_eq!(decode_entities("Caf&eacute; &amp; Bar"), "Café & Bar");
        assert_eq!(decode_entities("&nosuch; &#39;x&#x27; &hellip;"), "&nosuch; 'x' \u{2026}");
        assert!(matches!(decode_entities("no references"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_html_to_text_drops_scripts() {
        assert_eq!(html_to_text("<script>alert(1)</script>safe"), "safe");
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>a <i>b</i></p>"), "a b");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc ...");
        assert_eq!(truncate_chars("abc", 3), "abc");
        assert_eq!(truncate_chars("abc", 0), "abc");
        assert_eq!(truncate_chars("héllo", 2), "hé ...");
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("\x1b[31mred\x1b[0m"), "red");
        assert_eq!(strip_control_chars("a\x07b\tc\n"), "ab\tc\n");
        assert_eq!(strip_control_chars("\x1b]0;title\x07text"), "text");
        assert!(matches!(strip_control_chars("clean"), Cow::Borrowed(_)));
    }

    proptest! {
        #[test]
        fn prop_trim_is_idempotent(s in "\\PC{0,40}") {
            prop_assert_eq!(trim_ws(trim_ws(&s)), trim_ws(&s));
        }

        #[test]
        fn prop_html_input_is_unchanged(s in "[a-z ]{0,20}") {
            let html = format!("<p>{s}</p>");
            prop_assert_eq!(to_html(&html), html);
        }
    }
}
