use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::{Captures, Regex};

use super::content::extract_content;
use super::xml::{Document, Element};
use super::{Enclosure, Feed, FeedKind, Item, ParseError};
use crate::util::{normalize, resolve_date, trim_ws};

/// CDATA sections and comments (kept verbatim), entity references (kept),
/// and any other `&` (escaped). Byte-oriented so undecoded Latin-1 passes.
#[allow(clippy::expect_used)]
static AMPERSAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s-u)<!\[CDATA\[.*?\]\]>|<!--.*?-->|&(?:[A-Za-z_:][A-Za-z0-9_.:\-]*;|#[0-9]+;|#[xX][0-9A-Fa-f]+;)?",
    )
    .expect("valid regex")
});

/// Where RSS 0.9x/2.0 and RSS 1.0 (RDF) put their items, tried in order.
const RSS_ITEM_PATHS: [&str; 4] = ["channel/item", "item", "rss:channel/rss:item", "rss:item"];

/// Atom link types that point at a human-readable page.
const HTML_LINK_TYPES: [&str; 3] = ["text/html", "application/xhtml", "application/xhtml+xml"];

/// Parses a feed document into a [`Feed`].
///
/// The document goes through an ampersand repair pass, is read as XML with
/// every string coerced to UTF-8, and is then classified: a root with a
/// `channel` (or `rss:channel`) child is RSS, a root named `feed` is Atom.
///
/// # Errors
///
/// - [`ParseError::Malformed`] if the markup is still broken after repair
/// - [`ParseError::UnknownFeedType`] if the root is neither RSS nor Atom
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let repaired = repair_ampersands(bytes);
    if let Cow::Owned(ref fixed) = repaired {
        tracing::debug!(
            added = fixed.len() - bytes.len(),
            "Escaped bare ampersands before parsing"
        );
    }

    let document = Document::parse(&repaired, normalize)?;
    let root = document.root().ok_or(ParseError::UnknownFeedType)?;
    let kind = detect_kind(root).ok_or_else(|| {
        tracing::debug!(root = root.name(), "Document root is not a feed");
        ParseError::UnknownFeedType
    })?;

    let encoding = document.encoding().to_owned();
    let feed = match kind {
        FeedKind::Rss => build_rss(root, encoding),
        FeedKind::Atom => build_atom(root, encoding),
    };

    tracing::debug!(
        kind = %feed.kind,
        encoding = %feed.encoding,
        items = feed.items.len(),
        "Parsed feed"
    );
    Ok(feed)
}

/// Escapes every `&` that does not start an entity or character reference.
///
/// CDATA sections and comments are left untouched. Returns the input
/// borrowed when nothing needed escaping.
///
/// # Examples
///
/// ```
/// use feedmend::feed::repair_ampersands;
///
/// let fixed = repair_ampersands(b"<a>Q&A &amp; more</a>");
/// assert_eq!(&*fixed, b"<a>Q&amp;A &amp; more</a>");
/// ```
pub fn repair_ampersands(bytes: &[u8]) -> Cow<'_, [u8]> {
    let has_bare = AMPERSAND_RE.find_iter(bytes).any(|m| m.as_bytes() == b"&");
    if !has_bare {
        return Cow::Borrowed(bytes);
    }
    AMPERSAND_RE.replace_all(bytes, |caps: &Captures<'_>| match &caps[0] {
        b"&" => b"&amp;".to_vec(),
        kept => kept.to_vec(),
    })
}

fn detect_kind(root: &Element) -> Option<FeedKind> {
    if root.find("channel").is_some() || root.find("rss:channel").is_some() {
        Some(FeedKind::Rss)
    } else if root.name() == "feed" {
        Some(FeedKind::Atom)
    } else {
        None
    }
}

/// Text of the first path that names an element with text, trimmed.
///
/// `None` only if no candidate element carries text; an element holding
/// only whitespace yields `Some("")`.
fn first_text(scope: &Element, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| scope.find(path).and_then(Element::text))
        .map(|text| trim_ws(&text).to_owned())
}

fn first_element<'a>(scope: &'a Element, paths: &[&str]) -> Option<&'a Element> {
    paths.iter().find_map(|path| scope.find(path))
}

// ============================================================================
// RSS
// ============================================================================

fn build_rss(root: &Element, encoding: String) -> Feed {
    let creator = first_text(
        root,
        &["channel/dc:creator", "channel/author", "rss:channel/rss:author"],
    );

    let items = RSS_ITEM_PATHS
        .iter()
        .map(|path| root.find_all(path))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
        .into_iter()
        .map(|element| rss_item(element, creator.as_deref()))
        .collect();

    Feed {
        kind: FeedKind::Rss,
        encoding,
        title: first_text(root, &["channel/title", "rss:channel/rss:title"]),
        link: first_text(root, &["channel/link", "rss:channel/rss:link"]),
        description: first_text(root, &["channel/description", "rss:channel/rss:description"]),
        creator,
        items,
    }
}

fn rss_item(element: &Element, feed_creator: Option<&str>) -> Item {
    let body = first_element(element, &["content:encoded", "description", "rss:description"]);

    Item {
        kind: FeedKind::Rss,
        title: first_text(element, &["title", "rss:title", "pubDate", "rss:pubDate"]),
        link: first_text(element, &["link", "rss:link"]).or_else(|| guid_link(element)),
        content: body.and_then(extract_content),
        date: first_text(element, &["dc:date", "pubDate", "rss:pubDate"])
            .and_then(|text| resolve_date(&text)),
        creator: first_text(element, &["dc:creator", "author", "rss:author"])
            .or_else(|| feed_creator.map(str::to_owned)),
        subject: first_text(element, &["dc:subject"]),
        category: first_text(element, &["dc:category", "category", "rss:category"]),
        enclosures: element.children_named("enclosure").map(enclosure).collect(),
    }
}

/// The `guid` as a link, unless it is explicitly marked as not a permalink.
fn guid_link(element: &Element) -> Option<String> {
    let guid = first_element(element, &["guid", "rss:guid"])?;
    if guid.attr("isPermaLink") == Some("false") {
        return None;
    }
    guid.text().map(|text| trim_ws(&text).to_owned())
}

fn enclosure(element: &Element) -> Enclosure {
    let attr = |key: &str| element.attr(key).map(str::to_owned);
    Enclosure {
        url: attr("url"),
        length: attr("length"),
        media_type: attr("type"),
    }
}

// ============================================================================
// Atom
// ============================================================================

fn build_atom(root: &Element, encoding: String) -> Feed {
    let creator = first_text(root, &["author/name"]);

    let items = root
        .children_named("entry")
        .map(|element| atom_entry(element, creator.as_deref()))
        .collect();

    Feed {
        kind: FeedKind::Atom,
        encoding,
        title: first_text(root, &["title"]),
        link: html_link(root),
        description: atom_description(root),
        creator,
        items,
    }
}

fn atom_entry(element: &Element, feed_creator: Option<&str>) -> Item {
    Item {
        kind: FeedKind::Atom,
        title: first_text(element, &["title"]),
        link: html_link(element),
        content: first_element(element, &["content", "summary"]).and_then(atom_body),
        date: first_text(element, &["issued", "created", "published", "updated"])
            .and_then(|text| resolve_date(&text)),
        creator: first_text(element, &["author/name"])
            .or_else(|| feed_creator.map(str::to_owned)),
        subject: None,
        category: None,
        enclosures: Vec::new(),
    }
}

/// `href` of the last `link` child whose type is an HTML page.
fn html_link(scope: &Element) -> Option<String> {
    scope
        .children_named("link")
        .filter(|link| {
            link.attr("type")
                .is_some_and(|kind| HTML_LINK_TYPES.contains(&kind))
        })
        .filter_map(|link| link.attr("href"))
        .last()
        .map(|href| trim_ws(href).to_owned())
}

/// Atom 0.3 `info` is kept as markup (its inner `div` if it has one);
/// `tagline` and Atom 1.0 `subtitle` are plain text.
fn atom_description(root: &Element) -> Option<String> {
    match root.find("info") {
        Some(info) => {
            let markup = info.find("div").unwrap_or(info).to_xml();
            Some(trim_ws(&markup).to_owned())
        }
        None => first_text(root, &["tagline", "subtitle"]),
    }
}

/// `mode="escaped"` bodies are already HTML and are only trimmed.
fn atom_body(body: &Element) -> Option<String> {
    if body.attr("mode") == Some("escaped") {
        if let Some(text) = body.text() {
            return Some(trim_ws(&text).to_owned());
        }
    }
    extract_content(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_repair_escapes_bare_ampersands() {
        let fixed = repair_ampersands(b"<t>Fish & Chips &c</t>");
        assert_eq!(&*fixed, b"<t>Fish &amp; Chips &amp;c</t>");
    }

    #[test]
    fn test_repair_keeps_references() {
        let input: &[u8] = b"<t>&amp; &lt; &#38; &#x26; &nbsp; &dc:x;</t>";
        assert!(matches!(repair_ampersands(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_repair_skips_cdata_and_comments() {
        let input: &[u8] = b"<t><![CDATA[a & b]]><!-- c & d --> e & f</t>";
        let fixed = repair_ampersands(input);
        assert_eq!(&*fixed, b"<t><![CDATA[a & b]]><!-- c & d --> e &amp; f</t>" as &[u8]);
    }

    #[test]
    fn test_repair_handles_latin1_bytes_in_cdata() {
        let input: &[u8] = b"<t><![CDATA[caf\xe9 & cr\xe8me]]></t>";
        assert!(matches!(repair_ampersands(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_repair_in_attribute_values() {
        let fixed = repair_ampersands(br#"<a href="/?a=1&b=2"/>"#);
        assert_eq!(&*fixed, br#"<a href="/?a=1&amp;b=2"/>"# as &[u8]);
    }

    #[test]
    fn test_detect_kind() {
        let kind = |xml: &str| {
            let doc = Document::parse(xml.as_bytes(), normalize).unwrap();
            detect_kind(doc.root().unwrap())
        };
        assert_eq!(kind("<rss><channel/></rss>"), Some(FeedKind::Rss));
        assert_eq!(kind("<rdf:RDF><channel/></rdf:RDF>"), Some(FeedKind::Rss));
        assert_eq!(kind("<x><rss:channel/></x>"), Some(FeedKind::Rss));
        assert_eq!(kind("<feed/>"), Some(FeedKind::Atom));
        assert_eq!(kind("<html><body/></html>"), None);
    }

    #[test]
    fn test_first_text_prefers_element_with_text() {
        let doc = Document::parse(
            b"<i><a/><b>  second  </b><c>third</c></i>",
            normalize,
        )
        .unwrap();
        let root = doc.root().unwrap();
        assert_eq!(first_text(root, &["a", "b", "c"]).as_deref(), Some("second"));
        assert_eq!(first_text(root, &["a", "z"]), None);
    }

    #[test]
    fn test_html_link_takes_last_match() {
        let doc = Document::parse(
            br#"<entry>
                <link rel="alternate" type="text/html" href="https://a.example/"/>
                <link rel="self" type="application/atom+xml" href="https://self.example/"/>
                <link rel="alternate" type="application/xhtml+xml" href=" https://b.example/ "/>
            </entry>"#,
            normalize,
        )
        .unwrap();
        assert_eq!(html_link(doc.root().unwrap()).as_deref(), Some("https://b.example/"));
    }

    #[test]
    fn test_escaped_atom_body_is_trimmed_only() {
        let doc = Document::parse(
            b"<content mode=\"escaped\">  &lt;b&gt;bold&lt;/b&gt;  </content>",
            normalize,
        )
        .unwrap();
        assert_eq!(atom_body(doc.root().unwrap()).as_deref(), Some("<b>bold</b>"));
    }
}
