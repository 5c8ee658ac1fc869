//! Item body extraction.
//!
//! A body element may hold one text node, one CDATA section, one embedded
//! markup element, or a mix of several. Whatever shape it takes, the result
//! is HTML produced by [`to_html`].

use super::xml::{Element, Node};
use crate::util::{to_html, trim_ws};

/// Extracts the HTML body of `element`, or `None` if it carries no content.
///
/// Whitespace-only text nodes are ignored when counting children.
///
/// - Several children: each is serialized back to markup (CDATA sections
///   contribute their bare content), the pieces are joined, trimmed and
///   converted.
/// - A single text node: the element's text, trimmed and converted.
/// - A single CDATA section: its content, trimmed and converted.
/// - A single markup element: its own text, converted untrimmed. When that
///   element has no direct text (XHTML content wrapped in a `div`), its inner
///   markup is used instead.
/// - A single comment, or nothing at all: `None`.
pub fn extract_content(element: &Element) -> Option<String> {
    let children: Vec<&Node> = element
        .children()
        .iter()
        .filter(|node| !node.is_blank_text())
        .collect();

    match children.as_slice() {
        [] | [Node::Comment(_)] => None,
        [Node::Text(_)] => element.text().map(|text| to_html(trim_ws(&text))),
        [Node::CData(raw)] => Some(to_html(trim_ws(raw))),
        [Node::Element(child)] => embedded_markup(child),
        many => {
            let joined: String = many
                .iter()
                .map(|node| match node {
                    Node::CData(raw) => raw.clone(),
                    other => other.to_xml(),
                })
                .collect();
            Some(to_html(trim_ws(&joined)))
        }
    }
}

fn embedded_markup(child: &Element) -> Option<String> {
    if let Some(text) = child.text().filter(|t| !trim_ws(t).is_empty()) {
        return Some(to_html(&text));
    }

    let inner: String = child.children().iter().map(Node::to_xml).collect();
    let inner = trim_ws(&inner);
    (!inner.is_empty()).then(|| to_html(inner))
}
