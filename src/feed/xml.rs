//! A small owned element tree over `quick-xml` pull events.
//!
//! Feed extraction needs random access ("the first `channel/title`", "every
//! `enclosure` child"), so the event stream is folded into [`Element`]s once.
//! Names keep their namespace prefixes literally: `dc:creator` is looked up as
//! `dc:creator`, whatever URI the prefix is bound to.
//!
//! Text never goes through the reader's own decoder. Raw bytes of text, CDATA
//! and attribute values are handed to a caller-supplied [`DecodeHook`] along
//! with the declared document encoding, then entity references are resolved.

use std::borrow::Cow;
use std::io::Cursor;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::util::decode_entities;

/// Encoding assumed when the document has no XML declaration.
pub const DEFAULT_ENCODING: &str = "UTF-8";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Turns raw text bytes into a string, given the declared document encoding.
pub type DecodeHook = fn(&[u8], &str) -> String;

/// The document could not be read as XML.
#[derive(Debug, Error)]
#[error("malformed XML at byte {position}: {message}")]
pub struct XmlError {
    /// Byte offset the reader had reached.
    pub position: u64,
    pub message: String,
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Character data with entity references already resolved.
    Text(String),
    CData(String),
    Comment(String),
}

/// An XML element with its attributes and children in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

/// A parsed document: its declared encoding and its root element.
#[derive(Debug, Clone)]
pub struct Document {
    encoding: String,
    root: Option<Element>,
}

impl Document {
    /// Builds the element tree, decoding all character data through `decode`.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError`] on any syntax error: mismatched or unclosed tags,
    /// a second root element, or markup the reader cannot tokenize.
    pub fn parse(bytes: &[u8], decode: DecodeHook) -> Result<Self, XmlError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut encoding = DEFAULT_ENCODING.to_owned();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| XmlError {
                position: reader.buffer_position() as u64,
                message: e.to_string(),
            })?;
            let position = reader.buffer_position() as u64;

            match event {
                Event::Decl(decl) => {
                    if let Some(Ok(label)) = decl.encoding() {
                        let label = String::from_utf8_lossy(&label).trim().to_owned();
                        if !label.is_empty() {
                            encoding = label;
                        }
                    }
                }
                Event::Start(start) => {
                    stack.push(Element::from_start(&start, &encoding, decode));
                }
                Event::Empty(start) => {
                    let element = Element::from_start(&start, &encoding, decode);
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| XmlError {
                        position,
                        message: "closing tag without an open element".to_owned(),
                    })?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::Text(text) => {
                    // Character data outside the root element is ignored
                    if let Some(parent) = stack.last_mut() {
                        let decoded = decode(&text, &encoding);
                        let resolved = decode_entities(&decoded).into_owned();
                        parent.children.push(Node::Text(resolved));
                    }
                }
                Event::CData(cdata) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(decode(&cdata, &encoding)));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Comment(decode(&comment, &encoding)));
                    }
                }
                Event::Eof => break,
                // Processing instructions and doctype
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError {
                position: reader.buffer_position() as u64,
                message: format!("unclosed element <{}>", open.name),
            });
        }

        Ok(Self { encoding, root })
    }

    /// The encoding label from the XML declaration, or [`DEFAULT_ENCODING`].
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// The root element; `None` for a document with no elements at all.
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
    position: u64,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlError {
            position,
            message: format!("second root element <{}>", element.name),
        });
    }
    *root = Some(element);
    Ok(())
}


impl Element {
    /// Creates an empty element; mostly useful for building trees in tests.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute, builder style.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Appends a child node, builder style.
    pub fn with_child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    fn from_start(start: &BytesStart<'_>, encoding: &str, decode: DecodeHook) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();

        for attr_result in start.attributes() {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::warn!(element = %name, error = %e, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = decode_entities(&decode(&attr.value, encoding)).into_owned();
            attributes.push((key, value));
        }

        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Qualified name, prefix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the attribute with this qualified name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Direct child elements, skipping text, CDATA and comments.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Direct child elements with the given qualified name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Every element reached by walking `path` (`"channel/item"`) through
    /// direct children, in document order.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        path.split('/')
            .filter(|step| !step.is_empty())
            .fold(vec![self], |current, step| {
                current
                    .into_iter()
                    .flat_map(|e| e.child_elements().filter(move |c| c.name == step))
                    .collect()
            })
    }

    /// The first element reached by walking `path`.
    pub fn find(&self, path: &str) -> Option<&Element> {
        self.find_all(path).into_iter().next()
    }

    /// The concatenated text and CDATA children, or `None` if there are none
    /// or they are all empty. Text inside nested elements is not included.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        let mut parts = self.children.iter().filter_map(|node| match node {
            Node::Text(t) | Node::CData(t) if !t.is_empty() => Some(t.as_str()),
            _ => None,
        });
        let first = parts.next()?;
        match parts.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{first}{second}");
                parts.for_each(|p| joined.push_str(p));
                Some(Cow::Owned(joined))
            }
        }
    }

    /// Serializes the element and its subtree back to markup.
    pub fn to_xml(&self) -> String {
        serialize(|writer| write_element(writer, self))
    }
}

impl Node {
    /// Serializes the node: text is escaped, CDATA re-wrapped, comments kept.
    pub fn to_xml(&self) -> String {
        serialize(|writer| write_node(writer, self))
    }

    /// True for text nodes holding nothing but whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }
}

fn serialize<F>(write: F) -> String
where
    F: FnOnce(&mut Writer<Cursor<Vec<u8>>>) -> Result<(), String>,
{
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    if let Err(e) = write(&mut writer) {
        tracing::warn!(error = %e, "Failed to serialize XML fragment");
    }
    String::from_utf8_lossy(&writer.into_inner().into_inner()).into_owned()
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> Result<(), String> {
    let event = match node {
        Node::Element(e) => return write_element(writer, e),
        Node::Text(t) => Event::Text(BytesText::from_escaped(partial_escape(t))),
        Node::CData(t) => Event::CData(BytesCData::new(t.as_str())),
        Node::Comment(t) => Event::Comment(BytesText::from_escaped(t.as_str())),
    };
    writer.write_event(event).map_err(|e| e.to_string())
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<(), String> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| e.to_string());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| e.to_string())?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::normalize;
    use pretty_assertions::assert_eq;

    fn parse(xml: &str) -> Document {
        Document::parse(xml.as_bytes(), normalize).unwrap()
    }

    #[test]
    fn test_encoding_from_declaration() {
        let doc = parse(r#"<?xml version="1.0" encoding="ISO-8859-1"?><rss/>"#);
        assert_eq!(doc.encoding(), "ISO-8859-1");
        assert_eq!(doc.root().map(Element::name), Some("rss"));
    }

    #[test]
    fn test_default_encoding() {
        let doc = parse("<rss/>");
        assert_eq!(doc.encoding(), DEFAULT_ENCODING);
    }

    #[test]
    fn test_latin1_text_goes_through_hook() {
        let xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t a=\"\xe9\">caf\xe9</t>";
        let doc = Document::parse(xml, normalize).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.text().as_deref(), Some("café"));
        assert_eq!(root.attr("a"), Some("é"));
    }

    #[test]
    fn test_bom_is_skipped() {
        let mut xml = UTF8_BOM.to_vec();
        xml.extend_from_slice(b"<feed><title>x</title></feed>");
        let doc = Document::parse(&xml, normalize).unwrap();
        assert_eq!(doc.root().unwrap().name(), "feed");
    }

    #[test]
    fn test_prefixed_paths() {
        let doc = parse(
            r#"<rdf:RDF><rss:channel><rss:title>T</rss:title></rss:channel><dc:x/></rdf:RDF>"#,
        );
        let root = doc.root().unwrap();
        assert_eq!(root.name(), "rdf:RDF");
        let title = root.find("rss:channel/rss:title").unwrap();
        assert_eq!(title.text().as_deref(), Some("T"));
        assert!(root.find("channel/title").is_none());
    }

    #[test]
    fn test_find_all_in_document_order() {
        let doc = parse("<r><c><i>1</i><i>2</i></c><c><i>3</i></c><i>root</i></r>");
        let root = doc.root().unwrap();
        let texts: Vec<_> = root
            .find_all("c/i")
            .into_iter()
            .filter_map(|e| e.text().map(Cow::into_owned))
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
        assert_eq!(root.find_all("i").len(), 1);
    }

    #[test]
    fn test_text_and_entities() {
        let doc = parse("<t>Fish &amp; Chips &#39;n&#x27; more&nbsp;</t>");
        assert_eq!(
            doc.root().unwrap().text().as_deref(),
            Some("Fish & Chips 'n' more\u{a0}")
        );
    }

    #[test]
    fn test_unknown_entity_keeps_raw_text() {
        let doc = parse("<t>a &bogus; b</t>");
        assert_eq!(doc.root().unwrap().text().as_deref(), Some("a &bogus; b"));

        let doc = parse("<t>&eacute;t&eacute; &bogus; &amp; &#39;</t>");
        assert_eq!(doc.root().unwrap().text().as_deref(), Some("été &bogus; & '"));
    }

    #[test]
    fn test_text_includes_cdata() {
        let doc = parse("<t>\n  <![CDATA[<b>hi</b>]]>\n</t>");
        assert_eq!(
            doc.root().unwrap().text().as_deref(),
            Some("\n  <b>hi</b>\n")
        );
    }

    #[test]
    fn test_empty_element_has_no_text() {
        let doc = parse("<r><a></a><b/><c> </c></r>");
        let root = doc.root().unwrap();
        assert!(root.find("a").unwrap().text().is_none());
        assert!(root.find("b").unwrap().text().is_none());
        assert_eq!(root.find("c").unwrap().text().as_deref(), Some(" "));
    }

    #[test]
    fn test_serialization() {
        let doc = parse(
            r#"<div class="x"><p>1 &lt; 2</p><br/><![CDATA[raw <b>]]><!-- note --></div>"#,
        );
        assert_eq!(
            doc.root().unwrap().to_xml(),
            r#"<div class="x"><p>1 &lt; 2</p><br/><![CDATA[raw <b>]]><!-- note --></div>"#
        );
    }

    #[test]
    fn test_blank_text_detection() {
        assert!(Node::Text(" \n\t".into()).is_blank_text());
        assert!(!Node::Text(" x ".into()).is_blank_text());
        assert!(!Node::CData(String::new()).is_blank_text());
    }

    #[test]
    fn test_builder() {
        let e = Element::new("enclosure")
            .with_attribute("url", "http://x/a.mp3")
            .with_child(Node::Text("t".into()));
        assert_eq!(e.to_xml(), r#"<enclosure url="http://x/a.mp3">t</enclosure>"#);
    }

    #[test]
    fn test_mismatched_tags_error() {
        let err = Document::parse(b"<a><b></a></b>", normalize).unwrap_err();
        assert!(err.to_string().contains("malformed XML"));
    }

    #[test]
    fn test_unclosed_element_error() {
        assert!(Document::parse(b"<a><b>text", normalize).is_err());
    }

    #[test]
    fn test_second_root_error() {
        let err = Document::parse(b"<a/><b/>", normalize).unwrap_err();
        assert!(err.message.contains("second root"));
    }

    #[test]
    fn test_no_root() {
        let doc = parse("<?xml version=\"1.0\"?>\n<!-- nothing -->\n");
        assert!(doc.root().is_none());
    }
}
