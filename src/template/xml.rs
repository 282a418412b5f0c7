//! A small mutable element tree over `quick-xml` events.
//!
//! PPTX parts are edited in place and written back, so unlike a read-only
//! extractor we keep every event: start tags with their original attributes,
//! whitespace text, declarations and comments. Only elements we touch are
//! re-serialised differently from the input.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// Error raised while parsing or writing an XML part.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct XmlError(String);

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        Self(e.to_string())
    }
}

/// A node in the tree.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Unescaped character data.
    Text(String),
    /// Anything else (declaration, comment, CDATA, PI), written back verbatim.
    Other(Event<'static>),
}

/// An element with its original start tag.
#[derive(Debug, Clone)]
pub struct Element {
    start: BytesStart<'static>,
    name: String,
    self_closing: bool,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element with no attributes.
    pub fn new(name: &str) -> Self {
        Self {
            start: BytesStart::new(name.to_string()),
            name: name.to_string(),
            self_closing: true,
            children: Vec::new(),
        }
    }

    /// Create an element holding a single text node.
    pub fn with_text(name: &str, text: &str) -> Self {
        let mut el = Self::new(name);
        el.set_text(text);
        el
    }

    fn from_start(start: BytesStart<'static>, self_closing: bool) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        Self {
            start,
            name,
            self_closing,
            children: Vec::new(),
        }
    }

    /// Qualified tag name, e.g. `a:t`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unescaped value of the attribute with qualified name `key`.
    pub fn attr(&self, key: &str) -> Option<String> {
        self.start
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == key.as_bytes())
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child named `name`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.name == name)
    }

    /// Follow a chain of direct-child names.
    pub fn find_path_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut current = self;
        for name in path {
            current = current.find_mut(name)?;
        }
        Some(current)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(text.to_string()));
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Drop direct child elements for which `keep` returns false.
    pub fn retain_elements(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            _ => true,
        });
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            Node::Other(_) => {}
        }
    }
}

/// A parsed XML part: the root element plus the nodes around it.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    prolog: Vec<Node>,
    root: Element,
    epilog: Vec<Node>,
}

impl XmlDocument {
    /// Parse a complete XML document.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut prolog: Vec<Node> = Vec::new();
        let mut root: Option<Element> = None;
        let mut epilog: Vec<Node> = Vec::new();

        loop {
            let node = match reader.read_event()? {
                Event::Start(e) => {
                    stack.push(Element::from_start(e.into_owned(), false));
                    continue;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XmlError("unbalanced end tag".into()))?;
                    Node::Element(el)
                }
                Event::Empty(e) => Node::Element(Element::from_start(e.into_owned(), true)),
                Event::Text(t) => Node::Text(t.unescape()?.into_owned()),
                Event::Eof => break,
                other => Node::Other(other.into_owned()),
            };
            if let Some(parent) = stack.last_mut() {
                parent.children.push(node);
                continue;
            }
            match (node, root.is_some()) {
                (Node::Element(el), false) => root = Some(el),
                (Node::Element(el), true) => {
                    return Err(XmlError(format!("second root element <{}>", el.name)))
                }
                (other, false) => prolog.push(other),
                (other, true) => epilog.push(other),
            }
        }

        if let Some(open) = stack.first() {
            return Err(XmlError(format!("unclosed element <{}>", open.name)));
        }
        let root = root.ok_or_else(|| XmlError("document has no root element".into()))?;
        Ok(Self {
            prolog,
            root,
            epilog,
        })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Serialise back to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, XmlError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &Element) -> Result<(), XmlError> {
    if el.self_closing && el.children.is_empty() {
        writer.write_event(Event::Empty(el.start.borrow()))?;
    } else {
        writer.write_event(Event::Start(el.start.borrow()))?;
        for child in &el.children {
            write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    }
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), XmlError> {
    match node {
        Node::Element(el) => write_element(writer, el)?,
        Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        Node::Other(ev) => writer.write_event(ev.clone())?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><a:p><a:r><a:rPr lang="en-US" b="1"/><a:t>Tom &amp; Jerry</a:t></a:r></a:p></p:sld>"#;

    #[test]
    fn unmodified_document_serialises_identically() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn text_is_unescaped_and_reescaped() {
        let mut doc = XmlDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.root().text(), "Tom & Jerry");

        let t = doc
            .root_mut()
            .find_path_mut(&["a:p", "a:r", "a:t"])
            .unwrap();
        t.set_text("<Alice> & Bob");
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(out.contains("<a:t>&lt;Alice&gt; &amp; Bob</a:t>"), "got: {out}");
    }

    #[test]
    fn attributes_are_readable() {
        let doc = XmlDocument::parse(SAMPLE).unwrap();
        let rpr = doc
            .root()
            .find("a:p")
            .and_then(|p| p.find("a:r"))
            .and_then(|r| r.find("a:rPr"))
            .unwrap();
        assert_eq!(rpr.attr("lang").as_deref(), Some("en-US"));
        assert_eq!(rpr.attr("missing"), None);
    }

    #[test]
    fn new_elements_serialise() {
        let mut doc = XmlDocument::parse("<root/>").unwrap();
        doc.root_mut().push(Element::with_text("a:t", "hi"));
        doc.root_mut().push(Element::new("a:br"));
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(out, "<root><a:t>hi</a:t><a:br/></root>");
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("").is_err());
    }
}
