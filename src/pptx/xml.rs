//! Minimal mutable XML tree for OOXML parts.
//!
//! Slide parts are parsed into [`Element`] trees, edited in place and written
//! back out. Qualified names are kept verbatim (`p:sp`, `a:tbl`), so a
//! round-tripped part keeps the prefixes the authoring tool used. Lookups
//! match on the local name unless the caller asks for a prefixed name.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::Error;

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Qualified name as authored, e.g. `p:spTree`.
    pub name: String,
    /// Attribute pairs in document order, values unescaped.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

fn local_part(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element { name: name.into(), attrs: Vec::new(), children: Vec::new() }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// True when the element's local name matches, regardless of prefix.
    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }

    /// Attribute lookup. A prefixed query (`r:id`) matches exactly; an
    /// unprefixed one falls back to local-name matching, preferring an
    /// exact hit so `attr("id")` on a `p:sldId` never returns `r:id`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        if let Some((_, v)) = self.attrs.iter().find(|(k, _)| k == name) {
            return Some(v);
        }
        if name.contains(':') {
            return None;
        }
        self.attrs
            .iter()
            .find(|(k, _)| local_part(k) == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_owned(), value)),
        }
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    /// Element children in order, skipping text nodes.
    pub fn children_elems(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn children_elems_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children_elems().filter(move |e| e.is(local))
    }

    pub fn named_mut<'a>(&'a mut self, local: &'a str) -> impl Iterator<Item = &'a mut Element> {
        self.children_elems_mut().filter(move |e| e.is(local))
    }

    pub fn child(&self, local: &str) -> Option<&Element> {
        self.children_elems().find(|e| e.is(local))
    }

    pub fn child_mut(&mut self, local: &str) -> Option<&mut Element> {
        self.children_elems_mut().find(|e| e.is(local))
    }

    /// Descend through a chain of child local names.
    pub fn find(&self, path: &[&str]) -> Option<&Element> {
        let mut cur = self;
        for name in path {
            cur = cur.child(name)?;
        }
        Some(cur)
    }

    pub fn find_mut(&mut self, path: &[&str]) -> Option<&mut Element> {
        let mut cur = self;
        for name in path {
            cur = cur.child_mut(name)?;
        }
        Some(cur)
    }

    /// Depth-first walk including `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    pub fn retain_children(&mut self, mut keep: impl FnMut(&Element) -> bool) {
        self.children.retain(|n| match n {
            Node::Element(e) => keep(e),
            Node::Text(_) => true,
        });
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        let el = self.stack.pop()?;
        for child in el.children.iter().rev() {
            if let Node::Element(e) = child {
                self.stack.push(e);
            }
        }
        Some(el)
    }
}

/// Parse an XML part into an element tree.
pub fn parse(bytes: &[u8]) -> Result<Element, Error> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(element_from(&e)?),
            Ok(Event::Empty(e)) => {
                let el = element_from(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(e)) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = utf8(e.as_ref())?;
                    parent.children.push(Node::Text(unescape(raw)));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Text(utf8(e.as_ref())?.to_owned()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    root.ok_or_else(|| Error::Xml("document has no root element".into()))
}

/// Serialise a tree back to bytes, with an XML declaration.
pub fn serialize(root: &Element) -> Vec<u8> {
    let mut out = String::with_capacity(1024);
    out.push_str(XML_DECL);
    write_element(root, &mut out);
    out.into_bytes()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) -> Result<(), Error> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(el));
    } else if root.is_none() {
        *root = Some(el);
    } else {
        return Err(Error::Xml("multiple root elements".into()));
    }
    Ok(())
}

fn element_from(e: &BytesStart) -> Result<Element, Error> {
    let name = utf8(e.name().as_ref())?.to_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?.to_owned();
        let value = unescape(utf8(&attr.value)?);
        attrs.push((key, value));
    }
    Ok(Element { name, attrs, children: Vec::new() })
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|e| Error::Xml(format!("non-utf8 content: {e}")))
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (k, v) in &el.attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        escape_into(v, true, out);
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        match child {
            Node::Element(e) => write_element(e, out),
            Node::Text(t) => escape_into(t, false, out),
        }
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn escape_into(text: &str, in_attr: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attr => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_owned();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match rest.find(';') {
            Some(end) if !rest[1..end].contains('&') => {
                match &rest[1..end] {
                    "lt" => out.push('<'),
                    "gt" => out.push('>'),
                    "amp" => out.push('&'),
                    "apos" => out.push('\''),
                    "quot" => out.push('"'),
                    entity => match char_ref(entity) {
                        Some(c) => out.push(c),
                        None => out.push_str(&rest[..=end]),
                    },
                }
                rest = &rest[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn char_ref(entity: &str) -> Option<char> {
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse().ok()?
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_serialize_round_trip() {
        let src = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:p="urn:p" xmlns:a="urn:a"><p:cSld><p:spTree><a:t>A &amp; B &lt;ok&gt;</a:t></p:spTree></p:cSld></p:sld>"#;
        let root = parse(src).unwrap();
        assert_eq!(root.name, "p:sld");
        let t = root.find(&["cSld", "spTree", "t"]).unwrap();
        assert_eq!(t.text(), "A & B <ok>");

        let bytes = serialize(&root);
        let again = parse(&bytes).unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn attr_prefers_exact_over_local_match() {
        let el = Element::new("p:sldId")
            .with_attr("r:id", "rId7")
            .with_attr("id", "256");
        assert_eq!(el.attr("id"), Some("256"));
        assert_eq!(el.attr("r:id"), Some("rId7"));
        assert_eq!(el.attr("q:id"), None);
    }

    #[test]
    fn numeric_character_references() {
        let root = parse(b"<r a=\"x&#10;y\">&#x2460;</r>").unwrap();
        assert_eq!(root.attr("a"), Some("x\ny"));
        assert_eq!(root.text(), "\u{2460}");
    }

    #[test]
    fn self_closing_for_empty_elements() {
        let root = Element::new("a:ext").with_attr("cx", "100").with_attr("cy", "200");
        assert_eq!(serialize(&root), format!("{XML_DECL}<a:ext cx=\"100\" cy=\"200\"/>").into_bytes());
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let root = parse(b"<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = root.descendants().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }
}
