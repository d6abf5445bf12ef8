use std::borrow::Cow;
use std::io::Write;

use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::xml::c14n::{escape_attr_value, escape_text_value};
use crate::xml::{Error, Result, XML_HEADER};

/// A child of an [`Element`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Qualified name as written, e.g. `samlp:AuthnRequest`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without its namespace prefix
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Namespace prefix, empty for the default namespace
    pub fn prefix(&self) -> &str {
        self.name.split_once(':').map_or("", |(prefix, _)| prefix)
    }

    /// All attributes, namespace declarations included, in document order
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Value of the attribute with this exact qualified name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing one with the same name
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Concatenated text of the direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Replace all children with a single text node.
    ///
    /// An empty string leaves the element without children; it still
    /// serializes as an element of its own.
    pub fn set_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.children.clear();
        self.push_text(&text.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Append a child element and return a handle to it
    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(Node::Element(child));
        match self.children.last_mut() {
            Some(Node::Element(element)) => element,
            _ => unreachable!("an element was just pushed"),
        }
    }

    /// Append a new empty child element named `name`
    pub fn add_child(&mut self, name: impl Into<String>) -> &mut Element {
        self.push(Element::new(name))
    }

    /// Append a child element carrying a single text value
    pub fn add_text_child(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.push(Element::new(name).with_text(text));
        self
    }

    /// Insert `child` directly before the first child element whose local
    /// name is `sibling`, or append it when there is no such sibling.
    pub fn insert_before(&mut self, sibling: &str, child: Element) -> &mut Element {
        let position = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.local_name() == sibling))
            .unwrap_or(self.children.len());
        self.children.insert(position, Node::Element(child));
        match &mut self.children[position] {
            Node::Element(element) => element,
            Node::Text(_) => unreachable!("an element was just inserted"),
        }
    }

    /// Remove the direct child elements with the given local name
    pub fn remove_children(&mut self, local_name: &str) -> Vec<Element> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(element) if element.local_name() == local_name => {
                    removed.push(element)
                }
                other => kept.push(other),
            }
        }
        self.children = kept;
        removed
    }

    /// First element matching a `/`-separated path of local names, relative
    /// to this element. An empty path selects the element itself.
    pub fn find(&self, path: &str) -> Option<&Element> {
        let segments = split_path(path);
        find_in(self, &segments)
    }

    /// Mutable handle to the first element matching the path
    pub fn find_mut(&mut self, path: &str) -> Option<&mut Element> {
        let segments = split_path(path);
        find_in_mut(self, &segments)
    }

    /// All elements matching the path, in document order
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let segments = split_path(path);
        let mut found = Vec::new();
        collect_in(self, &segments, &mut found);
        found
    }

    /// Text of the first element matching the path
    pub fn find_text(&self, path: &str) -> Option<String> {
        self.find(path).map(Element::text)
    }

    /// Parse a document and return its root element.
    ///
    /// Comments, processing instructions and the XML declaration are dropped.
    /// Literal line endings are normalized to `\n` before character
    /// references are expanded, so an escaped `&#xD;` survives. Literal
    /// whitespace in attribute values becomes a space.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event().map_err(Error::syntax)? {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::Syntax("unexpected closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let raw = normalize_line_endings(std::str::from_utf8(&e)?);
                        let text = unescape(&raw).map_err(Error::syntax)?;
                        parent.push_text(&text);
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        let raw = e.into_inner();
                        let text = std::str::from_utf8(&raw)?;
                        parent.push_text(&normalize_line_endings(text));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(Error::Syntax(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or(Error::NoRoot)
    }

    /// Serialize this element without an XML declaration
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| Error::Utf8(e.utf8_error()))
    }

    /// Serialize this element as a complete document with an XML declaration
    pub fn to_document(&self) -> Result<String> {
        Ok(format!("{XML_HEADER}{}", self.to_xml()?))
    }

    fn from_start(start: &BytesStart) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(Error::syntax)?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_owned();
            let raw = normalize_attr_whitespace(std::str::from_utf8(&attr.value)?);
            let value = unescape(&raw).map_err(Error::syntax)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(text),
            _ => self.children.push(Node::Text(text.to_owned())),
        }
    }

    fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        // Escaped the canonical way so CR, TAB and LF survive a reparse
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            let mut escaped = String::with_capacity(value.len());
            escape_attr_value(&mut escaped, value);
            start.push_attribute(Attribute::from((key.as_bytes(), escaped.as_bytes())));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(Error::write)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(Error::write)?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_to(writer)?,
                Node::Text(text) => {
                    let mut escaped = String::with_capacity(text.len());
                    escape_text_value(&mut escaped, text);
                    writer
                        .write_event(Event::Text(BytesText::from_escaped(escaped)))
                        .map_err(Error::write)?
                }
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(Error::write)?;
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn find_in<'a>(element: &'a Element, segments: &[&str]) -> Option<&'a Element> {
    match segments.split_first() {
        None => Some(element),
        Some((first, rest)) => element
            .child_elements()
            .filter(|child| child.local_name() == *first)
            .find_map(|child| find_in(child, rest)),
    }
}

fn find_in_mut<'a>(element: &'a mut Element, segments: &[&str]) -> Option<&'a mut Element> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(element);
    };
    for node in element.children.iter_mut() {
        if let Node::Element(child) = node {
            if child.local_name() == *first {
                if let Some(found) = find_in_mut(child, rest) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn collect_in<'a>(element: &'a Element, segments: &[&str], found: &mut Vec<&'a Element>) {
    match segments.split_first() {
        None => found.push(element),
        Some((first, rest)) => {
            for child in element
                .child_elements()
                .filter(|child| child.local_name() == *first)
            {
                collect_in(child, rest, found);
            }
        }
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(Error::MultipleRoots);
    }
    *root = Some(element);
    Ok(())
}

/// Normalize line endings to LF as an XML processor must
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Attribute value normalization for CDATA attributes
fn normalize_attr_whitespace(value: &str) -> Cow<'_, str> {
    if !value.contains(['\t', '\n', '\r']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(
        normalize_line_endings(value)
            .chars()
            .map(|ch| if matches!(ch, '\t' | '\n') { ' ' } else { ch })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECTORY_RES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DirectoryRes xmlns="http://www.idealdesk.com/ideal/messages/mer-acq/3.3.1" version="3.3.1">
  <!-- acquirer comment -->
  <Directory>
    <Country>
      <countryNames>Nederland</countryNames>
      <Issuer><issuerID>INGBNL2A</issuerID><issuerName>ING</issuerName></Issuer>
      <Issuer><issuerID>RABONL2U</issuerID><issuerName>Rabobank</issuerName></Issuer>
    </Country>
  </Directory>
</DirectoryRes>"#;

    #[test]
    fn test_parse_and_find() {
        let root = Element::parse(DIRECTORY_RES).unwrap();

        assert_eq!(root.name(), "DirectoryRes");
        assert_eq!(root.attr("version"), Some("3.3.1"));
        assert_eq!(
            root.find_text("Directory/Country/countryNames").as_deref(),
            Some("Nederland")
        );

        let issuers = root.find_all("Directory/Country/Issuer/issuerID");
        let ids: Vec<String> = issuers.iter().map(|e| e.text()).collect();
        assert_eq!(ids, vec!["INGBNL2A", "RABONL2U"]);
        assert!(root.find("Directory/Missing").is_none());
    }

    #[test]
    fn test_local_name_matching_ignores_prefix() {
        let xml = r#"<root xmlns:saml="urn:a"><saml:Attribute Name="x"><saml:AttributeValue>v</saml:AttributeValue></saml:Attribute></root>"#;
        let root = Element::parse(xml).unwrap();

        let attribute = root.find("Attribute").unwrap();
        assert_eq!(attribute.prefix(), "saml");
        assert_eq!(attribute.local_name(), "Attribute");
        assert_eq!(attribute.attr("Name"), Some("x"));
        assert_eq!(root.find_text("Attribute/AttributeValue").as_deref(), Some("v"));
    }

    #[test]
    fn test_entities_and_cdata_are_decoded() {
        let xml = "<a t=\"x &amp; y\">1 &lt; 2<![CDATA[ & 3]]></a>";
        let root = Element::parse(xml).unwrap();
        assert_eq!(root.attr("t"), Some("x & y"));
        assert_eq!(root.text(), "1 < 2 & 3");
    }

    #[test]
    fn test_line_endings_are_normalized() {
        let root = Element::parse("<a>one\r\ntwo\rthree</a>").unwrap();
        assert_eq!(root.text(), "one\ntwo\nthree");
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let mut root = Element::new("Msg").with_attr("xmlns", "urn:test");
        root.add_text_child("createDateTimestamp", "2024-01-01T00:00:00.000Z");
        let merchant = root.add_child("Merchant");
        merchant.add_text_child("merchantID", "0020000387");
        merchant.add_text_child("subID", "");
        root.add_text_child("description", "<Fish & Chips>");

        let xml = root.to_xml().unwrap();
        assert!(xml.contains("<subID/>"));
        assert_eq!(Element::parse(&xml).unwrap(), root);

        let document = root.to_document().unwrap();
        assert!(document.starts_with(XML_HEADER));
        assert_eq!(Element::parse(&document).unwrap(), root);
    }

    #[test]
    fn test_carriage_return_survives_roundtrip() {
        let mut root = Element::new("Transaction").with_attr("note", "a\tb\r\nc \"d\"");
        root.add_text_child("description", "Order 1\r\nThanks & <more>\r");

        let xml = root.to_xml().unwrap();
        assert!(xml.contains("Order 1&#xD;\nThanks &amp; &lt;more&gt;&#xD;"));
        assert!(xml.contains(r#"note="a&#x9;b&#xD;&#xA;c &quot;d&quot;""#));

        let parsed = Element::parse(&xml).unwrap();
        assert_eq!(parsed, root);
        assert_eq!(
            parsed.find_text("description").as_deref(),
            Some("Order 1\r\nThanks & <more>\r")
        );
    }

    #[test]
    fn test_literal_whitespace_in_attributes_is_normalized() {
        let root = Element::parse("<a t=\"x\r\ny\tz\" u=\"&#xD;\"/>").unwrap();
        assert_eq!(root.attr("t"), Some("x y z"));
        assert_eq!(root.attr("u"), Some("\r"));
    }

    #[test]
    fn test_insert_before_and_remove_children() {
        let mut root = Element::new("AcquirerTrxReq");
        root.add_child("createDateTimestamp");
        root.add_child("Merchant");
        root.insert_before("Merchant", Element::new("Issuer"));
        root.add_child("Transaction");

        let order: Vec<&str> = root.child_elements().map(Element::name).collect();
        assert_eq!(
            order,
            vec!["createDateTimestamp", "Issuer", "Merchant", "Transaction"]
        );

        let removed = root.remove_children("Issuer");
        assert_eq!(removed.len(), 1);
        assert!(root.find("Issuer").is_none());
    }

    #[test]
    fn test_set_attr_replaces_existing_value() {
        let mut element = Element::new("a").with_attr("version", "1");
        element.set_attr("version", "2");
        assert_eq!(element.attributes().len(), 1);
        assert_eq!(element.attr("version"), Some("2"));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(Element::parse("").is_err());
        assert!(Element::parse("<a><b></a>").is_err());
        assert!(Element::parse("<a/><b/>").is_err());
        assert!(Element::parse("<a>").is_err());
    }
}
