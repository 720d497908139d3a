//! Owned markup tree used for envelopes and documents.
//!
//! Lookups match on local names, so `cps:content` is found by `content`;
//! qualified names are kept as-is for serialization.

use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

/// Markup that failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct XmlError(pub String);

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A markup element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    /// Qualified tag name, including any namespace prefix.
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Parses a complete markup document and returns its root element.
    pub fn parse(input: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                XmlError(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;

            match event {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(XmlError("content after root element".into()));
                    }
                    stack.push(element_from_start(&start)?);
                }
                Event::Empty(start) => {
                    if root.is_some() {
                        return Err(XmlError("content after root element".into()));
                    }
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError("unbalanced end tag".into()))?;
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| XmlError(e.to_string()))?;
                    push_text(&mut stack, &text)?;
                }
                Event::CData(data) => {
                    let data = data.into_inner();
                    let text = std::str::from_utf8(&data)
                        .map_err(|_| XmlError("invalid UTF-8 in CDATA section".into()))?;
                    push_text(&mut stack, text)?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctypes.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError(format!(
                "unexpected end of input inside <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        root.ok_or_else(|| XmlError("no root element".into()))
    }

    /// Parses raw bytes, which must be UTF-8.
    pub fn parse_bytes(input: &[u8]) -> Result<Self, XmlError> {
        let text =
            std::str::from_utf8(input).map_err(|_| XmlError("input is not valid UTF-8".into()))?;
        Self::parse(text)
    }

    /// Tag name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Value of the attribute whose local name is `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local(key) == name)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given local name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(e) if e.local_name() == name => Some(e),
            _ => None,
        })
    }

    /// All child elements with the given local name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.local_name() == name)
    }

    /// Follows a sequence of child tags; `None` if any step is missing.
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, step| element.find(step.as_ref()))
    }

    /// Direct text content, trimmed; `None` when empty.
    pub fn text(&self) -> Option<String> {
        let mut text = String::new();
        for node in &self.children {
            if let Node::Text(t) = node {
                text.push_str(t);
            }
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Text of the first child element named `name`.
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.find(name).and_then(Element::text)
    }

    /// Replaces all direct text nodes with `text`, placed before any children.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children.retain(|node| matches!(node, Node::Element(_)));
        self.children.insert(0, Node::Text(text.into()));
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Serializes this element and its subtree.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                Node::Element(e) => e.write_xml(out),
                Node::Text(t) => out.push_str(&partial_escape(t.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Converts the subtree to a generic tree of fields.
    ///
    /// Leaves become their text (or null), elements with children become
    /// objects keyed by child tag, and an element whose children repeat a
    /// tag becomes an array of single-key objects.
    pub fn to_value(&self) -> Value {
        let children: Vec<&Element> = self.elements().collect();
        if children.is_empty() {
            return self.text().map(Value::String).unwrap_or(Value::Null);
        }

        let mut seen = std::collections::HashSet::new();
        let repeated = children.iter().any(|c| !seen.insert(c.local_name()));

        if repeated {
            Value::Array(
                children
                    .iter()
                    .map(|c| {
                        let mut entry = Map::new();
                        entry.insert(c.local_name().to_string(), c.to_value());
                        Value::Object(entry)
                    })
                    .collect(),
            )
        } else {
            let mut map = Map::new();
            for child in children {
                map.insert(child.local_name().to_string(), child.to_value());
            }
            Value::Object(map)
        }
    }

    /// Builds an element named `name` from a generic tree of fields.
    ///
    /// Objects become child elements, arrays contribute each item to the
    /// same parent, scalars become text and null leaves the element empty.
    pub fn from_value(name: impl Into<String>, value: &Value) -> Self {
        let mut element = Element::new(name);
        fill_from_value(&mut element, value);
        element
    }
}

fn fill_from_value(element: &mut Element, value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, child_value) in map {
                let mut child = Element::new(key.as_str());
                fill_from_value(&mut child, child_value);
                element.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                fill_from_value(element, item);
            }
        }
        Value::String(s) => element.set_text(s.as_str()),
        Value::Number(n) => element.set_text(n.to_string()),
        Value::Bool(b) => element.set_text(b.to_string()),
        Value::Null => {}
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| XmlError("invalid UTF-8 in tag name".into()))?
        .to_string();

    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| XmlError("invalid UTF-8 in attribute name".into()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Text(text.to_string()));
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError("text outside of root element".into())),
    }
}
