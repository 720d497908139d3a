//! Document bodies sent to the server and identifier paths within them.

use crate::error::ProtocolError;
use crate::xml::Element;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Maximum number of tags in a document identifier path.
pub const MAX_ID_PATH_DEPTH: usize = 10;

/// Relative path from a document root to the tag holding its identifier.
///
/// Written as slash-separated tags, optionally prefixed with `.` (`./id`,
/// `meta/key`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdPath {
    segments: Vec<String>,
}

impl IdPath {
    pub fn parse(path: &str) -> Result<Self, ProtocolError> {
        let path = path.trim();
        let mut parts = path.split('/').peekable();
        if parts.peek() == Some(&".") {
            parts.next();
        }

        let mut segments = Vec::new();
        for part in parts {
            if part.is_empty() || part == "." {
                return Err(ProtocolError::InvalidParameter(format!(
                    "document id path '{path}' contains an empty segment"
                )));
            }
            segments.push(part.to_string());
        }

        if segments.is_empty() {
            return Err(ProtocolError::InvalidParameter(
                "document id path must name at least one tag".into(),
            ));
        }
        if segments.len() > MAX_ID_PATH_DEPTH {
            return Err(ProtocolError::InvalidParameter(format!(
                "document id path '{path}' is deeper than {MAX_ID_PATH_DEPTH} tags"
            )));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Reads the identifier of `document`; `None` if any tag along the path
    /// is missing or the final tag is empty.
    pub fn extract(&self, document: &Element) -> Option<String> {
        document.find_path(&self.segments).and_then(Element::text)
    }

    /// Stores `id` in `document`, creating missing tags along the path.
    pub fn assign(&self, document: &mut Element, id: &str) {
        let mut current = document;
        for segment in &self.segments {
            if current.find(segment).is_none() {
                current.push(Element::new(segment.as_str()));
            }
            current = match current.find_mut(segment) {
                Some(child) => child,
                None => return,
            };
        }
        current.set_text(id);
    }
}

impl Default for IdPath {
    fn default() -> Self {
        Self {
            segments: vec!["id".to_string()],
        }
    }
}

impl FromStr for IdPath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Where documents keep their root tag and identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    pub root_tag: String,
    pub id_path: IdPath,
}

impl DocumentLayout {
    pub fn new(root_tag: impl Into<String>, id_path: IdPath) -> Self {
        Self {
            root_tag: root_tag.into(),
            id_path,
        }
    }
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            root_tag: "document".to_string(),
            id_path: IdPath::default(),
        }
    }
}

/// A document in one of the accepted representations.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    /// Serialized markup.
    Markup(String),
    /// Generic tree of fields, converted with [`Element::from_value`].
    Tree(Value),
    Element(Element),
}

impl From<&str> for DocumentSource {
    fn from(markup: &str) -> Self {
        DocumentSource::Markup(markup.to_string())
    }
}

impl From<String> for DocumentSource {
    fn from(markup: String) -> Self {
        DocumentSource::Markup(markup)
    }
}

impl From<Value> for DocumentSource {
    fn from(tree: Value) -> Self {
        DocumentSource::Tree(tree)
    }
}

impl From<Element> for DocumentSource {
    fn from(element: Element) -> Self {
        DocumentSource::Element(element)
    }
}

impl DocumentSource {
    /// Converts to an element; trees are rooted at `root_tag`.
    fn to_element(&self, root_tag: &str) -> Result<Element, ProtocolError> {
        match self {
            DocumentSource::Markup(markup) => Element::parse(markup).map_err(|e| {
                ProtocolError::InvalidParameter(format!("document is not valid markup: {e}"))
            }),
            DocumentSource::Tree(value) => Ok(Element::from_value(root_tag, value)),
            DocumentSource::Element(element) => Ok(element.clone()),
        }
    }
}

/// A batch of documents for a modification or id-based command.
#[derive(Debug, Clone, PartialEq)]
pub enum Documents {
    /// Documents keyed by identifier. Each is wrapped in the root tag when
    /// needed and gets its identifier written along the id path; `None`
    /// stands for an empty document holding only the identifier.
    WithIds(Vec<(String, Option<DocumentSource>)>),
    /// Documents that already carry their root tag and identifier.
    FullyFormed(Vec<DocumentSource>),
}

impl Documents {
    /// Empty documents holding only the given identifiers.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Documents::WithIds(ids.into_iter().map(|id| (id.into(), None)).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Documents::WithIds(docs) => docs.len(),
            Documents::FullyFormed(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes every document into markup for the content block.
    pub fn render(&self, layout: &DocumentLayout) -> Result<Vec<String>, ProtocolError> {
        match self {
            Documents::WithIds(docs) => docs
                .iter()
                .map(|(id, source)| {
                    let mut element = match source {
                        Some(source) => source.to_element(&layout.root_tag)?,
                        None => Element::new(layout.root_tag.as_str()),
                    };
                    if element.name != layout.root_tag {
                        element = Element::new(layout.root_tag.as_str()).with_child(element);
                    }
                    layout.id_path.assign(&mut element, id);
                    Ok(element.to_xml())
                })
                .collect(),
            Documents::FullyFormed(docs) => docs.iter().map(render_fully_formed).collect(),
        }
    }
}

fn render_fully_formed(source: &DocumentSource) -> Result<String, ProtocolError> {
    match source {
        DocumentSource::Markup(markup) => Ok(markup.clone()),
        DocumentSource::Element(element) => Ok(element.to_xml()),
        DocumentSource::Tree(Value::Object(map)) if map.len() == 1 => {
            let (root, value) = map.iter().next().ok_or_else(|| {
                ProtocolError::InvalidParameter("empty document tree".into())
            })?;
            Ok(Element::from_value(root.as_str(), value).to_xml())
        }
        DocumentSource::Tree(_) => Err(ProtocolError::InvalidParameter(
            "a fully formed document tree must have exactly one root key".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_path_parse() {
        assert_eq!(IdPath::parse("id").unwrap().segments(), ["id"]);
        assert_eq!(IdPath::parse("./id").unwrap().segments(), ["id"]);
        assert_eq!(IdPath::parse("meta/key").unwrap().to_string(), "meta/key");
        assert_eq!(IdPath::default(), IdPath::parse("./id").unwrap());
    }

    #[test]
    fn test_id_path_rejects_bad_paths() {
        for bad in ["", ".", "a//b", "/id", "id/", "a/./b"] {
            let err = IdPath::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Parameter, "path {bad:?}");
        }
    }

    #[test]
    fn test_id_path_depth_limit() {
        let ten = vec!["t"; 10].join("/");
        assert!(IdPath::parse(&ten).is_ok());

        let eleven = vec!["t"; 11].join("/");
        assert!(matches!(
            IdPath::parse(&eleven),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_extract() {
        let path = IdPath::parse("meta/key").unwrap();
        let doc = Element::parse("<document><meta><key>a-1</key></meta></document>").unwrap();
        assert_eq!(path.extract(&doc).as_deref(), Some("a-1"));

        let doc = Element::parse("<document><other/></document>").unwrap();
        assert_eq!(path.extract(&doc), None);
    }

    #[test]
    fn test_ids_only_documents() {
        let docs = Documents::ids(["1", "2"]);
        let rendered = docs.render(&DocumentLayout::default()).unwrap();
        assert_eq!(
            rendered,
            vec![
                "<document><id>1</id></document>",
                "<document><id>2</id></document>"
            ]
        );
    }

    #[test]
    fn test_with_ids_wraps_foreign_root() {
        let docs = Documents::WithIds(vec![(
            "7".into(),
            Some(DocumentSource::from("<book><title>T</title></book>")),
        )]);
        let rendered = docs.render(&DocumentLayout::default()).unwrap();
        assert_eq!(
            rendered,
            vec!["<document><book><title>T</title></book><id>7</id></document>"]
        );
    }

    #[test]
    fn test_with_ids_tree_and_nested_path() {
        let layout = DocumentLayout::new("doc", IdPath::parse("meta/key").unwrap());
        let docs = Documents::WithIds(vec![(
            "k<1>".into(),
            Some(DocumentSource::from(json!({"title": "foo"}))),
        )]);
        let rendered = docs.render(&layout).unwrap();
        assert_eq!(
            rendered,
            vec!["<doc><title>foo</title><meta><key>k&lt;1&gt;</key></meta></doc>"]
        );
    }

    #[test]
    fn test_with_ids_overwrites_existing_id() {
        let docs = Documents::WithIds(vec![(
            "new".into(),
            Some(DocumentSource::from("<document><id>old</id></document>")),
        )]);
        let rendered = docs.render(&DocumentLayout::default()).unwrap();
        assert_eq!(rendered, vec!["<document><id>new</id></document>"]);
    }

    #[test]
    fn test_invalid_markup_is_parameter_fault() {
        let docs = Documents::WithIds(vec![("1".into(), Some(DocumentSource::from("<broken")))]);
        assert!(matches!(
            docs.render(&DocumentLayout::default()),
            Err(ProtocolError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_fully_formed_passthrough() {
        let docs = Documents::FullyFormed(vec![
            DocumentSource::from("<document><id>1</id></document>"),
            DocumentSource::from(json!({"document": {"id": "2"}})),
            DocumentSource::from(Element::new("document").with_child(Element::new("id").with_text("3"))),
        ]);
        let rendered = docs.render(&DocumentLayout::default()).unwrap();
        assert_eq!(
            rendered,
            vec![
                "<document><id>1</id></document>",
                "<document><id>2</id></document>",
                "<document><id>3</id></document>"
            ]
        );

        let bad = Documents::FullyFormed(vec![DocumentSource::from(json!({"a": 1, "b": 2}))]);
        assert!(bad.render(&DocumentLayout::default()).is_err());
    }
}
