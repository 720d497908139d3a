//! Response parsing and per-command result views.
//!
//! [`dispatch`] parses a reply envelope, aborts on a fatal server error
//! block, and wraps the envelope in the [`Reply`] variant matching the
//! command. Every view dereferences to the shared [`Response`].

use crate::document::IdPath;
use crate::error::{ProtocolError, ServerError, Severity};
use crate::request::Command;
use crate::xml::Element;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::str::FromStr;

/// Value of a content field looked up by name.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Single(Value),
    /// The field tag occurs more than once.
    Multiple(Vec<Value>),
}

/// Representation of returned documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// Generic tree of fields.
    #[default]
    Tree,
    Element,
    /// Serialized markup.
    Text,
}

impl FromStr for DocumentFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dict" | "tree" => Ok(DocumentFormat::Tree),
            "etree" | "element" => Ok(DocumentFormat::Element),
            "" | "string" | "text" => Ok(DocumentFormat::Text),
            other => Err(ProtocolError::InvalidParameter(format!(
                "unsupported document format '{other}'"
            ))),
        }
    }
}

/// A returned document in the requested representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Tree(Value),
    Element(Element),
    Text(String),
}

/// A returned document with its extracted identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultDocument {
    /// `None` when the identifier path does not resolve in this document.
    pub id: Option<String>,
    pub document: Document,
}

/// Result-window metadata of a list-type reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultWindow {
    /// Total matching documents, when reported.
    pub hits: Option<u64>,
    /// Documents returned in this reply.
    pub found: u64,
    pub from_document: u64,
    pub to_document: u64,
    /// Matches left unreturned, when reported.
    pub more: Option<u64>,
}

/// A parsed reply envelope.
#[derive(Debug, Clone)]
pub struct Response {
    root: Element,
    warning: Option<ServerError>,
}

impl Response {
    /// Parses a reply envelope and checks its error block.
    ///
    /// A fatal error block is returned as [`ProtocolError::Server`]; any other
    /// severity is kept as a warning.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let root = Element::parse_bytes(raw).map_err(|e| ProtocolError::malformed(e.0, raw))?;

        let warning = match root.find("error") {
            Some(block) => {
                let error = server_error(block);
                if error.is_fatal() {
                    return Err(ProtocolError::Server(Box::new(error)));
                }
                tracing::warn!(
                    code = error.code,
                    level = %error.level,
                    source = %error.source,
                    "server warning: {}",
                    error.text
                );
                Some(error)
            }
            None => None,
        };

        Ok(Self { root, warning })
    }

    /// Elapsed server time in seconds.
    pub fn seconds(&self) -> Result<f64, ProtocolError> {
        let text = self
            .root
            .child_text("seconds")
            .ok_or_else(|| self.fault("missing <seconds>"))?;
        text.parse()
            .map_err(|_| self.fault(format!("non-numeric <seconds> '{text}'")))
    }

    pub fn storage_name(&self) -> Option<String> {
        self.root.child_text("storage")
    }

    pub fn command(&self) -> Option<String> {
        self.root.child_text("command")
    }

    /// Non-fatal error block reported with this reply.
    pub fn warning(&self) -> Option<&ServerError> {
        self.warning.as_ref()
    }

    /// The whole envelope.
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn content(&self) -> Option<&Element> {
        self.root.find("content")
    }

    /// The content block as a generic tree; null when absent.
    pub fn content_value(&self) -> Value {
        self.content().map(Element::to_value).unwrap_or(Value::Null)
    }

    /// The children of the content block serialized back to markup.
    pub fn content_markup(&self) -> String {
        self.content()
            .map(|c| c.elements().map(Element::to_xml).collect())
            .unwrap_or_default()
    }

    /// Looks up a content field by tag.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let content = self.content()?;
        let mut values: Vec<Value> = content.find_all(name).map(Element::to_value).collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(FieldValue::Single),
            _ => Some(FieldValue::Multiple(values)),
        }
    }

    /// Text of the first content field with the given tag.
    pub fn field_text(&self, name: &str) -> Option<String> {
        self.content().and_then(|c| c.child_text(name))
    }

    /// Reads a numeric content field; missing or non-numeric is a fault.
    pub fn count(&self, name: &str) -> Result<u64, ProtocolError> {
        let text = self
            .field_text(name)
            .ok_or_else(|| self.fault(format!("missing <{name}> in content")))?;
        parse_count(&text).ok_or_else(|| self.fault(format!("non-numeric <{name}> '{text}'")))
    }

    fn optional_count(&self, name: &str) -> Result<Option<u64>, ProtocolError> {
        match self.field_text(name) {
            Some(_) => self.count(name).map(Some),
            None => Ok(None),
        }
    }

    fn fault(&self, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::malformed(reason, self.root.to_xml().as_bytes())
    }
}

fn server_error(block: &Element) -> ServerError {
    ServerError {
        code: block
            .child_text("code")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0),
        text: block.child_text("text").unwrap_or_default(),
        level: Severity::parse(&block.child_text("level").unwrap_or_default()),
        source: block.child_text("source").unwrap_or_default(),
        message: block.child_text("message").unwrap_or_default(),
        document_ids: block.find_all("document_id").filter_map(Element::text).collect(),
    }
}

/// Counts may be prefixed with `=` (exact) as in `<more>=12</more>`.
fn parse_count(text: &str) -> Option<u64> {
    text.trim().trim_start_matches('=').parse().ok()
}

macro_rules! response_view {
    ($name:ident) => {
        impl Deref for $name {
            type Target = Response;

            fn deref(&self) -> &Response {
                &self.response
            }
        }
    };
}

/// Reply to insert, replace, partial-replace, update and delete.
#[derive(Debug, Clone)]
pub struct ModifyReply {
    response: Response,
    id_path: IdPath,
}

response_view!(ModifyReply);

impl ModifyReply {
    /// Identifiers of the affected documents, in reply order.
    pub fn modified_ids(&self) -> Vec<Option<String>> {
        self.content()
            .map(|c| {
                c.find_all("document")
                    .map(|d| self.id_path.extract(d))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Reply to search-delete.
#[derive(Debug, Clone)]
pub struct SearchDeleteReply {
    response: Response,
}

response_view!(SearchDeleteReply);

impl SearchDeleteReply {
    /// Number of deleted documents.
    pub fn hits(&self) -> Result<u64, ProtocolError> {
        self.count("hits")
    }
}

/// Reply to status.
#[derive(Debug, Clone)]
pub struct StatusReply {
    response: Response,
}

response_view!(StatusReply);

impl StatusReply {
    /// The full diagnostic tree.
    pub fn status(&self) -> Value {
        self.content_value()
    }
}

/// Where a list-type reply keeps its documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentLocation {
    /// Under `content/results`.
    Results,
    /// Directly under `content` (lookup).
    Content,
}

/// Reply to retrieve, similar, lookup and the list/retrieve first/last family.
#[derive(Debug, Clone)]
pub struct ListReply {
    response: Response,
    id_path: IdPath,
    location: DocumentLocation,
}

response_view!(ListReply);

impl ListReply {
    fn document_elements(&self) -> Vec<&Element> {
        let Some(content) = self.content() else {
            return Vec::new();
        };
        match self.location {
            DocumentLocation::Results => content
                .find("results")
                .map(|r| r.elements().collect())
                .unwrap_or_default(),
            DocumentLocation::Content => content.find_all("document").collect(),
        }
    }

    /// Returned documents in reply order.
    pub fn documents(&self, format: DocumentFormat) -> Vec<ResultDocument> {
        self.document_elements()
            .into_iter()
            .map(|element| ResultDocument {
                id: self.id_path.extract(element),
                document: match format {
                    DocumentFormat::Tree => Document::Tree(element.to_value()),
                    DocumentFormat::Element => Document::Element(element.clone()),
                    DocumentFormat::Text => Document::Text(element.to_xml()),
                },
            })
            .collect()
    }

    /// Identifiers of the returned documents.
    pub fn document_ids(&self) -> Vec<Option<String>> {
        self.document_elements()
            .into_iter()
            .map(|e| self.id_path.extract(e))
            .collect()
    }

    pub fn hits(&self) -> Result<u64, ProtocolError> {
        self.count("hits")
    }

    pub fn found(&self) -> Result<u64, ProtocolError> {
        self.count("found")
    }

    pub fn from_document(&self) -> Result<u64, ProtocolError> {
        self.count("from")
    }

    pub fn to_document(&self) -> Result<u64, ProtocolError> {
        self.count("to")
    }

    pub fn more(&self) -> Result<u64, ProtocolError> {
        self.count("more")
    }

    /// Window bounds; `hits` and `more` are optional.
    pub fn window(&self) -> Result<ResultWindow, ProtocolError> {
        Ok(ResultWindow {
            hits: self.optional_count("hits")?,
            found: self.found()?,
            from_document: self.from_document()?,
            to_document: self.to_document()?,
            more: self.optional_count("more")?,
        })
    }
}

/// Reply to search.
#[derive(Debug, Clone)]
pub struct SearchReply {
    list: ListReply,
}

impl Deref for SearchReply {
    type Target = ListReply;

    fn deref(&self) -> &ListReply {
        &self.list
    }
}

impl SearchReply {
    /// Facet path → term → hit count. Empty when the reply has no facets.
    pub fn facets(&self) -> Result<BTreeMap<String, BTreeMap<String, u64>>, ProtocolError> {
        let mut facets = BTreeMap::new();
        let Some(content) = self.content() else {
            return Ok(facets);
        };
        for facet in content.find_all("facet") {
            let path = facet
                .attr("path")
                .ok_or_else(|| self.fault("facet without path attribute"))?;
            let mut terms = BTreeMap::new();
            for term in facet.find_all("term") {
                let hits = term
                    .attr("hits")
                    .and_then(parse_count)
                    .ok_or_else(|| self.fault("facet term without numeric hits"))?;
                terms.insert(term.text().unwrap_or_default(), hits);
            }
            facets.insert(path.to_string(), terms);
        }
        Ok(facets)
    }

    /// Aggregate query → result data. Empty when the reply has none.
    pub fn aggregates(&self) -> BTreeMap<String, String> {
        self.content()
            .map(|c| {
                c.find_all("aggregate")
                    .filter_map(|a| {
                        let query = a.child_text("query")?;
                        let data = a
                            .find("data")
                            .map(|d| d.text().unwrap_or_else(|| inner_markup(d)))
                            .unwrap_or_default();
                        Some((query, data))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn inner_markup(element: &Element) -> String {
    element.elements().map(Element::to_xml).collect()
}

/// Reply to list-words: search term → word → occurrence count.
#[derive(Debug, Clone)]
pub struct WordsReply {
    response: Response,
}

response_view!(WordsReply);

impl WordsReply {
    pub fn words(&self) -> Result<BTreeMap<String, BTreeMap<String, u64>>, ProtocolError> {
        let mut lists = BTreeMap::new();
        let Some(content) = self.content() else {
            return Ok(lists);
        };
        for list in content.find_all("list") {
            let to = list.attr("to").unwrap_or_default().to_string();
            let mut words = BTreeMap::new();
            for word in list.find_all("word") {
                let count = word
                    .attr("count")
                    .and_then(parse_count)
                    .ok_or_else(|| self.fault("word without numeric count"))?;
                words.insert(word.text().unwrap_or_default(), count);
            }
            lists.insert(to, words);
        }
        Ok(lists)
    }
}

/// One spelling alternative with its scores.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Alternative {
    pub count: Option<u64>,
    pub cr: Option<f64>,
    pub idif: Option<f64>,
    pub h: Option<f64>,
}

/// Alternatives for one search term.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TermAlternatives {
    /// Occurrences of the term itself.
    pub count: u64,
    pub words: BTreeMap<String, Alternative>,
}

/// Reply to alternatives.
#[derive(Debug, Clone)]
pub struct AlternativesReply {
    response: Response,
}

response_view!(AlternativesReply);

impl AlternativesReply {
    /// Search term → its alternatives. Empty when none were returned.
    pub fn alternatives(&self) -> Result<BTreeMap<String, TermAlternatives>, ProtocolError> {
        let mut result = BTreeMap::new();
        let Some(list) = self.content().and_then(|c| c.find("alternatives_list")) else {
            return Ok(result);
        };

        for entry in list.find_all("alternatives") {
            let term = entry.child_text("to").unwrap_or_default();
            let count = match entry.child_text("count") {
                Some(text) => parse_count(&text)
                    .ok_or_else(|| self.fault(format!("non-numeric alternatives count '{text}'")))?,
                None => 0,
            };

            let mut words = BTreeMap::new();
            for word in entry.find_all("word") {
                let alternative = Alternative {
                    count: self.numeric_attr(word, "count")?,
                    cr: self.numeric_attr(word, "cr")?,
                    idif: self.numeric_attr(word, "idif")?,
                    h: self.numeric_attr(word, "h")?,
                };
                words.insert(word.text().unwrap_or_default(), alternative);
            }
            result.insert(term, TermAlternatives { count, words });
        }
        Ok(result)
    }

    fn numeric_attr<T: FromStr>(&self, element: &Element, name: &str) -> Result<Option<T>, ProtocolError> {
        match element.attr(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.fault(format!("non-numeric {name} attribute '{raw}'"))),
            None => Ok(None),
        }
    }
}

/// Reply to list-paths.
#[derive(Debug, Clone)]
pub struct ListPathsReply {
    response: Response,
}

response_view!(ListPathsReply);

impl ListPathsReply {
    /// Paths present in the storage.
    pub fn paths(&self) -> Vec<String> {
        self.content()
            .and_then(|c| c.find("paths"))
            .map(|p| p.find_all("path").filter_map(Element::text).collect())
            .unwrap_or_default()
    }
}

/// Reply to list-facets.
#[derive(Debug, Clone)]
pub struct ListFacetsReply {
    response: Response,
}

response_view!(ListFacetsReply);

impl ListFacetsReply {
    /// Facet path → its terms.
    pub fn facets(&self) -> Result<BTreeMap<String, Vec<String>>, ProtocolError> {
        let mut facets = BTreeMap::new();
        let Some(content) = self.content() else {
            return Ok(facets);
        };
        for facet in content.find_all("facet") {
            let path = facet
                .attr("path")
                .ok_or_else(|| self.fault("facet without path attribute"))?;
            let terms = facet.find_all("term").filter_map(Element::text).collect();
            facets.insert(path.to_string(), terms);
        }
        Ok(facets)
    }
}

/// A reply wrapped in the view matching its command.
#[derive(Debug, Clone)]
pub enum Reply {
    Modify(ModifyReply),
    SearchDelete(SearchDeleteReply),
    Status(StatusReply),
    Search(SearchReply),
    List(ListReply),
    Lookup(ListReply),
    Words(WordsReply),
    Alternatives(AlternativesReply),
    ListPaths(ListPathsReply),
    ListFacets(ListFacetsReply),
    /// reindex, backup, restore, clear and unrecognized commands.
    Generic(Response),
}

impl Deref for Reply {
    type Target = Response;

    fn deref(&self) -> &Response {
        match self {
            Reply::Modify(r) => &r.response,
            Reply::SearchDelete(r) => &r.response,
            Reply::Status(r) => &r.response,
            Reply::Search(r) => &r.list.response,
            Reply::List(r) | Reply::Lookup(r) => &r.response,
            Reply::Words(r) => &r.response,
            Reply::Alternatives(r) => &r.response,
            Reply::ListPaths(r) => &r.response,
            Reply::ListFacets(r) => &r.response,
            Reply::Generic(r) => r,
        }
    }
}

macro_rules! reply_conversion {
    ($method:ident, $view:ty, $($variant:ident)|+) => {
        /// Unwraps the view, failing if the reply has another shape.
        pub fn $method(self) -> Result<$view, ProtocolError> {
            match self {
                $(Reply::$variant(view) => Ok(view),)+
                other => Err(ProtocolError::UnexpectedReply(other.command().unwrap_or_default())),
            }
        }
    };
}

impl Reply {
    reply_conversion!(into_modify, ModifyReply, Modify);
    reply_conversion!(into_search_delete, SearchDeleteReply, SearchDelete);
    reply_conversion!(into_status, StatusReply, Status);
    reply_conversion!(into_search, SearchReply, Search);
    reply_conversion!(into_list, ListReply, List | Lookup);
    reply_conversion!(into_words, WordsReply, Words);
    reply_conversion!(into_alternatives, AlternativesReply, Alternatives);
    reply_conversion!(into_list_paths, ListPathsReply, ListPaths);
    reply_conversion!(into_list_facets, ListFacetsReply, ListFacets);

    /// The shared response, whatever the view.
    pub fn into_response(self) -> Response {
        match self {
            Reply::Modify(r) => r.response,
            Reply::SearchDelete(r) => r.response,
            Reply::Status(r) => r.response,
            Reply::Search(r) => r.list.response,
            Reply::List(r) | Reply::Lookup(r) => r.response,
            Reply::Words(r) => r.response,
            Reply::Alternatives(r) => r.response,
            Reply::ListPaths(r) => r.response,
            Reply::ListFacets(r) => r.response,
            Reply::Generic(r) => r,
        }
    }
}

/// Parses `raw` and selects the result view for `command`.
pub fn dispatch(raw: &[u8], command: &Command, id_path: &IdPath) -> Result<Reply, ProtocolError> {
    let response = Response::parse(raw)?;
    let id_path = id_path.clone();
    let list = |response, location| ListReply {
        response,
        id_path: id_path.clone(),
        location,
    };

    let reply = match command {
        Command::Insert
        | Command::Replace
        | Command::PartialReplace
        | Command::Update
        | Command::Delete => Reply::Modify(ModifyReply {
            response,
            id_path: id_path.clone(),
        }),
        Command::SearchDelete => Reply::SearchDelete(SearchDeleteReply { response }),
        Command::Status => Reply::Status(StatusReply { response }),
        Command::Search => Reply::Search(SearchReply {
            list: list(response, DocumentLocation::Results),
        }),
        Command::Retrieve
        | Command::Similar
        | Command::ListFirst
        | Command::ListLast
        | Command::RetrieveFirst
        | Command::RetrieveLast => Reply::List(list(response, DocumentLocation::Results)),
        Command::Lookup => Reply::Lookup(list(response, DocumentLocation::Content)),
        Command::ListWords => Reply::Words(WordsReply { response }),
        Command::Alternatives => Reply::Alternatives(AlternativesReply { response }),
        Command::ListPaths => Reply::ListPaths(ListPathsReply { response }),
        Command::ListFacets => Reply::ListFacets(ListFacetsReply { response }),
        Command::Reindex
        | Command::Backup
        | Command::Restore
        | Command::Clear
        | Command::Other(_) => Reply::Generic(response),
    };
    Ok(reply)
}
