//! Command names and per-command request parameters.
//!
//! Each command family has one parameter struct implementing
//! [`CommandParams`]. Building a struct into a [`Content`] block applies
//! the emission rules of its fields: unset options are left out, repeated
//! options produce one tag per value.

use crate::document::{DocumentLayout, Documents};
use crate::envelope::Content;
use crate::error::ProtocolError;
use crate::query;
use std::fmt;
use std::str::FromStr;

/// Server commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Insert,
    Replace,
    PartialReplace,
    Update,
    Delete,
    SearchDelete,
    Reindex,
    Backup,
    Restore,
    Clear,
    Status,
    Search,
    Retrieve,
    Similar,
    Lookup,
    Alternatives,
    ListWords,
    ListFirst,
    ListLast,
    RetrieveFirst,
    RetrieveLast,
    ListPaths,
    ListFacets,
    /// A command this crate has no dedicated support for.
    Other(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::Insert => "insert",
            Command::Replace => "replace",
            Command::PartialReplace => "partial-replace",
            Command::Update => "update",
            Command::Delete => "delete",
            Command::SearchDelete => "search-delete",
            Command::Reindex => "reindex",
            Command::Backup => "backup",
            Command::Restore => "restore",
            Command::Clear => "clear",
            Command::Status => "status",
            Command::Search => "search",
            Command::Retrieve => "retrieve",
            Command::Similar => "similar",
            Command::Lookup => "lookup",
            Command::Alternatives => "alternatives",
            Command::ListWords => "list-words",
            Command::ListFirst => "list-first",
            Command::ListLast => "list-last",
            Command::RetrieveFirst => "retrieve-first",
            Command::RetrieveLast => "retrieve-last",
            Command::ListPaths => "list-paths",
            Command::ListFacets => "list-facets",
            Command::Other(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "insert" => Command::Insert,
            "replace" => Command::Replace,
            "partial-replace" => Command::PartialReplace,
            "update" => Command::Update,
            "delete" => Command::Delete,
            "search-delete" => Command::SearchDelete,
            "reindex" => Command::Reindex,
            "backup" => Command::Backup,
            "restore" => Command::Restore,
            "clear" => Command::Clear,
            "status" => Command::Status,
            "search" => Command::Search,
            "retrieve" => Command::Retrieve,
            "similar" => Command::Similar,
            "lookup" => Command::Lookup,
            "alternatives" => Command::Alternatives,
            "list-words" => Command::ListWords,
            "list-first" => Command::ListFirst,
            "list-last" => Command::ListLast,
            "retrieve-first" => Command::RetrieveFirst,
            "retrieve-last" => Command::RetrieveLast,
            "list-paths" => Command::ListPaths,
            "list-facets" => Command::ListFacets,
            other => Command::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Parameters of one command, renderable into an envelope content block.
pub trait CommandParams {
    fn command(&self) -> Command;

    /// Writes this command's fields and documents into `content`.
    fn build(&self, content: &mut Content, layout: &DocumentLayout) -> Result<(), ProtocolError>;
}

macro_rules! option_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(ProtocolError::InvalidParameter(format!(
                        concat!("unknown ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

option_enum!(
    /// How a listed path appears in result documents.
    ListMode, "list mode" {
        Yes => "yes",
        No => "no",
        Snippet => "snippet",
        Highlight => "highlight",
    }
);

option_enum!(ExactMatch, "exact match mode" {
    Text => "text",
    Binary => "binary",
    All => "all",
});

option_enum!(BackupType, "backup type" {
    Full => "full",
    Incremental => "incremental",
});

/// Renders `(path, mode)` pairs into the `list` field.
fn render_list(list: &[(String, ListMode)]) -> String {
    list.iter()
        .map(|(path, mode)| query::term(mode.as_str(), path))
        .collect::<Vec<_>>()
        .join("\n")
}

fn check_archive_name(file: &str) -> Result<(), ProtocolError> {
    if file.to_ascii_lowercase().ends_with(".tar.gz") {
        Ok(())
    } else {
        Err(ProtocolError::InvalidParameter(format!(
            "backup file '{file}' must end with '.tar.gz'"
        )))
    }
}

// =========================================================================
// Document commands
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyKind {
    Insert,
    Replace,
    PartialReplace,
    Update,
}

/// insert / replace / partial-replace / update
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyParams {
    pub kind: ModifyKind,
    pub documents: Documents,
}

impl ModifyParams {
    pub fn insert(documents: Documents) -> Self {
        Self {
            kind: ModifyKind::Insert,
            documents,
        }
    }

    pub fn replace(documents: Documents) -> Self {
        Self {
            kind: ModifyKind::Replace,
            documents,
        }
    }

    pub fn partial_replace(documents: Documents) -> Self {
        Self {
            kind: ModifyKind::PartialReplace,
            documents,
        }
    }

    pub fn update(documents: Documents) -> Self {
        Self {
            kind: ModifyKind::Update,
            documents,
        }
    }
}

impl CommandParams for ModifyParams {
    fn command(&self) -> Command {
        match self.kind {
            ModifyKind::Insert => Command::Insert,
            ModifyKind::Replace => Command::Replace,
            ModifyKind::PartialReplace => Command::PartialReplace,
            ModifyKind::Update => Command::Update,
        }
    }

    fn build(&self, content: &mut Content, layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_documents(self.documents.render(layout)?);
        Ok(())
    }
}

/// retrieve / delete by identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdsParams {
    pub command: Command,
    pub ids: Vec<String>,
}

impl IdsParams {
    pub fn retrieve<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: Command::Retrieve,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn delete<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: Command::Delete,
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandParams for IdsParams {
    fn command(&self) -> Command {
        self.command.clone()
    }

    fn build(&self, content: &mut Content, layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_documents(Documents::ids(self.ids.iter().cloned()).render(layout)?);
        Ok(())
    }
}

/// lookup: documents by identifier, with a listing selection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LookupParams {
    pub ids: Vec<String>,
    pub list: Vec<(String, ListMode)>,
}

impl LookupParams {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            list: Vec::new(),
        }
    }

    pub fn with_list(mut self, path: impl Into<String>, mode: ListMode) -> Self {
        self.list.push((path.into(), mode));
        self
    }
}

impl CommandParams for LookupParams {
    fn command(&self) -> Command {
        Command::Lookup
    }

    fn build(&self, content: &mut Content, layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_documents(Documents::ids(self.ids.iter().cloned()).render(layout)?);
        content.set_markup("list", render_list(&self.list));
        Ok(())
    }
}

// =========================================================================
// Query commands
// =========================================================================

/// search / search-delete / list-words
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub command: Command,
    /// Query markup, inserted verbatim. See [`crate::query`].
    pub query: String,
    pub docs: Option<u32>,
    pub offset: Option<u32>,
    pub list: Vec<(String, ListMode)>,
    /// Ordering fragments, joined into one field.
    pub ordering: Vec<String>,
    pub aggregate: Vec<String>,
    pub facet: Vec<String>,
    pub facet_size: Option<u32>,
    pub stem_lang: Option<String>,
    pub exact_match: Option<ExactMatch>,
    pub group: Option<String>,
    pub group_size: Option<u32>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_command(Command::Search, query)
    }

    pub fn search_delete(query: impl Into<String>) -> Self {
        Self::with_command(Command::SearchDelete, query)
    }

    pub fn list_words(query: impl Into<String>) -> Self {
        Self::with_command(Command::ListWords, query)
    }

    fn with_command(command: Command, query: impl Into<String>) -> Self {
        Self {
            command,
            query: query.into(),
            docs: None,
            offset: None,
            list: Vec::new(),
            ordering: Vec::new(),
            aggregate: Vec::new(),
            facet: Vec::new(),
            facet_size: None,
            stem_lang: None,
            exact_match: None,
            group: None,
            group_size: None,
        }
    }

    pub fn with_docs(mut self, docs: u32) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_list(mut self, path: impl Into<String>, mode: ListMode) -> Self {
        self.list.push((path.into(), mode));
        self
    }

    pub fn with_ordering(mut self, ordering: impl Into<String>) -> Self {
        self.ordering.push(ordering.into());
        self
    }

    pub fn with_aggregate(mut self, aggregate: impl Into<String>) -> Self {
        self.aggregate.push(aggregate.into());
        self
    }

    pub fn with_facet(mut self, path: impl Into<String>) -> Self {
        self.facet.push(path.into());
        self
    }

    pub fn with_facet_size(mut self, size: u32) -> Self {
        self.facet_size = Some(size);
        self
    }

    pub fn with_stem_lang(mut self, lang: impl Into<String>) -> Self {
        self.stem_lang = Some(lang.into());
        self
    }

    pub fn with_exact_match(mut self, mode: ExactMatch) -> Self {
        self.exact_match = Some(mode);
        self
    }

    pub fn with_group(mut self, tag: impl Into<String>, size: Option<u32>) -> Self {
        self.group = Some(tag.into());
        self.group_size = size;
        self
    }
}

impl CommandParams for SearchParams {
    fn command(&self) -> Command {
        self.command.clone()
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_markup("query", self.query.as_str());
        content.set_optional("docs", self.docs);
        content.set_optional("offset", self.offset);
        content.set_markup("list", render_list(&self.list));
        content.set_markup("ordering", self.ordering.join("\n"));
        content.set_markup_list("aggregate", self.aggregate.clone());
        content.set_text_list("facet", &self.facet);
        content.set_optional("facet_size", self.facet_size);
        content.set_optional("stem_lang", self.stem_lang.as_deref());
        content.set_optional("exact_match", self.exact_match);
        content.set_optional("group", self.group.as_deref());
        content.set_optional("group_size", self.group_size);
        Ok(())
    }
}

/// list-first / list-last / retrieve-first / retrieve-last
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub command: Command,
    pub docs: Option<u32>,
    pub offset: Option<u32>,
    pub list: Vec<(String, ListMode)>,
}

impl ListParams {
    fn with_command(command: Command) -> Self {
        Self {
            command,
            docs: None,
            offset: None,
            list: Vec::new(),
        }
    }

    pub fn list_first() -> Self {
        Self::with_command(Command::ListFirst)
    }

    pub fn list_last() -> Self {
        Self::with_command(Command::ListLast)
    }

    pub fn retrieve_first() -> Self {
        Self::with_command(Command::RetrieveFirst)
    }

    pub fn retrieve_last() -> Self {
        Self::with_command(Command::RetrieveLast)
    }

    pub fn with_docs(mut self, docs: u32) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_list(mut self, path: impl Into<String>, mode: ListMode) -> Self {
        self.list.push((path.into(), mode));
        self
    }
}

impl CommandParams for ListParams {
    fn command(&self) -> Command {
        self.command.clone()
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_optional("docs", self.docs);
        content.set_optional("offset", self.offset);
        content.set_markup("list", render_list(&self.list));
        Ok(())
    }
}

/// What `similar` compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimilarSource {
    /// An existing document.
    Id(String),
    /// Free text.
    Text(String),
}

/// similar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimilarParams {
    pub source: SimilarSource,
    /// Number of keywords extracted from the source.
    pub len: u32,
    /// Minimum number of keywords a match must share.
    pub quota: u32,
    pub offset: u32,
    pub docs: Option<u32>,
    pub query: Option<String>,
}

impl SimilarParams {
    pub fn new(source: SimilarSource, len: u32, quota: u32) -> Self {
        Self {
            source,
            len,
            quota,
            offset: 0,
            docs: None,
            query: None,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_docs(mut self, docs: u32) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl CommandParams for SimilarParams {
    fn command(&self) -> Command {
        Command::Similar
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        match &self.source {
            SimilarSource::Id(id) => content.set_text("id", id),
            SimilarSource::Text(text) => content.set_text("text", text),
        }
        content.set_optional("len", Some(self.len));
        content.set_optional("quota", Some(self.quota));
        content.set_optional("offset", Some(self.offset));
        content.set_optional("docs", self.docs);
        if let Some(query) = &self.query {
            content.set_markup("query", query.as_str());
        }
        Ok(())
    }
}

/// alternatives: spelling suggestions for query terms.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternativesParams {
    pub query: String,
    /// Minimum ratio between the occurrence of an alternative and the term.
    pub cr: Option<f64>,
    /// Maximum difference between an alternative and the term.
    pub idif: Option<f64>,
    /// Threshold on the combined score of `cr` and `idif`.
    pub h: Option<f64>,
}

impl AlternativesParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            cr: None,
            idif: None,
            h: None,
        }
    }

    pub fn with_cr(mut self, cr: f64) -> Self {
        self.cr = Some(cr);
        self
    }

    pub fn with_idif(mut self, idif: f64) -> Self {
        self.idif = Some(idif);
        self
    }

    pub fn with_h(mut self, h: f64) -> Self {
        self.h = Some(h);
        self
    }
}

impl CommandParams for AlternativesParams {
    fn command(&self) -> Command {
        Command::Alternatives
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_markup("query", self.query.as_str());
        content.set_optional("cr", self.cr);
        content.set_optional("idif", self.idif);
        content.set_optional("h", self.h);
        Ok(())
    }
}

/// list-facets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListFacetsParams {
    pub paths: Vec<String>,
}

impl ListFacetsParams {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl CommandParams for ListFacetsParams {
    fn command(&self) -> Command {
        Command::ListFacets
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        content.set_text_list("path", &self.paths);
        Ok(())
    }
}

// =========================================================================
// Maintenance commands
// =========================================================================

/// backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupParams {
    /// Server-side path of the archive, ending in `.tar.gz`.
    pub file: String,
    pub backup_type: Option<BackupType>,
}

impl BackupParams {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            backup_type: None,
        }
    }

    pub fn with_type(mut self, backup_type: BackupType) -> Self {
        self.backup_type = Some(backup_type);
        self
    }
}

impl CommandParams for BackupParams {
    fn command(&self) -> Command {
        Command::Backup
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        check_archive_name(&self.file)?;
        content.set_text("file", &self.file);
        content.set_optional("type", self.backup_type);
        Ok(())
    }
}

/// restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreParams {
    pub file: String,
    /// Verify the incremental backup sequence before restoring.
    pub sequence_check: Option<bool>,
}

impl RestoreParams {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            sequence_check: None,
        }
    }

    pub fn with_sequence_check(mut self, check: bool) -> Self {
        self.sequence_check = Some(check);
        self
    }
}

impl CommandParams for RestoreParams {
    fn command(&self) -> Command {
        Command::Restore
    }

    fn build(&self, content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        check_archive_name(&self.file)?;
        content.set_text("file", &self.file);
        content.set_optional(
            "sequence_check",
            self.sequence_check.map(|c| if c { "yes" } else { "no" }),
        );
        Ok(())
    }
}

/// Commands without parameters: status, reindex, clear, list-paths, and
/// anything not covered above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleParams {
    pub command: Command,
}

impl SimpleParams {
    pub fn new(command: Command) -> Self {
        Self { command }
    }

    pub fn status() -> Self {
        Self::new(Command::Status)
    }

    pub fn reindex() -> Self {
        Self::new(Command::Reindex)
    }

    pub fn clear() -> Self {
        Self::new(Command::Clear)
    }

    pub fn list_paths() -> Self {
        Self::new(Command::ListPaths)
    }
}

impl CommandParams for SimpleParams {
    fn command(&self) -> Command {
        self.command.clone()
    }

    fn build(&self, _content: &mut Content, _layout: &DocumentLayout) -> Result<(), ProtocolError> {
        Ok(())
    }
}
