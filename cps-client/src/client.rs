//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use cps_protocol::{
    AlternativesParams, AlternativesReply, BackupParams, Command, CommandParams, Documents,
    IdsParams, ListFacetsParams, ListFacetsReply, ListParams, ListPathsReply, ListReply,
    LookupParams, ModifyParams, ModifyReply, Reply, RequestOptions, Response, RestoreParams,
    SearchDeleteReply, SearchParams, SearchReply, SimilarParams, SimpleParams, StatusReply,
    WordsReply,
};

/// High-level client for a single storage.
pub struct Client {
    conn: Connection,
    options: RequestOptions,
}

impl Client {
    /// Opens a connection with the given configuration.
    pub fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        Ok(Self::from_connection(Connection::open(config)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            options: RequestOptions::new(),
        }
    }

    /// Sets the envelope options used by subsequent requests.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn set_options(&mut self, options: RequestOptions) {
        self.options = options;
    }

    /// Returns the underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn close(&mut self) {
        self.conn.close();
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn request(&mut self, params: &dyn CommandParams) -> Result<Reply, ClientError> {
        self.conn.execute(params, &self.options)
    }

    // =========================================================================
    // Document modification
    // =========================================================================

    pub fn insert(&mut self, documents: Documents) -> Result<ModifyReply, ClientError> {
        Ok(self.request(&ModifyParams::insert(documents))?.into_modify()?)
    }

    pub fn replace(&mut self, documents: Documents) -> Result<ModifyReply, ClientError> {
        Ok(self.request(&ModifyParams::replace(documents))?.into_modify()?)
    }

    pub fn partial_replace(&mut self, documents: Documents) -> Result<ModifyReply, ClientError> {
        Ok(self
            .request(&ModifyParams::partial_replace(documents))?
            .into_modify()?)
    }

    pub fn update(&mut self, documents: Documents) -> Result<ModifyReply, ClientError> {
        Ok(self.request(&ModifyParams::update(documents))?.into_modify()?)
    }

    pub fn delete<I, S>(&mut self, ids: I) -> Result<ModifyReply, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.request(&IdsParams::delete(ids))?.into_modify()?)
    }

    /// Deletes every document matching the query of `params`.
    pub fn search_delete(&mut self, mut params: SearchParams) -> Result<SearchDeleteReply, ClientError> {
        params.command = Command::SearchDelete;
        Ok(self.request(&params)?.into_search_delete()?)
    }

    // =========================================================================
    // Storage maintenance
    // =========================================================================

    pub fn reindex(&mut self) -> Result<Response, ClientError> {
        Ok(self.request(&SimpleParams::reindex())?.into_response())
    }

    pub fn backup(&mut self, params: BackupParams) -> Result<Response, ClientError> {
        Ok(self.request(&params)?.into_response())
    }

    pub fn restore(&mut self, params: RestoreParams) -> Result<Response, ClientError> {
        Ok(self.request(&params)?.into_response())
    }

    pub fn clear(&mut self) -> Result<Response, ClientError> {
        Ok(self.request(&SimpleParams::clear())?.into_response())
    }

    pub fn status(&mut self) -> Result<StatusReply, ClientError> {
        Ok(self.request(&SimpleParams::status())?.into_status()?)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn search(&mut self, mut params: SearchParams) -> Result<SearchReply, ClientError> {
        params.command = Command::Search;
        Ok(self.request(&params)?.into_search()?)
    }

    pub fn retrieve<I, S>(&mut self, ids: I) -> Result<ListReply, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self.request(&IdsParams::retrieve(ids))?.into_list()?)
    }

    pub fn similar(&mut self, params: SimilarParams) -> Result<ListReply, ClientError> {
        Ok(self.request(&params)?.into_list()?)
    }

    pub fn lookup(&mut self, params: LookupParams) -> Result<ListReply, ClientError> {
        Ok(self.request(&params)?.into_list()?)
    }

    pub fn alternatives(&mut self, params: AlternativesParams) -> Result<AlternativesReply, ClientError> {
        Ok(self.request(&params)?.into_alternatives()?)
    }

    pub fn list_words(&mut self, mut params: SearchParams) -> Result<WordsReply, ClientError> {
        params.command = Command::ListWords;
        Ok(self.request(&params)?.into_words()?)
    }

    // =========================================================================
    // Ordered listing
    // =========================================================================

    pub fn list_first(&mut self, params: ListParams) -> Result<ListReply, ClientError> {
        self.list(Command::ListFirst, params)
    }

    pub fn list_last(&mut self, params: ListParams) -> Result<ListReply, ClientError> {
        self.list(Command::ListLast, params)
    }

    pub fn retrieve_first(&mut self, params: ListParams) -> Result<ListReply, ClientError> {
        self.list(Command::RetrieveFirst, params)
    }

    pub fn retrieve_last(&mut self, params: ListParams) -> Result<ListReply, ClientError> {
        self.list(Command::RetrieveLast, params)
    }

    fn list(&mut self, command: Command, mut params: ListParams) -> Result<ListReply, ClientError> {
        params.command = command;
        Ok(self.request(&params)?.into_list()?)
    }

    // =========================================================================
    // Schema introspection
    // =========================================================================

    pub fn list_paths(&mut self) -> Result<ListPathsReply, ClientError> {
        Ok(self.request(&SimpleParams::list_paths())?.into_list_paths()?)
    }

    pub fn list_facets<I, S>(&mut self, paths: I) -> Result<ListFacetsReply, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self
            .request(&ListFacetsParams::new(paths))?
            .into_list_facets()?)
    }
}
