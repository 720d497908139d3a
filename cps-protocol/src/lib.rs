//! # cps-protocol
//!
//! Wire protocol implementation for CPS document storage servers.
//!
//! This crate provides:
//! - Compact tag/wire-type field encoding and 8-byte length-prefixed framing
//!   for the binary transport
//! - Request envelope construction from statically declared command parameters
//! - Document rendering and a small owned markup tree
//! - Response parsing with the error/warning taxonomy and per-command result views

pub mod codec;
pub mod document;
pub mod envelope;
pub mod error;
pub mod field;
pub mod frame;
pub mod query;
pub mod request;
pub mod response;
pub mod xml;

pub use codec::{Decoder, Encoder};
pub use document::{DocumentLayout, DocumentSource, Documents, IdPath, MAX_ID_PATH_DEPTH};
pub use envelope::{Content, Envelope, ProcessingType, RequestOptions};
pub use error::{ErrorKind, ProtocolError, ServerError, Severity};
pub use field::{FieldMap, FieldValue as WireValue, WireType};
pub use frame::{Frame, FRAME_HEADER_SIZE, FRAME_MARKER};
pub use request::{
    AlternativesParams, BackupParams, BackupType, Command, CommandParams, ExactMatch, IdsParams,
    ListFacetsParams, ListMode, ListParams, LookupParams, ModifyKind, ModifyParams,
    RestoreParams, SearchParams, SimilarParams, SimilarSource, SimpleParams,
};
pub use response::{
    dispatch, Alternative, AlternativesReply, Document, DocumentFormat, FieldValue,
    ListFacetsReply, ListPathsReply, ListReply, ModifyReply, Reply, Response, ResultDocument,
    ResultWindow, SearchDeleteReply, SearchReply, StatusReply, TermAlternatives, WordsReply,
};
pub use xml::Element;

/// Namespace declared on request and reply envelopes.
pub const NAMESPACE: &str = "www.clusterpoint.com";

/// Default port of the binary transport.
pub const DEFAULT_TCP_PORT: u16 = 5550;

/// Default port of the text transport.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default request path of the text transport.
pub const DEFAULT_REQUEST_PATH: &str = "/cgi-bin/cps2-cgi";

/// Storage name sent when the server should detect the storage itself.
pub const AUTODETECT_STORAGE: &str = "*";

/// Maximum frame payload size (256 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;
