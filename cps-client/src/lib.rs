//! # cps-client
//!
//! Blocking client library for CPS document storages.
//!
//! This crate provides:
//! - Connection URL parsing (`tcp://`, `unix://`, `http://`)
//! - Binary framed and HTTP text transports with a single-retry contract
//! - Connection configuration from code, YAML files or the environment
//! - A high-level [`Client`] with one method per storage command

pub mod client;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod observer;
pub mod stream;
pub mod transport;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::{with_connection, Connection, ConnectionConfig};
pub use endpoint::Endpoint;
pub use error::ClientError;
pub use observer::{TraceSink, TracingSink};
pub use stream::{ClientStream, Connector, EndpointConnector};
pub use transport::{BinaryTransport, HttpTransport, Transport, TransportState};
