//! Connection management.

use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::observer::TraceSink;
use crate::stream::EndpointConnector;
use crate::transport::{BinaryTransport, HttpTransport, Transport, TransportState};
use cps_protocol::{
    dispatch, Command, CommandParams, Content, DocumentLayout, Envelope, IdPath, Reply,
    RequestOptions, DEFAULT_HTTP_PORT, DEFAULT_REQUEST_PATH,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Connection URL, see [`Endpoint::parse`].
    pub url: String,
    pub storage: String,
    pub user: String,
    pub password: String,
    /// Optional `application` tag sent with every request.
    pub application: Option<String>,
    pub document_root: String,
    pub id_path: IdPath,
    /// HTTP request path used when the URL carries none.
    pub request_path: String,
    pub connect_timeout: Option<Duration>,
    pub io_timeout: Option<Duration>,
    pub trace_sink: Option<Arc<dyn TraceSink>>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            storage: storage.into(),
            user: String::new(),
            password: String::new(),
            application: None,
            document_root: "document".to_string(),
            id_path: IdPath::default(),
            request_path: DEFAULT_REQUEST_PATH.to_string(),
            connect_timeout: None,
            io_timeout: None,
            trace_sink: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_application(mut self, application: Option<String>) -> Self {
        self.application = application;
        self
    }

    pub fn with_document_root(mut self, root: impl Into<String>) -> Self {
        self.document_root = root.into();
        self
    }

    pub fn with_id_path(mut self, id_path: IdPath) -> Self {
        self.id_path = id_path;
        self
    }

    pub fn with_request_path(mut self, path: impl Into<String>) -> Self {
        self.request_path = path.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    fn layout(&self) -> DocumentLayout {
        DocumentLayout::new(self.document_root.clone(), self.id_path.clone())
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("storage", &self.storage)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("application", &self.application)
            .field("document_root", &self.document_root)
            .field("id_path", &self.id_path.to_string())
            .field("request_path", &self.request_path)
            .field("connect_timeout", &self.connect_timeout)
            .field("io_timeout", &self.io_timeout)
            .field("trace_sink", &self.trace_sink.is_some())
            .finish()
    }
}

/// `Host` header value for an HTTP endpoint.
fn host_header(host: &str, port: u16) -> String {
    let host = if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    if port == DEFAULT_HTTP_PORT {
        host
    } else {
        format!("{host}:{port}")
    }
}

/// An open connection to a storage.
///
/// Dropping the connection closes its transport.
pub struct Connection {
    config: ConnectionConfig,
    layout: DocumentLayout,
    transport: Box<dyn Transport>,
}

impl Connection {
    /// Parses the URL, picks the transport for its scheme and opens it.
    pub fn open(config: ConnectionConfig) -> Result<Self, ClientError> {
        let endpoint = Endpoint::parse(&config.url, &config.storage)?;
        let connector = EndpointConnector::new(endpoint.clone())
            .with_connect_timeout(config.connect_timeout)
            .with_io_timeout(config.io_timeout);
        let sink = config.trace_sink.clone();

        let transport: Box<dyn Transport> = match &endpoint {
            Endpoint::Http { host, port, .. } => Box::new(HttpTransport::new(
                connector,
                host_header(host, *port),
                endpoint.request_path(&config.request_path),
                sink,
            )),
            Endpoint::Tcp { .. } | Endpoint::Unix { .. } => {
                Box::new(BinaryTransport::new(connector, sink))
            }
        };

        Self::with_transport(config, transport)
    }

    /// Opens `transport` and wraps it; the transport is not tied to the URL.
    pub fn with_transport(
        config: ConnectionConfig,
        mut transport: Box<dyn Transport>,
    ) -> Result<Self, ClientError> {
        transport.open()?;
        tracing::debug!(storage = %config.storage, "Connection open");
        Ok(Self {
            layout: config.layout(),
            config,
            transport,
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.transport.state() == TransportState::Open
    }

    /// Builds the envelope for `params`, sends it and selects the result view.
    pub fn execute<P>(&mut self, params: &P, options: &RequestOptions) -> Result<Reply, ClientError>
    where
        P: CommandParams + ?Sized,
    {
        let command = params.command();
        let mut content = Content::new();
        params.build(&mut content, &self.layout)?;

        let envelope = Envelope::new(self.config.storage.as_str(), command.as_str())
            .with_credentials(self.config.user.as_str(), self.config.password.as_str())
            .with_application(self.config.application.clone())
            .with_options(options.clone())
            .with_content(content)
            .to_xml();

        if let Some(sink) = &self.config.trace_sink {
            sink.request_built(command.as_str(), &envelope);
        }
        self.send_raw(&command, &envelope)
    }

    /// Sends a prebuilt envelope and dispatches the reply as `command`.
    pub fn send_raw(&mut self, command: &Command, envelope: &str) -> Result<Reply, ClientError> {
        let raw = self.transport.send(envelope, &self.config.storage)?;
        let reply = dispatch(&raw, command, &self.config.id_path)?;

        if let (Some(warning), Some(sink)) = (reply.warning(), &self.config.trace_sink) {
            sink.warning(warning);
        }
        Ok(reply)
    }

    /// Closes and reopens the transport, clearing a failed state.
    pub fn reopen(&mut self) -> Result<(), ClientError> {
        self.transport.close();
        self.transport.open()
    }

    pub fn close(&mut self) {
        if self.transport.state() != TransportState::Unopened {
            tracing::debug!(storage = %self.config.storage, "Connection closed");
        }
        self.transport.close();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens a connection, runs `f` with it, and closes it whatever `f` returns.
pub fn with_connection<T, F>(config: ConnectionConfig, f: F) -> Result<T, ClientError>
where
    F: FnOnce(&mut Connection) -> Result<T, ClientError>,
{
    let mut conn = Connection::open(config)?;
    let result = f(&mut conn);
    conn.close();
    result
}
