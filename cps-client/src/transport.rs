//! Request/response transports over a [`Connector`].
//!
//! Both transports follow the same contract: a failed send is retried
//! exactly once on a freshly opened stream, and a second failure leaves the
//! transport in [`TransportState::Failed`] until it is explicitly reopened.

use crate::error::ClientError;
use crate::http::{self, ChunkResult, ResponseHead};
use crate::observer::TraceSink;
use crate::stream::Connector;
use bytes::Bytes;
use cps_protocol::{Decoder, Encoder, AUTODETECT_STORAGE, MAX_PAYLOAD_SIZE};
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Consecutive zero-byte reads or writes tolerated before giving up.
pub const MAX_IDLE_IO: usize = 5;

const READ_CHUNK: usize = 8 * 1024;

/// Largest response body accepted over HTTP, matching the binary frame cap.
const MAX_BODY_SIZE: usize = MAX_PAYLOAD_SIZE as usize;

/// Lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unopened,
    Open,
    Failed,
}

/// A request/response channel to the server.
pub trait Transport {
    fn open(&mut self) -> Result<(), ClientError>;

    /// Sends one envelope and returns the raw reply envelope.
    fn send(&mut self, envelope: &str, storage: &str) -> Result<Vec<u8>, ClientError>;

    fn close(&mut self);

    fn state(&self) -> TransportState;
}

/// Stream ownership and state shared by both transports.
struct Link<C: Connector> {
    connector: C,
    stream: Option<C::Stream>,
    state: TransportState,
}

impl<C: Connector> Link<C> {
    fn new(connector: C) -> Self {
        Self {
            connector,
            stream: None,
            state: TransportState::Unopened,
        }
    }

    fn open(&mut self) -> Result<(), ClientError> {
        self.stream = None;
        match self.connector.connect() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = TransportState::Open;
                Ok(())
            }
            Err(e) => {
                self.state = TransportState::Failed;
                Err(ClientError::connection(format!(
                    "cannot connect to {}: {}",
                    self.connector.describe(),
                    e
                )))
            }
        }
    }

    /// The open stream, reconnecting if the peer closed it after the last
    /// response.
    fn stream(&mut self) -> Result<&mut C::Stream, ClientError> {
        if self.state != TransportState::Open {
            return Err(ClientError::NotConnected);
        }
        if self.stream.is_none() {
            self.open()?;
        }
        self.stream.as_mut().ok_or(ClientError::NotConnected)
    }

    /// Drops the stream but stays open; the next send reconnects.
    fn release(&mut self) {
        self.stream = None;
    }

    fn fail(&mut self) {
        self.stream = None;
        self.state = TransportState::Failed;
    }

    fn close(&mut self) {
        self.stream = None;
        self.state = TransportState::Unopened;
    }
}

/// Writes all of `buf`, tolerating up to [`MAX_IDLE_IO`] - 1 consecutive
/// zero-byte writes.
fn write_tolerant<W: Write + ?Sized>(writer: &mut W, mut buf: &[u8]) -> io::Result<()> {
    let mut idle = 0;
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                idle += 1;
                if idle >= MAX_IDLE_IO {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("{MAX_IDLE_IO} consecutive zero-byte writes"),
                    ));
                }
            }
            Ok(n) => {
                idle = 0;
                buf = &buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    writer.flush()
}

/// Outcome of a single read attempt while waiting for more data.
enum Fill {
    Data,
    Eof,
}

/// Reads once into `buf`, counting zero-byte reads against `idle`.
fn fill<R: Read + ?Sized>(reader: &mut R, buf: &mut Vec<u8>, idle: &mut usize) -> io::Result<Fill> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => {
                *idle += 1;
                if *idle >= MAX_IDLE_IO {
                    return Ok(Fill::Eof);
                }
            }
            Ok(n) => {
                *idle = 0;
                buf.extend_from_slice(&chunk[..n]);
                return Ok(Fill::Data);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// Binary transport
// =============================================================================

/// Framed binary protocol over TCP or a Unix socket.
pub struct BinaryTransport<C: Connector> {
    link: Link<C>,
    decoder: Decoder,
    sink: Option<Arc<dyn TraceSink>>,
}

impl<C: Connector> BinaryTransport<C> {
    pub fn new(connector: C, sink: Option<Arc<dyn TraceSink>>) -> Self {
        Self {
            link: Link::new(connector),
            decoder: Decoder::new(),
            sink,
        }
    }

    fn receive(&mut self) -> Result<Bytes, ClientError> {
        self.decoder.clear();
        let stream = self.link.stream()?;
        let mut buf = Vec::new();
        let mut idle = 0;
        loop {
            if let Some(envelope) = self.decoder.decode_reply()? {
                return Ok(envelope);
            }
            buf.clear();
            match fill(stream, &mut buf, &mut idle) {
                Ok(Fill::Data) => self.decoder.extend(&buf),
                Ok(Fill::Eof) => {
                    return Err(ClientError::connection(
                        "connection closed while waiting for reply",
                    ))
                }
                Err(e) => return Err(ClientError::connection(format!("receive failed: {e}"))),
            }
        }
    }
}

impl<C: Connector> Transport for BinaryTransport<C> {
    fn open(&mut self) -> Result<(), ClientError> {
        self.link.open()
    }

    fn send(&mut self, envelope: &str, storage: &str) -> Result<Vec<u8>, ClientError> {
        let storage = if storage.is_empty() {
            AUTODETECT_STORAGE
        } else {
            storage
        };
        let frame = Encoder::encode_request(envelope, Some(storage))?;

        if let Err(e) = write_tolerant(self.link.stream()?, &frame) {
            tracing::warn!(
                "Send to {} failed ({}), reconnecting",
                self.link.connector.describe(),
                e
            );
            self.link.open()?;
            if let Err(e) = write_tolerant(self.link.stream()?, &frame) {
                self.link.fail();
                return Err(ClientError::connection(format!(
                    "send failed after reconnect: {e}"
                )));
            }
        }
        if let Some(sink) = &self.sink {
            sink.bytes_sent(&frame);
        }

        match self.receive() {
            Ok(reply) => {
                if let Some(sink) = &self.sink {
                    sink.bytes_received(&reply);
                }
                Ok(reply.to_vec())
            }
            Err(e) => {
                self.link.fail();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        self.link.close();
        self.decoder.clear();
    }

    fn state(&self) -> TransportState {
        self.link.state
    }
}

// =============================================================================
// HTTP transport
// =============================================================================

/// Why one HTTP exchange did not produce a response.
enum Attempt {
    /// The connection looked dead before a status line arrived; worth one retry.
    Stale(String),
    Failed(ClientError),
}

/// Text protocol over HTTP/1.1 with a persistent connection.
pub struct HttpTransport<C: Connector> {
    link: Link<C>,
    host: String,
    path: String,
    sink: Option<Arc<dyn TraceSink>>,
}

impl<C: Connector> HttpTransport<C> {
    /// `host` is the value of the `Host` header; `path` is the request path.
    pub fn new(
        connector: C,
        host: impl Into<String>,
        path: impl Into<String>,
        sink: Option<Arc<dyn TraceSink>>,
    ) -> Self {
        Self {
            link: Link::new(connector),
            host: host.into(),
            path: path.into(),
            sink,
        }
    }

    fn exchange(&mut self, request: &[u8]) -> Result<(ResponseHead, Vec<u8>), Attempt> {
        let stream = self.link.stream().map_err(Attempt::Failed)?;
        if let Err(e) = write_tolerant(stream, request) {
            return Err(Attempt::Stale(format!("write failed: {e}")));
        }
        if let Some(sink) = &self.sink {
            sink.bytes_sent(request);
        }
        read_response(stream)
    }
}

fn read_response<R: Read + ?Sized>(stream: &mut R) -> Result<(ResponseHead, Vec<u8>), Attempt> {
    let mut buf = Vec::new();
    let mut idle = 0;

    let header_end = loop {
        if let Some(end) = http::find_header_end(&buf) {
            break end;
        }
        match fill(stream, &mut buf, &mut idle) {
            Ok(Fill::Data) => {}
            Ok(Fill::Eof) => {
                return Err(Attempt::Stale("connection closed before status line".into()))
            }
            Err(e) => return Err(Attempt::Stale(format!("read failed: {e}"))),
        }
    };

    let head = http::parse_response_head(&buf[..header_end]).ok_or_else(|| {
        let line = buf[..header_end].split(|&b| b == b'\r').next().unwrap_or_default();
        Attempt::Stale(format!(
            "bad status line '{}'",
            String::from_utf8_lossy(line)
        ))
    })?;
    let mut rest = buf.split_off(header_end + 4);

    let truncated = |e: Option<io::Error>| {
        Attempt::Failed(ClientError::connection(match e {
            Some(e) => format!("reading response body failed: {e}"),
            None => "connection closed in the middle of the response body".to_string(),
        }))
    };
    let too_large = |size: usize| {
        Attempt::Failed(ClientError::connection(format!(
            "response body too large: {size} bytes (max {MAX_BODY_SIZE})"
        )))
    };

    let body = if head.chunked {
        let mut body = Vec::new();
        loop {
            match http::decode_chunk(&rest) {
                ChunkResult::Complete {
                    data,
                    consumed,
                    is_last,
                } => {
                    if body.len() + data.len() > MAX_BODY_SIZE {
                        return Err(too_large(body.len() + data.len()));
                    }
                    body.extend_from_slice(data);
                    rest.drain(..consumed);
                    if is_last {
                        break body;
                    }
                }
                ChunkResult::NeedMore => match fill(stream, &mut rest, &mut idle) {
                    Ok(Fill::Data) => {}
                    Ok(Fill::Eof) => return Err(truncated(None)),
                    Err(e) => return Err(truncated(Some(e))),
                },
                ChunkResult::Invalid => {
                    return Err(Attempt::Failed(ClientError::connection(
                        "malformed chunked response body",
                    )))
                }
            }
        }
    } else if let Some(length) = head.content_length {
        if length > MAX_BODY_SIZE {
            return Err(too_large(length));
        }
        while rest.len() < length {
            match fill(stream, &mut rest, &mut idle) {
                Ok(Fill::Data) => {}
                Ok(Fill::Eof) => return Err(truncated(None)),
                Err(e) => return Err(truncated(Some(e))),
            }
        }
        rest.truncate(length);
        rest
    } else {
        // Delimited by connection close.
        loop {
            match fill(stream, &mut rest, &mut idle) {
                Ok(Fill::Data) if rest.len() > MAX_BODY_SIZE => {
                    return Err(too_large(rest.len()))
                }
                Ok(Fill::Data) => {}
                Ok(Fill::Eof) => break rest,
                Err(e) => return Err(truncated(Some(e))),
            }
        }
    };

    let mut head = head;
    if !head.chunked && head.content_length.is_none() {
        head.close = true;
    }
    Ok((head, body))
}

impl<C: Connector> Transport for HttpTransport<C> {
    fn open(&mut self) -> Result<(), ClientError> {
        self.link.open()
    }

    fn send(&mut self, envelope: &str, storage: &str) -> Result<Vec<u8>, ClientError> {
        let request = http::encode_request(&self.path, &self.host, storage, envelope.as_bytes());

        let (head, body) = match self.exchange(&request) {
            Ok(response) => response,
            Err(Attempt::Failed(e)) => {
                self.link.fail();
                return Err(e);
            }
            Err(Attempt::Stale(reason)) => {
                tracing::warn!(
                    "Stale connection to {} ({}), reconnecting",
                    self.link.connector.describe(),
                    reason
                );
                self.link.open()?;
                match self.exchange(&request) {
                    Ok(response) => response,
                    Err(Attempt::Stale(reason)) => {
                        self.link.fail();
                        return Err(ClientError::connection(format!(
                            "request failed after reconnect: {reason}"
                        )));
                    }
                    Err(Attempt::Failed(e)) => {
                        self.link.fail();
                        return Err(e);
                    }
                }
            }
        };

        if head.close {
            self.link.release();
        }
        if !head.is_success() {
            tracing::warn!(status = head.status, "Server answered HTTP {} {}", head.status, head.reason);
        }
        if let Some(sink) = &self.sink {
            sink.bytes_received(&body);
        }
        Ok(body)
    }

    fn close(&mut self) {
        self.link.close();
    }

    fn state(&self) -> TransportState {
        self.link.state
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::stream::Connector;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::rc::Rc;

    /// Behavior of one scripted stream.
    #[derive(Debug, Clone, Default)]
    pub struct Script {
        pub reply: Vec<u8>,
        pub fail_write: bool,
        pub zero_writes: usize,
        pub read_chunk: Option<usize>,
        pub write_chunk: Option<usize>,
    }

    impl Script {
        pub fn reply(reply: impl Into<Vec<u8>>) -> Self {
            Self {
                reply: reply.into(),
                ..Default::default()
            }
        }

        pub fn broken() -> Self {
            Self {
                fail_write: true,
                ..Default::default()
            }
        }
    }

    pub struct MockStream {
        script: Script,
        pos: usize,
        written: Rc<RefCell<Vec<u8>>>,
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = &self.script.reply[self.pos..];
            let n = remaining
                .len()
                .min(buf.len())
                .min(self.script.read_chunk.unwrap_or(usize::MAX));
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.script.fail_write {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            if self.script.zero_writes > 0 {
                self.script.zero_writes -= 1;
                return Ok(0);
            }
            let n = buf.len().min(self.script.write_chunk.unwrap_or(usize::MAX));
            self.written.borrow_mut().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Hands out one scripted stream per connect; `None` entries and an
    /// exhausted script refuse the connection.
    #[derive(Default)]
    pub struct ScriptedConnector {
        scripts: RefCell<VecDeque<Option<Script>>>,
        pub connects: Rc<Cell<usize>>,
        pub written: Rc<RefCell<Vec<Rc<RefCell<Vec<u8>>>>>>,
    }

    impl ScriptedConnector {
        pub fn new(scripts: impl IntoIterator<Item = Option<Script>>) -> Self {
            Self {
                scripts: RefCell::new(scripts.into_iter().collect()),
                ..Default::default()
            }
        }

        /// Bytes written to the `index`th stream.
        pub fn written(&self, index: usize) -> Vec<u8> {
            self.written.borrow()[index].borrow().clone()
        }
    }

    impl Connector for ScriptedConnector {
        type Stream = MockStream;

        fn connect(&self) -> io::Result<MockStream> {
            self.connects.set(self.connects.get() + 1);
            match self.scripts.borrow_mut().pop_front().flatten() {
                Some(script) => {
                    let written = Rc::new(RefCell::new(Vec::new()));
                    self.written.borrow_mut().push(written.clone());
                    Ok(MockStream {
                        script,
                        pos: 0,
                        written,
                    })
                }
                None => Err(io::Error::from(io::ErrorKind::ConnectionRefused)),
            }
        }

        fn describe(&self) -> String {
            "mock".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Script, ScriptedConnector};
    use super::*;
    use crate::observer::testing::RecordingSink;

    const REPLY: &str = "<cps:reply xmlns:cps=\"www.clusterpoint.com\"/>";

    fn binary_reply() -> Vec<u8> {
        Encoder::encode_reply(REPLY).unwrap().to_vec()
    }

    fn http_reply(extra_headers: &str, body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n{}",
            body.len(),
            extra_headers,
            body
        )
        .into_bytes()
    }

    fn binary(scripts: Vec<Option<Script>>) -> BinaryTransport<ScriptedConnector> {
        BinaryTransport::new(ScriptedConnector::new(scripts), None)
    }

    fn http_transport(scripts: Vec<Option<Script>>) -> HttpTransport<ScriptedConnector> {
        HttpTransport::new(ScriptedConnector::new(scripts), "db.local", "/cgi-bin/cps2-cgi", None)
    }

    #[test]
    fn test_send_before_open() {
        let mut transport = binary(vec![Some(Script::reply(binary_reply()))]);
        assert_eq!(transport.state(), TransportState::Unopened);
        assert!(matches!(
            transport.send("<x/>", "books"),
            Err(ClientError::NotConnected)
        ));
    }

    #[test]
    fn test_binary_round_trip() {
        let sink = Arc::new(RecordingSink::default());
        let mut transport = BinaryTransport::new(
            ScriptedConnector::new(vec![Some(Script::reply(binary_reply()))]),
            Some(sink.clone() as Arc<dyn TraceSink>),
        );
        transport.open().unwrap();
        assert_eq!(transport.state(), TransportState::Open);

        let reply = transport.send("<x/>", "books").unwrap();
        assert_eq!(reply, REPLY.as_bytes());

        let written = transport.link.connector.written(0);
        let mut decoder = Decoder::new();
        decoder.extend(&written);
        let (envelope, storage) = decoder.decode_request().unwrap().unwrap();
        assert_eq!(envelope.as_ref(), b"<x/>");
        assert_eq!(storage, "books");
        assert_eq!(
            sink.events(),
            vec![format!("sent:{}", written.len()), format!("received:{}", REPLY.len())]
        );
    }

    #[test]
    fn test_binary_empty_storage_uses_autodetect() {
        let mut transport = binary(vec![Some(Script::reply(binary_reply()))]);
        transport.open().unwrap();
        transport.send("<x/>", "").unwrap();
        let written = transport.link.connector.written(0);
        assert!(written.ends_with(b"\x12\x01*"));
    }

    #[test]
    fn test_binary_retries_once_on_write_failure() {
        let mut transport = binary(vec![
            Some(Script::broken()),
            Some(Script::reply(binary_reply())),
        ]);
        transport.open().unwrap();
        let reply = transport.send("<x/>", "books").unwrap();
        assert_eq!(reply, REPLY.as_bytes());
        assert_eq!(transport.link.connector.connects.get(), 2);
        assert_eq!(transport.state(), TransportState::Open);
    }

    #[test]
    fn test_binary_second_failure_is_fatal() {
        let mut transport = binary(vec![
            Some(Script::broken()),
            Some(Script::broken()),
            Some(Script::reply(binary_reply())),
        ]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.state(), TransportState::Failed);
        assert_eq!(transport.link.connector.connects.get(), 2);

        assert!(matches!(
            transport.send("<x/>", "books"),
            Err(ClientError::NotConnected)
        ));

        transport.open().unwrap();
        assert!(transport.send("<x/>", "books").is_ok());
    }

    #[test]
    fn test_binary_reconnect_refused() {
        let mut transport = binary(vec![Some(Script::broken()), None]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_zero_byte_write_limit() {
        let tolerated = Script {
            zero_writes: MAX_IDLE_IO - 1,
            write_chunk: Some(3),
            ..Script::reply(binary_reply())
        };
        let mut transport = binary(vec![Some(tolerated)]);
        transport.open().unwrap();
        assert!(transport.send("<x/>", "books").is_ok());
        assert_eq!(transport.link.connector.connects.get(), 1);

        let exhausted = Script {
            zero_writes: MAX_IDLE_IO,
            ..Script::reply(binary_reply())
        };
        let mut transport = binary(vec![Some(exhausted), Some(Script::reply(binary_reply()))]);
        transport.open().unwrap();
        assert!(transport.send("<x/>", "books").is_ok());
        assert_eq!(transport.link.connector.connects.get(), 2);
    }

    #[test]
    fn test_binary_reply_in_small_pieces() {
        let script = Script {
            read_chunk: Some(3),
            ..Script::reply(binary_reply())
        };
        let mut transport = binary(vec![Some(script)]);
        transport.open().unwrap();
        assert_eq!(transport.send("<x/>", "books").unwrap(), REPLY.as_bytes());
    }

    #[test]
    fn test_binary_truncated_reply() {
        let mut reply = binary_reply();
        reply.truncate(reply.len() - 4);
        let mut transport = binary(vec![Some(Script::reply(reply)), Some(Script::default())]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.state(), TransportState::Failed);
        assert_eq!(transport.link.connector.connects.get(), 1);
    }

    #[test]
    fn test_binary_bad_marker() {
        let mut transport = binary(vec![Some(Script::reply(b"HTTP/1.1 200 OK\r\n".to_vec()))]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_http_round_trip() {
        let mut transport = http_transport(vec![Some(Script::reply(http_reply("", REPLY)))]);
        transport.open().unwrap();
        let reply = transport.send("<x/>", "books").unwrap();
        assert_eq!(reply, REPLY.as_bytes());

        let request = String::from_utf8(transport.link.connector.written(0)).unwrap();
        assert!(request.starts_with("POST /cgi-bin/cps2-cgi HTTP/1.1\r\n"));
        assert!(request.contains("Host: db.local\r\n"));
        assert!(request.contains("Recipient: books\r\n"));
        assert!(request.ends_with("\r\n\r\n<x/>"));
    }

    #[test]
    fn test_http_stale_connection_retried() {
        let mut transport = http_transport(vec![
            Some(Script::default()),
            Some(Script::reply(http_reply("", REPLY))),
        ]);
        transport.open().unwrap();
        assert_eq!(transport.send("<x/>", "books").unwrap(), REPLY.as_bytes());
        assert_eq!(transport.link.connector.connects.get(), 2);
    }

    #[test]
    fn test_http_bad_status_line_retried() {
        let mut transport = http_transport(vec![
            Some(Script::reply(b"garbage\r\n\r\n".to_vec())),
            Some(Script::reply(http_reply("", REPLY))),
        ]);
        transport.open().unwrap();
        assert!(transport.send("<x/>", "books").is_ok());
        assert_eq!(transport.link.connector.connects.get(), 2);
    }

    #[test]
    fn test_http_stale_twice_fails() {
        let mut transport =
            http_transport(vec![Some(Script::default()), Some(Script::default())]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_http_connection_close_reconnects_lazily() {
        let mut transport = http_transport(vec![
            Some(Script::reply(http_reply("Connection: close\r\n", REPLY))),
            Some(Script::reply(http_reply("", REPLY))),
        ]);
        transport.open().unwrap();
        transport.send("<x/>", "books").unwrap();
        assert_eq!(transport.link.connector.connects.get(), 1);
        assert_eq!(transport.state(), TransportState::Open);

        transport.send("<x/>", "books").unwrap();
        assert_eq!(transport.link.connector.connects.get(), 2);
    }

    #[test]
    fn test_http_chunked_body() {
        let raw = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let script = Script {
            read_chunk: Some(7),
            ..Script::reply(raw.as_bytes().to_vec())
        };
        let mut transport = http_transport(vec![Some(script)]);
        transport.open().unwrap();
        assert_eq!(transport.send("<x/>", "books").unwrap(), b"hello world");
    }

    #[test]
    fn test_http_error_status_returns_body() {
        let raw = format!(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: {}\r\n\r\n{}",
            REPLY.len(),
            REPLY
        );
        let mut transport = http_transport(vec![Some(Script::reply(raw.into_bytes()))]);
        transport.open().unwrap();
        assert_eq!(transport.send("<x/>", "books").unwrap(), REPLY.as_bytes());
    }

    #[test]
    fn test_http_body_until_eof() {
        let raw = format!("HTTP/1.0 200 OK\r\n\r\n{REPLY}");
        let mut transport = http_transport(vec![Some(Script::reply(raw.into_bytes()))]);
        transport.open().unwrap();
        assert_eq!(transport.send("<x/>", "books").unwrap(), REPLY.as_bytes());
    }

    #[test]
    fn test_http_truncated_body_not_retried() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort";
        let mut transport = http_transport(vec![
            Some(Script::reply(raw.as_bytes().to_vec())),
            Some(Script::reply(http_reply("", REPLY))),
        ]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.link.connector.connects.get(), 1);
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_http_oversized_chunk_is_connection_error() {
        let raw = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabc\r\n";
        let mut transport = http_transport(vec![
            Some(Script::reply(raw.as_bytes().to_vec())),
            Some(Script::reply(http_reply("", REPLY))),
        ]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert_eq!(transport.link.connector.connects.get(), 1);
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_http_content_length_over_limit() {
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\nabc",
            MAX_BODY_SIZE + 1
        );
        let mut transport = http_transport(vec![Some(Script::reply(raw.into_bytes()))]);
        transport.open().unwrap();
        let err = transport.send("<x/>", "books").unwrap_err();
        assert!(err.to_string().contains("too large"));
        assert_eq!(transport.state(), TransportState::Failed);
    }

    #[test]
    fn test_close_resets_state() {
        let mut transport = http_transport(vec![Some(Script::reply(http_reply("", REPLY)))]);
        transport.open().unwrap();
        transport.close();
        assert_eq!(transport.state(), TransportState::Unopened);
        assert!(matches!(
            transport.send("<x/>", "books"),
            Err(ClientError::NotConnected)
        ));
    }
}
