//! Client stream abstraction for TCP and Unix domain sockets.

use crate::endpoint::Endpoint;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Opens fresh byte streams to a server.
///
/// Transports call [`Connector::connect`] on open and on every reconnect;
/// each call must yield an independent stream.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self) -> io::Result<Self::Stream>;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String;
}

/// A client stream that can be either TCP or a Unix domain socket.
#[derive(Debug)]
pub enum ClientStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ClientStream {
    fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            ClientStream::Tcp(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
            #[cfg(unix)]
            ClientStream::Unix(stream) => {
                stream.set_read_timeout(timeout)?;
                stream.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for ClientStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ClientStream::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            ClientStream::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ClientStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ClientStream::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            ClientStream::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ClientStream::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            ClientStream::Unix(stream) => stream.flush(),
        }
    }
}

/// Connects to an [`Endpoint`] with optional connect and I/O timeouts.
#[derive(Debug, Clone)]
pub struct EndpointConnector {
    endpoint: Endpoint,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl EndpointConnector {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: None,
            io_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn connect_tcp(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((host, port));
        };

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{host}:{port} resolved to no addresses"),
            )
        }))
    }
}

impl Connector for EndpointConnector {
    type Stream = ClientStream;

    fn connect(&self) -> io::Result<ClientStream> {
        tracing::debug!("Connecting to {}...", self.endpoint);

        let stream = match &self.endpoint {
            Endpoint::Tcp { host, port } | Endpoint::Http { host, port, .. } => {
                let stream = self.connect_tcp(host, *port)?;
                stream.set_nodelay(true).ok();
                ClientStream::Tcp(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix { path } => ClientStream::Unix(UnixStream::connect(path)?),
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not available on this platform",
                ))
            }
        };

        stream.set_timeouts(self.io_timeout)?;
        tracing::debug!("Connected to {}", self.endpoint);
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_connect_and_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(&buf).unwrap();
        });

        let connector = EndpointConnector::new(Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        })
        .with_connect_timeout(Some(Duration::from_secs(5)))
        .with_io_timeout(Some(Duration::from_secs(5)));

        let mut stream = connector.connect().unwrap();
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        drop(stream);
        server.join().unwrap();
    }

    #[test]
    fn test_refused_connection() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connector = EndpointConnector::new(Endpoint::Tcp {
            host: "127.0.0.1".into(),
            port,
        });
        assert!(connector.connect().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let connector = EndpointConnector::new(Endpoint::Unix {
            path: dir.path().join("absent.sock"),
        });
        assert!(connector.connect().is_err());
        assert!(connector.describe().starts_with("unix://"));
    }
}
