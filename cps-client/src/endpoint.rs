//! Connection URL parsing.

use crate::error::ClientError;
use cps_protocol::{DEFAULT_HTTP_PORT, DEFAULT_REQUEST_PATH, DEFAULT_TCP_PORT};
use std::fmt;
use std::path::PathBuf;

/// Where and how to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Binary framed protocol over a Unix domain socket.
    Unix { path: PathBuf },
    /// Binary framed protocol over TCP.
    Tcp { host: String, port: u16 },
    /// Text protocol over HTTP/1.1.
    Http {
        host: String,
        port: u16,
        path: Option<String>,
    },
}

impl Endpoint {
    /// Parses a connection URL.
    ///
    /// An empty URL or `unix://` selects the socket `<storage>.sock` in the
    /// working directory.
    pub fn parse(url: &str, storage: &str) -> Result<Self, ClientError> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(Self::default_socket(storage));
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ClientError::Config(format!("connection URL '{url}' has no scheme")))?;

        match scheme.to_ascii_lowercase().as_str() {
            "unix" => {
                if rest.is_empty() {
                    Ok(Self::default_socket(storage))
                } else {
                    Ok(Endpoint::Unix {
                        path: PathBuf::from(rest),
                    })
                }
            }
            "tcp" => {
                let (authority, path) = split_path(rest);
                if path.is_some() {
                    return Err(ClientError::Config(format!(
                        "tcp URL '{url}' must not carry a path"
                    )));
                }
                let (host, port) = parse_authority(authority, DEFAULT_TCP_PORT, url)?;
                Ok(Endpoint::Tcp { host, port })
            }
            "http" => {
                let (authority, path) = split_path(rest);
                let (host, port) = parse_authority(authority, DEFAULT_HTTP_PORT, url)?;
                Ok(Endpoint::Http {
                    host,
                    port,
                    path: path.filter(|p| *p != "/").map(str::to_string),
                })
            }
            other => Err(ClientError::Config(format!(
                "unsupported connection scheme '{other}'"
            ))),
        }
    }

    fn default_socket(storage: &str) -> Self {
        Endpoint::Unix {
            path: PathBuf::from(format!("{storage}.sock")),
        }
    }

    /// Whether this endpoint speaks the binary framed protocol.
    pub fn is_binary(&self) -> bool {
        !matches!(self, Endpoint::Http { .. })
    }

    /// Request path for HTTP endpoints, falling back to `default`.
    pub fn request_path<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            Endpoint::Http {
                path: Some(path), ..
            } => path,
            _ => default,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix { path } => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::Http { host, port, path } => write!(
                f,
                "http://{host}:{port}{}",
                path.as_deref().unwrap_or(DEFAULT_REQUEST_PATH)
            ),
        }
    }
}

fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.find('/') {
        Some(idx) => (&rest[..idx], Some(&rest[idx..])),
        None => (rest, None),
    }
}

fn parse_authority(authority: &str, default_port: u16, url: &str) -> Result<(String, u16), ClientError> {
    let (host, port) = if let Some(inner) = authority.strip_prefix('[') {
        // Bracketed IPv6 literal.
        let (host, after) = inner
            .split_once(']')
            .ok_or_else(|| ClientError::Config(format!("unterminated IPv6 host in '{url}'")))?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(ClientError::Config(format!("connection URL '{url}' has no host")));
    }

    let port = match port {
        Some(port) => port
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid port '{port}' in '{url}'")))?,
        None => default_port,
    };

    Ok((host.to_string(), port))
}
