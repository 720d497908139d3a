//! Minimal HTTP/1.1 request encoding and response parsing for the text
//! transport.

use cps_protocol::MAX_PAYLOAD_SIZE;

/// Serializes a `POST` carrying an envelope for `storage`.
pub fn encode_request(path: &str, host: &str, storage: &str, body: &[u8]) -> Vec<u8> {
    let mut req = Vec::with_capacity(160 + body.len());
    req.extend_from_slice(b"POST ");
    req.extend_from_slice(path.as_bytes());
    req.extend_from_slice(b" HTTP/1.1\r\n");

    let length = body.len().to_string();
    let headers: [(&str, &str); 4] = [
        ("Host", host),
        ("Content-Type", "text/xml"),
        ("Recipient", storage),
        ("Content-Length", length.as_str()),
    ];
    for (name, value) in headers {
        req.extend_from_slice(name.as_bytes());
        req.extend_from_slice(b": ");
        req.extend_from_slice(value.as_bytes());
        req.extend_from_slice(b"\r\n");
    }

    req.extend_from_slice(b"\r\n");
    req.extend_from_slice(body);
    req
}

/// Find the position of `\r\n\r\n` in data, returns index of the first `\r`.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(3)).find(|&i| {
        data[i] == b'\r' && data[i + 1] == b'\n' && data[i + 2] == b'\r' && data[i + 3] == b'\n'
    })
}

/// Parsed status line and the headers the transport cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub content_length: Option<usize>,
    pub chunked: bool,
    /// The server will close the connection after this response.
    pub close: bool,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Parses response headers (everything before `\r\n\r\n`).
///
/// Returns `None` when the status line is not a valid HTTP status line.
pub fn parse_response_head(data: &[u8]) -> Option<ResponseHead> {
    let text = std::str::from_utf8(data).ok()?;
    let mut lines = text.split("\r\n");

    // Status line: HTTP/1.1 200 OK
    let status_line = lines.next()?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let status: u16 = parts.next()?.parse().ok()?;
    let reason = parts.next().unwrap_or_default().to_string();

    // HTTP/1.0 closes by default.
    let mut close = version == "HTTP/1.0";
    let mut content_length = None;
    let mut chunked = false;

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().ok();
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value
                .split(',')
                .any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
        } else if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("close") {
                close = true;
            } else if value.eq_ignore_ascii_case("keep-alive") {
                close = false;
            }
        }
    }

    Some(ResponseHead {
        status,
        reason,
        content_length,
        chunked,
        close,
    })
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChunkResult<'a> {
    Complete {
        data: &'a [u8],
        consumed: usize,
        is_last: bool,
    },
    NeedMore,
    Invalid,
}

/// Decode one chunk from chunked transfer encoding.
pub fn decode_chunk(data: &[u8]) -> ChunkResult<'_> {
    let crlf = match find_crlf(data) {
        Some(pos) => pos,
        None => return ChunkResult::NeedMore,
    };

    let size_str = match std::str::from_utf8(&data[..crlf]) {
        Ok(s) => s.trim(),
        Err(_) => return ChunkResult::Invalid,
    };

    // Strip chunk extensions (;key=value).
    let size_hex = size_str.split(';').next().unwrap_or("").trim();
    let size = match usize::from_str_radix(size_hex, 16) {
        Ok(s) => s,
        Err(_) => return ChunkResult::Invalid,
    };

    if size == 0 {
        // Last chunk; no trailers are expected.
        let end = crlf + 2;
        if data.len() < end + 2 {
            return ChunkResult::NeedMore;
        }
        return ChunkResult::Complete {
            data: &[],
            consumed: end + 2,
            is_last: true,
        };
    }

    if size > MAX_PAYLOAD_SIZE as usize {
        return ChunkResult::Invalid;
    }

    let chunk_start = crlf + 2;
    // Chunk data is followed by a trailing \r\n.
    let Some((chunk_end, total)) = chunk_start
        .checked_add(size)
        .and_then(|end| Some((end, end.checked_add(2)?)))
    else {
        return ChunkResult::Invalid;
    };

    if data.len() < total {
        return ChunkResult::NeedMore;
    }

    ChunkResult::Complete {
        data: &data[chunk_start..chunk_end],
        consumed: total,
        is_last: false,
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    (0..data.len().saturating_sub(1)).find(|&i| data[i] == b'\r' && data[i + 1] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request() {
        let req = encode_request("/cgi-bin/cps2-cgi", "db.local", "books", b"<x/>");
        let text = String::from_utf8(req).unwrap();
        assert_eq!(
            text,
            "POST /cgi-bin/cps2-cgi HTTP/1.1\r\n\
             Host: db.local\r\n\
             Content-Type: text/xml\r\n\
             Recipient: books\r\n\
             Content-Length: 4\r\n\
             \r\n\
             <x/>"
        );
    }

    #[test]
    fn test_parse_simple_response() {
        let data = b"HTTP/1.1 200 OK\r\ncontent-length: 42\r\nx-other: 1";
        let head = parse_response_head(data).unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.content_length, Some(42));
        assert!(!head.chunked);
        assert!(!head.close);
        assert!(head.is_success());
    }

    #[test]
    fn test_parse_chunked_close_response() {
        let data = b"HTTP/1.1 500 Internal Server Error\r\nTransfer-Encoding: gzip, chunked\r\nConnection: close";
        let head = parse_response_head(data).unwrap();
        assert!(head.chunked);
        assert!(head.close);
        assert!(!head.is_success());
    }

    #[test]
    fn test_http10_closes_by_default() {
        let head = parse_response_head(b"HTTP/1.0 200 OK").unwrap();
        assert!(head.close);
        let head = parse_response_head(b"HTTP/1.0 200 OK\r\nConnection: keep-alive").unwrap();
        assert!(!head.close);
    }

    #[test]
    fn test_bad_status_line() {
        assert!(parse_response_head(b"garbage").is_none());
        assert!(parse_response_head(b"HTTP/1.1 abc OK").is_none());
        assert!(parse_response_head(b"\x09\x09\x00\x00").is_none());
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n\r\nbody"), Some(15));
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
    }

    #[test]
    fn test_decode_chunks() {
        assert_eq!(
            decode_chunk(b"5\r\nhello\r\n0\r\n\r\n"),
            ChunkResult::Complete {
                data: b"hello",
                consumed: 10,
                is_last: false
            }
        );
        assert_eq!(
            decode_chunk(b"0\r\n\r\n"),
            ChunkResult::Complete {
                data: b"",
                consumed: 5,
                is_last: true
            }
        );
        assert_eq!(decode_chunk(b"5\r\nhel"), ChunkResult::NeedMore);
        assert_eq!(decode_chunk(b"0\r\n"), ChunkResult::NeedMore);
        assert_eq!(decode_chunk(b"zz\r\n"), ChunkResult::Invalid);
        assert!(matches!(
            decode_chunk(b"a;ext=1\r\n0123456789\r\n"),
            ChunkResult::Complete { consumed: 21, .. }
        ));
    }

    #[test]
    fn test_decode_chunk_rejects_oversized_size_line() {
        assert_eq!(
            decode_chunk(b"ffffffffffffffff\r\nabc\r\n"),
            ChunkResult::Invalid
        );
        assert_eq!(
            decode_chunk(b"fffffffffffffffe\r\n"),
            ChunkResult::Invalid
        );

        let just_over = format!("{:x}\r\n", MAX_PAYLOAD_SIZE as usize + 1);
        assert_eq!(decode_chunk(just_over.as_bytes()), ChunkResult::Invalid);

        let at_limit = format!("{:x}\r\nabc", MAX_PAYLOAD_SIZE);
        assert_eq!(decode_chunk(at_limit.as_bytes()), ChunkResult::NeedMore);
    }
}
