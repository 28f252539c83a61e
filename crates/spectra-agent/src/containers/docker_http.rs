//! Minimal HTTP/1.1-over-Unix-socket client for the Docker Engine API.
//!
//! The engine API is plain HTTP on a Unix socket; reqwest has no Unix
//! transport, and pulling in a dedicated client crate just for this one
//! GET-JSON call would add a dependency the rest of the agent doesn't
//! need, so the request/response framing is hand-rolled on top of
//! `tokio::net::UnixStream` the same way `spectra-types::Envelope` hand-
//! rolls its own wire shape instead of reaching for a heavier derive.

use spectra_types::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Issues `GET path` against the daemon listening on `socket_path` and
/// parses the response body as JSON. Connection: close is requested so
/// the daemon ends the stream after one response and a missing
/// Content-Length can be handled by reading to EOF.
pub async fn get_json(socket_path: &str, path: &str) -> Result<serde_json::Value> {
    let mut stream = UnixStream::connect(socket_path).await.map_err(Error::Io)?;

    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nAccept: application/json\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.map_err(Error::Io)?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.map_err(Error::Io)?;

    let (status, body) = split_response(&raw)
        .ok_or_else(|| Error::Platform("malformed HTTP response from docker socket".into()))?;

    if !(200..300).contains(&status) {
        return Err(Error::Platform(format!("docker API returned status {status}")));
    }

    serde_json::from_slice(body).map_err(|e| Error::Platform(format!("invalid JSON from docker API: {e}")))
}

/// Splits raw response bytes into (status code, body), honoring
/// `Content-Length` when present and otherwise treating everything after
/// the header block as the body (valid since we asked for `Connection:
/// close`).
fn split_response(raw: &[u8]) -> Option<(u16, &[u8])> {
    let header_end = find_subslice(raw, b"\r\n\r\n")? + 4;
    let header_block = std::str::from_utf8(&raw[..header_end]).ok()?;
    let mut lines = header_block.split("\r\n");

    let status_line = lines.next()?;
    let status: u16 = status_line.split_whitespace().nth(1)?.parse().ok()?;

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok());

    let body = &raw[header_end..];
    let body = match content_length {
        Some(len) if len <= body.len() => &body[..len],
        _ => body,
    };

    Some((status, body))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_and_content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"ok\":true}\r\nGARBAGE";
        let (status, body) = split_response(raw).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"{\"ok\":true}\r\n");
    }

    #[test]
    fn falls_back_to_rest_of_buffer_without_content_length() {
        let raw = b"HTTP/1.0 200 OK\r\nConnection: close\r\n\r\n{\"ok\":true}";
        let (status, body) = split_response(raw).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, b"{\"ok\":true}");
    }

    #[test]
    fn non_2xx_status_is_parsed() {
        let raw = b"HTTP/1.1 404 Not Found\r\n\r\n";
        let (status, _) = split_response(raw).unwrap();
        assert_eq!(status, 404);
    }
}
