//! Incremental parsing of request/response initials and body framing
//! discovery (C2).
//!
//! Parsing never blocks and never allocates beyond what's needed to copy
//! header names/values and the URI out of the shared buffer; the caller
//! owns that buffer and decides when to discard the consumed prefix.

use crate::error::RequestInitialError;
use crate::headers::HeaderMap;
use crate::method::Method;
use crate::request::RequestInitial;
use crate::response::ResponseInitial;
use crate::status::StatusCode;
use crate::version::Version;

const MAX_HEADERS: usize = 100;

/// Either "not enough bytes yet" or "here's the initial, and how many
/// bytes it occupied".
pub(crate) enum Parsed<T> {
    Partial,
    Complete(T, usize),
}

/// Scans `buf` for a complete request initial terminated by the blank
/// line. `max_initial_size` bounds how large an incomplete prefix may grow
/// before this gives up with [`RequestInitialError::TooLarge`].
pub(crate) fn parse_request_initial(
    buf: &[u8],
    max_initial_size: usize,
    is_tls: bool,
) -> Result<Parsed<RequestInitial>, RequestInitialError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let method = Method::from_bytes(req.method.unwrap().as_bytes())
                .map_err(|_| RequestInitialError::Malformed)?;
            let version =
                Version::from_httparse(req.version.unwrap()).ok_or(RequestInitialError::Malformed)?;
            let uri = req.path.unwrap().as_bytes().to_vec();
            let headers = collect_headers(req.headers)?;

            let authority = headers.get_first("host").map(|s| s.to_string());
            // §4.2: scheme comes from the transport's TLS status, unless
            // the caller supplied an explicit X-Scheme override.
            let scheme = headers
                .get_first("x-scheme")
                .map(|s| s.to_string())
                .unwrap_or_else(|| if is_tls { "https".to_string() } else { "http".to_string() });
            let mut initial = RequestInitial::new(method, version, uri)
                .with_headers(headers)
                .with_scheme(scheme);
            if let Some(authority) = authority {
                initial = initial.with_authority(authority);
            }

            Ok(Parsed::Complete(initial.freeze(), len))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() > max_initial_size {
                Err(RequestInitialError::TooLarge)
            } else {
                Ok(Parsed::Partial)
            }
        }
        Err(_) => Err(RequestInitialError::Malformed),
    }
}

/// Scans `buf` for a complete status line + headers. Unlike the request
/// side, a malformed response initial surfaces as the generic
/// `RECEIVED_DATA_MALFORMED` read error — there's no server-side 4xx
/// handle to speak of on the client.
pub(crate) fn parse_response_initial(
    buf: &[u8],
    max_initial_size: usize,
) -> Result<Parsed<ResponseInitial>, ()> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut raw_headers);

    match resp.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let version = Version::from_httparse(resp.version.unwrap()).ok_or(())?;
            let status = StatusCode::from_u16(resp.code.unwrap()).map_err(|_| ())?;
            let headers = collect_headers(resp.headers).map_err(|_| ())?;

            Ok(Parsed::Complete(
                ResponseInitial::new(status, version)
                    .with_headers(headers)
                    .freeze(),
                len,
            ))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() > max_initial_size {
                Err(())
            } else {
                Ok(Parsed::Partial)
            }
        }
        Err(_) => Err(()),
    }
}

fn collect_headers(raw: &[httparse::Header<'_>]) -> Result<HeaderMap, RequestInitialError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for h in raw {
        let value =
            std::str::from_utf8(h.value).map_err(|_| RequestInitialError::Malformed)?;
        headers.add(h.name, value.trim());
    }
    Ok(headers)
}

/// The framing discipline selected for a body, per §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyLength {
    /// No body at all: HEAD responses, 204, 304, or an unframed request.
    Zero,
    /// `Content-Length: n`.
    Fixed(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Bytes until transport EOF.
    Endless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyLengthError {
    InvalidContentLength,
    InvalidTransferEncoding,
}

fn connection_has_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get_all("connection")
        .flat_map(|v| v.split(','))
        .any(|tok| tok.trim().eq_ignore_ascii_case("upgrade"))
}

fn transfer_encoding_chunked(headers: &HeaderMap) -> Result<bool, BodyLengthError> {
    let mut token_count = 0u32;
    let mut saw_chunked = false;
    let mut saw_identity = false;
    let mut chunked_is_last = false;
    for value in headers.get_all("transfer-encoding") {
        for tok in value.split(',') {
            let tok = tok.trim();
            if tok.is_empty() {
                continue;
            }
            token_count += 1;
            let is_chunked = tok.eq_ignore_ascii_case("chunked");
            if is_chunked {
                saw_chunked = true;
            }
            if tok.eq_ignore_ascii_case("identity") {
                saw_identity = true;
            }
            chunked_is_last = is_chunked;
        }
    }
    if token_count == 0 {
        return Ok(false);
    }
    // identity alongside any other token is invalid; a bare identity-only
    // Transfer-Encoding header is unusual but not itself malformed.
    if saw_identity && token_count > 1 {
        return Err(BodyLengthError::InvalidTransferEncoding);
    }
    // chunked must be the last coding if present at all.
    if saw_chunked && !chunked_is_last {
        return Err(BodyLengthError::InvalidTransferEncoding);
    }
    Ok(saw_chunked && chunked_is_last)
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, BodyLengthError> {
    match headers.get_first("content-length") {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| BodyLengthError::InvalidContentLength),
    }
}

/// Body framing for a request, as observed by a server.
pub(crate) fn discover_request_body_length(
    headers: &HeaderMap,
) -> Result<BodyLength, BodyLengthError> {
    if connection_has_upgrade(headers) {
        return Ok(BodyLength::Endless);
    }
    if transfer_encoding_chunked(headers)? {
        return Ok(BodyLength::Chunked);
    }
    if let Some(len) = content_length(headers)? {
        return Ok(BodyLength::Fixed(len));
    }
    Ok(BodyLength::Zero)
}

/// Body framing for a response, as observed by a client. `is_head`,
/// `is_connect` describe the originating request; `version` is the
/// response's own version line.
pub(crate) fn discover_response_body_length(
    status: StatusCode,
    version: Version,
    is_head_request: bool,
    is_connect_request: bool,
    headers: &HeaderMap,
) -> Result<BodyLength, BodyLengthError> {
    if is_head_request
        || is_connect_request && status.is_success()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(BodyLength::Zero);
    }
    if status == StatusCode::SWITCHING_PROTOCOLS || connection_has_upgrade(headers) {
        return Ok(BodyLength::Endless);
    }
    if transfer_encoding_chunked(headers)? {
        return Ok(BodyLength::Chunked);
    }
    if let Some(len) = content_length(headers)? {
        return Ok(BodyLength::Fixed(len));
    }
    // No Content-Length and no Transfer-Encoding: the newer, authoritative
    // reference module applies this fallback regardless of version, not
    // only for HTTP/1.0 responses.
    let _ = version;
    Ok(BodyLength::Endless)
}

/// Parses one chunk-length line (`<hex>[;ext]\r\n`), discarding any
/// chunk-extension. `line` excludes the trailing `\r\n`.
pub(crate) fn parse_chunk_length_line(line: &[u8]) -> Result<u64, ()> {
    let hex_part = match line.iter().position(|&b| b == b';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    if hex_part.is_empty() {
        return Err(());
    }
    let s = std::str::from_utf8(hex_part).map_err(|_| ())?;
    u64::from_str_radix(s.trim(), 16).map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request() {
        let buf = b"GET /index HTTP/1.1\r\nHost: example.com\r\n\r\n";
        match parse_request_initial(buf, 65536, false).unwrap() {
            Parsed::Complete(initial, len) => {
                assert_eq!(len, buf.len());
                assert_eq!(initial.method(), Method::Get);
                assert_eq!(initial.version(), Version::Http11);
                assert_eq!(initial.uri(), b"/index");
                assert_eq!(initial.authority(), Some("example.com"));
                assert_eq!(initial.scheme(), Some("http"));
            }
            Parsed::Partial => panic!("expected complete"),
        }
    }

    #[test]
    fn partial_request_waits_for_more() {
        let buf = b"GET /index HTTP/1.1\r\nHost: example";
        assert!(matches!(
            parse_request_initial(buf, 65536, false).unwrap(),
            Parsed::Partial
        ));
    }

    #[test]
    fn oversized_partial_request_is_too_large() {
        let buf = vec![b'a'; 100];
        assert!(matches!(
            parse_request_initial(&buf, 10, false),
            Err(RequestInitialError::TooLarge)
        ));
    }

    #[test]
    fn tls_transport_yields_https_scheme() {
        let buf = b"GET / HTTP/1.1\r\n\r\n";
        match parse_request_initial(buf, 65536, true).unwrap() {
            Parsed::Complete(initial, _) => assert_eq!(initial.scheme(), Some("https")),
            Parsed::Partial => panic!("expected complete"),
        }
    }

    #[test]
    fn x_scheme_header_overrides_tls_status() {
        let buf = b"GET / HTTP/1.1\r\nX-Scheme: https\r\n\r\n";
        match parse_request_initial(buf, 65536, false).unwrap() {
            Parsed::Complete(initial, _) => assert_eq!(initial.scheme(), Some("https")),
            Parsed::Partial => panic!("expected complete"),
        }
    }

    #[test]
    fn chunked_wins_over_content_length() {
        let mut headers = HeaderMap::new();
        headers.add("transfer-encoding", "chunked");
        headers.add("content-length", "5");
        assert_eq!(
            discover_request_body_length(&headers).unwrap(),
            BodyLength::Chunked
        );
    }

    #[test]
    fn identity_mixed_with_other_coding_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.add("transfer-encoding", "chunked, identity");
        assert_eq!(
            discover_request_body_length(&headers),
            Err(BodyLengthError::InvalidTransferEncoding)
        );
    }

    #[test]
    fn chunked_not_last_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.add("transfer-encoding", "chunked, gzip");
        assert_eq!(
            discover_request_body_length(&headers),
            Err(BodyLengthError::InvalidTransferEncoding)
        );
    }

    #[test]
    fn bad_content_length_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.add("content-length", "abc");
        assert_eq!(
            discover_request_body_length(&headers),
            Err(BodyLengthError::InvalidContentLength)
        );
    }

    #[test]
    fn response_with_no_framing_headers_is_endless() {
        let headers = HeaderMap::new();
        assert_eq!(
            discover_response_body_length(StatusCode::OK, Version::Http11, false, false, &headers)
                .unwrap(),
            BodyLength::Endless
        );
    }

    #[test]
    fn head_response_has_zero_length_body() {
        let headers = HeaderMap::new();
        assert_eq!(
            discover_response_body_length(StatusCode::OK, Version::Http11, true, false, &headers)
                .unwrap(),
            BodyLength::Zero
        );
    }

    #[test]
    fn chunk_length_line_discards_extension() {
        assert_eq!(parse_chunk_length_line(b"1a;foo=bar"), Ok(0x1a));
        assert_eq!(parse_chunk_length_line(b"0"), Ok(0));
        assert!(parse_chunk_length_line(b"zz").is_err());
    }
}
