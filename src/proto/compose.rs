//! Producing the wire bytes of a request/response initial, with mandatory
//! header defaults normalized in (C3).

use crate::headers::HeaderMap;
use crate::request::RequestInitial;
use crate::response::ResponseInitial;
use crate::status::StatusCode;
use crate::version::Version;

fn product() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn has_connection_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all("connection")
        .flat_map(|v| v.split(','))
        .any(|tok| tok.trim().eq_ignore_ascii_case(token))
}

fn serialize(first_line: &str, headers: &HeaderMap) -> Vec<u8> {
    let mut out = Vec::with_capacity(first_line.len() + 256);
    out.extend_from_slice(first_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.title_case().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Composes a request initial, applying the defaults from §4.3:
/// `User-Agent`, `Accept` (unless upgrading), HTTP/1.0 keep-alive opt-in,
/// and a `Host` derived from `authority` if one isn't already set.
pub(crate) fn compose_request(initial: RequestInitial) -> (Vec<u8>, RequestInitial) {
    let mut headers = initial.headers().clone();

    headers.set_default("user-agent", product());
    if !headers.contains("upgrade") {
        headers.set_default("accept", "*/*");
    }
    if initial.version() == Version::Http10 && !headers.contains("connection") {
        headers.insert("connection", "Keep-Alive");
    }
    if let Some(authority) = initial.authority() {
        headers.set_default("host", authority.to_string());
    }

    let normalized = {
        let mut n = RequestInitial::new(initial.method(), initial.version(), initial.uri().to_vec())
            .with_headers(headers.clone());
        if let Some(a) = initial.authority() {
            n = n.with_authority(a.to_string());
        }
        if let Some(s) = initial.scheme() {
            n = n.with_scheme(s.to_string());
        }
        n.freeze()
    };

    let first_line = format!(
        "{} {} {}",
        initial.method(),
        String::from_utf8_lossy(initial.uri()),
        initial.version()
    );
    (serialize(&first_line, &headers), normalized)
}

/// Context about the request an outgoing response answers, needed to
/// apply §4.3's response-side defaults.
pub(crate) struct RequestContext {
    pub(crate) is_head: bool,
    pub(crate) is_connect: bool,
    pub(crate) request_connection_close: bool,
    pub(crate) expects_100_continue: bool,
}

/// Composes a response initial per §4.3. Returns the serialized bytes
/// (including a leading literal `100 Continue` interim response if the
/// request expected one and the final status is successful) and the
/// normalized, frozen initial.
pub(crate) fn compose_response(
    initial: ResponseInitial,
    ctx: &RequestContext,
) -> (Vec<u8>, ResponseInitial) {
    let mut headers = initial.headers().clone();
    let status = initial.status();
    let version = initial.version();

    headers.set_default("server", product());

    if status.as_u16() >= 400 {
        headers.insert("connection", "Close");
    } else if version == Version::Http10 && !headers.contains("connection") {
        headers.insert("connection", "Keep-Alive");
    } else if ctx.request_connection_close {
        headers.insert("connection", "Close");
    }

    let framing_exempt = ctx.is_head
        || ctx.is_connect
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || status == StatusCode::SWITCHING_PROTOCOLS;

    if !headers.contains("content-length") && !headers.contains("transfer-encoding") && !framing_exempt {
        if version == Version::Http11 {
            headers.insert("transfer-encoding", "Chunked");
        } else {
            headers.insert("connection", "Close");
        }
    }

    let normalized = ResponseInitial::new(status, version)
        .with_headers(headers.clone())
        .freeze();

    let first_line = format!("{} {} {}", version, status, status.canonical_reason());
    let mut out = Vec::new();
    if ctx.expects_100_continue && status.as_u16() < 400 {
        out.extend_from_slice(b"HTTP/1.1 100 Continue\r\n\r\n");
    }
    out.extend(serialize(&first_line, &headers));

    (out, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn request_gets_default_headers() {
        let req = RequestInitial::new(Method::Get, Version::Http11, "/")
            .with_authority("example.com");
        let (bytes, normalized) = compose_request(req);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(text.contains("User-Agent:"));
        assert!(text.contains("Accept: */*"));
        assert!(text.contains("Host: example.com"));
        assert_eq!(normalized.headers().get_first("host"), Some("example.com"));
    }

    #[test]
    fn http10_request_defaults_to_keep_alive() {
        let req = RequestInitial::new(Method::Get, Version::Http10, "/");
        let (bytes, _) = compose_request(req);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Connection: Keep-Alive"));
    }

    #[test]
    fn error_response_forces_connection_close() {
        let resp = ResponseInitial::new(StatusCode::BAD_REQUEST, Version::Http11);
        let ctx = RequestContext {
            is_head: false,
            is_connect: false,
            request_connection_close: false,
            expects_100_continue: false,
        };
        let (bytes, _) = compose_response(resp, &ctx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Connection: Close"));
    }

    #[test]
    fn success_response_defaults_to_chunked_on_http11() {
        let resp = ResponseInitial::new(StatusCode::OK, Version::Http11);
        let ctx = RequestContext {
            is_head: false,
            is_connect: false,
            request_connection_close: false,
            expects_100_continue: false,
        };
        let (bytes, _) = compose_response(resp, &ctx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Transfer-Encoding: Chunked"));
    }

    #[test]
    fn hundred_continue_is_prepended() {
        let resp = ResponseInitial::new(StatusCode::OK, Version::Http11);
        let ctx = RequestContext {
            is_head: false,
            is_connect: false,
            request_connection_close: false,
            expects_100_continue: true,
        };
        let (bytes, _) = compose_response(resp, &ctx);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 100 Continue\r\n\r\n"));
    }
}
