//! The Stream Manager (C7): owns one request/response exchange, binding a
//! Reader and a Writer to the transport and deciding keep-alive at
//! teardown.

use std::sync::Arc;

use tokio::sync::Notify;

use crate::error::RequestInitialError;
use crate::headers::HeaderMap;
use crate::method::Method;
use crate::proto::compose::{compose_request, compose_response, RequestContext};
use crate::proto::decode::{ChunkedDecoder, Step};
use crate::proto::parse::{
    discover_request_body_length, discover_response_body_length, parse_request_initial,
    parse_response_initial, BodyLength, Parsed,
};
use crate::request::RequestInitial;
use crate::response::ResponseInitial;
use crate::status::StatusCode;
use crate::stream::reader::{self, Backpressure, Reader, ReaderHandle};
use crate::stream::writer::{self, Sink, Writer};
use crate::version::Version;

/// Which side of the exchange this Manager is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

enum IncomingState {
    /// Waiting on the initial (request on the server, response on the
    /// client).
    AwaitingInitial,
    /// Streaming a fixed-length body; `remaining` bytes left.
    Fixed { remaining: u64 },
    /// Streaming a chunked body.
    Chunked(ChunkedDecoder),
    /// Endless body: everything until transport EOF.
    Endless,
    /// No body at all, or the body has been fully consumed.
    Done,
}

/// What the Driver should do after feeding bytes/EOF to the Manager.
pub(crate) enum Event {
    NeedMore,
    /// The server received a complete, well-formed request; its Reader is
    /// now live.
    RequestReady(Reader, RequestInitial),
    /// The request initial could not be read at all — there is no Reader.
    RequestInitialFailed(RequestInitialError),
    /// The client received a complete, well-formed response.
    ResponseReady(Reader, ResponseInitial),
    /// The response initial could not be read at all, or its framing
    /// headers were malformed. The connection can't be trusted past this
    /// point and should be torn down.
    ResponseInitialFailed,
}

/// Binds a pause/resume callback and an outgoing byte sink to the
/// Connection Driver's transport handle.
pub(crate) struct StreamManager {
    role: Role,
    max_initial_size: usize,
    max_buf_len: usize,
    is_tls: bool,
    backpressure: Arc<dyn Backpressure>,
    sink: Arc<dyn Sink>,
    drained: Arc<Notify>,

    incoming: IncomingState,
    reader_handle: Option<ReaderHandle>,

    // Context carried from the request, needed to compose/frame a
    // response (server) or to interpret one (client).
    is_head_request: bool,
    is_connect_request: bool,
    request_connection_close: bool,
    request_keep_alive: bool,
    expects_100_continue: bool,

    reader_terminal: bool,
    saw_error: bool,
    upgraded: bool,
    negotiated_version: Option<Version>,
    response_connection_close: bool,
    response_keep_alive: bool,
}

impl StreamManager {
    pub(crate) fn new(
        role: Role,
        max_initial_size: usize,
        max_buf_len: usize,
        is_tls: bool,
        backpressure: Arc<dyn Backpressure>,
        sink: Arc<dyn Sink>,
        drained: Arc<Notify>,
    ) -> StreamManager {
        StreamManager {
            role,
            max_initial_size,
            max_buf_len,
            is_tls,
            backpressure,
            sink,
            drained,
            incoming: IncomingState::AwaitingInitial,
            reader_handle: None,
            is_head_request: false,
            is_connect_request: false,
            request_connection_close: false,
            request_keep_alive: false,
            expects_100_continue: false,
            reader_terminal: false,
            saw_error: false,
            upgraded: false,
            negotiated_version: None,
            response_connection_close: false,
            response_keep_alive: false,
        }
    }

    /// Feeds newly appended bytes to the parser/body decoder, consuming as
    /// much of `buf` as possible. Returns the number of bytes consumed and
    /// the most significant event observed.
    pub(crate) fn on_bytes(&mut self, buf: &[u8]) -> (usize, Event) {
        let mut offset = 0;

        if matches!(self.incoming, IncomingState::AwaitingInitial) {
            match self.role {
                Role::Server => match parse_request_initial(&buf[offset..], self.max_initial_size, self.is_tls) {
                    Ok(Parsed::Partial) => return (offset, Event::NeedMore),
                    Err(e) => {
                        debug!("request initial parse failed: {}", e);
                        return (offset, Event::RequestInitialFailed(e));
                    }
                    Ok(Parsed::Complete(initial, len)) => {
                        offset += len;
                        self.negotiated_version = Some(initial.version());
                        self.is_head_request = initial.method() == Method::Head;
                        self.is_connect_request = initial.method() == Method::Connect;
                        self.request_connection_close = connection_has(initial.headers(), "close");
                        self.request_keep_alive = connection_has(initial.headers(), "keep-alive");
                        self.expects_100_continue = initial
                            .headers()
                            .get_first("expect")
                            .map(|v| v.eq_ignore_ascii_case("100-continue"))
                            .unwrap_or(false);

                        let body_length = match discover_request_body_length(initial.headers()) {
                            Ok(bl) => bl,
                            Err(e) => {
                                debug!("request body framing headers malformed: {:?}", e);
                                return (
                                    offset,
                                    Event::RequestInitialFailed(RequestInitialError::Malformed),
                                )
                            }
                        };
                        self.upgraded = body_length == BodyLength::Endless;
                        let reader = self.start_incoming(body_length);
                        return (offset, Event::RequestReady(reader, initial));
                    }
                },
                Role::Client => match parse_response_initial(&buf[offset..], self.max_initial_size) {
                    Ok(Parsed::Partial) => return (offset, Event::NeedMore),
                    Err(()) => {
                        debug!("response initial failed to parse");
                        self.reader_terminal = true;
                        self.saw_error = true;
                        return (offset, Event::ResponseInitialFailed);
                    }
                    Ok(Parsed::Complete(initial, len)) => {
                        offset += len;
                        self.response_connection_close = connection_has(initial.headers(), "close");
                        self.response_keep_alive = connection_has(initial.headers(), "keep-alive");
                        let body_length = match discover_response_body_length(
                            initial.status(),
                            initial.version(),
                            self.is_head_request,
                            self.is_connect_request,
                            initial.headers(),
                        ) {
                            Ok(bl) => bl,
                            Err(e) => {
                                debug!("response body framing headers malformed: {:?}", e);
                                self.reader_terminal = true;
                                self.saw_error = true;
                                return (offset, Event::ResponseInitialFailed);
                            }
                        };
                        self.upgraded = body_length == BodyLength::Endless
                            && (self.is_connect_request || initial.status() == StatusCode::SWITCHING_PROTOCOLS);
                        let reader = self.start_incoming(body_length);
                        return (offset, Event::ResponseReady(reader, initial));
                    }
                },
            }
        }

        loop {
            let remaining = &buf[offset..];
            if remaining.is_empty() && !matches!(self.incoming, IncomingState::Fixed { remaining: 0 }) {
                return (offset, Event::NeedMore);
            }
            match &mut self.incoming {
                IncomingState::Fixed { remaining: left } => {
                    if *left == 0 {
                        self.mark_reader_end();
                        self.incoming = IncomingState::Done;
                        continue;
                    }
                    let take = (*left as usize).min(remaining.len());
                    if take == 0 {
                        return (offset, Event::NeedMore);
                    }
                    if let Some(h) = &self.reader_handle {
                        h.append(&remaining[..take]);
                    }
                    *left -= take as u64;
                    offset += take;
                    if *left == 0 {
                        self.mark_reader_end();
                        self.incoming = IncomingState::Done;
                    }
                }
                IncomingState::Chunked(decoder) => match decoder.step(remaining) {
                    Step::Produced { consumed, data } => {
                        if let Some(h) = &self.reader_handle {
                            h.append(&data);
                        }
                        offset += consumed;
                        if consumed == 0 {
                            return (offset, Event::NeedMore);
                        }
                    }
                    Step::End { consumed } => {
                        offset += consumed;
                        self.mark_reader_end();
                        self.incoming = IncomingState::Done;
                    }
                    Step::NeedMore => return (offset, Event::NeedMore),
                    Step::Malformed => {
                        debug!("chunked body decode failed: malformed chunk");
                        self.mark_reader_malformed();
                        self.incoming = IncomingState::Done;
                        return (offset, Event::NeedMore);
                    }
                    Step::TooLarge => {
                        debug!("chunk-length line exceeded max_initial_size");
                        self.mark_reader_too_large();
                        self.incoming = IncomingState::Done;
                        return (offset, Event::NeedMore);
                    }
                },
                IncomingState::Endless => {
                    if remaining.is_empty() {
                        return (offset, Event::NeedMore);
                    }
                    if let Some(h) = &self.reader_handle {
                        h.append(remaining);
                    }
                    offset += remaining.len();
                    return (offset, Event::NeedMore);
                }
                IncomingState::Done | IncomingState::AwaitingInitial => {
                    return (offset, Event::NeedMore);
                }
            }
        }
    }

    fn start_incoming(&mut self, body_length: BodyLength) -> Reader {
        let (reader, handle) = reader::pair(self.max_buf_len, self.backpressure.clone());
        self.incoming = match body_length {
            BodyLength::Zero => {
                handle.mark_end();
                IncomingState::Done
            }
            BodyLength::Fixed(0) => {
                handle.mark_end();
                IncomingState::Done
            }
            BodyLength::Fixed(n) => IncomingState::Fixed { remaining: n },
            BodyLength::Chunked => IncomingState::Chunked(ChunkedDecoder::new(self.max_initial_size)),
            BodyLength::Endless => IncomingState::Endless,
        };
        self.reader_handle = Some(handle);
        reader
    }

    fn mark_reader_end(&mut self) {
        if let Some(h) = &self.reader_handle {
            h.mark_end();
        }
        self.reader_terminal = true;
    }

    fn mark_reader_malformed(&mut self) {
        if let Some(h) = &self.reader_handle {
            h.mark_malformed();
        }
        self.reader_terminal = true;
        self.saw_error = true;
    }

    fn mark_reader_too_large(&mut self) {
        if let Some(h) = &self.reader_handle {
            h.mark_too_large();
        }
        self.reader_terminal = true;
        self.saw_error = true;
    }

    /// Transport EOF: ends the Reader cleanly if framing is endless,
    /// otherwise records an abort.
    pub(crate) fn on_eof(&mut self) {
        match self.incoming {
            IncomingState::Endless => self.mark_reader_end(),
            IncomingState::Done => {}
            _ => {
                if let Some(h) = &self.reader_handle {
                    h.mark_aborted();
                }
                self.reader_terminal = true;
                self.saw_error = true;
            }
        }
    }

    /// Composes and sends a request (client). Returns the Writer.
    pub(crate) fn write_request(&mut self, initial: RequestInitial) -> Writer {
        self.is_head_request = initial.method() == Method::Head;
        self.is_connect_request = initial.method() == Method::Connect;
        self.negotiated_version = Some(initial.version());

        let (bytes, normalized) = compose_request(initial);
        self.sink.write(&bytes);

        self.request_connection_close = connection_has(normalized.headers(), "close");
        self.request_keep_alive = connection_has(normalized.headers(), "keep-alive");

        let chunked = !normalized.headers().contains("content-length");
        Writer::new(self.sink.clone(), chunked, self.drained.clone())
    }

    /// Composes and sends a response (server). Returns the Writer.
    pub(crate) fn write_response(&mut self, initial: ResponseInitial) -> Writer {
        let ctx = RequestContext {
            is_head: self.is_head_request,
            is_connect: self.is_connect_request,
            request_connection_close: self.request_connection_close,
            expects_100_continue: self.expects_100_continue,
        };
        let status = initial.status();
        let version = initial.version();
        let (bytes, normalized) = compose_response(initial, &ctx);
        self.sink.write(&bytes);

        self.response_connection_close = connection_has(normalized.headers(), "close");
        self.response_keep_alive = connection_has(normalized.headers(), "keep-alive");
        if status == StatusCode::SWITCHING_PROTOCOLS {
            self.upgraded = true;
        }

        let chunked = normalized
            .headers()
            .get_first("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        let _ = version;
        Writer::new(self.sink.clone(), chunked, self.drained.clone())
    }

    /// Computes whether this was the last exchange on the connection, per
    /// §4.7's last-stream rules. `None` until both sides have reached a
    /// terminal state.
    pub(crate) fn last_stream(&self, writer_finished: bool) -> Option<bool> {
        if !self.reader_terminal || !writer_finished {
            return None;
        }
        if self.saw_error {
            debug!("last exchange: error seen mid-stream");
            return Some(true);
        }
        if self.upgraded {
            debug!("last exchange: connection upgraded");
            return Some(true);
        }
        let last = match self.negotiated_version {
            Some(Version::Http11) => self.request_connection_close || self.response_connection_close,
            // 1.0 defaults to "last" unless both sides opted into
            // Keep-Alive (§4.7).
            Some(Version::Http10) => !(self.request_keep_alive && self.response_keep_alive),
            None => true,
        };
        debug!("keep-alive decision: last_stream = {}", last);
        Some(last)
    }
}

fn connection_has(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all("connection")
        .flat_map(|v| v.split(','))
        .any(|tok| tok.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::reader::Backpressure as BackpressureTrait;
    use crate::stream::writer::Sink as SinkTrait;
    use std::sync::Mutex as StdMutex;

    struct NullBackpressure;
    impl BackpressureTrait for NullBackpressure {
        fn pause_reading(&self) {}
        fn resume_reading(&self) {}
    }

    struct Captured(StdMutex<Vec<u8>>);
    impl SinkTrait for Captured {
        fn write(&self, data: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(data);
        }
    }

    fn make_manager(role: Role) -> StreamManager {
        StreamManager::new(
            role,
            65536,
            4096,
            false,
            Arc::new(NullBackpressure),
            Arc::new(Captured(StdMutex::new(Vec::new()))),
            Arc::new(Notify::new()),
        )
    }

    #[tokio::test]
    async fn oversized_chunk_length_line_is_entity_too_large() {
        let mut mgr = make_manager(Role::Server);
        let mut buf = Vec::new();
        buf.extend_from_slice(b"GET / HTTP/1.1\r\nTransfer-Encoding: Chunked\r\n\r\n");
        let (consumed, event) = mgr.on_bytes(&buf);
        buf.drain(..consumed);
        let reader = match event {
            Event::RequestReady(reader, _) => reader,
            _ => panic!("expected RequestReady"),
        };

        // An unterminated chunk-length line longer than max_initial_size.
        buf.extend(std::iter::repeat(b'a').take(70_000));
        let (consumed, _event) = mgr.on_bytes(&buf);
        buf.drain(..consumed);

        let err = reader.wait_end().await.unwrap_err();
        assert!(err.is_entity_too_large());
    }

    #[test]
    fn http10_last_stream_honors_mutual_keep_alive() {
        let mut mgr = make_manager(Role::Server);
        let buf = b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n".to_vec();
        let (_consumed, event) = mgr.on_bytes(&buf);
        assert!(matches!(event, Event::RequestReady(_, _)));

        let resp = ResponseInitial::new(StatusCode::NO_CONTENT, Version::Http10)
            .with_headers({
                let mut h = HeaderMap::new();
                h.insert("connection", "Keep-Alive");
                h
            });
        let writer = mgr.write_response(resp);

        assert_eq!(mgr.last_stream(true), Some(false));
        let _ = writer;
    }

    #[test]
    fn http10_last_stream_defaults_to_close_without_keep_alive() {
        let mut mgr = make_manager(Role::Server);
        let buf = b"GET / HTTP/1.0\r\n\r\n".to_vec();
        let (_consumed, event) = mgr.on_bytes(&buf);
        assert!(matches!(event, Event::RequestReady(_, _)));

        let resp = ResponseInitial::new(StatusCode::NO_CONTENT, Version::Http10);
        let writer = mgr.write_response(resp);

        assert_eq!(mgr.last_stream(true), Some(true));
        let _ = writer;
    }
}
