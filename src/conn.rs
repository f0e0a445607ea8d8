//! The Connection Driver (C8): owns the shared byte buffer, rotates Stream
//! Managers across a connection's lifetime, and decides when to close.
//!
//! A driver is fed bytes and transport events from the outside
//! (`on_bytes`/`on_eof`/`on_closed`/`on_drain`) and, in turn, calls back
//! into the transport it was built from (`write`/`pause_reading`/
//! `resume_reading`/`close`) through the [`Transport`] it owns. Nothing in
//! this module touches a socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Notify;

use crate::error::{Error, RequestInitialError};
use crate::proto::{DEFAULT_MAX_BUF_LEN, DEFAULT_MAX_INITIAL_SIZE};
use crate::response::ResponseInitial;
use crate::status::StatusCode;
use crate::stream::manager::{Event, Role, StreamManager};
use crate::stream::reader::Backpressure;
use crate::stream::writer::Sink;
use crate::stream::{Reader, Writer};
use crate::transport::Transport;

/// Bridges a caller-owned [`Transport`] (plain `&mut self` methods) to the
/// `Arc<dyn ... >`-shaped, thread-shareable hooks the Stream Manager and its
/// Reader/Writer need. One adapter, one lock, two trait impls.
struct TransportAdapter<T> {
    inner: Arc<StdMutex<T>>,
}

impl<T> Clone for TransportAdapter<T> {
    fn clone(&self) -> TransportAdapter<T> {
        TransportAdapter {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport + Send> Backpressure for TransportAdapter<T> {
    fn pause_reading(&self) {
        self.inner.lock().unwrap().pause_reading();
    }

    fn resume_reading(&self) {
        self.inner.lock().unwrap().resume_reading();
    }
}

impl<T: Transport + Send> Sink for TransportAdapter<T> {
    fn write(&self, data: &[u8]) {
        self.inner.lock().unwrap().write(data);
    }
}

/// Owns one connection's worth of HTTP/1.x state: the append-only receive
/// buffer, the Stream Manager for whichever exchange is currently being
/// read or written, and the keep-alive decision at each exchange's
/// boundary (§4.7).
pub struct ConnectionDriver<T: Transport + Send + 'static> {
    transport: Arc<StdMutex<T>>,
    backpressure: Arc<dyn Backpressure>,
    sink: Arc<dyn Sink>,
    drained: Arc<Notify>,

    role: Role,
    max_initial_size: usize,
    max_buf_len: usize,
    is_tls: bool,

    buf: Vec<u8>,
    closing: bool,
    /// Set once a request initial has failed to parse at all: the
    /// connection is done accepting new exchanges, but stays open until
    /// whatever error response the application composes has finished
    /// writing (§4.7/§8).
    halted: bool,

    manager: StreamManager,
    current_writer: Option<Writer>,

    pending_request: VecDeque<(Reader, crate::request::RequestInitial)>,
    pending_request_failed: VecDeque<RequestInitialError>,
    pending_response: VecDeque<(Reader, ResponseInitial)>,
}

impl<T: Transport + Send + 'static> std::fmt::Debug for ConnectionDriver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDriver")
            .field("role", &self.role)
            .field("closing", &self.closing)
            .finish()
    }
}

impl<T: Transport + Send + 'static> ConnectionDriver<T> {
    fn new(role: Role, transport: T, max_initial_size: usize, max_buf_len: usize) -> ConnectionDriver<T> {
        let is_tls = transport.is_tls();
        let transport = Arc::new(StdMutex::new(transport));
        let adapter = TransportAdapter {
            inner: transport.clone(),
        };
        let backpressure: Arc<dyn Backpressure> = Arc::new(adapter.clone());
        let sink: Arc<dyn Sink> = Arc::new(adapter);
        let drained = Arc::new(Notify::new());
        let manager = StreamManager::new(
            role,
            max_initial_size,
            max_buf_len,
            is_tls,
            backpressure.clone(),
            sink.clone(),
            drained.clone(),
        );
        ConnectionDriver {
            transport,
            backpressure,
            sink,
            drained,
            role,
            max_initial_size,
            max_buf_len,
            is_tls,
            buf: Vec::new(),
            closing: false,
            halted: false,
            manager,
            current_writer: None,
            pending_request: VecDeque::new(),
            pending_request_failed: VecDeque::new(),
            pending_response: VecDeque::new(),
        }
    }

    /// Feeds newly-received bytes in. Parses as much as it can, queuing any
    /// completed request/response initials (and their Readers) for the
    /// next `next_request`/`read_response` call.
    pub fn on_bytes(&mut self, data: &[u8]) {
        let _span = debug_span!("on_bytes", len = data.len()).entered();
        if self.closing || self.halted {
            return;
        }
        self.buf.extend_from_slice(data);
        loop {
            let (consumed, event) = self.manager.on_bytes(&self.buf);
            if consumed > 0 {
                self.buf.drain(..consumed);
            }
            match event {
                Event::NeedMore => {}
                Event::RequestReady(reader, initial) => {
                    self.pending_request.push_back((reader, initial));
                }
                Event::RequestInitialFailed(err) => {
                    debug!("request initial failed to parse: {}", err);
                    self.halted = true;
                    self.pending_request_failed.push_back(err);
                    return;
                }
                Event::ResponseReady(reader, initial) => {
                    self.pending_response.push_back((reader, initial));
                }
                Event::ResponseInitialFailed => {
                    warn!("response initial failed to parse, closing connection");
                    self.closing = true;
                    self.transport.lock().unwrap().close();
                    return;
                }
            }
            if consumed == 0 {
                break;
            }
        }
        self.maybe_rotate();
    }

    /// Transport EOF: forwarded to the current exchange's Reader, then
    /// re-checks whether the connection has reached its last exchange.
    pub fn on_eof(&mut self) {
        if self.closing || self.halted {
            return;
        }
        self.manager.on_eof();
        self.maybe_rotate();
    }

    /// The transport went away, cleanly or with `error`. No further writes
    /// are possible; any live Writer observes `WRITE_ABORTED`.
    pub fn on_closed(&mut self, error: Option<Error>) {
        match &error {
            Some(e) => error!("transport closed with error: {}", e),
            None => info!("transport closed"),
        }
        self.closing = true;
        if let Some(writer) = &self.current_writer {
            writer.abort();
        }
    }

    /// The transport finished flushing a prior `write`. Wakes any Writer
    /// waiting in `flush()`.
    pub fn on_drain(&mut self) {
        self.drained.notify_waiters();
        self.maybe_rotate();
    }

    fn maybe_rotate(&mut self) {
        if self.closing {
            return;
        }
        let writer_finished = match &self.current_writer {
            Some(w) => w.is_finished(),
            None => false,
        };
        if self.halted {
            // Waiting on the application to finish the error-response
            // Writer it was handed; only then is it safe to close.
            if writer_finished {
                debug!("halted connection's error response finished, closing");
                self.closing = true;
                self.transport.lock().unwrap().close();
            }
            return;
        }
        if let Some(last) = self.manager.last_stream(writer_finished) {
            if last {
                debug!("last exchange on connection, closing");
                self.closing = true;
                self.transport.lock().unwrap().close();
            } else {
                self.current_writer = None;
                self.manager = StreamManager::new(
                    self.role,
                    self.max_initial_size,
                    self.max_buf_len,
                    self.is_tls,
                    self.backpressure.clone(),
                    self.sink.clone(),
                    self.drained.clone(),
                );
            }
        }
    }
}

cfg_feature! {
    #![feature = "server"]

    use crate::headers::HeaderMap;
    use crate::proto::compose::{compose_response, RequestContext};
    use crate::request::RequestInitial;
    use crate::version::Version;

    impl<T: Transport + Send + 'static> ConnectionDriver<T> {
        /// Builds a driver that reads requests and writes responses, using
        /// the default `max_initial_size`/`max_buf_len` caps.
        pub fn server(transport: T) -> ConnectionDriver<T> {
            ConnectionDriver::new(Role::Server, transport, DEFAULT_MAX_INITIAL_SIZE, DEFAULT_MAX_BUF_LEN)
        }

        /// Builds a server-role driver with explicit limits.
        pub fn server_with_limits(
            transport: T,
            max_initial_size: usize,
            max_buf_len: usize,
        ) -> ConnectionDriver<T> {
            ConnectionDriver::new(Role::Server, transport, max_initial_size, max_buf_len)
        }

        /// Pops the next fully-read request, if one is ready. Its initial
        /// failing to parse at all is surfaced as `Err` — there is no
        /// Reader to respond through, so the caller must respond via
        /// [`ConnectionDriver::respond_to_invalid_request`] instead of
        /// `write_response`.
        pub fn next_request(&mut self) -> Option<std::result::Result<(Reader, RequestInitial), RequestInitialError>> {
            if let Some(err) = self.pending_request_failed.pop_front() {
                return Some(Err(err));
            }
            self.pending_request.pop_front().map(Ok)
        }

        /// Composes and sends a response to the oldest outstanding request,
        /// returning its Writer.
        pub fn write_response(&mut self, initial: ResponseInitial) -> Writer {
            let writer = self.manager.write_response(initial);
            self.current_writer = Some(writer.clone());
            writer
        }

        /// Writes the default status-line-and-headers response for a
        /// request whose initial failed to parse (§4.7, §8), and returns a
        /// Writer so the caller can add a body before finishing it. The
        /// connection keeps accepting nothing further and closes once that
        /// Writer reaches FINISHED.
        ///
        /// Must be called at most once per `RequestInitialError` returned
        /// from `next_request`.
        pub fn respond_to_invalid_request(&mut self, err: &RequestInitialError) -> Writer {
            let mut headers = HeaderMap::new();
            headers.insert("connection", "Close");
            let resp = ResponseInitial::new(err.default_status(), Version::Http11).with_headers(headers);
            let ctx = RequestContext {
                is_head: false,
                is_connect: false,
                request_connection_close: true,
                expects_100_continue: false,
            };
            let (bytes, normalized) = compose_response(resp, &ctx);
            self.sink.write(&bytes);

            let chunked = normalized
                .headers()
                .get_first("transfer-encoding")
                .map(|v| v.eq_ignore_ascii_case("chunked"))
                .unwrap_or(false);
            let writer = Writer::new(self.sink.clone(), chunked, self.drained.clone());
            self.current_writer = Some(writer.clone());
            self.halted = true;
            writer
        }
    }
}

cfg_feature! {
    #![feature = "client"]

    impl<T: Transport + Send + 'static> ConnectionDriver<T> {
        /// Builds a driver that writes requests and reads responses, using
        /// the default `max_initial_size`/`max_buf_len` caps.
        pub fn client(transport: T) -> ConnectionDriver<T> {
            ConnectionDriver::new(Role::Client, transport, DEFAULT_MAX_INITIAL_SIZE, DEFAULT_MAX_BUF_LEN)
        }

        /// Builds a client-role driver with explicit limits.
        pub fn client_with_limits(
            transport: T,
            max_initial_size: usize,
            max_buf_len: usize,
        ) -> ConnectionDriver<T> {
            ConnectionDriver::new(Role::Client, transport, max_initial_size, max_buf_len)
        }

        /// Composes and sends a request, returning its Writer.
        pub fn write_request(&mut self, initial: crate::request::RequestInitial) -> Writer {
            let writer = self.manager.write_request(initial);
            self.current_writer = Some(writer.clone());
            writer
        }

        /// Pops the next fully-read response, if one is ready.
        pub fn read_response(&mut self) -> Option<(Reader, ResponseInitial)> {
            self.pending_response.pop_front()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockTransport {
        out: Vec<u8>,
        paused: bool,
        closed: bool,
        tls: bool,
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) {
            self.out.extend_from_slice(data);
        }
        fn pause_reading(&mut self) {
            self.paused = true;
        }
        fn resume_reading(&mut self) {
            self.paused = false;
        }
        fn close(&mut self) {
            self.closed = true;
        }
        fn is_closing(&self) -> bool {
            self.closed
        }
        fn is_tls(&self) -> bool {
            self.tls
        }
    }

    #[test]
    fn server_reads_request_and_writes_response() {
        let mut driver = ConnectionDriver::server(MockTransport::default());
        driver.on_bytes(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let (reader, initial) = driver.next_request().unwrap().unwrap();
        assert_eq!(initial.method(), crate::method::Method::Get);
        assert!(reader.finished());
        assert_eq!(initial.scheme(), Some("http"));

        let resp = ResponseInitial::new(StatusCode::NO_CONTENT, Version::Http11);
        let writer = driver.write_response(resp);
        assert!(!writer.is_finished());
    }

    #[test]
    fn tls_transport_yields_https_scheme_on_request() {
        let mut driver = ConnectionDriver::server(MockTransport {
            tls: true,
            ..Default::default()
        });
        driver.on_bytes(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        let (_reader, initial) = driver.next_request().unwrap().unwrap();
        assert_eq!(initial.scheme(), Some("https"));
    }

    #[tokio::test]
    async fn malformed_request_stays_open_until_error_response_finishes() {
        let mut driver = ConnectionDriver::server(MockTransport::default());
        driver.on_bytes(b"NOTAMETHOD / HTTP/1.1\r\n\r\n");
        let err = driver.next_request().unwrap().unwrap_err();
        assert_eq!(err.default_status(), StatusCode::BAD_REQUEST);
        assert!(!driver.transport.lock().unwrap().is_closing());

        let writer = driver.respond_to_invalid_request(&err);
        writer.write(b"12345").unwrap();
        writer.finish(None).await.unwrap();
        driver.on_drain();

        assert!(driver.transport.lock().unwrap().is_closing());
        let out = driver.transport.lock().unwrap().out.clone();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400"));
        assert!(text.ends_with("5\r\n12345\r\n0\r\n\r\n"));
    }
}
