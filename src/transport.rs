//! The transport interface the Connection Driver requires from whatever
//! I/O runtume hosts it (§6). Sans-io: this crate never opens a socket
//! itself.

/// Operations the Connection Driver performs on the host-provided
/// transport.
///
/// The inbound direction (`on_bytes`, `on_eof`, `on_closed`, `on_drain`)
/// isn't part of this trait: those are calls the transport owner makes
/// *into* [`crate::conn::ConnectionDriver`], not methods the driver calls
/// on the transport.
pub trait Transport {
    /// Queues `data` for writing. Non-blocking; may buffer internally.
    fn write(&mut self, data: &[u8]);

    /// Stops delivering `on_bytes` until [`Transport::resume_reading`] is
    /// called. Used for backpressure when a Reader's buffer grows past
    /// `max_buf_len`.
    fn pause_reading(&mut self);

    /// Resumes delivering `on_bytes` after a prior pause.
    fn resume_reading(&mut self);

    /// Half- or full-closes the transport.
    fn close(&mut self);

    /// True once `close()` has been called or the peer has gone away.
    fn is_closing(&self) -> bool;

    /// Equivalent to `get_extra_info("sslcontext")`: true if this
    /// transport is TLS-backed. Consulted to decide whether a bare EOF
    /// (no explicit close) tears the whole connection (TLS) or only the
    /// read side (plain TCP, matching RFC 7230's half-close allowance).
    fn is_tls(&self) -> bool {
        false
    }
}
