//! The Stream Reader (C5): a backpressure-aware byte queue exposing
//! `read`, `read_until`, `wait_end`, `abort`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Notify, Mutex as AsyncMutex};

use crate::error::{Error, Result};

struct Inner {
    buf: VecDeque<u8>,
    /// Set once the transport (or the parser, for a fixed-length/chunked
    /// body) has signaled no more bytes are coming.
    end_appended: bool,
    /// The first error recorded against this reader, if any. Distinct
    /// from `end_appended`: an aborted reader never sets `end_appended`.
    error: Option<ErrorKind>,
    max_buf_len: usize,
    paused: bool,
}

/// Cloneable tag for the recorded terminal error, since [`Error`] itself
/// isn't `Clone` (it may carry a boxed cause).
#[derive(Clone, Copy)]
enum ErrorKind {
    Aborted,
    Malformed,
    TooLarge,
}

impl ErrorKind {
    fn into_error(self) -> Error {
        match self {
            ErrorKind::Aborted => Error::read_aborted(),
            ErrorKind::Malformed => Error::received_data_malformed(),
            ErrorKind::TooLarge => Error::entity_too_large(),
        }
    }
}

/// Callbacks the Reader uses to ask its owning Stream Manager to pause or
/// resume the transport's read side.
pub trait Backpressure: Send + Sync {
    fn pause_reading(&self);
    fn resume_reading(&self);
}

/// A buffered, backpressure-aware body reader.
///
/// Reads are mutually exclusive: only one `read`/`read_until` call may be
/// outstanding at a time, enforced by an internal async lock.
pub struct Reader {
    inner: Arc<StdMutex<Inner>>,
    notify: Arc<Notify>,
    read_gate: Arc<AsyncMutex<()>>,
    backpressure: Arc<dyn Backpressure>,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("finished", &self.finished())
            .finish()
    }
}

/// The producer-facing half, held by the Stream Manager to feed bytes in
/// and signal completion.
pub struct ReaderHandle {
    inner: Arc<StdMutex<Inner>>,
    notify: Arc<Notify>,
    backpressure: Arc<dyn Backpressure>,
}

impl std::fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderHandle").finish()
    }
}

pub fn pair(max_buf_len: usize, backpressure: Arc<dyn Backpressure>) -> (Reader, ReaderHandle) {
    let inner = Arc::new(StdMutex::new(Inner {
        buf: VecDeque::new(),
        end_appended: false,
        error: None,
        max_buf_len,
        paused: false,
    }));
    let notify = Arc::new(Notify::new());
    (
        Reader {
            inner: inner.clone(),
            notify: notify.clone(),
            read_gate: Arc::new(AsyncMutex::new(())),
            backpressure: backpressure.clone(),
        },
        ReaderHandle {
            inner,
            notify,
            backpressure,
        },
    )
}

impl ReaderHandle {
    /// Appends freshly-decoded body bytes, wakes any waiting reader, and
    /// pauses the transport's read side if the buffer crossed
    /// `max_buf_len`.
    pub fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        trace!("Reader::append {} bytes", data.len());
        let mut inner = self.inner.lock().unwrap();
        inner.buf.extend(data);
        if !inner.paused && inner.buf.len() > inner.max_buf_len {
            debug!("pausing reads: buffered {} bytes exceeds max_buf_len {}", inner.buf.len(), inner.max_buf_len);
            inner.paused = true;
            self.backpressure.pause_reading();
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn mark_end(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.end_appended = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn mark_aborted(&self) {
        self.set_error(ErrorKind::Aborted);
    }

    pub fn mark_malformed(&self) {
        self.set_error(ErrorKind::Malformed);
    }

    pub fn mark_too_large(&self) {
        self.set_error(ErrorKind::TooLarge);
    }

    fn set_error(&self, kind: ErrorKind) {
        let mut inner = self.inner.lock().unwrap();
        if inner.error.is_none() {
            inner.error = Some(kind);
        }
        drop(inner);
        self.notify.notify_waiters();
    }
}

impl Reader {
    /// `finished()` is true once end has been signaled (or an error
    /// recorded) and the buffer has been fully drained.
    pub fn finished(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.buf.is_empty() && (inner.end_appended || inner.error.is_some())
    }

    pub fn end_appended(&self) -> bool {
        self.inner.lock().unwrap().end_appended
    }

    /// Requests that the owning Stream Manager tear down the connection;
    /// subsequent reads observe READ_ABORTED.
    pub fn abort(&self) {
        self.backpressure.resume_reading();
        let mut inner = self.inner.lock().unwrap();
        if inner.error.is_none() {
            inner.error = Some(ErrorKind::Aborted);
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Waits until the reader reaches end or a recorded error.
    pub async fn wait_end(&self) -> Result<()> {
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if let Some(kind) = inner.error {
                    return Err(kind.into_error());
                }
                if inner.end_appended && inner.buf.is_empty() {
                    return Ok(());
                }
            }
            self.notify.notified().await;
        }
    }

    /// Reads up to `n` bytes (or until end, if `n` is `None`), or exactly
    /// `n` bytes if `exactly` is true.
    pub async fn read(&self, n: Option<usize>, exactly: bool) -> Result<Vec<u8>> {
        let _gate = self.read_gate.lock().await;

        if n == Some(0) {
            return Ok(Vec::new());
        }

        if exactly {
            let want = n.expect("exactly requires n");
            return self.read_exactly(want).await;
        }

        match n {
            Some(want) => self.read_at_most(want).await,
            None => self.read_to_end().await,
        }
    }

    async fn read_exactly(&self, want: usize) -> Result<Vec<u8>> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.buf.len() >= want {
                    let out: Vec<u8> = inner.buf.drain(..want).collect();
                    self.maybe_resume(&mut inner);
                    return Ok(out);
                }
                if let Some(kind) = inner.error {
                    return Err(kind.into_error());
                }
                if inner.end_appended {
                    return Err(Error::read_unsatisfiable());
                }
            }
            self.notify.notified().await;
        }
    }

    async fn read_at_most(&self, want: usize) -> Result<Vec<u8>> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.buf.is_empty() {
                    let take = want.min(inner.buf.len());
                    let out: Vec<u8> = inner.buf.drain(..take).collect();
                    self.maybe_resume(&mut inner);
                    return Ok(out);
                }
                if let Some(kind) = inner.error {
                    return Err(kind.into_error());
                }
                if inner.end_appended {
                    return Err(Error::read_finished());
                }
            }
            self.notify.notified().await;
        }
    }

    async fn read_to_end(&self) -> Result<Vec<u8>> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(kind) = inner.error {
                    return Err(kind.into_error());
                }
                if inner.end_appended {
                    let out: Vec<u8> = inner.buf.drain(..).collect();
                    return Ok(out);
                }
                if inner.buf.len() > inner.max_buf_len {
                    return Err(Error::max_buffer_reached());
                }
            }
            self.notify.notified().await;
        }
    }

    /// Scans for `separator`, returning everything up to (and, if
    /// `keep_separator`, including) it.
    pub async fn read_until(&self, separator: &[u8], keep_separator: bool) -> Result<Vec<u8>> {
        let _gate = self.read_gate.lock().await;
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(pos) = find_subslice(&inner.buf, separator) {
                    let take = if keep_separator {
                        pos + separator.len()
                    } else {
                        pos
                    };
                    let out: Vec<u8> = inner.buf.drain(..take).collect();
                    if !keep_separator {
                        for _ in 0..separator.len() {
                            inner.buf.pop_front();
                        }
                    }
                    self.maybe_resume(&mut inner);
                    return Ok(out);
                }
                if let Some(kind) = inner.error {
                    return Err(kind.into_error());
                }
                if inner.end_appended {
                    return Err(if inner.buf.is_empty() {
                        Error::read_finished()
                    } else {
                        Error::separator_not_found()
                    });
                }
                if inner.buf.len() > inner.max_buf_len {
                    return Err(Error::max_buffer_reached());
                }
            }
            self.notify.notified().await;
        }
    }

    fn maybe_resume(&self, inner: &mut Inner) {
        if inner.paused && inner.buf.len() <= inner.max_buf_len {
            debug!("resuming reads: buffered {} bytes within max_buf_len {}", inner.buf.len(), inner.max_buf_len);
            inner.paused = false;
            self.backpressure.resume_reading();
        }
    }
}

fn find_subslice(buf: &VecDeque<u8>, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || buf.len() < needle.len() {
        return None;
    }
    (0..=buf.len() - needle.len()).find(|&start| {
        (0..needle.len()).all(|i| buf[start + i] == needle[i])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackpressure;
    impl Backpressure for NullBackpressure {
        fn pause_reading(&self) {}
        fn resume_reading(&self) {}
    }

    fn make_pair(max_buf_len: usize) -> (Reader, ReaderHandle) {
        pair(max_buf_len, Arc::new(NullBackpressure))
    }

    #[tokio::test]
    async fn read_zero_returns_immediately() {
        let (reader, _handle) = make_pair(1024);
        assert_eq!(reader.read(Some(0), false).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn read_at_most_waits_for_data() {
        let (reader, handle) = make_pair(1024);
        let read_fut = tokio::spawn(async move { reader.read(Some(10), false).await });
        tokio::task::yield_now().await;
        handle.append(b"hello");
        let data = read_fut.await.unwrap().unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn exact_read_fails_on_early_end() {
        let (reader, handle) = make_pair(1024);
        handle.append(b"ab");
        handle.mark_end();
        let err = reader.read(Some(5), true).await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::Kind::ReadUnsatisfiable));
    }

    #[tokio::test]
    async fn read_until_finds_separator() {
        let (reader, handle) = make_pair(1024);
        handle.append(b"GET / HTTP/1.1\r\n");
        let line = reader.read_until(b"\r\n", false).await.unwrap();
        assert_eq!(line, b"GET / HTTP/1.1");
    }

    #[tokio::test]
    async fn read_until_missing_separator_at_end_fails() {
        let (reader, handle) = make_pair(1024);
        handle.append(b"nope");
        handle.mark_end();
        let err = reader.read_until(b"\r\n", false).await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::Kind::SeparatorNotFound));
    }

    #[tokio::test]
    async fn finished_after_end_and_drain() {
        let (reader, handle) = make_pair(1024);
        handle.mark_end();
        assert!(reader.finished());
        let _ = reader.read(None, false).await;
    }
}
