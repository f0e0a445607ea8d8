//! The Stream Writer (C6): `write`, `flush`, `finish`, `abort` over a
//! chunked-or-identity body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::error::{Error, Result};
use crate::proto::encode::encode_chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    New,
    InitialSent,
    BodyStreaming,
    Finished,
}

/// Where a Writer's encoded bytes go. Implemented by the Stream Manager,
/// which forwards to the transport.
pub trait Sink: Send + Sync {
    fn write(&self, data: &[u8]);
}

struct Shared {
    state: std::sync::Mutex<State>,
    aborted: AtomicBool,
    chunked: bool,
    sink: Arc<dyn Sink>,
    finished_notify: Notify,
}

/// A buffered, chunk-aware body writer.
///
/// `flush`/`finish` are serialized by an internal async gate, matching
/// the "only one flush outstanding" rule in §5.
#[derive(Clone)]
pub struct Writer {
    shared: Arc<Shared>,
    gate: Arc<AsyncMutex<()>>,
    drained: Arc<Notify>,
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Writer {
    pub(crate) fn new(sink: Arc<dyn Sink>, chunked: bool, drained: Arc<Notify>) -> Writer {
        Writer {
            shared: Arc::new(Shared {
                state: std::sync::Mutex::new(State::InitialSent),
                aborted: AtomicBool::new(false),
                chunked,
                sink,
                finished_notify: Notify::new(),
            }),
            gate: Arc::new(AsyncMutex::new(())),
            drained,
        }
    }

    /// True once the writer has reached FINISHED, by `finish()` or abort.
    pub fn is_finished(&self) -> bool {
        *self.shared.state.lock().unwrap() == State::Finished
    }

    /// Writes `data` to the body. Empty writes are a no-op.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        if self.shared.aborted.load(Ordering::SeqCst) {
            return Err(Error::write_aborted());
        }
        if self.is_finished() {
            return Err(Error::write_after_finished());
        }
        if data.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            *state = State::BodyStreaming;
        }
        let out = if self.shared.chunked {
            encode_chunk(data, false)
        } else {
            data.to_vec()
        };
        self.shared.sink.write(&out);
        Ok(())
    }

    /// Waits until the transport reports it has drained its write buffer.
    pub async fn flush(&self) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.shared.aborted.load(Ordering::SeqCst) {
            return Err(Error::write_aborted());
        }
        self.drained.notified().await;
        Ok(())
    }

    /// Writes any trailing `data` with the last-chunk signal and moves to
    /// FINISHED. Finishing twice with empty data is idempotent.
    pub async fn finish(&self, data: Option<&[u8]>) -> Result<()> {
        let _gate = self.gate.lock().await;
        if self.shared.aborted.load(Ordering::SeqCst) {
            return Err(Error::write_aborted());
        }

        let data = data.unwrap_or(&[]);
        if self.is_finished() {
            return if data.is_empty() {
                Ok(())
            } else {
                Err(Error::write_after_finished())
            };
        }

        let out = if self.shared.chunked {
            encode_chunk(data, true)
        } else {
            data.to_vec()
        };
        if !out.is_empty() {
            self.shared.sink.write(&out);
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            *state = State::Finished;
        }
        self.shared.finished_notify.notify_waiters();
        Ok(())
    }

    /// Tears the connection; subsequent writes observe WRITE_ABORTED.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock().unwrap();
            *state = State::Finished;
        }
        self.shared.finished_notify.notify_waiters();
        self.drained.notify_waiters();
    }

    /// Completes when the writer reaches FINISHED, by `finish()` or abort.
    pub async fn wait_finished(&self) {
        loop {
            if self.is_finished() {
                return;
            }
            self.shared.finished_notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct Captured(StdMutex<Vec<u8>>);
    impl Sink for Captured {
        fn write(&self, data: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(data);
        }
    }

    #[tokio::test]
    async fn chunked_write_then_finish() {
        let captured = Arc::new(Captured(StdMutex::new(Vec::new())));
        let writer = Writer::new(captured.clone(), true, Arc::new(Notify::new()));
        writer.write(b"hello").unwrap();
        writer.finish(None).await.unwrap();
        assert_eq!(
            captured.0.lock().unwrap().as_slice(),
            b"5\r\nhello\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn write_after_finish_fails() {
        let captured = Arc::new(Captured(StdMutex::new(Vec::new())));
        let writer = Writer::new(captured, false, Arc::new(Notify::new()));
        writer.finish(None).await.unwrap();
        assert!(writer.write(b"late").is_err());
    }

    #[tokio::test]
    async fn idempotent_empty_finish() {
        let captured = Arc::new(Captured(StdMutex::new(Vec::new())));
        let writer = Writer::new(captured, false, Arc::new(Notify::new()));
        writer.finish(None).await.unwrap();
        writer.finish(None).await.unwrap();
    }

    #[tokio::test]
    async fn abort_releases_wait_finished() {
        let captured = Arc::new(Captured(StdMutex::new(Vec::new())));
        let writer = Writer::new(captured, false, Arc::new(Notify::new()));
        writer.abort();
        writer.wait_finished().await;
        assert!(writer.write(b"x").is_err());
    }
}
