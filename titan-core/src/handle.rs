//! Handle for long-lived subscription pump tasks.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Handle owning one subscription pump task.
///
/// Lifecycle contract:
/// - Prefer [`stop`](PumpHandle::stop) to request a graceful shutdown and
///   await completion.
/// - [`abort`](PumpHandle::abort) cancels immediately without cleanup.
/// - If dropped without an explicit shutdown, a best-effort stop signal is
///   sent and the task is then aborted; the pump may not observe the signal
///   before the abort lands.
#[derive(Debug)]
pub struct PumpHandle {
    inner: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl PumpHandle {
    /// Wrap a spawned pump with its stop signal.
    #[must_use]
    pub const fn new(inner: JoinHandle<()>, stop_tx: oneshot::Sender<()>) -> Self {
        Self {
            inner: Some(inner),
            stop_tx: Some(stop_tx),
        }
    }

    /// Gracefully stop the pump and await its completion.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(inner) = self.inner.take() {
            let _ = inner.await;
        }
    }

    /// Force-cancel the pump without waiting.
    pub fn abort(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.abort();
        }
    }

    /// Whether the pump task has already finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for PumpHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(h) = self.inner.take()
            && !h.is_finished()
        {
            h.abort();
        }
    }
}
