use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between a caller and a long-running
/// scan or hash operation.
///
/// The flag is checked once per fixed-size block, never mid-block, so
/// cancellation latency is bounded by the block size. Clones share the same
/// underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }
}

/// Progress callback invoked synchronously on the analysis thread with
/// `(processed, total)` byte counts. Must not block.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + 'a;
