use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Request-scoped cancellation flag.
///
/// Cloned into every fetch/OCR worker of a request. Workers poll it between
/// units of work (body chunks, pages, documents); nothing produced after the
/// flag is raised reaches synthesis.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
