use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Progress / cancellation channel shared with the caller.
///
/// The engine only polls it between words, so a cancel request takes
/// effect after the word in flight is finished.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    progress: AtomicU32,
    alive: AtomicBool,
    cancel: AtomicBool,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_progress(&self, percent: u32) {
        self.progress.store(percent.min(100), Ordering::Relaxed);
    }

    pub fn progress(&self) -> u32 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Heartbeat; the engine sets it after every unit of work.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
    }

    /// Reads and clears the heartbeat.
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
