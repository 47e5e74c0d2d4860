//! For tracking conversion progress and aborting early

use crate::pipeline::Stage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A trait that is used to report progress to some consumer.
pub trait ProgressReporter: Send {
    /// Called when a stage starts, with the number of frames it will process
    fn begin(&mut self, _stage: Stage, _total_frames: u64) {}

    /// Called after each frame has been processed.
    ///
    /// This method may return `false` to abort processing.
    /// The stage then fails with `Error::Aborted` and its output is left incomplete.
    fn increase(&mut self) -> bool;

    /// Called once the whole job has finished
    fn done(&mut self, _msg: &str) {}
}

/// No-op progress reporter
pub struct NoProgress {}

impl ProgressReporter for NoProgress {
    fn increase(&mut self) -> bool {
        true
    }
}

/// Lets another thread cancel a running job. Clones share the flag.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for CancelFlag {
    fn increase(&mut self) -> bool {
        !self.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared() {
        let mut p = CancelFlag::default();
        let remote = p.clone();
        assert!(p.increase());
        remote.cancel();
        assert!(!p.increase());
        assert!(NoProgress {}.increase());
    }
}
