//! Entity counters feeding the progress indicator.

use super::progress::Progress;
use core::sync::atomic::{AtomicU64, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    completed: AtomicU64,
    unavailable: AtomicU64,
}

/// Tracks how many entities of a run have finished, and how many of those failed.
#[derive(Clone)]
pub struct RunTracker {
    counters: Arc<Counters>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for RunTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RunTracker")
            .field("counters", &self.counters)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl RunTracker {
    #[must_use]
    pub fn new(progress: &Arc<dyn Progress>, total: u64) -> Self {
        let counters = Arc::new(Counters::default());
        counters.total.store(total, Ordering::Relaxed);

        let counters_clone = Arc::clone(&counters);
        let use_colors = progress.use_colors();
        progress.set_determinate(Box::new(move || Self::progress_reporter_callback(&counters_clone, use_colors)));

        Self {
            counters,
            progress: Arc::clone(progress),
        }
    }

    /// Record a finished entity.
    pub fn complete(&self, unavailable: bool) {
        let _ = self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if unavailable {
            let _ = self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    /// Returns (total, completed, message).
    fn progress_reporter_callback(counters: &Counters, use_colors: bool) -> (u64, u64, String) {
        let total = counters.total.load(Ordering::Relaxed);
        let completed = counters.completed.load(Ordering::Relaxed);
        let unavailable = counters.unavailable.load(Ordering::Relaxed);

        let mut message = format!("{completed}/{total} entities");
        if unavailable > 0 {
            let failed = format!("{unavailable} unavailable");
            if use_colors {
                message = format!("{message}, {}", failed.yellow());
            } else {
                message = format!("{message}, {failed}");
            }
        }

        (total, completed, message)
    }
}
