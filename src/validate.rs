//! Post-decode validation callbacks.
//!
//! Custom read hooks may register callbacks to run after the whole top-level
//! graph has been decoded, the point where every back-reference is resolved
//! and cross-node invariants can actually be checked. Callbacks run highest
//! priority first; the first fault aborts the rest.

use crate::error::Result;
use tracing::trace;

/// One registered validation callback.
pub(crate) type ValidationFn = Box<dyn FnOnce() -> Result<()>>;

struct Entry {
    priority: i32,
    callback: ValidationFn,
}

/// Priority-ordered callback list, drained once per top-level read.
#[derive(Default)]
pub(crate) struct ValidationList {
    entries: Vec<Entry>,
}

impl ValidationList {
    /// Inserts a callback after any existing entries of equal or higher
    /// priority, so registration order breaks ties.
    pub(crate) fn register(&mut self, priority: i32, callback: ValidationFn) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            Entry {
                priority,
                callback,
            },
        );
    }

    /// Runs and drains all callbacks. A fault drops the not-yet-run remainder.
    pub(crate) fn run(&mut self) -> Result<()> {
        let entries = std::mem::take(&mut self.entries);
        let total = entries.len();
        for (i, entry) in entries.into_iter().enumerate() {
            trace!(priority = entry.priority, index = i, total, "running validation callback");
            (entry.callback)()?;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
