// ── Fetch generations ──
//
// Every fetch that ends in a bulk write takes a ticket before it goes out.
// When the result lands it may only be written if no later ticket has been
// written first; otherwise the result is stale and dropped.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ticket handed out when a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Monotonic issue/commit counter for one store slot.
#[derive(Debug, Default)]
pub(crate) struct GenerationCounter {
    issued: AtomicU64,
    committed: Mutex<u64>,
}

impl GenerationCounter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket.
    pub(crate) fn begin(&self) -> Generation {
        Generation(self.issued.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Run `write` if `generation` is not older than the last committed
    /// ticket, and record it as committed. The check and the write happen
    /// under one lock so two landing fetches cannot interleave.
    pub(crate) fn commit_with<R>(&self, generation: Generation, write: impl FnOnce() -> R) -> Option<R> {
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        if generation.0 < *committed {
            return None;
        }
        *committed = generation.0;
        Some(write())
    }

    /// Issue a fresh ticket and commit it at once, running `write` under
    /// the commit lock. Every ticket handed out before this call is stale
    /// afterwards.
    pub(crate) fn advance_with<R>(&self, write: impl FnOnce() -> R) -> R {
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        *committed = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        write()
    }

    /// Last committed ticket number (0 before the first commit).
    pub(crate) fn committed(&self) -> u64 {
        *self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickets_increase() {
        let counter = GenerationCounter::new();
        let a = counter.begin();
        let b = counter.begin();
        assert!(b > a);
        assert_eq!(a.get(), 1);
    }

    #[test]
    fn stale_commit_is_refused() {
        let counter = GenerationCounter::new();
        let first = counter.begin();
        let second = counter.begin();

        assert_eq!(counter.commit_with(second, || "second"), Some("second"));
        assert_eq!(counter.commit_with(first, || "first"), None);
        assert_eq!(counter.committed(), second.get());
    }

    #[test]
    fn advance_makes_outstanding_tickets_stale() {
        let counter = GenerationCounter::new();
        let in_flight = counter.begin();

        assert_eq!(counter.advance_with(|| "local"), "local");
        assert_eq!(counter.commit_with(in_flight, || ()), None);

        let later = counter.begin();
        assert!(counter.commit_with(later, || ()).is_some());
    }

    #[test]
    fn in_order_commits_all_land() {
        let counter = GenerationCounter::new();
        let first = counter.begin();
        let second = counter.begin();

        assert!(counter.commit_with(first, || ()).is_some());
        assert!(counter.commit_with(second, || ()).is_some());
    }
}
