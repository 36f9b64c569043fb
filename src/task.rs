//! Single in-flight operation tracking.
//!
//! Every component allows at most one operation at a time. [`ActiveOp`] holds
//! the cancellation token of that operation; the returned [`OpGuard`] frees the
//! slot when the operation finishes, unless a newer operation replaced it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ActiveOp {
    current: Mutex<Option<(u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl ActiveOp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an operation, or return `None` if one is already active.
    pub fn begin(&self) -> Option<OpGuard<'_>> {
        let mut current = self.current.lock();
        if current.is_some() {
            return None;
        }
        Some(self.install(&mut current))
    }

    /// Start an operation, cancelling any active one first.
    pub fn begin_replacing(&self) -> OpGuard<'_> {
        let mut current = self.current.lock();
        if let Some((_, token)) = current.take() {
            token.cancel();
        }
        self.install(&mut current)
    }

    fn install(&self, current: &mut Option<(u64, CancellationToken)>) -> OpGuard<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *current = Some((id, token.clone()));
        OpGuard {
            slot: self,
            id,
            token,
        }
    }

    /// Cancel the active operation. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        match self.current.lock().take() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.lock().is_some()
    }
}

pub struct OpGuard<'a> {
    slot: &'a ActiveOp,
    id: u64,
    token: CancellationToken,
}

impl OpGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.slot.current.lock();
        if current.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_refuses_while_active() {
        let op = ActiveOp::new();
        let guard = op.begin().unwrap();
        assert!(op.is_active());
        assert!(op.begin().is_none());
        drop(guard);
        assert!(!op.is_active());
        assert!(op.begin().is_some());
    }

    #[test]
    fn replacing_cancels_previous_and_keeps_slot() {
        let op = ActiveOp::new();
        let first = op.begin_replacing();
        let second = op.begin_replacing();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // The stale guard must not free the newer operation's slot.
        drop(first);
        assert!(op.is_active());
        drop(second);
        assert!(!op.is_active());
    }

    #[test]
    fn cancel_frees_slot_and_signals_token() {
        let op = ActiveOp::new();
        let guard = op.begin().unwrap();
        assert!(op.cancel());
        assert!(guard.is_cancelled());
        assert!(!op.is_active());
        assert!(!op.cancel());
    }
}
