//! Cooperative cancellation for the two unbounded operations: the
//! proof-of-work mint loop and the discrete-log sweep. Both check a token
//! once per iteration and report cancellation by returning a dedicated
//! result, never by mutating state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cheap clonable cancellation handle.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Cancel {
        Cancel::default()
    }

    /// Trip the token. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::Cancel;

    #[test]
    fn clones_share_state() {
        let cancel = Cancel::new();
        let other = cancel.clone();
        assert!(!other.is_cancelled());
        cancel.cancel();
        assert!(other.is_cancelled());
    }
}
