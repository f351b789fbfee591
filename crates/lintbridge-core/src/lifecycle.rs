//! Process-wide shutdown state.
//!
//! The state moves one way, from active to shutting down. Creation paths call
//! [`Lifecycle::ensure_active`] immediately before provisioning; a creation
//! that passed the check before [`Lifecycle::begin_shutdown`] is allowed to
//! finish, but none can pass it afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Default)]
pub struct Lifecycle {
    shutting_down: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lifecycle ready to be injected into several owners.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Transitions to shutting down. Returns true for the call that performed
    /// the transition.
    pub fn begin_shutdown(&self) -> bool {
        let transitioned = self
            .shutting_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if transitioned {
            info!("Lifecycle is shutting down");
        }
        transitioned
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn ensure_active(&self) -> EngineResult<()> {
        if self.is_shutting_down() {
            return Err(EngineError::AlreadyShuttingDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn shutdown_transitions_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_active().is_ok());
        assert!(lifecycle.begin_shutdown());
        assert!(!lifecycle.begin_shutdown());
        assert!(matches!(
            lifecycle.ensure_active(),
            Err(EngineError::AlreadyShuttingDown)
        ));
    }

    #[test]
    fn concurrent_shutdown_has_single_winner() {
        let lifecycle = Lifecycle::shared();
        let winners: usize = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                thread::spawn(move || lifecycle.begin_shutdown())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| usize::from(handle.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
        assert!(lifecycle.is_shutting_down());
    }
}
