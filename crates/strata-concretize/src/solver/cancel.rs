use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ConcretizeError, Result};

/// Cancellation handle shared between a caller and a running solve.
///
/// Cloning shares the flag, so any clone can abort the search. An optional
/// deadline turns the token into a timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// A token that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// A token sharing this one's flag that also expires after `timeout`,
    /// keeping whichever deadline comes first
    pub fn limited_to(&self, timeout: Option<Duration>) -> Self {
        let limit = timeout.and_then(|t| Instant::now().checked_add(t));
        let deadline = match (self.deadline, limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.is_expired()
    }

    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail with `SolveCancelled` once the token is cancelled or expired
    pub fn check(&self) -> Result<()> {
        if self.flag.load(Ordering::SeqCst) {
            return Err(ConcretizeError::SolveCancelled {
                reason: "cancelled by caller".to_string(),
            });
        }
        if self.is_expired() {
            return Err(ConcretizeError::SolveCancelled {
                reason: "timeout exceeded".to_string(),
            });
        }
        Ok(())
    }
}
