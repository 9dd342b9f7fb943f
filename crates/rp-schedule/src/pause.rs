//! Pause capability
//!
//! A small composable switch held by value inside each checker or scheduler
//! that needs an administrator-toggleable on/off state without losing its
//! configuration. Pauses carry an expiry and clear themselves once it passes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

/// Pause switch with expiry
#[derive(Debug, Default)]
pub struct PauseController {
    paused_until: Mutex<Option<DateTime<Utc>>>,
}

impl PauseController {
    /// Create an unpaused controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause for `duration` from now
    pub fn pause(&self, duration: std::time::Duration) {
        let secs = duration.as_secs().min(i64::MAX as u64) as i64;
        let until = Utc::now() + ChronoDuration::seconds(secs);
        *self.paused_until.lock() = Some(until);
    }

    /// Clear any pause immediately
    pub fn resume(&self) {
        *self.paused_until.lock() = None;
    }

    /// Whether currently paused; an elapsed expiry clears the pause
    pub fn is_paused(&self) -> bool {
        let mut guard = self.paused_until.lock();
        match *guard {
            Some(until) if Utc::now() < until => true,
            Some(_) => {
                *guard = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pause_and_resume() {
        let pc = PauseController::new();
        assert!(!pc.is_paused());
        pc.pause(Duration::from_secs(3600));
        assert!(pc.is_paused());
        pc.resume();
        assert!(!pc.is_paused());
    }

    #[test]
    fn test_pause_auto_clears_after_expiry() {
        let pc = PauseController::new();
        pc.pause(Duration::from_secs(0));
        // Zero-length pause has already expired.
        assert!(!pc.is_paused());
        assert!(!pc.is_paused());
    }
}
