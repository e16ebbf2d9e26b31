//! Login throttling per client address.
//!
//! Every login attempt, successful or not, goes through [`LoginThrottle::check`] before any
//! credential is looked at. An address that comes back before its cooldown has elapsed is
//! rejected and pushed a further full step into the future, so a burst of attempts compounds
//! instead of sliding. The first attempt after the cooldown is allowed and forgets the address.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::errors::{Error, Result};

#[derive(Debug)]
pub struct LoginThrottle {
    step_seconds: i64,
    next_allowed: Mutex<HashMap<String, i64>>,
}

impl LoginThrottle {
    /// Create a throttle whose cooldown grows by `step` per early attempt. Sub-second parts of
    /// `step` are ignored.
    pub fn new(step: Duration) -> Self {
        Self {
            step_seconds: i64::try_from(step.as_secs()).unwrap_or(i64::MAX),
            next_allowed: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `address` may attempt a login now.
    pub fn check(&self, address: &str) -> Result<()> {
        self.check_at(address, Utc::now().timestamp())
    }

    /// Check whether `address` may attempt a login at Unix time `now`.
    pub fn check_at(&self, address: &str, now: i64) -> Result<()> {
        let mut next_allowed = self.next_allowed.lock().unwrap_or_else(PoisonError::into_inner);

        match next_allowed.get_mut(address) {
            Some(next) if now < *next => {
                *next = next.saturating_add(self.step_seconds);
                warn!(address, next_allowed = *next, "Login attempt throttled");
                Err(Error::ThrottledTooManyAttempts)
            }
            Some(_) => {
                next_allowed.remove(address);
                debug!(address, "Login throttle cleared");
                Ok(())
            }
            None => {
                next_allowed.insert(address.to_string(), now.saturating_add(self.step_seconds));
                Ok(())
            }
        }
    }

    /// The Unix time from which `address` is next allowed, if it is being tracked.
    pub fn next_allowed(&self, address: &str) -> Option<i64> {
        self.next_allowed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .copied()
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.next_allowed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
