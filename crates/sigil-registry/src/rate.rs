//! Fixed-window registration rate limiting per owner

use sigil_core::{AccountId, Timestamp};
use std::collections::HashMap;

use crate::error::RegistryError;

/// Registrations counted in the owner's current window
#[derive(Debug, Clone, Copy)]
struct RegistrationWindow {
    count: u32,
    window_start: Timestamp,
}

/// Bounds registrations per owner per window
#[derive(Debug, Clone, Default)]
pub struct RegistrationLimiter {
    windows: HashMap<AccountId, RegistrationWindow>,
}

impl RegistrationLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a registration is allowed (doesn't consume)
    pub fn check(&self, owner: &AccountId, now: Timestamp, max: u32, window: Timestamp) -> Result<(), RegistryError> {
        let Some(current) = self.windows.get(owner) else {
            return Ok(());
        };

        let elapsed = now.saturating_sub(current.window_start);
        if elapsed >= window {
            return Ok(());
        }
        if current.count >= max {
            return Err(RegistryError::RateLimited {
                retry_after: window - elapsed,
            });
        }
        Ok(())
    }

    /// Count a registration, opening a new window if the last one has passed
    pub fn record(&mut self, owner: &AccountId, now: Timestamp, window: Timestamp) {
        let entry = self.windows.entry(owner.clone()).or_insert(RegistrationWindow {
            count: 0,
            window_start: now,
        });
        if now.saturating_sub(entry.window_start) >= window {
            *entry = RegistrationWindow {
                count: 0,
                window_start: now,
            };
        }
        entry.count += 1;
    }
}
