//! Per-event locking.
//!
//! Quota availability is always derived live from order and cart rows, so
//! the availability-check-then-commit sequence of two concurrent checkouts
//! for the same event must not interleave. The lock is event-scoped on
//! purpose: checkouts for different events never contend, and one order
//! touching several quotas never has to take more than one lock.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("could not acquire the event lock within {attempts} attempts")]
pub struct LockTimeout {
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(40),
        }
    }
}

pub struct LockManager {
    config: LockConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn event_mutex(&self, event_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_id)
            .or_default()
            .clone()
    }

    /// Runs `f` inside the event's critical section. The clock is read once
    /// under the lock so every expiry comparison in the section sees the
    /// same instant. Acquisition backs off exponentially and gives up with
    /// a [`LockTimeout`] after the configured number of attempts.
    pub fn with_event_lock<T>(
        &self,
        event_id: Uuid,
        f: impl FnOnce(DateTime<Utc>) -> T,
    ) -> Result<T, LockTimeout> {
        let mutex = self.event_mutex(event_id);
        let mut delay = self.config.base_delay;
        for attempt in 1..=self.config.max_attempts {
            let acquired = match mutex.try_lock() {
                Ok(guard) => Some(guard),
                Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => None,
            };
            if let Some(guard) = acquired {
                let now = Utc::now();
                let result = f(now);
                drop(guard);
                return Ok(result);
            }
            if attempt < self.config.max_attempts {
                debug!(%event_id, attempt, "event lock contended, backing off");
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
        }
        warn!(
            %event_id,
            attempts = self.config.max_attempts,
            "gave up waiting for the event lock"
        );
        Err(LockTimeout {
            attempts: self.config.max_attempts,
        })
    }

    /// The no-op variant used by simulate requests: same timestamp contract,
    /// no contention with real checkout traffic.
    pub fn without_lock<T>(&self, f: impl FnOnce(DateTime<Utc>) -> T) -> T {
        f(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn fast_config() -> LockConfig {
        LockConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn times_out_when_the_event_stays_locked() {
        let manager = Arc::new(LockManager::new(fast_config()));
        let event_id = Uuid::new_v4();
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let (held_tx, held_rx) = mpsc::channel::<()>();

        let background = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .with_event_lock(event_id, |_now| {
                        held_tx.send(()).unwrap();
                        hold_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        let result = manager.with_event_lock(event_id, |_now| ());
        assert_eq!(result, Err(LockTimeout { attempts: 3 }));

        hold_tx.send(()).unwrap();
        background.join().unwrap();
    }

    #[test]
    fn different_events_do_not_contend() {
        let manager = Arc::new(LockManager::new(fast_config()));
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let (held_tx, held_rx) = mpsc::channel::<()>();

        let background = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .with_event_lock(Uuid::new_v4(), |_now| {
                        held_tx.send(()).unwrap();
                        hold_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        let result = manager.with_event_lock(Uuid::new_v4(), |_now| 42);
        assert_eq!(result, Ok(42));

        hold_tx.send(()).unwrap();
        background.join().unwrap();
    }

    #[test]
    fn retries_until_the_lock_frees_up() {
        let manager = Arc::new(LockManager::new(LockConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(5),
        }));
        let event_id = Uuid::new_v4();
        let (held_tx, held_rx) = mpsc::channel::<()>();

        let background = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .with_event_lock(event_id, |_now| {
                        held_tx.send(()).unwrap();
                        thread::sleep(Duration::from_millis(10));
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        let result = manager.with_event_lock(event_id, |_now| ());
        assert_eq!(result, Ok(()));
        background.join().unwrap();
    }

    #[test]
    fn without_lock_ignores_contention() {
        let manager = Arc::new(LockManager::new(fast_config()));
        let event_id = Uuid::new_v4();
        let (hold_tx, hold_rx) = mpsc::channel::<()>();
        let (held_tx, held_rx) = mpsc::channel::<()>();

        let background = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .with_event_lock(event_id, |_now| {
                        held_tx.send(()).unwrap();
                        hold_rx.recv().unwrap();
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert_eq!(manager.without_lock(|_now| 7), 7);

        hold_tx.send(()).unwrap();
        background.join().unwrap();
    }
}
