//! Quota availability.
//!
//! Capacity has no counter column anywhere; what is left is always derived
//! from the paid orders, live pending orders and live cart reservations
//! that consume the quota. Callers must only act on the result inside the
//! event lock, and the order assembly caches it per request in a mutable
//! ledger instead of re-reading mid-walk.

use chrono::{DateTime, Utc};

use crate::models::{Availability, AvailabilityState, Quota};
use crate::store::EventStore;

pub fn availability(store: &EventStore, quota: &Quota, now: DateTime<Utc>) -> Availability {
    let Some(size) = quota.size else {
        return Availability::unlimited();
    };
    let consumption = store.quota_consumption(quota, now);
    let state = if consumption.paid >= size {
        AvailabilityState::Gone
    } else if consumption.paid + consumption.pending >= size {
        AvailabilityState::Ordered
    } else if consumption.total() >= size {
        AvailabilityState::Reserved
    } else {
        AvailabilityState::Ok
    };
    let remaining = match state {
        AvailabilityState::Ok => size - consumption.total(),
        _ => 0,
    };
    Availability {
        state,
        remaining: Some(remaining),
    }
}
