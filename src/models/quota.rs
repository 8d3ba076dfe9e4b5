use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A finite (or unlimited) pool of sellable capacity shared by one or more
/// item/variation combinations, optionally scoped to a single subevent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quota {
    pub id: Uuid,
    pub event_id: Uuid,
    pub subevent_id: Option<Uuid>,
    pub name: String,
    /// `None` means unlimited capacity.
    pub size: Option<i64>,
    /// Items without variations consuming this quota.
    #[serde(default)]
    pub items: HashSet<Uuid>,
    /// Variations consuming this quota (for items that have variations).
    #[serde(default)]
    pub variations: HashSet<Uuid>,
}

impl Quota {
    /// Whether a sold unit of the given product counts against this quota.
    /// Subevent scopes must match exactly; items with variations are matched
    /// through their variation, plain items through the item itself.
    pub fn matches(&self, item_id: Uuid, variation_id: Option<Uuid>, subevent_id: Option<Uuid>) -> bool {
        if self.subevent_id != subevent_id {
            return false;
        }
        match variation_id {
            Some(v) => self.variations.contains(&v),
            None => self.items.contains(&item_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityState {
    /// Capacity left after paid orders, pending orders and cart reservations.
    Ok,
    /// Cart reservations use up the rest; units may come back when they expire.
    Reserved,
    /// Paid plus pending orders use up the capacity.
    Ordered,
    /// Paid orders alone use up the capacity.
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub state: AvailabilityState,
    /// Units left for sale; `None` means unlimited.
    pub remaining: Option<i64>,
}

impl Availability {
    pub fn unlimited() -> Self {
        Self {
            state: AvailabilityState::Ok,
            remaining: None,
        }
    }

    pub fn sellable(&self) -> bool {
        self.state == AvailabilityState::Ok
    }
}
