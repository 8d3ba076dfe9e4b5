use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organizer {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub slug: String,
    pub currency: String,
    /// Number of decimal places of the event currency, used for all rounding.
    pub currency_places: u32,
    pub has_subevents: bool,
    pub testmode: bool,
    pub sales_channels: Vec<String>,
    /// Days a pending order stays valid before it expires unpaid.
    pub payment_term_days: i64,
    /// Whether an invoice should be generated right after order creation.
    pub invoice_immediately: bool,
}

impl Event {
    pub fn channel_enabled(&self, channel: &str) -> bool {
        self.sales_channels.iter().any(|c| c == channel)
    }
}

/// One date of an event series. Items can carry a date-specific price or be
/// switched off entirely for a single date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubEvent {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub date_from: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub item_price_overrides: HashMap<Uuid, Decimal>,
    #[serde(default)]
    pub variation_price_overrides: HashMap<Uuid, Decimal>,
    #[serde(default)]
    pub disabled_items: HashSet<Uuid>,
    #[serde(default)]
    pub disabled_variations: HashSet<Uuid>,
}

impl SubEvent {
    pub fn item_disabled(&self, item_id: Uuid, variation_id: Option<Uuid>) -> bool {
        if self.disabled_items.contains(&item_id) {
            return true;
        }
        variation_id.is_some_and(|v| self.disabled_variations.contains(&v))
    }
}
