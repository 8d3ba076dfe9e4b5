use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An ephemeral reservation of one unit of inventory for a not-yet-placed
/// cart. Counts toward quota consumption until `expires` passes, and is
/// deleted when an order is created from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartPosition {
    pub id: Uuid,
    pub event_id: Uuid,
    pub item_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub subevent_id: Option<Uuid>,
    pub voucher_id: Option<Uuid>,
    pub seat_id: Option<Uuid>,
    pub price: Decimal,
    /// The undiscounted listed price at the time the cart was built.
    pub listed_price: Option<Decimal>,
    /// The price after the voucher was applied, used to account for the
    /// voucher budget already consumed by this reservation.
    pub price_after_voucher: Option<Decimal>,
    pub expires: DateTime<Utc>,
}

impl CartPosition {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires > now
    }

    /// Gross discount this reservation currently charges against its
    /// voucher's budget.
    pub fn budget_use(&self) -> Decimal {
        match (self.listed_price, self.price_after_voucher) {
            (Some(listed), Some(after)) => (listed - after).max(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }
}
