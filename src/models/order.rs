use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters order codes are drawn from. `I` and `O` are left out to avoid
/// confusion with `1` and `0`; `0` itself stays in the alphabet.
pub const CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ1234567890";
pub const CODE_MIN_LEN: usize = 5;
pub const CODE_MAX_LEN: usize = 16;

pub fn is_valid_code(code: &str) -> bool {
    (CODE_MIN_LEN..=CODE_MAX_LEN).contains(&code.len())
        && code.chars().all(|c| CODE_ALPHABET.contains(c))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Canceled,
    Refunded,
}

/// The purchase aggregate: positions, fees and payments are owned by the
/// order and are committed (or discarded) together with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub code: String,
    pub event_id: Uuid,
    pub status: OrderStatus,
    pub testmode: bool,
    pub email: Option<String>,
    pub locale: String,
    pub sales_channel: String,
    pub datetime: DateTime<Utc>,
    /// Pending orders stop counting toward quotas once this passes.
    pub expires: DateTime<Utc>,
    pub total: Decimal,
    pub invoice_address: Option<InvoiceAddress>,
    pub positions: Vec<OrderPosition>,
    pub fees: Vec<OrderFee>,
    pub payments: Vec<OrderPayment>,
}

impl Order {
    pub fn position_total(&self) -> Decimal {
        self.positions
            .iter()
            .filter(|p| !p.canceled)
            .map(|p| p.price)
            .sum()
    }

    pub fn fee_total(&self) -> Decimal {
        self.fees
            .iter()
            .filter(|f| !f.canceled)
            .map(|f| f.value)
            .sum()
    }

    /// Whether the order still consumes quota as a pending order.
    pub fn is_pending_and_live(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.expires > now
    }

    pub fn position(&self, positionid: u32) -> Option<&OrderPosition> {
        self.positions.iter().find(|p| p.positionid == positionid)
    }
}

/// One purchased unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPosition {
    pub id: Uuid,
    /// 1-based, consecutive and unique within the order.
    pub positionid: u32,
    pub item_id: Uuid,
    pub variation_id: Option<Uuid>,
    pub subevent_id: Option<Uuid>,
    pub price: Decimal,
    pub tax_rate: Decimal,
    pub tax_value: Decimal,
    pub tax_rule_id: Option<Uuid>,
    pub voucher_id: Option<Uuid>,
    /// Gross discount charged against the voucher's budget by this position.
    pub voucher_budget_use: Option<Decimal>,
    pub seat_id: Option<Uuid>,
    /// Positionid of the parent position. Add-ons are never nested.
    pub addon_to: Option<u32>,
    pub attendee_name: Option<String>,
    pub canceled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    Payment,
    Shipping,
    Service,
    Cancellation,
    Other,
}

/// A non-product charge attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFee {
    pub id: Uuid,
    pub fee_type: FeeType,
    pub description: String,
    pub value: Decimal,
    pub tax_rate: Decimal,
    pub tax_value: Decimal,
    pub tax_rule_id: Option<Uuid>,
    pub canceled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Created,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayment {
    pub id: Uuid,
    pub provider: String,
    pub amount: Decimal,
    pub state: PaymentState,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceAddress {
    pub company: Option<String>,
    pub name: Option<String>,
    pub street: Option<String>,
    pub zipcode: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub vat_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_alphabet_is_exactly_the_published_one() {
        assert_eq!(CODE_ALPHABET.len(), 34);
        assert!(!CODE_ALPHABET.contains('I'));
        assert!(!CODE_ALPHABET.contains('O'));
        assert!(CODE_ALPHABET.contains('0'));
    }

    #[test]
    fn code_validation_checks_length_and_characters() {
        assert!(is_valid_code("ABC92"));
        assert!(is_valid_code("ABCDEFGHJKLMNPQR"));
        assert!(!is_valid_code("AB12"));
        assert!(!is_valid_code("ABCDEFGHJKLMNPQRS"));
        assert!(!is_valid_code("ABCI2"));
        assert!(!is_valid_code("abc92"));
    }
}
