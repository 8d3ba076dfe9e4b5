use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::locking::LockTimeout;

#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed input or a business-rule violation. Collected across the
    /// whole request before raising, so the caller sees every problem at
    /// once. Never partially applied.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Transient contention on the event lock. Retry the whole request.
    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Programming or consistency error; aborts the whole transaction.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Everything that went wrong with one create-order request: order-level
/// problems plus per-position problems, each tied to its input index.
#[derive(Debug, Default, Serialize)]
pub struct ValidationErrors {
    pub order: Vec<OrderRuleError>,
    pub positions: Vec<PositionErrorEntry>,
}

#[derive(Debug, Serialize)]
pub struct PositionErrorEntry {
    pub index: usize,
    pub error: PositionError,
}

impl ValidationErrors {
    pub fn of_order(error: OrderRuleError) -> Self {
        let mut errors = Self::default();
        errors.order_rule(error);
        errors
    }

    pub fn order_rule(&mut self, error: OrderRuleError) {
        self.order.push(error);
    }

    pub fn position(&mut self, index: usize, error: PositionError) {
        self.positions.push(PositionErrorEntry { index, error });
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty() && self.positions.is_empty()
    }

    pub fn into_result(self) -> Result<(), OrderError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(OrderError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        for error in &self.order {
            parts.push(error.to_string());
        }
        for entry in &self.positions {
            parts.push(format!("position {}: {}", entry.index + 1, entry.error));
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum OrderRuleError {
    #[error("an order must contain at least one position")]
    EmptyPositions,
    #[error("either all positions must carry a positionid or none")]
    MixedPositionIds,
    #[error("positionids must be consecutive, starting at 1")]
    NonConsecutivePositionIds,
    #[error("sales channel {channel:?} is not enabled for this event")]
    UnknownSalesChannel { channel: String },
    #[error("test-mode orders are not available for this event")]
    TestmodeUnavailable,
    #[error("cart position {id} does not exist")]
    UnknownCart { id: Uuid },
    #[error("cart position {id} belongs to a different event")]
    CartWrongEvent { id: Uuid },
    #[error("payment provider {provider:?} is not available for this event")]
    UnknownPaymentProvider { provider: String },
    #[error("the free payment provider cannot be used on a non-free order")]
    FreeProviderNonZeroTotal,
    #[error("a paid order with a non-zero total requires a payment provider")]
    PaymentProviderRequired,
    #[error("order codes are 5-16 characters from the order code alphabet")]
    InvalidCode,
    #[error("this order code is already in use")]
    CodeTaken,
    #[error("fee #{index} needs a value or a payment provider to derive one from")]
    MissingFeeValue { index: usize },
    #[error("fee #{index} references an unknown tax rule")]
    UnknownFeeTaxRule { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PositionError {
    #[error("item does not exist, is inactive or belongs to a different event")]
    UnknownItem,
    #[error("this item requires a variation")]
    VariationRequired,
    #[error("variation does not exist or does not belong to this item")]
    UnknownVariation,
    #[error("this event is a series, a subevent is required")]
    SubeventRequired,
    #[error("subevent does not exist or does not belong to this event")]
    UnknownSubevent,
    #[error("this product is not available for the selected date")]
    ItemDisabledForSubevent,
    #[error("this product is not assigned to a quota and cannot be sold")]
    NotAssignedToQuota,
    #[error("quota {name:?} has no remaining capacity")]
    QuotaExceeded { name: String },
    #[error("this item requires a seat selection")]
    SeatRequired,
    #[error("this item does not take a seat")]
    SeatNotAllowed,
    #[error("seat does not exist for this event date")]
    UnknownSeat,
    #[error("seat is blocked or already taken")]
    SeatUnavailable,
    #[error("seat is used more than once in this order")]
    SeatDuplicate,
    #[error("voucher code is not known for this event")]
    UnknownVoucher,
    #[error("voucher does not apply to the selected product")]
    VoucherWrongProduct,
    #[error("voucher is restricted to a different event date")]
    VoucherWrongSubevent,
    #[error("voucher has expired")]
    VoucherExpired,
    #[error("voucher has no redemptions left")]
    VoucherExhausted,
    #[error("voucher discount budget is used up")]
    VoucherBudgetExceeded,
    #[error("add-on positions cannot redeem a voucher")]
    VoucherOnAddon,
    #[error("add-on references an unknown parent position")]
    AddonUnknownParent,
    #[error("add-ons cannot be nested")]
    AddonNested,
    #[error("add-ons must directly follow their parent position")]
    AddonOutOfOrder,
    #[error("price must not be negative")]
    NegativePrice,
}
