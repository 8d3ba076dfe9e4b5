//! Payment providers and the payment kickoff.
//!
//! Providers are plain trait objects registered once at startup; the
//! engine never discovers them dynamically. The kickoff runs once per
//! order, after totals are final, and decides whether the order starts
//! paid, with an open payment, or plainly pending.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::engine::assembly::RequestedStatus;
use crate::engine::error::OrderRuleError;
use crate::models::{Event, Order, OrderPayment, OrderStatus, PaymentState};
use crate::utils::money::round_money;

pub const PROVIDER_FREE: &str = "free";
pub const PROVIDER_BANK_TRANSFER: &str = "banktransfer";

pub trait PaymentProvider: Send + Sync {
    fn identifier(&self) -> &'static str;

    fn is_enabled(&self, event: &Event) -> bool {
        let _ = event;
        true
    }

    /// Payment fee for an order subtotal, used when a payment fee line does
    /// not carry its own value.
    fn calculate_fee(&self, total: Decimal, places: u32) -> Decimal {
        let _ = (total, places);
        Decimal::ZERO
    }

    /// Subject for the "waiting for payment" mail; rendering and delivery
    /// live in the mail collaborator.
    fn pending_mail_subject(&self, order: &Order, payment: Option<&OrderPayment>) -> String {
        let _ = payment;
        format!("Payment pending for order {}", order.code)
    }
}

/// Implicit provider for zero-total orders.
pub struct FreeProvider;

impl PaymentProvider for FreeProvider {
    fn identifier(&self) -> &'static str {
        PROVIDER_FREE
    }
}

pub struct BankTransferProvider {
    pub fee_abs: Decimal,
    pub fee_percent: Decimal,
}

impl Default for BankTransferProvider {
    fn default() -> Self {
        Self {
            fee_abs: Decimal::ZERO,
            fee_percent: Decimal::ZERO,
        }
    }
}

impl PaymentProvider for BankTransferProvider {
    fn identifier(&self) -> &'static str {
        PROVIDER_BANK_TRANSFER
    }

    fn calculate_fee(&self, total: Decimal, places: u32) -> Decimal {
        round_money(
            self.fee_abs + total * self.fee_percent / Decimal::ONE_HUNDRED,
            places,
        )
    }
}

/// Explicit provider registry, handed to the engine at construction time.
pub struct PaymentProviderRegistry {
    providers: HashMap<String, Arc<dyn PaymentProvider>>,
}

impl PaymentProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FreeProvider));
        registry.register(Arc::new(BankTransferProvider::default()));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn PaymentProvider>) {
        self.providers
            .insert(provider.identifier().to_string(), provider);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn PaymentProvider>> {
        self.providers.get(identifier).cloned()
    }
}

impl Default for PaymentProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluated once after totals are finalized. Zero-total orders confirm
/// immediately through the implicit free provider, whatever was requested.
pub(crate) fn kickoff_payment(
    order: &mut Order,
    requested_status: RequestedStatus,
    provider_id: Option<&str>,
    payment_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), OrderRuleError> {
    if order.total.is_zero() {
        order.status = OrderStatus::Paid;
        order.payments.push(OrderPayment {
            id: Uuid::new_v4(),
            provider: PROVIDER_FREE.to_string(),
            amount: Decimal::ZERO,
            state: PaymentState::Confirmed,
            payment_date: Some(payment_date.unwrap_or(now)),
        });
        return Ok(());
    }

    if provider_id == Some(PROVIDER_FREE) {
        return Err(OrderRuleError::FreeProviderNonZeroTotal);
    }

    match (requested_status, provider_id) {
        (RequestedStatus::Paid, None) => Err(OrderRuleError::PaymentProviderRequired),
        (RequestedStatus::Paid, Some(provider)) => {
            order.status = OrderStatus::Paid;
            order.payments.push(OrderPayment {
                id: Uuid::new_v4(),
                provider: provider.to_string(),
                amount: order.total,
                state: PaymentState::Confirmed,
                payment_date: Some(payment_date.unwrap_or(now)),
            });
            Ok(())
        }
        (RequestedStatus::Pending, Some(provider)) => {
            order.payments.push(OrderPayment {
                id: Uuid::new_v4(),
                provider: provider.to_string(),
                amount: order.total,
                state: PaymentState::Created,
                payment_date: None,
            });
            Ok(())
        }
        (RequestedStatus::Pending, None) => Ok(()),
    }
}
