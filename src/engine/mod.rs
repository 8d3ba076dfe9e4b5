//! The order-creation engine.
//!
//! Under concurrent access from many simultaneous buyers, decides whether a
//! requested purchase (items, variations, seats, vouchers, add-ons) can be
//! satisfied against finite quotas, computes final pricing, and atomically
//! commits an order together with its positions, fees and initial payment
//! record.

pub mod assembly;
pub mod availability;
pub mod codes;
pub mod error;
pub mod locking;
pub mod payment;
pub mod pricing;
pub mod vouchers;

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::EventStore;

pub use assembly::{
    CreatedOrder, FeeSpec, OrderCreateRequest, OrderOutcome, PositionSpec, RequestedStatus,
};
pub use error::{OrderError, OrderRuleError, PositionError, ValidationErrors};
pub use locking::{LockConfig, LockManager, LockTimeout};
pub use payment::{
    BankTransferProvider, FreeProvider, PaymentProvider, PaymentProviderRegistry,
    PROVIDER_BANK_TRANSFER, PROVIDER_FREE,
};

pub struct OrderEngine {
    store: Arc<EventStore>,
    locks: LockManager,
    providers: PaymentProviderRegistry,
}

impl OrderEngine {
    pub fn new(
        store: Arc<EventStore>,
        providers: PaymentProviderRegistry,
        lock_config: LockConfig,
    ) -> Self {
        Self {
            store,
            locks: LockManager::new(lock_config),
            providers,
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn providers(&self) -> &PaymentProviderRegistry {
        &self.providers
    }

    /// Validates, prices and — unless `simulate` is set — atomically
    /// commits an order against the event's quotas. The entire
    /// check-then-commit span runs inside the per-event lock; simulate
    /// requests use the no-op variant and never contend with real checkout
    /// traffic.
    pub fn create_order(
        &self,
        event_id: Uuid,
        req: OrderCreateRequest,
    ) -> Result<OrderOutcome, OrderError> {
        let event = self
            .store
            .event(event_id)
            .ok_or(OrderError::NotFound("event"))?;

        if req.simulate {
            debug!(event = %event.slug, positions = req.positions.len(), "simulating order");
            let assembly = self.locks.without_lock(|now| self.assemble(&event, &req, now))?;
            return Ok(OrderOutcome {
                order: CreatedOrder::Draft(assembly.order),
                send_email: req.send_email,
                generate_invoice: false,
            });
        }

        let assembly = self.locks.with_event_lock(event.id, |now| {
            let assembly = self.assemble(&event, &req, now)?;
            self.commit(&assembly)?;
            Ok::<_, OrderError>(assembly)
        })??;

        info!(
            order = %assembly.order.code,
            event = %event.slug,
            total = %assembly.order.total,
            positions = assembly.order.positions.len(),
            "order created"
        );
        Ok(OrderOutcome {
            order: CreatedOrder::Persisted(assembly.order),
            send_email: req.send_email,
            generate_invoice: event.invoice_immediately,
        })
    }
}
