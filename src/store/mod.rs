//! In-memory event store.
//!
//! Stand-in for the durable store the engine runs against. Every entity map
//! is guarded by its own mutex; quota, voucher and seat consumption are
//! always derived live from the order and cart rows, never from counters.
//! The one persisted counter, `Voucher::redeemed`, is only ever mutated
//! through [`EventStore::increment_voucher_redeemed`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    CartPosition, Event, Item, Order, OrderStatus, Organizer, Quota, Seat, SubEvent, TaxRule,
    Voucher,
};

/// Live consumption of one quota, split by the three consumer classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConsumption {
    pub paid: i64,
    pub pending: i64,
    pub carts: i64,
}

impl QuotaConsumption {
    pub fn total(&self) -> i64 {
        self.paid + self.pending + self.carts
    }
}

#[derive(Default)]
pub struct EventStore {
    organizers: Mutex<HashMap<Uuid, Organizer>>,
    events: Mutex<HashMap<Uuid, Event>>,
    subevents: Mutex<HashMap<Uuid, SubEvent>>,
    items: Mutex<HashMap<Uuid, Item>>,
    tax_rules: Mutex<HashMap<Uuid, TaxRule>>,
    quotas: Mutex<HashMap<Uuid, Quota>>,
    vouchers: Mutex<HashMap<Uuid, Voucher>>,
    seats: Mutex<HashMap<Uuid, Seat>>,
    carts: Mutex<HashMap<Uuid, CartPosition>>,
    orders: Mutex<HashMap<Uuid, Order>>,
}

// A poisoned map is still structurally sound; recover the data instead of
// propagating the panic of an unrelated thread.
fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- setup ------------------------------------------------------------

    pub fn insert_organizer(&self, organizer: Organizer) {
        guard(&self.organizers).insert(organizer.id, organizer);
    }

    pub fn insert_event(&self, event: Event) {
        guard(&self.events).insert(event.id, event);
    }

    pub fn insert_subevent(&self, subevent: SubEvent) {
        guard(&self.subevents).insert(subevent.id, subevent);
    }

    pub fn insert_item(&self, item: Item) {
        guard(&self.items).insert(item.id, item);
    }

    pub fn insert_tax_rule(&self, rule: TaxRule) {
        guard(&self.tax_rules).insert(rule.id, rule);
    }

    pub fn insert_quota(&self, quota: Quota) {
        guard(&self.quotas).insert(quota.id, quota);
    }

    pub fn insert_voucher(&self, voucher: Voucher) {
        guard(&self.vouchers).insert(voucher.id, voucher);
    }

    pub fn insert_seat(&self, seat: Seat) {
        guard(&self.seats).insert(seat.id, seat);
    }

    pub fn insert_cart_position(&self, cart: CartPosition) {
        guard(&self.carts).insert(cart.id, cart);
    }

    // -- lookups ----------------------------------------------------------

    pub fn organizer(&self, id: Uuid) -> Option<Organizer> {
        guard(&self.organizers).get(&id).cloned()
    }

    pub fn event(&self, id: Uuid) -> Option<Event> {
        guard(&self.events).get(&id).cloned()
    }

    pub fn subevent(&self, id: Uuid) -> Option<SubEvent> {
        guard(&self.subevents).get(&id).cloned()
    }

    pub fn item(&self, id: Uuid) -> Option<Item> {
        guard(&self.items).get(&id).cloned()
    }

    pub fn tax_rule(&self, id: Uuid) -> Option<TaxRule> {
        guard(&self.tax_rules).get(&id).cloned()
    }

    pub fn quota(&self, id: Uuid) -> Option<Quota> {
        guard(&self.quotas).get(&id).cloned()
    }

    pub fn voucher(&self, id: Uuid) -> Option<Voucher> {
        guard(&self.vouchers).get(&id).cloned()
    }

    pub fn voucher_by_code(&self, event_id: Uuid, code: &str) -> Option<Voucher> {
        guard(&self.vouchers)
            .values()
            .find(|v| v.event_id == event_id && v.code == code)
            .cloned()
    }

    pub fn seat(&self, id: Uuid) -> Option<Seat> {
        guard(&self.seats).get(&id).cloned()
    }

    pub fn cart_position(&self, id: Uuid) -> Option<CartPosition> {
        guard(&self.carts).get(&id).cloned()
    }

    pub fn order(&self, id: Uuid) -> Option<Order> {
        guard(&self.orders).get(&id).cloned()
    }

    pub fn order_by_code(&self, code: &str) -> Option<Order> {
        guard(&self.orders).values().find(|o| o.code == code).cloned()
    }

    pub fn order_count(&self) -> usize {
        guard(&self.orders).len()
    }

    pub fn cart_count(&self) -> usize {
        guard(&self.carts).len()
    }

    /// All quotas a product counts against. An empty result means the
    /// product is not sellable at all.
    pub fn quotas_for(
        &self,
        event_id: Uuid,
        item_id: Uuid,
        variation_id: Option<Uuid>,
        subevent_id: Option<Uuid>,
    ) -> Vec<Quota> {
        guard(&self.quotas)
            .values()
            .filter(|q| q.event_id == event_id && q.matches(item_id, variation_id, subevent_id))
            .cloned()
            .collect()
    }

    // -- live consumption queries ----------------------------------------

    pub fn quota_consumption(&self, quota: &Quota, now: DateTime<Utc>) -> QuotaConsumption {
        let mut paid = 0;
        let mut pending = 0;
        for order in guard(&self.orders).values() {
            let counts_as = match order.status {
                OrderStatus::Paid => &mut paid,
                OrderStatus::Pending if order.expires > now => &mut pending,
                _ => continue,
            };
            for pos in order.positions.iter().filter(|p| !p.canceled) {
                if quota.matches(pos.item_id, pos.variation_id, pos.subevent_id) {
                    *counts_as += 1;
                }
            }
        }
        let carts = guard(&self.carts)
            .values()
            .filter(|cp| {
                cp.is_live(now) && quota.matches(cp.item_id, cp.variation_id, cp.subevent_id)
            })
            .count() as i64;
        QuotaConsumption {
            paid,
            pending,
            carts,
        }
    }

    /// Live cart reservations currently holding the voucher.
    pub fn voucher_cart_redemptions(&self, voucher_id: Uuid, now: DateTime<Utc>) -> i64 {
        guard(&self.carts)
            .values()
            .filter(|cp| cp.voucher_id == Some(voucher_id) && cp.is_live(now))
            .count() as i64
    }

    /// Cumulative gross discount the voucher has already granted, across
    /// committed order positions and live cart reservations.
    pub fn voucher_budget_used(&self, voucher_id: Uuid, now: DateTime<Utc>) -> Decimal {
        let mut used = Decimal::ZERO;
        for order in guard(&self.orders).values() {
            if order.status == OrderStatus::Canceled {
                continue;
            }
            for pos in order.positions.iter().filter(|p| !p.canceled) {
                if pos.voucher_id == Some(voucher_id) {
                    if let Some(budget_use) = pos.voucher_budget_use {
                        used += budget_use;
                    }
                }
            }
        }
        for cp in guard(&self.carts).values() {
            if cp.voucher_id == Some(voucher_id) && cp.is_live(now) {
                used += cp.budget_use();
            }
        }
        used
    }

    /// Whether the seat is held by a paid order, a live pending order, or a
    /// live cart reservation.
    pub fn seat_taken(&self, seat_id: Uuid, now: DateTime<Utc>) -> bool {
        let in_orders = guard(&self.orders).values().any(|order| {
            let holds = order.status == OrderStatus::Paid || order.is_pending_and_live(now);
            holds
                && order
                    .positions
                    .iter()
                    .any(|p| !p.canceled && p.seat_id == Some(seat_id))
        });
        if in_orders {
            return true;
        }
        guard(&self.carts)
            .values()
            .any(|cp| cp.seat_id == Some(seat_id) && cp.is_live(now))
    }

    /// Order codes are unique per organizer, across all of its events.
    pub fn order_code_exists(&self, organizer_id: Uuid, code: &str) -> bool {
        let events = guard(&self.events);
        guard(&self.orders).values().any(|o| {
            o.code == code
                && events
                    .get(&o.event_id)
                    .is_some_and(|e| e.organizer_id == organizer_id)
        })
    }

    // -- writes -----------------------------------------------------------

    /// Atomic `redeemed = redeemed + n`. Other code paths (admin edits,
    /// expiry sweeps) increment the same counter outside the event lock, so
    /// a read-modify-write in the engine would lose updates.
    pub fn increment_voucher_redeemed(&self, voucher_id: Uuid, by: i64) -> bool {
        let mut vouchers = guard(&self.vouchers);
        match vouchers.get_mut(&voucher_id) {
            Some(v) => {
                v.redeemed += by;
                debug!(voucher = %v.code, redeemed = v.redeemed, "voucher redeemed counter incremented");
                true
            }
            None => false,
        }
    }

    pub fn insert_order(&self, order: Order) {
        guard(&self.orders).insert(order.id, order);
    }

    pub fn remove_cart_positions(&self, ids: &[Uuid]) {
        let mut carts = guard(&self.carts);
        for id in ids {
            carts.remove(id);
        }
    }
}
