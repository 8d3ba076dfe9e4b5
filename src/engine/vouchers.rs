//! Per-request voucher accounting.
//!
//! One ledger lives for the span of a single create-order request. It
//! tracks the signed redemption delta the request applies to each voucher
//! (carts being consumed contribute -1, new positions +1) and the remaining
//! discount budget, lazily initialised from the persisted state the first
//! time a voucher is touched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::engine::error::PositionError;
use crate::models::{CartPosition, Item, Voucher};
use crate::store::EventStore;

/// Static per-position voucher checks: product match, subevent scope,
/// expiry, and the rule that add-ons never redeem vouchers.
pub fn check_voucher(
    voucher: &Voucher,
    item: &Item,
    variation_id: Option<Uuid>,
    subevent_id: Option<Uuid>,
    is_addon: bool,
    now: DateTime<Utc>,
) -> Result<(), PositionError> {
    if is_addon {
        return Err(PositionError::VoucherOnAddon);
    }
    if !voucher.applies_to(item, variation_id) {
        return Err(PositionError::VoucherWrongProduct);
    }
    if let Some(scope) = voucher.subevent_id {
        if subevent_id != Some(scope) {
            return Err(PositionError::VoucherWrongSubevent);
        }
    }
    if voucher.is_expired(now) {
        return Err(PositionError::VoucherExpired);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct VoucherLedger {
    usage: HashMap<Uuid, i64>,
    budget: HashMap<Uuid, Decimal>,
}

impl VoucherLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits back what a consumed cart reservation held, so the new
    /// order's positions can legitimately reuse it. Expired carts held
    /// nothing.
    pub fn credit_cart(&mut self, store: &EventStore, cart: &CartPosition, now: DateTime<Utc>) {
        let Some(voucher_id) = cart.voucher_id else {
            return;
        };
        if !cart.is_live(now) {
            return;
        }
        *self.usage.entry(voucher_id).or_insert(0) -= 1;
        if let Some(voucher) = store.voucher(voucher_id) {
            if voucher.budget.is_some() {
                self.ensure_budget(store, &voucher, now);
                if let Some(remaining) = self.budget.get_mut(&voucher_id) {
                    *remaining += cart.budget_use();
                }
            }
        }
    }

    fn ensure_budget(&mut self, store: &EventStore, voucher: &Voucher, now: DateTime<Utc>) {
        if let Some(budget) = voucher.budget {
            self.budget.entry(voucher.id).or_insert_with(|| {
                (budget - store.voucher_budget_used(voucher.id, now)).max(Decimal::ZERO)
            });
        }
    }

    /// Remaining discount budget, or `None` for vouchers without a budget.
    pub fn remaining_budget(
        &mut self,
        store: &EventStore,
        voucher: &Voucher,
        now: DateTime<Utc>,
    ) -> Option<Decimal> {
        voucher.budget?;
        self.ensure_budget(store, voucher, now);
        self.budget.get(&voucher.id).copied()
    }

    /// Claims one redemption for this request, counting the persisted
    /// counter, live cart reservations and the request's own delta.
    pub fn redeem(
        &mut self,
        store: &EventStore,
        voucher: &Voucher,
        now: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        let delta = self.usage.get(&voucher.id).copied().unwrap_or(0);
        let in_carts = store.voucher_cart_redemptions(voucher.id, now);
        if voucher.redeemed + in_carts + delta + 1 > voucher.max_usages {
            return Err(PositionError::VoucherExhausted);
        }
        *self.usage.entry(voucher.id).or_insert(0) += 1;
        Ok(())
    }

    pub fn consume_budget(&mut self, voucher_id: Uuid, amount: Decimal) {
        if let Some(remaining) = self.budget.get_mut(&voucher_id) {
            *remaining = (*remaining - amount).max(Decimal::ZERO);
        }
    }

    /// Signed redemption deltas this request applies, for the commit step.
    pub fn usage_deltas(&self) -> Vec<(Uuid, i64)> {
        self.usage.iter().map(|(id, delta)| (*id, *delta)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VoucherPriceMode;
    use rust_decimal_macros::dec;

    fn voucher(max_usages: i64, redeemed: i64, budget: Option<Decimal>) -> Voucher {
        Voucher {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            code: "GIFT23".into(),
            max_usages,
            redeemed,
            budget,
            valid_until: None,
            item_id: None,
            variation_id: None,
            subevent_id: None,
            price_mode: VoucherPriceMode::Subtract,
            value: Some(dec!(10.00)),
            allow_ignore_quota: false,
            block_quota: false,
        }
    }

    fn cart_with_voucher(voucher: &Voucher, live: bool) -> CartPosition {
        let now = Utc::now();
        CartPosition {
            id: Uuid::new_v4(),
            event_id: voucher.event_id,
            item_id: Uuid::new_v4(),
            variation_id: None,
            subevent_id: None,
            voucher_id: Some(voucher.id),
            seat_id: None,
            price: dec!(13.00),
            listed_price: Some(dec!(23.00)),
            price_after_voucher: Some(dec!(13.00)),
            expires: if live {
                now + chrono::Duration::minutes(30)
            } else {
                now - chrono::Duration::minutes(1)
            },
        }
    }

    #[test]
    fn redemption_counts_persisted_and_request_usage() {
        let store = EventStore::new();
        let v = voucher(2, 1, None);
        store.insert_voucher(v.clone());
        let mut ledger = VoucherLedger::new();
        let now = Utc::now();

        assert!(ledger.redeem(&store, &v, now).is_ok());
        assert_eq!(
            ledger.redeem(&store, &v, now),
            Err(PositionError::VoucherExhausted)
        );
    }

    #[test]
    fn live_carts_count_toward_the_usage_cap() {
        let store = EventStore::new();
        let v = voucher(1, 0, None);
        store.insert_voucher(v.clone());
        store.insert_cart_position(cart_with_voucher(&v, true));
        let mut ledger = VoucherLedger::new();
        let now = Utc::now();

        assert_eq!(
            ledger.redeem(&store, &v, now),
            Err(PositionError::VoucherExhausted)
        );
    }

    #[test]
    fn consuming_a_cart_transfers_its_redemption() {
        let store = EventStore::new();
        let v = voucher(1, 0, None);
        store.insert_voucher(v.clone());
        let cart = cart_with_voucher(&v, true);
        store.insert_cart_position(cart.clone());
        let mut ledger = VoucherLedger::new();
        let now = Utc::now();

        ledger.credit_cart(&store, &cart, now);
        assert!(ledger.redeem(&store, &v, now).is_ok());
        // Net delta is zero, nothing to persist at commit time.
        assert_eq!(ledger.usage_deltas(), vec![(v.id, 0)]);
    }

    #[test]
    fn budget_initialises_from_the_store_and_credits_consumed_carts() {
        let store = EventStore::new();
        let v = voucher(10, 0, Some(dec!(25.00)));
        store.insert_voucher(v.clone());
        let cart = cart_with_voucher(&v, true);
        store.insert_cart_position(cart.clone());
        let mut ledger = VoucherLedger::new();
        let now = Utc::now();

        // The live cart uses 10.00 of the budget...
        let mut fresh = VoucherLedger::new();
        assert_eq!(fresh.remaining_budget(&store, &v, now), Some(dec!(15.00)));

        // ...which comes back once the cart is being consumed.
        ledger.credit_cart(&store, &cart, now);
        assert_eq!(ledger.remaining_budget(&store, &v, now), Some(dec!(25.00)));
    }

    #[test]
    fn consumed_budget_never_goes_negative() {
        let store = EventStore::new();
        let v = voucher(10, 0, Some(dec!(5.00)));
        store.insert_voucher(v.clone());
        let mut ledger = VoucherLedger::new();
        let now = Utc::now();

        assert_eq!(ledger.remaining_budget(&store, &v, now), Some(dec!(5.00)));
        ledger.consume_budget(v.id, dec!(5.00));
        assert_eq!(ledger.remaining_budget(&store, &v, now), Some(dec!(0.00)));
        ledger.consume_budget(v.id, dec!(1.00));
        assert_eq!(ledger.remaining_budget(&store, &v, now), Some(dec!(0.00)));
    }

    #[test]
    fn addons_never_redeem_vouchers() {
        let v = voucher(10, 0, None);
        let item = Item {
            id: Uuid::new_v4(),
            event_id: v.event_id,
            name: "Workshop".into(),
            default_price: dec!(5.00),
            free_price: false,
            active: true,
            requires_seat: false,
            tax_rule_id: None,
            variations: vec![],
        };
        assert_eq!(
            check_voucher(&v, &item, None, None, true, Utc::now()),
            Err(PositionError::VoucherOnAddon)
        );
    }
}
