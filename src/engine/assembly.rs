//! Order assembly.
//!
//! Validation is front-loaded: the whole request is checked and priced
//! against in-memory ledgers before a single write happens, and problems
//! are collected across all positions so the caller sees everything at
//! once. The commit step then persists the aggregate, increments voucher
//! counters and deletes consumed cart reservations — or, in simulate mode,
//! never runs at all.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use crate::engine::availability::availability;
use crate::engine::codes::generate_order_code;
use crate::engine::error::{OrderError, OrderRuleError, PositionError, ValidationErrors};
use crate::engine::payment::kickoff_payment;
use crate::engine::pricing::{price_for, taxed_from_gross, PriceError, PriceParams};
use crate::engine::vouchers::{check_voucher, VoucherLedger};
use crate::engine::OrderEngine;
use crate::models::order::is_valid_code;
use crate::models::{
    Event, FeeType, InvoiceAddress, Order, OrderFee, OrderPosition, OrderStatus,
};
use crate::utils::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedStatus {
    #[default]
    #[serde(alias = "n")]
    Pending,
    #[serde(alias = "p")]
    Paid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderCreateRequest {
    pub email: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_sales_channel")]
    pub sales_channel: String,
    #[serde(default)]
    pub testmode: bool,
    #[serde(default)]
    pub status: RequestedStatus,
    pub payment_provider: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    /// Caller-chosen order code; one is generated when absent.
    pub code: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    /// Cart reservations to consume into this order.
    #[serde(default)]
    pub consume_carts: Vec<Uuid>,
    pub invoice_address: Option<InvoiceAddress>,
    pub positions: Vec<PositionSpec>,
    #[serde(default)]
    pub fees: Vec<FeeSpec>,
    /// Administrative override: skip quota checks and take explicit prices
    /// as given.
    #[serde(default)]
    pub force: bool,
    /// Dry run: validate and price, persist nothing.
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_true")]
    pub send_email: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionSpec {
    pub item: Uuid,
    pub variation: Option<Uuid>,
    pub subevent: Option<Uuid>,
    pub seat: Option<Uuid>,
    /// Voucher code to redeem for this position.
    pub voucher: Option<String>,
    /// Explicit gross price; the pricing engine only re-derives the tax.
    pub price: Option<Decimal>,
    pub positionid: Option<u32>,
    pub addon_to: Option<u32>,
    pub attendee_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeSpec {
    pub fee_type: FeeType,
    pub description: Option<String>,
    /// Absolute value, or a percentage when `percentage` is set. A payment
    /// fee may omit it and defer to the payment provider's fee schedule.
    pub value: Option<Decimal>,
    #[serde(default)]
    pub percentage: bool,
    #[serde(default)]
    pub split_taxes_like_products: bool,
    pub tax_rule: Option<Uuid>,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_sales_channel() -> String {
    "web".to_string()
}

fn default_true() -> bool {
    true
}

/// A created order is either persisted or a simulate-mode draft; both carry
/// the identical aggregate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "order", rename_all = "snake_case")]
pub enum CreatedOrder {
    Draft(Order),
    Persisted(Order),
}

impl CreatedOrder {
    pub fn order(&self) -> &Order {
        match self {
            CreatedOrder::Draft(order) | CreatedOrder::Persisted(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            CreatedOrder::Draft(order) | CreatedOrder::Persisted(order) => order,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, CreatedOrder::Persisted(_))
    }
}

#[derive(Debug, Serialize)]
pub struct OrderOutcome {
    #[serde(flatten)]
    pub order: CreatedOrder,
    /// Captured for the mail collaborator; the engine never delivers mail.
    pub send_email: bool,
    /// Set when the event settings ask for immediate invoicing.
    pub generate_invoice: bool,
}

/// Draft produced by [`OrderEngine::assemble`], holding everything the
/// commit step needs.
pub(crate) struct Assembly {
    pub(crate) order: Order,
    pub(crate) voucher_usage: Vec<(Uuid, i64)>,
    pub(crate) consumed_cart_ids: Vec<Uuid>,
}

/// Mutable per-request state threaded through the position walk.
struct WalkCtx<'a> {
    event: &'a Event,
    now: DateTime<Utc>,
    places: u32,
    force: bool,
    /// Remaining units per quota; `None` means unlimited.
    quota_ledger: HashMap<Uuid, Option<i64>>,
    voucher_ledger: VoucherLedger,
    /// Seats freed by cart reservations consumed in this same request.
    freed_seats: HashSet<Uuid>,
    /// Seats already claimed by earlier positions of this request.
    used_seats: HashSet<Uuid>,
}

impl OrderEngine {
    pub(crate) fn assemble(
        &self,
        event: &Event,
        req: &OrderCreateRequest,
        now: DateTime<Utc>,
    ) -> Result<Assembly, OrderError> {
        let store = self.store();
        let places = event.currency_places;
        let mut errors = ValidationErrors::default();

        if req.positions.is_empty() {
            errors.order_rule(OrderRuleError::EmptyPositions);
        }
        if !event.channel_enabled(&req.sales_channel) {
            errors.order_rule(OrderRuleError::UnknownSalesChannel {
                channel: req.sales_channel.clone(),
            });
        }
        if req.testmode && !event.testmode {
            errors.order_rule(OrderRuleError::TestmodeUnavailable);
        }
        if let Some(provider_id) = &req.payment_provider {
            match self.providers().get(provider_id) {
                Some(provider) if provider.is_enabled(event) => {}
                _ => errors.order_rule(OrderRuleError::UnknownPaymentProvider {
                    provider: provider_id.clone(),
                }),
            }
        }
        if let Some(code) = &req.code {
            if !is_valid_code(code) {
                errors.order_rule(OrderRuleError::InvalidCode);
            } else if store.order_code_exists(event.organizer_id, code) {
                errors.order_rule(OrderRuleError::CodeTaken);
            }
        }

        // Positionids are all-or-none and, when given, match the
        // transmission order exactly.
        let position_count = req.positions.len();
        let explicit_ids = req
            .positions
            .iter()
            .filter(|p| p.positionid.is_some())
            .count();
        if explicit_ids != 0 && explicit_ids != position_count {
            errors.order_rule(OrderRuleError::MixedPositionIds);
        } else if explicit_ids == position_count && position_count > 0 {
            let consecutive = req
                .positions
                .iter()
                .enumerate()
                .all(|(i, p)| p.positionid == Some(i as u32 + 1));
            if !consecutive {
                errors.order_rule(OrderRuleError::NonConsecutivePositionIds);
            }
        }

        // Add-ons reference an earlier non-add-on position and follow it
        // directly (sibling add-ons in between are fine).
        for (idx, spec) in req.positions.iter().enumerate() {
            let Some(parent) = spec.addon_to else {
                continue;
            };
            if parent == 0 || parent as usize > position_count || parent as usize - 1 >= idx {
                errors.position(idx, PositionError::AddonUnknownParent);
                continue;
            }
            let parent_idx = parent as usize - 1;
            if req.positions[parent_idx].addon_to.is_some() {
                errors.position(idx, PositionError::AddonNested);
                continue;
            }
            let nearest_parent = req.positions[..idx]
                .iter()
                .rposition(|p| p.addon_to.is_none());
            if nearest_parent != Some(parent_idx) {
                errors.position(idx, PositionError::AddonOutOfOrder);
            }
        }

        // Resolve the cart reservations this order consumes.
        let mut consumed: Vec<_> = Vec::new();
        for cart_id in &req.consume_carts {
            match store.cart_position(*cart_id) {
                None => errors.order_rule(OrderRuleError::UnknownCart { id: *cart_id }),
                Some(cart) if cart.event_id != event.id => {
                    errors.order_rule(OrderRuleError::CartWrongEvent { id: *cart_id });
                }
                Some(cart) => consumed.push(cart),
            }
        }

        let mut ctx = WalkCtx {
            event,
            now,
            places,
            force: req.force,
            quota_ledger: HashMap::new(),
            voucher_ledger: VoucherLedger::new(),
            freed_seats: HashSet::new(),
            used_seats: HashSet::new(),
        };

        // Credit back everything the consumed carts were holding, so the
        // new positions can legitimately reuse that capacity.
        for cart in &consumed {
            if !cart.is_live(now) {
                continue;
            }
            for quota in
                store.quotas_for(event.id, cart.item_id, cart.variation_id, cart.subevent_id)
            {
                let entry = ctx
                    .quota_ledger
                    .entry(quota.id)
                    .or_insert_with(|| availability(store, &quota, now).remaining);
                if let Some(remaining) = entry {
                    *remaining += 1;
                }
            }
            if let Some(seat) = cart.seat_id {
                ctx.freed_seats.insert(seat);
            }
            ctx.voucher_ledger.credit_cart(store, cart, now);
        }

        let mut positions = Vec::with_capacity(position_count);
        for (idx, spec) in req.positions.iter().enumerate() {
            let positionid = idx as u32 + 1;
            match self.position_from_spec(&mut ctx, spec, positionid) {
                Ok(position) => positions.push(position),
                Err(error) => errors.position(idx, error),
            }
        }

        errors.into_result()?;

        let code = match &req.code {
            Some(code) => code.clone(),
            None => generate_order_code(store, event.organizer_id),
        };
        let total: Decimal = positions.iter().map(|p| p.price).sum();
        let mut order = Order {
            id: Uuid::new_v4(),
            code,
            event_id: event.id,
            status: OrderStatus::Pending,
            testmode: req.testmode,
            email: req.email.clone(),
            locale: req.locale.clone(),
            sales_channel: req.sales_channel.clone(),
            datetime: now,
            expires: req
                .expires
                .unwrap_or_else(|| now + chrono::Duration::days(event.payment_term_days)),
            total,
            invoice_address: req.invoice_address.clone(),
            positions,
            fees: Vec::new(),
            payments: Vec::new(),
        };

        let mut fee_errors = ValidationErrors::default();
        for (idx, spec) in req.fees.iter().enumerate() {
            match self.resolve_fee(&order, spec, idx, req, places) {
                Ok(mut lines) => order.fees.append(&mut lines),
                Err(error) => fee_errors.order_rule(error),
            }
        }
        fee_errors.into_result()?;
        order.total = order.position_total() + order.fee_total();

        kickoff_payment(
            &mut order,
            req.status,
            req.payment_provider.as_deref(),
            req.payment_date,
            now,
        )
        .map_err(|e| OrderError::Validation(ValidationErrors::of_order(e)))?;

        Ok(Assembly {
            order,
            voucher_usage: ctx.voucher_ledger.usage_deltas(),
            consumed_cart_ids: consumed.iter().map(|c| c.id).collect(),
        })
    }

    fn position_from_spec(
        &self,
        ctx: &mut WalkCtx<'_>,
        spec: &PositionSpec,
        positionid: u32,
    ) -> Result<OrderPosition, PositionError> {
        let store = self.store();

        let item = store
            .item(spec.item)
            .filter(|i| i.event_id == ctx.event.id && i.active)
            .ok_or(PositionError::UnknownItem)?;

        let variation = match (item.has_variations(), spec.variation) {
            (true, None) => return Err(PositionError::VariationRequired),
            (true, Some(variation_id)) => Some(
                item.variation(variation_id)
                    .filter(|v| v.active)
                    .ok_or(PositionError::UnknownVariation)?
                    .clone(),
            ),
            (false, Some(_)) => return Err(PositionError::UnknownVariation),
            (false, None) => None,
        };

        let subevent = if ctx.event.has_subevents {
            let Some(subevent_id) = spec.subevent else {
                return Err(PositionError::SubeventRequired);
            };
            let subevent = store
                .subevent(subevent_id)
                .filter(|s| s.event_id == ctx.event.id && s.active)
                .ok_or(PositionError::UnknownSubevent)?;
            if subevent.item_disabled(item.id, spec.variation) {
                return Err(PositionError::ItemDisabledForSubevent);
            }
            Some(subevent)
        } else {
            if spec.subevent.is_some() {
                return Err(PositionError::UnknownSubevent);
            }
            None
        };

        let is_addon = spec.addon_to.is_some();
        let voucher = match &spec.voucher {
            Some(code) => {
                let voucher = store
                    .voucher_by_code(ctx.event.id, code)
                    .ok_or(PositionError::UnknownVoucher)?;
                check_voucher(
                    &voucher,
                    &item,
                    spec.variation,
                    spec.subevent,
                    is_addon,
                    ctx.now,
                )?;
                Some(voucher)
            }
            None => None,
        };

        let seat_id = if item.requires_seat {
            let Some(seat_id) = spec.seat else {
                return Err(PositionError::SeatRequired);
            };
            let seat = store
                .seat(seat_id)
                .filter(|s| s.event_id == ctx.event.id)
                .ok_or(PositionError::UnknownSeat)?;
            if seat.subevent_id != spec.subevent {
                return Err(PositionError::UnknownSeat);
            }
            if seat.blocked {
                return Err(PositionError::SeatUnavailable);
            }
            if !ctx.used_seats.insert(seat_id) {
                return Err(PositionError::SeatDuplicate);
            }
            if store.seat_taken(seat_id, ctx.now) && !ctx.freed_seats.contains(&seat_id) {
                return Err(PositionError::SeatUnavailable);
            }
            Some(seat_id)
        } else {
            if spec.seat.is_some() {
                return Err(PositionError::SeatNotAllowed);
            }
            None
        };

        // A product outside every quota is never sellable, no matter what.
        let quotas = store.quotas_for(ctx.event.id, item.id, spec.variation, spec.subevent);
        if quotas.is_empty() {
            return Err(PositionError::NotAssignedToQuota);
        }
        let bypass_quota =
            ctx.force || voucher.as_ref().is_some_and(|v| v.bypasses_quota());
        if !bypass_quota {
            // All-or-nothing: only draw units once every quota has one left,
            // so a failed position does not eat into its sibling quotas.
            for quota in &quotas {
                let entry = ctx
                    .quota_ledger
                    .entry(quota.id)
                    .or_insert_with(|| availability(store, quota, ctx.now).remaining);
                if let Some(remaining) = entry {
                    if *remaining <= 0 {
                        return Err(PositionError::QuotaExceeded {
                            name: quota.name.clone(),
                        });
                    }
                }
            }
            for quota in &quotas {
                if let Some(Some(remaining)) = ctx.quota_ledger.get_mut(&quota.id) {
                    *remaining -= 1;
                }
            }
        }

        if let Some(voucher) = &voucher {
            ctx.voucher_ledger.redeem(store, voucher, ctx.now)?;
        }

        let tax_rule = match item.tax_rule_id {
            Some(rule_id) => {
                let rule = store.tax_rule(rule_id);
                if rule.is_none() {
                    warn!(item = %item.name, %rule_id, "tax rule missing, pricing untaxed");
                }
                rule
            }
            None => None,
        };

        let remaining_budget = match &voucher {
            Some(v) => ctx.voucher_ledger.remaining_budget(store, v, ctx.now),
            None => None,
        };
        let computation = price_for(PriceParams {
            item: &item,
            variation: variation.as_ref(),
            subevent: subevent.as_ref(),
            voucher: voucher.as_ref(),
            custom_price: spec.price,
            force_custom_price: ctx.force,
            tax_rule: tax_rule.as_ref(),
            remaining_budget,
            places: ctx.places,
        })
        .map_err(|error| match error {
            PriceError::BudgetExceeded => PositionError::VoucherBudgetExceeded,
            PriceError::NegativePrice => PositionError::NegativePrice,
        })?;

        let budget_use = voucher
            .as_ref()
            .and_then(|v| v.budget.map(|_| computation.voucher_discount));
        if let (Some(voucher), Some(used)) = (&voucher, budget_use) {
            ctx.voucher_ledger.consume_budget(voucher.id, used);
        }

        Ok(OrderPosition {
            id: Uuid::new_v4(),
            positionid,
            item_id: item.id,
            variation_id: spec.variation,
            subevent_id: spec.subevent,
            price: computation.price.gross,
            tax_rate: computation.price.rate,
            tax_value: computation.price.tax,
            tax_rule_id: tax_rule.map(|r| r.id),
            voucher_id: voucher.as_ref().map(|v| v.id),
            voucher_budget_use: budget_use,
            seat_id,
            addon_to: spec.addon_to,
            attendee_name: spec.attendee_name.clone(),
            canceled: false,
        })
    }

    fn resolve_fee(
        &self,
        order: &Order,
        spec: &FeeSpec,
        index: usize,
        req: &OrderCreateRequest,
        places: u32,
    ) -> Result<Vec<OrderFee>, OrderRuleError> {
        let subtotal = order.position_total();
        let base_value = match spec.value {
            Some(value) => value,
            None => {
                // Payment fees may defer to the provider's fee schedule.
                let provider = req
                    .payment_provider
                    .as_deref()
                    .and_then(|id| self.providers().get(id));
                match (spec.fee_type, provider) {
                    (FeeType::Payment, Some(provider)) => provider.calculate_fee(subtotal, places),
                    _ => return Err(OrderRuleError::MissingFeeValue { index }),
                }
            }
        };
        let value = if spec.percentage {
            round_money(subtotal * base_value / Decimal::ONE_HUNDRED, places)
        } else {
            round_money(base_value, places)
        };
        let description = spec.description.clone().unwrap_or_default();

        if spec.split_taxes_like_products {
            let lines =
                split_fee_like_products(spec.fee_type, &description, value, &order.positions, places);
            if !lines.is_empty() {
                return Ok(lines);
            }
            // No taxed net to split over (all-free order); fall back to the
            // fee's own tax rule.
        }

        let tax_rule = match spec.tax_rule {
            Some(rule_id) => Some(
                self.store()
                    .tax_rule(rule_id)
                    .ok_or(OrderRuleError::UnknownFeeTaxRule { index })?,
            ),
            None => None,
        };
        let taxed = taxed_from_gross(tax_rule.as_ref(), value, places);
        Ok(vec![OrderFee {
            id: Uuid::new_v4(),
            fee_type: spec.fee_type,
            description,
            value: taxed.gross,
            tax_rate: taxed.rate,
            tax_value: taxed.tax,
            tax_rule_id: tax_rule.map(|r| r.id),
            canceled: false,
        }])
    }

    pub(crate) fn commit(&self, assembly: &Assembly) -> Result<(), OrderError> {
        for (voucher_id, delta) in &assembly.voucher_usage {
            if *delta > 0 && !self.store().increment_voucher_redeemed(*voucher_id, *delta) {
                return Err(OrderError::Internal(format!(
                    "voucher {voucher_id} vanished during commit"
                )));
            }
        }
        self.store().insert_order(assembly.order.clone());
        self.store().remove_cart_positions(&assembly.consumed_cart_ids);
        Ok(())
    }
}

/// Distributes a fee across the distinct tax rates of the order's
/// positions, proportionally to each rate's share of the net product
/// subtotal. The rounding remainder goes to the lowest rate, so any
/// residual favors the tax authority rather than the buyer.
fn split_fee_like_products(
    fee_type: FeeType,
    description: &str,
    value: Decimal,
    positions: &[OrderPosition],
    places: u32,
) -> Vec<OrderFee> {
    let mut brackets: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for position in positions.iter().filter(|p| !p.canceled) {
        *brackets.entry(position.tax_rate).or_insert(Decimal::ZERO) +=
            position.price - position.tax_value;
    }
    let total_net: Decimal = brackets.values().copied().sum();
    if total_net.is_zero() {
        return Vec::new();
    }

    let mut lines: Vec<OrderFee> = Vec::new();
    let mut allocated = Decimal::ZERO;
    for (rate, net) in &brackets {
        let share = round_money(value * net / total_net, places);
        allocated += share;
        lines.push(fee_line(fee_type, description, share, *rate, places));
    }
    let remainder = value - allocated;
    if !remainder.is_zero() {
        // BTreeMap iterates rates in ascending order, so the first line is
        // the lowest bracket.
        let lowest = lines[0].value + remainder;
        lines[0] = fee_line(fee_type, description, lowest, lines[0].tax_rate, places);
    }
    lines
}

fn fee_line(
    fee_type: FeeType,
    description: &str,
    gross: Decimal,
    rate: Decimal,
    places: u32,
) -> OrderFee {
    let tax = if rate.is_zero() {
        Decimal::ZERO
    } else {
        round_money(gross * rate / (Decimal::ONE_HUNDRED + rate), places)
    };
    OrderFee {
        id: Uuid::new_v4(),
        fee_type,
        description: description.to_string(),
        value: gross,
        tax_rate: rate,
        tax_value: tax,
        tax_rule_id: None,
        canceled: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(price: Decimal, tax_rate: Decimal, tax_value: Decimal) -> OrderPosition {
        OrderPosition {
            id: Uuid::new_v4(),
            positionid: 1,
            item_id: Uuid::new_v4(),
            variation_id: None,
            subevent_id: None,
            price,
            tax_rate,
            tax_value,
            tax_rule_id: None,
            voucher_id: None,
            voucher_budget_use: None,
            seat_id: None,
            addon_to: None,
            attendee_name: None,
            canceled: false,
        }
    }

    #[test]
    fn fee_split_is_proportional_to_net_subtotals() {
        // 100.00 gross at 19 % incl. (net 84.03) and 50.00 gross at 7 %
        // incl. (net 46.73).
        let positions = vec![
            position(dec!(100.00), dec!(19), dec!(15.97)),
            position(dec!(50.00), dec!(7), dec!(3.27)),
        ];
        let lines =
            split_fee_like_products(FeeType::Payment, "Payment fee", dec!(15.00), &positions, 2);
        assert_eq!(lines.len(), 2);
        // Ascending by rate: 7 % first.
        assert_eq!(lines[0].tax_rate, dec!(7));
        assert_eq!(lines[0].value, dec!(5.36));
        assert_eq!(lines[1].tax_rate, dec!(19));
        assert_eq!(lines[1].value, dec!(9.64));
        assert_eq!(lines[0].value + lines[1].value, dec!(15.00));
    }

    #[test]
    fn fee_split_remainder_lands_on_the_lowest_rate() {
        // Equal nets of 10.00 in both brackets; 0.05 splits into two 0.03
        // halves after half-up rounding, so the lower bracket absorbs -0.01.
        let positions = vec![
            position(dec!(11.90), dec!(19), dec!(1.90)),
            position(dec!(10.70), dec!(7), dec!(0.70)),
        ];
        let lines = split_fee_like_products(FeeType::Service, "", dec!(0.05), &positions, 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tax_rate, dec!(7));
        assert_eq!(lines[0].value, dec!(0.02));
        assert_eq!(lines[1].tax_rate, dec!(19));
        assert_eq!(lines[1].value, dec!(0.03));
    }

    #[test]
    fn fee_split_groups_positions_by_exact_rate() {
        let positions = vec![
            position(dec!(11.90), dec!(19), dec!(1.90)),
            position(dec!(11.90), dec!(19), dec!(1.90)),
        ];
        let lines = split_fee_like_products(FeeType::Service, "", dec!(1.00), &positions, 2);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].value, dec!(1.00));
        assert_eq!(lines[0].tax_rate, dec!(19));
    }

    #[test]
    fn fee_split_over_free_positions_yields_nothing() {
        let positions = vec![position(dec!(0.00), Decimal::ZERO, Decimal::ZERO)];
        let lines = split_fee_like_products(FeeType::Service, "", dec!(1.00), &positions, 2);
        assert!(lines.is_empty());
    }
}
