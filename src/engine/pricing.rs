//! Pricing.
//!
//! Pure computation: no store access, no side effects, so the same code
//! path serves real order creation and simulate previews without any risk
//! of double-counting voucher usage.
//!
//! Adjustments (date overrides, custom prices, voucher discounts) happen in
//! "listed space" — gross for tax-inclusive rules, net otherwise. Budget
//! arithmetic happens on gross values, and a budget-capped price is derived
//! back from its gross.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Item, ItemVariation, SubEvent, TaxRule, Voucher};
use crate::utils::money::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaxedPrice {
    pub gross: Decimal,
    pub net: Decimal,
    pub tax: Decimal,
    pub rate: Decimal,
}

impl TaxedPrice {
    pub fn free() -> Self {
        Self {
            gross: Decimal::ZERO,
            net: Decimal::ZERO,
            tax: Decimal::ZERO,
            rate: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PriceError {
    /// The requested discount no longer fits into the voucher's remaining
    /// budget and the caller pinned the price, so it cannot be adjusted up.
    #[error("voucher discount budget is used up")]
    BudgetExceeded,
    #[error("price must not be negative")]
    NegativePrice,
}

/// Base price resolution: the variation's own price wins, then the
/// date-specific override, then the item default.
pub fn listed_price(
    item: &Item,
    variation: Option<&ItemVariation>,
    subevent: Option<&SubEvent>,
) -> Decimal {
    if let Some(var) = variation {
        if let Some(price) = var.default_price {
            return price;
        }
        if let Some(se) = subevent {
            if let Some(price) = se.variation_price_overrides.get(&var.id) {
                return *price;
            }
        }
    } else if let Some(se) = subevent {
        if let Some(price) = se.item_price_overrides.get(&item.id) {
            return *price;
        }
    }
    item.default_price
}

/// Splits a gross value into net and tax. For rules that add tax on top,
/// use [`taxed_from_listed`] on the listed (net) value instead.
pub fn taxed_from_gross(rule: Option<&TaxRule>, gross: Decimal, places: u32) -> TaxedPrice {
    match rule {
        Some(r) if !r.rate.is_zero() => {
            let tax = round_money(gross * r.rate / (Decimal::ONE_HUNDRED + r.rate), places);
            TaxedPrice {
                gross,
                net: gross - tax,
                tax,
                rate: r.rate,
            }
        }
        _ => TaxedPrice {
            gross,
            net: gross,
            tax: Decimal::ZERO,
            rate: Decimal::ZERO,
        },
    }
}

/// Derives the final price from a value in listed space: the value already
/// is the gross for tax-inclusive rules, otherwise the tax is added on top.
pub fn taxed_from_listed(rule: Option<&TaxRule>, listed: Decimal, places: u32) -> TaxedPrice {
    match rule {
        Some(r) if !r.price_includes_tax && !r.rate.is_zero() => {
            let gross = round_money(
                listed * (Decimal::ONE_HUNDRED + r.rate) / Decimal::ONE_HUNDRED,
                places,
            );
            TaxedPrice {
                gross,
                net: listed,
                tax: gross - listed,
                rate: r.rate,
            }
        }
        _ => taxed_from_gross(rule, listed, places),
    }
}

pub struct PriceParams<'a> {
    pub item: &'a Item,
    pub variation: Option<&'a ItemVariation>,
    pub subevent: Option<&'a SubEvent>,
    pub voucher: Option<&'a Voucher>,
    /// Explicit price from the request, in gross terms.
    pub custom_price: Option<Decimal>,
    /// Administrative override: take the custom price as-is, without the
    /// free-price floor.
    pub force_custom_price: bool,
    pub tax_rule: Option<&'a TaxRule>,
    /// Remaining discount budget of the voucher; `None` when uncapped.
    pub remaining_budget: Option<Decimal>,
    pub places: u32,
}

pub struct PriceComputation {
    pub price: TaxedPrice,
    /// The resolved listed price, before custom prices and vouchers.
    pub listed: Decimal,
    /// Gross reduction granted by the voucher, already capped to the
    /// remaining budget.
    pub voucher_discount: Decimal,
}

pub fn price_for(p: PriceParams<'_>) -> Result<PriceComputation, PriceError> {
    let listed = listed_price(p.item, p.variation, p.subevent);
    let gross_listed = taxed_from_listed(p.tax_rule, listed, p.places).gross;

    // Price the voucher would grant, ignoring the budget for now.
    let gross_after_voucher = match p.voucher {
        Some(v) => taxed_from_listed(p.tax_rule, v.apply(listed, p.places), p.places).gross,
        None => gross_listed,
    };

    let (final_gross, voucher_discount) = if let Some(custom) = p.custom_price {
        if custom < Decimal::ZERO {
            return Err(PriceError::NegativePrice);
        }
        let custom = round_money(custom, p.places);
        let gross = if !p.force_custom_price && p.item.free_price {
            // Free-price items let buyers pay more, never less.
            custom.max(gross_after_voucher)
        } else {
            custom
        };
        let discount = (gross_listed - gross).max(Decimal::ZERO);
        if let Some(remaining) = p.remaining_budget {
            // A pinned price cannot be adjusted up to fit the budget.
            if discount > remaining {
                return Err(PriceError::BudgetExceeded);
            }
        }
        (gross, discount)
    } else {
        let discount = (gross_listed - gross_after_voucher).max(Decimal::ZERO);
        match p.remaining_budget {
            Some(remaining) if discount > remaining => (gross_listed - remaining, remaining),
            _ => (gross_after_voucher, discount),
        }
    };

    Ok(PriceComputation {
        price: taxed_from_gross(p.tax_rule, final_gross, p.places),
        listed,
        voucher_discount,
    })
}
