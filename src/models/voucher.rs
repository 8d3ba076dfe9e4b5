use crate::models::item::Item;
use crate::utils::money::round_money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherPriceMode {
    /// The voucher grants access but does not change the price.
    #[default]
    None,
    /// The voucher sets the price to a fixed value.
    Set,
    /// The voucher subtracts a fixed value from the listed price.
    Subtract,
    /// The voucher reduces the listed price by a percentage.
    Percent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    pub event_id: Uuid,
    pub code: String,
    pub max_usages: i64,
    /// Persisted redemption counter; only ever mutated through the store's
    /// atomic increment.
    pub redeemed: i64,
    /// Cap on the cumulative gross discount this voucher may grant.
    pub budget: Option<Decimal>,
    pub valid_until: Option<DateTime<Utc>>,
    /// Restricts the voucher to one item (and optionally one variation).
    pub item_id: Option<Uuid>,
    pub variation_id: Option<Uuid>,
    /// Restricts the voucher to one date of an event series.
    pub subevent_id: Option<Uuid>,
    pub price_mode: VoucherPriceMode,
    pub value: Option<Decimal>,
    /// Sell even if the quota is exhausted.
    pub allow_ignore_quota: bool,
    /// The voucher holds back its own unit, so the quota check is skipped.
    pub block_quota: bool,
}

impl Voucher {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|t| t < now)
    }

    pub fn applies_to(&self, item: &Item, variation_id: Option<Uuid>) -> bool {
        match (self.item_id, self.variation_id) {
            (None, None) => true,
            (Some(i), None) => i == item.id,
            (Some(i), Some(v)) => i == item.id && variation_id == Some(v),
            (None, Some(v)) => variation_id == Some(v),
        }
    }

    pub fn bypasses_quota(&self) -> bool {
        self.allow_ignore_quota || self.block_quota
    }

    /// The discounted price for a listed price, before any budget capping.
    pub fn apply(&self, listed: Decimal, places: u32) -> Decimal {
        match self.price_mode {
            VoucherPriceMode::None => listed,
            VoucherPriceMode::Set => self.value.unwrap_or(Decimal::ZERO),
            VoucherPriceMode::Subtract => {
                let value = self.value.unwrap_or(Decimal::ZERO);
                round_money((listed - value).max(Decimal::ZERO), places)
            }
            VoucherPriceMode::Percent => {
                let value = self.value.unwrap_or(Decimal::ZERO);
                let factor = (Decimal::ONE_HUNDRED - value) / Decimal::ONE_HUNDRED;
                round_money(listed * factor, places)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn voucher(price_mode: VoucherPriceMode, value: Option<Decimal>) -> Voucher {
        Voucher {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            code: "GIFT23".into(),
            max_usages: 1,
            redeemed: 0,
            budget: None,
            valid_until: None,
            item_id: None,
            variation_id: None,
            subevent_id: None,
            price_mode,
            value,
            allow_ignore_quota: false,
            block_quota: false,
        }
    }

    #[test]
    fn set_mode_replaces_the_price() {
        let v = voucher(VoucherPriceMode::Set, Some(dec!(12.00)));
        assert_eq!(v.apply(dec!(23.00), 2), dec!(12.00));
    }

    #[test]
    fn subtract_mode_never_goes_negative() {
        let v = voucher(VoucherPriceMode::Subtract, Some(dec!(30.00)));
        assert_eq!(v.apply(dec!(23.00), 2), dec!(0.00));
    }

    #[test]
    fn percent_mode_rounds_half_up() {
        let v = voucher(VoucherPriceMode::Percent, Some(dec!(33)));
        // 23.00 * 0.67 = 15.41
        assert_eq!(v.apply(dec!(23.00), 2), dec!(15.41));
    }

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let mut v = voucher(VoucherPriceMode::None, None);
        v.valid_until = Some(now);
        assert!(!v.is_expired(now));
        v.valid_until = Some(now - chrono::Duration::seconds(1));
        assert!(v.is_expired(now));
    }
}
