use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds a monetary value to the currency's number of decimal places,
/// half-up (midpoints away from zero).
pub fn round_money(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_money(dec!(2.345), 2), dec!(2.35));
        assert_eq!(round_money(dec!(2.344), 2), dec!(2.34));
        assert_eq!(round_money(dec!(2.5), 0), dec!(3));
    }

    #[test]
    fn rounds_away_from_zero_for_negative_values() {
        assert_eq!(round_money(dec!(-2.345), 2), dec!(-2.35));
    }

    #[test]
    fn keeps_exact_values_untouched() {
        assert_eq!(round_money(dec!(19.00), 2), dec!(19.00));
    }
}
