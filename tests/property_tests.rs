//! Property-based tests for the codec and the risk math.
//!
//! These verify the laws the rest of the layer leans on under random inputs.

use cdp_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn decimals_strategy() -> impl Strategy<Value = u32> {
    0u32..=12
}

fn units_strategy() -> impl Strategy<Value = BaseUnits> {
    any::<u128>().prop_map(BaseUnits::new)
}

proptest! {
    /// parse(format(x, d), d) == x for all nonnegative x
    #[test]
    fn codec_round_trips(
        x in units_strategy(),
        d in decimals_strategy(),
    ) {
        let formatted = format_amount(x, d);
        let parsed = parse_amount(&formatted, d).unwrap();
        prop_assert_eq!(parsed, x);
    }

    /// comma and dot separators parse identically
    #[test]
    fn separators_are_equivalent(
        whole in 0u64..1_000_000_000,
        frac in 0u32..1_000_000,
    ) {
        let dotted = format!("{whole}.{frac}");
        let commaed = format!("{whole},{frac}");
        prop_assert_eq!(
            parse_amount(&dotted, 9).unwrap(),
            parse_amount(&commaed, 9).unwrap()
        );
    }

    /// digits past the configured precision truncate instead of rounding
    #[test]
    fn excess_digits_truncate(
        x in any::<u64>().prop_map(|v| BaseUnits::new(v as u128)),
        d in 1u32..=12,
        extra in 1u8..=9,
    ) {
        let padded = format!("{}{}", format_amount(x, d), extra);
        prop_assert_eq!(parse_amount(&padded, d).unwrap(), x);
    }

    /// zero debt always yields a zero ratio, whatever the collateral
    #[test]
    fn ratio_zero_debt(c in units_strategy()) {
        prop_assert_eq!(collateral_ratio(c, BaseUnits::ZERO), Decimal::ZERO);
    }

    /// more collateral never lowers the ratio
    #[test]
    fn ratio_monotonic_in_collateral(
        c in 0u64..u64::MAX / 2,
        extra in 0u64..u64::MAX / 2,
        debt in 1u64..u64::MAX,
    ) {
        let base = collateral_ratio(BaseUnits::new(c as u128), BaseUnits::new(debt as u128));
        let more = collateral_ratio(
            BaseUnits::new(c as u128 + extra as u128),
            BaseUnits::new(debt as u128),
        );
        prop_assert!(more >= base);
    }

    /// zero collateral always yields a zero liquidation price
    #[test]
    fn liquidation_price_zero_collateral(
        debt in units_strategy(),
        ratio in 0u32..50_000,
    ) {
        prop_assert_eq!(
            liquidation_price(BaseUnits::ZERO, debt, Bps::new(ratio)),
            Decimal::ZERO
        );
    }

    /// valuing zero base units is always zero, whatever the rate
    #[test]
    fn usd_value_of_zero_is_zero(
        price in (1i64..10_000_000).prop_map(|p| Decimal::new(p, 4)),
        d in 1u32..=12,
    ) {
        prop_assert_eq!(usd_value(BaseUnits::ZERO, price, d), Decimal::ZERO);
    }
}
