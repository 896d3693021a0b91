// 3.0: collateral risk metrics. pure functions, no I/O, explicit zero handling.
// everything here is informational: it depends on an oracle price that can itself be
// stale, so nothing computed in this module is ever written back to the ledger.

use crate::types::{BaseUnits, Bps};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// 3.1: collateral value over debt as a one-decimal percentage. the numerator is kept
// in integer permille before the final scale-down so the tenths digit is exact.
pub fn collateral_ratio(collateral_value: BaseUnits, debt: BaseUnits) -> Decimal {
    if debt.is_zero() {
        return Decimal::ZERO;
    }

    let permille = collateral_value.value().saturating_mul(1000) / debt.value();
    BaseUnits::new(permille).to_decimal() / dec!(10)
}

// 3.2: collateral unit price at which the position crosses its liquidation threshold.
// debt and collateral share the same base-unit precision, so the scales cancel and
// only the bps denominator remains.
pub fn liquidation_price(collateral: BaseUnits, debt: BaseUnits, liquidation_ratio: Bps) -> Decimal {
    if collateral.is_zero() {
        return Decimal::ZERO;
    }

    debt.to_decimal() * Decimal::from(liquidation_ratio.value()) / (collateral.to_decimal() * dec!(10_000))
}

// 3.3: USD valuation of a base-unit amount. the unit price comes from whichever
// series the caller is valuing: peg-denominated debt uses the peg→USD rate,
// collateral uses the collateral→USD rate. the two are sourced independently.
pub fn usd_value(amount: BaseUnits, unit_price_usd: Decimal, decimals: u32) -> Decimal {
    amount.to_decimal() * Decimal::new(1, decimals) * unit_price_usd
}
