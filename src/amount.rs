// 2.0: fixed-point amount codec. decimal strings in, integer base units out, and back.
// the only place in the crate where human input is turned into wire amounts, so the
// rules are strict: truncate, never round; checked math, never wrap.

use crate::types::BaseUnits;

// 2.1: protocol-wide fixed decimal precision for base-unit amounts.
pub const AMOUNT_DECIMALS: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("invalid amount {input:?}")]
    InvalidAmount { input: String },

    #[error("amount {input:?} exceeds representable range")]
    AmountOverflow { input: String },
}

fn pow10(decimals: u32) -> Option<u128> {
    10u128.checked_pow(decimals)
}

// 2.2: parse a decimal string into base units. accepts '.' or ',' as the separator,
// treats a missing integer part as zero, and truncates excess fractional digits.
pub fn parse_amount(input: &str, decimals: u32) -> Result<BaseUnits, AmountError> {
    let invalid = || AmountError::InvalidAmount {
        input: input.to_string(),
    };
    let overflow = || AmountError::AmountOverflow {
        input: input.to_string(),
    };

    let normalized = input.trim().replace(',', ".");
    let mut parts = normalized.splitn(3, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return Err(invalid());
    }

    if !int_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let scale = pow10(decimals).ok_or_else(overflow)?;

    // digits were validated above, so a failed parse can only mean overflow
    let int_units: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| overflow())?
    };

    // right-pad with zeros, then truncate to the configured precision
    let mut frac_digits: String = frac_part.chars().take(decimals as usize).collect();
    while (frac_digits.len() as u32) < decimals {
        frac_digits.push('0');
    }
    let frac_units: u128 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse().map_err(|_| overflow())?
    };

    int_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .map(BaseUnits::new)
        .ok_or_else(overflow)
}

// 2.3: format base units as a decimal string. the fraction is left-padded to the full
// precision so that parse(format(x)) is the identity.
pub fn format_amount(amount: BaseUnits, decimals: u32) -> String {
    let scale = match pow10(decimals) {
        Some(s) => s,
        None => return amount.value().to_string(),
    };

    let whole = amount.value() / scale;
    let frac = amount.value() % scale;

    if decimals == 0 {
        whole.to_string()
    } else {
        format!("{whole}.{frac:0width$}", width = decimals as usize)
    }
}
