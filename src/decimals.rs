//! Raw on-chain amounts to display decimals, and display formatting.
//!

use ethers::types::U256;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ContractError;

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = 79_228_162_514_264_337_593_543_950_335;
const MAX_SCALE: u32 = 28;
const DISPLAY_DECIMALS: u32 = 2;

/// Converts a full-precision token amount into a `Decimal` with `decimals` places.
///
/// Amounts too large for a `Decimal` at full precision lose trailing fractional digits
/// (truncated) until they fit. An integer part beyond `Decimal` range is an error.
pub fn raw_to_decimal(raw: U256, decimals: u32) -> Result<Decimal, ContractError> {
    let mut mantissa = raw;
    let mut scale = decimals;
    let ten = U256::from(10u8);

    while scale > MAX_SCALE || mantissa > U256::from(MAX_MANTISSA) {
        if scale == 0 {
            return Err(ContractError::Conversion(format!(
                "amount {} with {} decimals exceeds decimal range",
                raw, decimals
            )));
        }
        mantissa /= ten;
        scale -= 1;
    }

    let mantissa = i128::try_from(mantissa.as_u128())
        .map_err(|e| ContractError::Conversion(e.to_string()))?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.normalize())
        .map_err(|e| ContractError::Conversion(e.to_string()))
}

/// Formats an amount for display: two decimals, comma thousands separators.
pub fn format_currency(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded);
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, frac_part)
}
