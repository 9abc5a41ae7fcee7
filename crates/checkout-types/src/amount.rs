//! Decimal amount conversion between human values and token base units.
//!
//! Token amounts cross the API boundary as decimal numbers ("100.5" units
//! of a 6-decimal token) but live on-chain as arbitrary-precision integers
//! of the smallest base unit. The conversion goes through
//! [`rust_decimal::Decimal`] so the arithmetic itself never touches binary
//! floating point.

use alloy::primitives::U256;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced by amount conversion.
#[derive(Debug, Error)]
pub enum AmountError {
	/// The input is not a representable, non-negative base-10 amount.
	#[error("invalid amount: {0}")]
	InvalidAmount(String),
}

/// Returns `10^decimals` as a `Decimal`.
///
/// Errors when the scale factor itself overflows the decimal range,
/// which bounds `decimals` to 28.
fn pow10(decimals: u8) -> Result<Decimal, AmountError> {
	let mut scale = Decimal::ONE;
	for _ in 0..decimals {
		scale = scale
			.checked_mul(Decimal::TEN)
			.ok_or_else(|| AmountError::InvalidAmount(format!("unsupported decimals {decimals}")))?;
	}
	Ok(scale)
}

/// Converts a human decimal amount into integer base units.
///
/// Sub-base-unit dust is truncated. Fails on non-finite, negative, or
/// otherwise unrepresentable inputs.
pub fn to_base_units(amount: f64, decimals: u8) -> Result<U256, AmountError> {
	let value = Decimal::from_f64(amount)
		.ok_or_else(|| AmountError::InvalidAmount(format!("not a finite number: {amount}")))?;
	if value.is_sign_negative() {
		return Err(AmountError::InvalidAmount(format!(
			"negative amount: {amount}"
		)));
	}

	let scaled = value
		.checked_mul(pow10(decimals)?)
		.ok_or_else(|| AmountError::InvalidAmount(format!("amount out of range: {amount}")))?;
	let units = scaled.trunc().normalize();

	U256::from_str_radix(&units.to_string(), 10)
		.map_err(|e| AmountError::InvalidAmount(e.to_string()))
}

/// Converts a base-10 base-unit string back into a human decimal amount.
///
/// Fails with [`AmountError::InvalidAmount`] when the input is not a valid
/// base-10 number.
pub fn from_base_units(value: &str, decimals: u8) -> Result<Decimal, AmountError> {
	let units =
		Decimal::from_str(value).map_err(|e| AmountError::InvalidAmount(e.to_string()))?;
	units
		.checked_div(pow10(decimals)?)
		.ok_or_else(|| AmountError::InvalidAmount(format!("value out of range: {value}")))
}
