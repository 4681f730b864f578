use alloy::primitives::U256;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NUM_MONERO_DECIMALS: i64 = 12;
pub const NUM_ETHER_DECIMALS: i64 = 18;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} has more than {max} decimal places")]
    TooManyDecimals { field: &'static str, max: i64 },
    #[error("{field} is too large")]
    Overflow { field: &'static str },
}

/// Validates that a decimal amount is strictly positive and has no more than
/// `max_decimals` fractional digits.
pub fn validate_positive(
    field: &'static str,
    max_decimals: i64,
    value: &BigDecimal,
) -> Result<(), AmountError> {
    if *value <= BigDecimal::zero() {
        return Err(AmountError::NotPositive { field });
    }
    if value.normalized().fractional_digit_count() > max_decimals {
        return Err(AmountError::TooManyDecimals {
            field,
            max: max_decimals,
        });
    }
    Ok(())
}

pub fn piconero_to_xmr(piconero: u64) -> BigDecimal {
    BigDecimal::new(BigInt::from(piconero), NUM_MONERO_DECIMALS).normalized()
}

pub fn xmr_to_piconero(amount: &BigDecimal) -> Result<u64, AmountError> {
    let scaled = scale_to_integer("XMR amount", amount, NUM_MONERO_DECIMALS)?;
    let (bigint, _) = scaled.with_scale(0).into_bigint_and_exponent();
    bigint
        .try_into()
        .map_err(|_| AmountError::Overflow { field: "XMR amount" })
}

pub fn wei_to_eth(wei: U256) -> BigDecimal {
    let digits = BigInt::parse_bytes(wei.to_string().as_bytes(), 10).unwrap_or_else(BigInt::zero);
    BigDecimal::new(digits, NUM_ETHER_DECIMALS).normalized()
}

pub fn eth_to_wei(amount: &BigDecimal) -> Result<U256, AmountError> {
    let scaled = scale_to_integer("ETH amount", amount, NUM_ETHER_DECIMALS)?;
    U256::from_str_radix(&scaled.with_scale(0).to_string(), 10)
        .map_err(|_| AmountError::Overflow { field: "ETH amount" })
}

fn scale_to_integer(
    field: &'static str,
    amount: &BigDecimal,
    decimals: i64,
) -> Result<BigDecimal, AmountError> {
    validate_positive(field, decimals, amount)?;
    let multiplier = BigDecimal::new(BigInt::from(1), -decimals);
    Ok((amount * multiplier).normalized())
}

/// ETH-asset units received per 1 XMR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(BigDecimal);

impl ExchangeRate {
    pub fn new(rate: BigDecimal) -> Self {
        Self(rate.normalized())
    }

    pub fn decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn validate(&self) -> Result<(), AmountError> {
        validate_positive("exchangeRate", NUM_ETHER_DECIMALS, &self.0)
    }

    /// ETH-side amount for the given XMR amount.
    pub fn to_eth_amount(&self, xmr: &BigDecimal) -> BigDecimal {
        (xmr * &self.0).normalized()
    }

    /// XMR amount for the given ETH-side amount, rounded to piconero
    /// precision.
    pub fn to_xmr_amount(&self, eth: &BigDecimal) -> BigDecimal {
        (eth / &self.0)
            .with_scale_round(NUM_MONERO_DECIMALS, bigdecimal::rounding::RoundingMode::HalfUp)
            .normalized()
    }
}

impl std::fmt::Display for ExchangeRate {
    // Plain (non-exponent) notation, normalized; offer hashing and logging
    // must agree byte-for-byte.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalized())
    }
}
