//! Fixed-point liquidity math over Q64.96 square-root prices.
//!
//! All conversions multiply before dividing through a 512-bit intermediate,
//! so nothing is truncated until the final divide — systematic under- or
//! over-provisioning from early rounding cannot happen. A zero denominator
//! (equal sqrt prices at both band ticks) is a fatal invariant violation:
//! the engine only ever passes its fixed, validated band.

use alloy_primitives::{U256, U512};

use crate::error::{EngineError, EngineResult};
use crate::ticks::{sqrt_price_x96_at_tick, TickRange};

/// Fixed-point one for the Q64.96 square-root price representation.
pub const Q96: U256 = U256::from_limbs([0, 1 << 32, 0, 0]);

/// `a * b / denominator` with full 512-bit intermediate precision.
///
/// Errors: `DivisionByZero` for a zero denominator, `MathOverflow` if the
/// quotient does not fit 256 bits. Both are fatal.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> EngineResult<U256> {
    if denominator.is_zero() {
        return Err(EngineError::DivisionByZero);
    }
    let product: U512 = a.widening_mul(b);
    let den = widen(denominator);
    let quotient = product / den;
    narrow(quotient)
}

fn widen(v: U256) -> U512 {
    let l = v.into_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

fn narrow(v: U512) -> EngineResult<U256> {
    let l = v.into_limbs();
    if l[4] | l[5] | l[6] | l[7] != 0 {
        return Err(EngineError::MathOverflow);
    }
    Ok(U256::from_limbs([l[0], l[1], l[2], l[3]]))
}

fn band_sqrt_prices(range: TickRange) -> EngineResult<(U256, U256)> {
    let sqrt_lower = sqrt_price_x96_at_tick(range.lower)?;
    let sqrt_upper = sqrt_price_x96_at_tick(range.upper)?;
    Ok((sqrt_lower, sqrt_upper))
}

/// Liquidity delta to request from the AMM so that `collateral` backs the
/// given band.
///
/// Two branches, selected by the side the collateral occupies:
/// - collateral is currency1 (the side whose amount tracks `sqrtU - sqrtL`):
///   `L = collateral * Q96 / (sqrtU - sqrtL)`
/// - collateral is currency0: the inverse square-root prices at both bounds
///   govern, which collapses to
///   `L = collateral * (sqrtL * sqrtU / Q96) / (sqrtU - sqrtL)`
pub fn liquidity_for_collateral(
    collateral: U256,
    range: TickRange,
    collateral_is_currency1: bool,
) -> EngineResult<u128> {
    let (sqrt_lower, sqrt_upper) = band_sqrt_prices(range)?;
    let spread = sqrt_upper
        .checked_sub(sqrt_lower)
        .ok_or(EngineError::MathOverflow)?;

    let liquidity = if collateral_is_currency1 {
        mul_div(collateral, Q96, spread)?
    } else {
        let geometric = mul_div(sqrt_lower, sqrt_upper, Q96)?;
        mul_div(collateral, geometric, spread)?
    };
    u128::try_from(liquidity).map_err(|_| EngineError::MathOverflow)
}

/// Inverse of [`liquidity_for_collateral`]: the collateral a liquidity delta
/// represents over the band.
pub fn collateral_for_liquidity(
    liquidity: u128,
    range: TickRange,
    collateral_is_currency1: bool,
) -> EngineResult<U256> {
    let (sqrt_lower, sqrt_upper) = band_sqrt_prices(range)?;
    let spread = sqrt_upper
        .checked_sub(sqrt_lower)
        .ok_or(EngineError::MathOverflow)?;
    let liq = U256::from(liquidity);

    if collateral_is_currency1 {
        mul_div(liq, spread, Q96)
    } else {
        let geometric = mul_div(sqrt_lower, sqrt_upper, Q96)?;
        mul_div(liq, spread, geometric)
    }
}

/// currency0 moved by `liquidity` across `[sqrt_lower, sqrt_upper]`:
/// `L * Q96 * (sqrtU - sqrtL) / (sqrtL * sqrtU)`, rounded down.
pub fn amount0_for_liquidity(
    liquidity: u128,
    sqrt_lower: U256,
    sqrt_upper: U256,
) -> EngineResult<U256> {
    let spread = sqrt_upper
        .checked_sub(sqrt_lower)
        .ok_or(EngineError::MathOverflow)?;
    let lq = U256::from(liquidity)
        .checked_mul(Q96)
        .ok_or(EngineError::MathOverflow)?;
    let denominator = sqrt_lower
        .checked_mul(sqrt_upper)
        .ok_or(EngineError::MathOverflow)?;
    mul_div(lq, spread, denominator)
}

/// currency1 moved by `liquidity` across `[sqrt_lower, sqrt_upper]`:
/// `L * (sqrtU - sqrtL) / Q96`, rounded down.
pub fn amount1_for_liquidity(
    liquidity: u128,
    sqrt_lower: U256,
    sqrt_upper: U256,
) -> EngineResult<U256> {
    let spread = sqrt_upper
        .checked_sub(sqrt_lower)
        .ok_or(EngineError::MathOverflow)?;
    mul_div(U256::from(liquidity), spread, Q96)
}
