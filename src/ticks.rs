//! Tick band selection and square-root price math.
//!
//! Every outcome pool is seeded with one-sided liquidity inside a fixed price
//! band of roughly $0.01 to $10 of collateral per outcome token. The band is
//! expressed as a pre-computed tick pair, mirrored depending on which side of
//! the sorted currency pair the outcome token landed on, and the pool's
//! initial price sits one tick spacing outside the band on the side where the
//! outcome token is nearly worthless — so seeding never requires collateral.
//!
//! `sqrt_price_x96_at_tick` is the engine-side copy of the AMM's price
//! convention: sqrt(1.0001^tick) in Q64.96 fixed point. The two must agree
//! bit-for-bit, which is why this is an integer port of the canonical
//! bit-decomposed multiply chain rather than a float approximation.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tick spacing shared by every outcome pool.
pub const TICK_SPACING: i32 = 10;

/// Ticks representable by the sqrt-price algorithm.
pub const MIN_TICK: i32 = -887272;
pub const MAX_TICK: i32 = 887272;

// Band bounds for the outcome-token-as-currency0 orientation
// (pool price = collateral per outcome token, band ~[0.01, 10]).
// log(0.01)/log(1.0001) = -46054.0 and log(10)/log(1.0001) = 23027.0,
// rounded inward to the tick spacing.
const BAND_LOWER_C0: i32 = -46050;
const BAND_UPPER_C0: i32 = 23020;

/// An inclusive tick range for a liquidity position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRange {
    pub lower: i32,
    pub upper: i32,
}

impl TickRange {
    pub fn contains(&self, tick: i32) -> bool {
        self.lower <= tick && tick < self.upper
    }

    pub fn width(&self) -> i32 {
        self.upper - self.lower
    }
}

/// The fixed seeding band for a pool, oriented by where the outcome token
/// sits in the sorted currency pair.
///
/// Pure and total: both orientations are pre-computed constants.
pub fn tick_range(outcome_is_currency0: bool) -> TickRange {
    if outcome_is_currency0 {
        TickRange {
            lower: BAND_LOWER_C0,
            upper: BAND_UPPER_C0,
        }
    } else {
        // Price is outcome tokens per collateral, so the band mirrors.
        TickRange {
            lower: -BAND_UPPER_C0,
            upper: -BAND_LOWER_C0,
        }
    }
}

/// Initial pool tick: one spacing outside the band, on the side where the
/// outcome token's value is nearest zero. Launching at the band edge lets the
/// engine supply liquidity entirely in outcome tokens.
pub fn initial_tick(outcome_is_currency0: bool) -> i32 {
    let range = tick_range(outcome_is_currency0);
    if outcome_is_currency0 {
        range.lower - TICK_SPACING
    } else {
        range.upper + TICK_SPACING
    }
}

// 2^128-scaled step ratios for each bit of |tick|: STEP_RATIOS[i] is
// round(1.0001^(-2^i / 2) * 2^128). All fit in 128 bits.
const STEP_RATIOS: [u128; 20] = [
    0xfffcb933bd6fad37aa2d162d1a594001,
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// sqrt(1.0001^tick) as a Q64.96 fixed-point number.
///
/// Matches the AMM's representation exactly; a tick outside the supported
/// range is a fatal invariant violation (the engine only ever passes its own
/// validated band constants).
pub fn sqrt_price_x96_at_tick(tick: i32) -> EngineResult<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(EngineError::TickOutOfRange(tick));
    }
    let abs = tick.unsigned_abs();

    let mut ratio: U256 = if abs & 1 != 0 {
        U256::from(STEP_RATIOS[0])
    } else {
        U256::from(1u8) << 128
    };
    for (i, step) in STEP_RATIOS.iter().enumerate().skip(1) {
        if abs & (1 << i) != 0 {
            ratio = (ratio * U256::from(*step)) >> 128;
        }
    }
    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up so the round trip through the AMM's
    // tick math stays consistent.
    let rounded = ratio >> 32;
    let sqrt_price = if (ratio & U256::from(u32::MAX)).is_zero() {
        rounded
    } else {
        rounded + U256::from(1u8)
    };
    Ok(sqrt_price)
}
