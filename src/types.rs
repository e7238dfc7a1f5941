//! Shared value types: content-derived identifiers, pool keys and the
//! balance/parameter shapes exchanged with the external AMM.
//!
//! Identifiers are keccak-256 digests of the identified content, so the same
//! inputs always produce the same id and ids never collide across stores.

use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! content_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub B256);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

content_id!(
    /// Identifier of an [`Event`](crate::store::Event), derived from its content.
    EventId
);
content_id!(
    /// Identifier of a [`Market`](crate::store::Market), derived from its
    /// event, creator and creation block.
    MarketId
);
content_id!(
    /// Identifier of a liquidity pool, derived from its [`PoolKey`].
    PoolId
);

/// Immutable description of a pool: the currency pair (sorted), the fee tier,
/// the tick spacing and the hook (engine) address attached to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    /// Fee in hundredths of a basis point (1_000_000 = 100%).
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
}

impl PoolKey {
    /// Build a key with the currency pair in canonical (sorted) order.
    pub fn ordered(a: Address, b: Address, fee: u32, tick_spacing: i32, hooks: Address) -> Self {
        let (currency0, currency1) = if a < b { (a, b) } else { (b, a) };
        Self {
            currency0,
            currency1,
            fee,
            tick_spacing,
            hooks,
        }
    }

    /// Content-derived pool identifier.
    pub fn id(&self) -> PoolId {
        let mut buf = Vec::with_capacity(20 + 20 + 4 + 4 + 20);
        buf.extend_from_slice(self.currency0.as_slice());
        buf.extend_from_slice(self.currency1.as_slice());
        buf.extend_from_slice(&self.fee.to_be_bytes());
        buf.extend_from_slice(&self.tick_spacing.to_be_bytes());
        buf.extend_from_slice(self.hooks.as_slice());
        PoolId(keccak256(&buf))
    }

    /// Whether `currency` is one side of this pool.
    pub fn involves(&self, currency: Address) -> bool {
        self.currency0 == currency || self.currency1 == currency
    }

    /// The side opposite to `currency`.
    pub fn other(&self, currency: Address) -> Address {
        if self.currency0 == currency {
            self.currency1
        } else {
            self.currency0
        }
    }
}

/// Signed token movements reported by the AMM for one operation, from the
/// perspective of the account driving it: positive = owed to the account,
/// negative = owed by the account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta {
        amount0: 0,
        amount1: 0,
    };

    pub fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    /// The delta of the given side (0 or 1).
    pub fn amount(&self, side: u8) -> i128 {
        if side == 0 {
            self.amount0
        } else {
            self.amount1
        }
    }
}

/// Absolute value of a signed leg as an unsigned amount.
pub fn leg_magnitude(amount: i128) -> U256 {
    U256::from(amount.unsigned_abs())
}

/// Swap request as handed to the AMM by a trader.
///
/// `amount_specified < 0` means exact input (the canonical convention of the
/// AMM substrate): the magnitude is the amount of the input currency paid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapParams {
    /// Direction: true = currency0 in, currency1 out (price moves down).
    pub zero_for_one: bool,
    pub amount_specified: i128,
}

impl SwapParams {
    /// Exact-input swap of `amount_in` of the input currency.
    pub fn exact_in(zero_for_one: bool, amount_in: u128) -> Self {
        Self {
            zero_for_one,
            amount_specified: -(amount_in as i128),
        }
    }

    pub fn is_exact_input(&self) -> bool {
        self.amount_specified < 0
    }
}

/// Liquidity modification request against a pool position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyLiquidityParams {
    pub tick_lower: i32,
    pub tick_upper: i32,
    /// Positive adds liquidity, negative removes it.
    pub liquidity_delta: i128,
}

/// The request object handed to the AMM for the unlock/callback round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityRequest {
    pub key: PoolKey,
    pub params: ModifyLiquidityParams,
}

/// Result of a liquidity modification as reported by the AMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyLiquidityReceipt {
    /// Net token movements for the position owner.
    pub delta: BalanceDelta,
    /// The liquidity delta actually applied to the position. Must equal the
    /// requested delta; the callback adapter treats a mismatch as fatal.
    pub applied_liquidity_delta: i128,
}
