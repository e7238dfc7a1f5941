//! Trait seams toward the external collaborators: the AMM substrate, the
//! fungible-token contracts and the oracle/judge host — plus the hook surface
//! this engine exposes back to the AMM.
//!
//! The host-ledger execution model is single-threaded and transactional, so
//! every mutating call takes `&mut self` and an `Err` means the surrounding
//! transaction aborted.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::types::{
    BalanceDelta, LiquidityRequest, MarketId, ModifyLiquidityParams, ModifyLiquidityReceipt,
    PoolId, PoolKey, SwapParams,
};

/// AMM operations available while the pool manager is unlocked, i.e. inside
/// the unlock callback.
pub trait AmmOps {
    /// Modify the caller's liquidity position. Returns the token deltas and
    /// the liquidity delta actually applied to the position.
    fn modify_liquidity(
        &mut self,
        key: &PoolKey,
        params: &ModifyLiquidityParams,
    ) -> EngineResult<ModifyLiquidityReceipt>;

    /// Pay a negative balance delta: transfer `amount` of `currency` from
    /// `payer` into the AMM.
    fn settle(
        &mut self,
        tokens: &mut dyn TokenLedger,
        currency: Address,
        amount: U256,
        payer: Address,
    ) -> EngineResult<()>;

    /// Collect a positive balance delta: transfer `amount` of `currency` out
    /// of the AMM to `recipient`.
    fn take(
        &mut self,
        tokens: &mut dyn TokenLedger,
        currency: Address,
        amount: U256,
        recipient: Address,
    ) -> EngineResult<()>;

    /// The AMM's own token-holding identity.
    fn address(&self) -> Address;
}

/// The AMM substrate as consumed by the engine. Swap execution is driven by
/// traders directly against the AMM; the engine only reacts through
/// [`PoolHooks`].
pub trait Amm: AmmOps {
    fn create_pool(&mut self, key: &PoolKey, initial_sqrt_price_x96: U256) -> EngineResult<()>;

    fn sqrt_price_x96(&self, pool_id: PoolId) -> EngineResult<U256>;

    fn liquidity(&self, pool_id: PoolId) -> EngineResult<u128>;

    /// Two-phase liquidity modification: unlock the pool manager, invoke the
    /// callback exactly once with the request, and return whatever the
    /// callback produced. The callback performs the actual
    /// `modify_liquidity` and settles the resulting deltas before returning.
    fn unlock(
        &mut self,
        tokens: &mut dyn TokenLedger,
        callback: &mut dyn UnlockCallback,
        request: LiquidityRequest,
    ) -> EngineResult<BalanceDelta>;
}

/// Continuation invoked by the AMM during [`Amm::unlock`].
pub trait UnlockCallback {
    fn unlocked(
        &mut self,
        amm: &mut dyn AmmOps,
        tokens: &mut dyn TokenLedger,
        request: &LiquidityRequest,
    ) -> EngineResult<BalanceDelta>;
}

/// Standard fungible-token semantics for the collateral and outcome tokens.
pub trait TokenLedger {
    /// Deploy a fresh token contract and return its address.
    fn deploy(&mut self, name: &str, symbol: &str, decimals: u8) -> Address;

    fn mint(&mut self, token: Address, to: Address, amount: U256) -> EngineResult<()>;

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EngineResult<()>;

    /// Transfer on behalf of `from`, consuming `spender`'s allowance.
    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EngineResult<()>;

    fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> EngineResult<()>;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256;

    fn balance_of(&self, token: Address, owner: Address) -> U256;

    fn decimals(&self, token: Address) -> u8;
}

/// The oracle/judge host. One judge instance is deployed per market and only
/// the authorized identity (this engine) may record an outcome on it.
pub trait OracleHost {
    fn deploy(&mut self, market_id: MarketId, authorized: Address) -> Address;

    fn set_outcome(&mut self, oracle: Address, caller: Address, index: u32) -> EngineResult<()>;

    fn outcome(&self, oracle: Address) -> EngineResult<Option<u32>>;

    fn is_outcome_set(&self, oracle: Address) -> bool;
}

/// Hook surface the engine exposes to the AMM. Invoked around every swap and
/// liquidity modification against a pool whose key names this engine.
pub trait PoolHooks {
    fn before_swap(
        &mut self,
        pool_id: PoolId,
        params: &SwapParams,
        sender: Address,
    ) -> EngineResult<()>;

    fn after_swap(
        &mut self,
        pool_id: PoolId,
        params: &SwapParams,
        delta: &BalanceDelta,
    ) -> EngineResult<()>;

    fn before_add_liquidity(&mut self, pool_id: PoolId, sender: Address) -> EngineResult<()>;

    fn before_remove_liquidity(&mut self, pool_id: PoolId, sender: Address) -> EngineResult<()>;
}

/// The fixed capability set this engine registers with the AMM. An explicit
/// struct rather than dispatch variants: gate-swap, post-swap accounting and
/// both liquidity gates are always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookPermissions {
    pub before_swap: bool,
    pub after_swap: bool,
    pub before_add_liquidity: bool,
    pub before_remove_liquidity: bool,
}

impl HookPermissions {
    pub const ALL: HookPermissions = HookPermissions {
        before_swap: true,
        after_swap: true,
        before_add_liquidity: true,
        before_remove_liquidity: true,
    };
}
