//! The AMM-facing hook surface: swap gating and swap-driven accounting.
//!
//! Trading is permitted strictly between `start_market` and `settle`.
//! `after_swap` moves the pool counters by exactly the signed amounts the AMM
//! reported for the two legs — never by values recomputed from price — so
//! circulating supply and attributed collateral stay the net sum of reported
//! deltas (no double counting, no drift).

use alloy_primitives::Address;

use crate::error::{EngineError, EngineResult};
use crate::interfaces::PoolHooks;
use crate::lifecycle::{MarketEngine, UnlockState};
use crate::store::{Event, Market};
use crate::types::{leg_magnitude, BalanceDelta, MarketId, PoolId, SwapParams};

impl MarketEngine {
    /// Resolve the market guarding a pool. Unmapped pools surface as
    /// not-found on the missing link.
    fn market_for_pool(&self, pool_id: PoolId) -> EngineResult<(MarketId, &Market, &Event)> {
        let event_id = self.store.event_id_for_pool(pool_id)?;
        let market_id = self.store.market_id_for_event(event_id)?;
        let market = self.store.market(market_id)?;
        let event = self.store.event(event_id)?;
        Ok((market_id, market, event))
    }

    /// True while the engine itself is modifying liquidity through the
    /// unlock callback.
    fn own_modification_in_flight(&self, sender: Address) -> bool {
        self.unlock_state != UnlockState::Idle && sender == self.config.address
    }
}

impl PoolHooks for MarketEngine {
    fn before_swap(
        &mut self,
        pool_id: PoolId,
        _params: &SwapParams,
        _sender: Address,
    ) -> EngineResult<()> {
        let (market_id, market, event) = self.market_for_pool(pool_id)?;
        if event.is_outcome_set || !market.stage.trading_open() {
            tracing::warn!(
                pool = %pool_id,
                market = %market_id,
                stage = ?market.stage,
                outcome_set = event.is_outcome_set,
                "swap rejected outside trading window"
            );
            return Err(EngineError::SwapDisabled(pool_id));
        }
        Ok(())
    }

    fn after_swap(
        &mut self,
        pool_id: PoolId,
        _params: &SwapParams,
        delta: &BalanceDelta,
    ) -> EngineResult<()> {
        let (_, _, event) = self.market_for_pool(pool_id)?;
        // Settlement-time liquidity moves must not be double-counted as
        // trades.
        if event.is_outcome_set {
            return Ok(());
        }

        let record = self.registry.get(pool_id)?;
        let key = &record.key;
        if !key.involves(self.config.collateral_token) {
            return Err(EngineError::InvalidPoolId(pool_id));
        }
        let outcome_is_currency0 = key.currency0 != self.config.collateral_token;

        let (outcome_leg, collateral_leg) = if outcome_is_currency0 {
            (delta.amount0, delta.amount1)
        } else {
            (delta.amount1, delta.amount0)
        };

        // The swapper receiving outcome tokens is a buy; both counters move
        // up together. Selling moves both down.
        let is_buy = outcome_leg >= 0;
        self.registry.record_swap(
            pool_id,
            is_buy,
            leg_magnitude(outcome_leg),
            leg_magnitude(collateral_leg),
        )?;

        tracing::debug!(
            pool = %pool_id,
            is_buy,
            outcome_leg,
            collateral_leg,
            "swap recorded"
        );
        Ok(())
    }

    fn before_add_liquidity(&mut self, pool_id: PoolId, sender: Address) -> EngineResult<()> {
        // The engine's own seeding runs before the pool is committed to the
        // registry, so the unlock check comes first.
        if self.own_modification_in_flight(sender) {
            return Ok(());
        }
        if !self.registry.contains(pool_id) {
            return Err(EngineError::PoolNotFound(pool_id));
        }
        Err(EngineError::LiquidityDisabled(pool_id))
    }

    fn before_remove_liquidity(&mut self, pool_id: PoolId, sender: Address) -> EngineResult<()> {
        if self.own_modification_in_flight(sender) {
            return Ok(());
        }
        if !self.registry.contains(pool_id) {
            return Err(EngineError::PoolNotFound(pool_id));
        }
        Err(EngineError::LiquidityDisabled(pool_id))
    }
}
