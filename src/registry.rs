//! Per-pool accounting records.
//!
//! The registry is the engine's single source of truth for how many outcome
//! tokens a pool has released into circulation and how much collateral is
//! attributable to it. Both counters move only by the signed amounts the AMM
//! reports for each completed swap — they are never recomputed from price or
//! raw pool balances, which also hold seeding principal and would double
//! count.

use std::collections::HashMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{PoolId, PoolKey};

/// Parameters of the liquidity the engine itself supplied at seeding time.
/// Cleared when that liquidity is withdrawn at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedLiquidity {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

/// Accounting record for a single outcome pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub key: PoolKey,
    /// Outcome tokens held outside the pool (net of buys and sells).
    pub outcome_circulating: U256,
    /// Collateral attributable to this pool (net of buys and sells).
    pub collateral_in_pool: U256,
    /// Engine-provided seed liquidity, if not yet withdrawn.
    pub provided_liquidity: Option<ProvidedLiquidity>,
    /// Number of swaps recorded against this pool.
    pub swap_count: u64,
}

impl PoolRecord {
    fn new(key: PoolKey) -> Self {
        Self {
            key,
            outcome_circulating: U256::ZERO,
            collateral_in_pool: U256::ZERO,
            provided_liquidity: None,
            swap_count: 0,
        }
    }
}

/// Registry-wide counters, kept for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub pools_registered: u64,
    pub swaps_recorded: u64,
    pub buys: u64,
    pub sells: u64,
}

/// Owner of every [`PoolRecord`]. Mutated only by the swap accountant and by
/// the lifecycle seeding/settlement paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolRegistry {
    pools: HashMap<PoolId, PoolRecord>,
    pub stats: RegistryStats,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created pool. Registering the same id twice would
    /// silently zero live counters, so it is rejected.
    pub fn register_pool(&mut self, pool_id: PoolId, key: PoolKey) -> EngineResult<()> {
        if self.pools.contains_key(&pool_id) {
            return Err(EngineError::InvalidPoolId(pool_id));
        }
        self.pools.insert(pool_id, PoolRecord::new(key));
        self.stats.pools_registered += 1;
        Ok(())
    }

    /// Apply one completed swap to the counters. Must be called exactly once
    /// per swap, with the magnitudes the AMM reported for the outcome-token
    /// and collateral legs.
    ///
    /// A buy moves both counters up, a sell moves both down. A sell that
    /// would drive a counter below zero means the reported deltas contradict
    /// the recorded history — fatal, not saturated.
    pub fn record_swap(
        &mut self,
        pool_id: PoolId,
        is_buy: bool,
        outcome_delta: U256,
        collateral_delta: U256,
    ) -> EngineResult<()> {
        let record = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))?;

        if is_buy {
            record.outcome_circulating = record
                .outcome_circulating
                .checked_add(outcome_delta)
                .ok_or(EngineError::MathOverflow)?;
            record.collateral_in_pool = record
                .collateral_in_pool
                .checked_add(collateral_delta)
                .ok_or(EngineError::MathOverflow)?;
            self.stats.buys += 1;
        } else {
            record.outcome_circulating = record
                .outcome_circulating
                .checked_sub(outcome_delta)
                .ok_or(EngineError::MathOverflow)?;
            record.collateral_in_pool = record
                .collateral_in_pool
                .checked_sub(collateral_delta)
                .ok_or(EngineError::MathOverflow)?;
            self.stats.sells += 1;
        }
        record.swap_count += 1;
        self.stats.swaps_recorded += 1;
        Ok(())
    }

    /// Remember the liquidity parameters the engine supplied at seeding.
    pub fn record_seed_liquidity(
        &mut self,
        pool_id: PoolId,
        provided: ProvidedLiquidity,
    ) -> EngineResult<()> {
        let record = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))?;
        record.provided_liquidity = Some(provided);
        Ok(())
    }

    /// Clear and return the seed-liquidity parameters once withdrawn.
    pub fn clear_seed_liquidity(
        &mut self,
        pool_id: PoolId,
    ) -> EngineResult<Option<ProvidedLiquidity>> {
        let record = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))?;
        Ok(record.provided_liquidity.take())
    }

    pub fn get(&self, pool_id: PoolId) -> EngineResult<&PoolRecord> {
        self.pools
            .get(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))
    }

    pub fn contains(&self, pool_id: PoolId) -> bool {
        self.pools.contains_key(&pool_id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn key() -> PoolKey {
        PoolKey::ordered(
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            0,
            10,
            Address::repeat_byte(9),
        )
    }

    fn registry_with_pool() -> (PoolRegistry, PoolId) {
        let mut registry = PoolRegistry::new();
        let pool_id = key().id();
        registry.register_pool(pool_id, key()).unwrap();
        (registry, pool_id)
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (mut registry, pool_id) = registry_with_pool();
        assert_eq!(
            registry.register_pool(pool_id, key()),
            Err(EngineError::InvalidPoolId(pool_id))
        );
    }

    #[test]
    fn unknown_pool_is_not_found() {
        let registry = PoolRegistry::new();
        let missing = key().id();
        match registry.get(missing) {
            Err(EngineError::PoolNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected PoolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn counters_track_net_signed_legs() {
        let (mut registry, pool_id) = registry_with_pool();
        registry
            .record_swap(pool_id, true, U256::from(100u64), U256::from(5u64))
            .unwrap();
        registry
            .record_swap(pool_id, true, U256::from(40u64), U256::from(2u64))
            .unwrap();
        registry
            .record_swap(pool_id, false, U256::from(30u64), U256::from(1u64))
            .unwrap();

        let record = registry.get(pool_id).unwrap();
        assert_eq!(record.outcome_circulating, U256::from(110u64));
        assert_eq!(record.collateral_in_pool, U256::from(6u64));
        assert_eq!(record.swap_count, 3);
        assert_eq!(registry.stats.buys, 2);
        assert_eq!(registry.stats.sells, 1);
    }

    #[test]
    fn counter_underflow_is_fatal() {
        let (mut registry, pool_id) = registry_with_pool();
        registry
            .record_swap(pool_id, true, U256::from(10u64), U256::from(1u64))
            .unwrap();
        assert_eq!(
            registry.record_swap(pool_id, false, U256::from(11u64), U256::ZERO),
            Err(EngineError::MathOverflow)
        );
    }

    #[test]
    fn seed_liquidity_clears_once() {
        let (mut registry, pool_id) = registry_with_pool();
        let provided = ProvidedLiquidity {
            tick_lower: -46050,
            tick_upper: 23020,
            liquidity: 1_000,
        };
        registry.record_seed_liquidity(pool_id, provided).unwrap();
        assert_eq!(registry.clear_seed_liquidity(pool_id).unwrap(), Some(provided));
        assert_eq!(registry.clear_seed_liquidity(pool_id).unwrap(), None);
    }
}
