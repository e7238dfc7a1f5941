//! The market lifecycle engine: `initialize_market -> start_market -> settle`.
//!
//! `MarketEngine` owns the stores and drives every stage transition. External
//! collaborators (AMM, token ledger, oracle host) are passed into each
//! operation explicitly — all mutation is confined to the call that owns the
//! transaction boundary, there is no ambient global state.
//!
//! Engine-local state commits before any external call that could hand
//! control back (oracle recording, liquidity withdrawal, token transfers),
//! matching the reentrancy discipline of the host ledger.

use alloy_primitives::{Address, B256, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::interfaces::{Amm, HookPermissions, OracleHost, TokenLedger};
use crate::liquidity::{
    amount0_for_liquidity, amount1_for_liquidity, liquidity_for_collateral, mul_div, Q96,
};
use crate::registry::{PoolRecord, PoolRegistry, ProvidedLiquidity};
use crate::store::{Event, Market, MarketStage, MarketStore, Outcome, UNRESOLVED};
use crate::ticks::{initial_tick, sqrt_price_x96_at_tick, tick_range, TICK_SPACING};
use crate::types::{EventId, MarketId, ModifyLiquidityParams, PoolId, PoolKey};

/// Static engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The engine's own identity: hook address on every pool key and
    /// custodian of seeded liquidity and settlement collateral.
    pub address: Address,
    /// The shared collateral asset all outcome pools price against.
    pub collateral_token: Address,
    pub outcome_token_decimals: u8,
    pub tick_spacing: i32,
}

impl EngineConfig {
    pub fn new(address: Address, collateral_token: Address) -> Self {
        Self {
            address,
            collateral_token,
            outcome_token_decimals: 18,
            tick_spacing: TICK_SPACING,
        }
    }
}

/// Engine-level counters. Purely observability; nothing reads these back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub markets_created: u64,
    pub markets_started: u64,
    pub markets_settled: u64,
    pub claims_paid: u64,
    pub collateral_claimed: U256,
}

/// Guard state for the unlock/callback round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnlockState {
    /// No modification in flight.
    Idle,
    /// Unlock requested, callback not yet invoked.
    Armed,
    /// Callback ran for the current unlock.
    Entered,
}

/// One outcome to create at market initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSpec {
    pub name: String,
    /// Opaque metadata blob carried on the outcome record.
    pub details: String,
}

/// Parameters for [`MarketEngine::initialize_market`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeMarket {
    pub creator: Address,
    /// Fee tier applied to every outcome pool, hundredths of a bip.
    pub fee: u32,
    /// Content reference to the off-chain event description.
    pub description_hash: B256,
    pub outcomes: Vec<OutcomeSpec>,
    /// Collateral budget backing each pool's one-sided seed liquidity.
    pub seed_collateral: U256,
    /// Current block of the host ledger.
    pub block: u64,
}

/// Everything a caller needs after initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInit {
    pub market_id: MarketId,
    pub event_id: EventId,
    pub oracle: Address,
    pub pools: Vec<PoolId>,
    pub outcome_tokens: Vec<Address>,
}

/// The settlement and accounting engine.
pub struct MarketEngine {
    pub(crate) config: EngineConfig,
    pub(crate) store: MarketStore,
    pub(crate) registry: PoolRegistry,
    pub stats: EngineStats,
    pub(crate) unlock_state: UnlockState,
    pub(crate) claim_in_progress: bool,
}

impl MarketEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: MarketStore::new(),
            registry: PoolRegistry::new(),
            stats: EngineStats::default(),
            unlock_state: UnlockState::Idle,
            claim_in_progress: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The capability set this engine registers with the AMM.
    pub fn permissions() -> HookPermissions {
        HookPermissions::ALL
    }

    pub fn market(&self, market_id: MarketId) -> EngineResult<&Market> {
        self.store.market(market_id)
    }

    pub fn event(&self, event_id: EventId) -> EngineResult<&Event> {
        self.store.event(event_id)
    }

    pub fn pool(&self, pool_id: PoolId) -> EngineResult<&PoolRecord> {
        self.registry.get(pool_id)
    }

    /// Create the event, its outcome tokens and pools, seed each pool with
    /// one-sided outcome-token liquidity, attach an oracle and record the
    /// market in stage `Created`.
    pub fn initialize_market(
        &mut self,
        amm: &mut dyn Amm,
        tokens: &mut dyn TokenLedger,
        oracles: &mut dyn OracleHost,
        params: InitializeMarket,
    ) -> EngineResult<MarketInit> {
        if params.outcomes.len() < 2 {
            return Err(EngineError::InvalidOutcomeSpec {
                reason: format!(
                    "a market needs at least 2 outcomes, got {}",
                    params.outcomes.len()
                ),
            });
        }
        if params.outcomes.iter().any(|o| o.name.trim().is_empty()) {
            return Err(EngineError::InvalidOutcomeSpec {
                reason: "outcome name must not be empty".into(),
            });
        }
        if params.seed_collateral.is_zero() {
            return Err(EngineError::InvalidAmount(params.seed_collateral));
        }

        let collateral = self.config.collateral_token;
        let mut outcomes = Vec::with_capacity(params.outcomes.len());
        let mut pools = Vec::with_capacity(params.outcomes.len());
        let mut seeded: Vec<(PoolId, PoolKey, ProvidedLiquidity)> =
            Vec::with_capacity(params.outcomes.len());

        for spec in &params.outcomes {
            let symbol: String = spec
                .name
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(6)
                .collect::<String>()
                .to_uppercase();
            let token = tokens.deploy(&spec.name, &symbol, self.config.outcome_token_decimals);

            let key = PoolKey::ordered(
                token,
                collateral,
                params.fee,
                self.config.tick_spacing,
                self.config.address,
            );
            let pool_id = key.id();
            let outcome_is_currency0 = key.currency0 == token;

            let range = tick_range(outcome_is_currency0);
            let launch_tick = initial_tick(outcome_is_currency0);
            let initial_sqrt_price = sqrt_price_x96_at_tick(launch_tick)?;
            amm.create_pool(&key, initial_sqrt_price)?;

            // Collateral sits on the quote side exactly when the outcome
            // token is currency0.
            let liquidity =
                liquidity_for_collateral(params.seed_collateral, range, outcome_is_currency0)?;
            let liquidity_delta =
                i128::try_from(liquidity).map_err(|_| EngineError::MathOverflow)?;

            // With the launch price one spacing outside the band, the whole
            // position is denominated in outcome tokens. Mint exactly what
            // the AMM will pull in.
            let sqrt_lower = sqrt_price_x96_at_tick(range.lower)?;
            let sqrt_upper = sqrt_price_x96_at_tick(range.upper)?;
            let required = if outcome_is_currency0 {
                amount0_for_liquidity(liquidity, sqrt_lower, sqrt_upper)?
            } else {
                amount1_for_liquidity(liquidity, sqrt_lower, sqrt_upper)?
            };
            tokens.mint(token, self.config.address, required)?;

            self.modify_liquidity_locked(
                amm,
                tokens,
                &key,
                ModifyLiquidityParams {
                    tick_lower: range.lower,
                    tick_upper: range.upper,
                    liquidity_delta,
                },
            )?;

            tracing::debug!(
                pool = %pool_id,
                outcome = %spec.name,
                %liquidity,
                outcome_tokens = %required,
                "seeded outcome pool"
            );

            seeded.push((
                pool_id,
                key,
                ProvidedLiquidity {
                    tick_lower: range.lower,
                    tick_upper: range.upper,
                    liquidity,
                },
            ));
            outcomes.push(Outcome {
                token,
                details: spec.details.clone(),
            });
            pools.push(pool_id);
        }

        // All external work done; commit engine state.
        for (pool_id, key, provided) in seeded {
            self.registry.register_pool(pool_id, key)?;
            self.registry.record_seed_liquidity(pool_id, provided)?;
        }

        let outcome_tokens: Vec<Address> = outcomes.iter().map(|o| o.token).collect();
        let event = Event {
            collateral_token: collateral,
            description_hash: params.description_hash,
            is_outcome_set: false,
            outcome_resolution: UNRESOLVED,
            outcomes,
            lp_pools: pools.clone(),
        };
        let event_id = self.store.insert_event(event);

        let market_id =
            MarketStore::derive_market_id(event_id, params.creator, params.block, params.fee);
        let oracle = oracles.deploy(market_id, self.config.address);

        let inserted = self.store.insert_market(Market {
            stage: MarketStage::Created,
            creator: params.creator,
            created_at_block: params.block,
            created_at: Utc::now(),
            event_id,
            oracle,
            fee: params.fee,
            usdm_amount_at_settlement: U256::ZERO,
            usdm_claimed: U256::ZERO,
        });
        debug_assert_eq!(inserted, market_id);

        self.stats.markets_created += 1;
        tracing::info!(
            market = %market_id,
            event = %event_id,
            outcomes = pools.len(),
            seed_collateral = %params.seed_collateral,
            "market initialized"
        );

        Ok(MarketInit {
            market_id,
            event_id,
            oracle,
            pools,
            outcome_tokens,
        })
    }

    /// Open trading. Only the creator may start, and only from `Created`.
    pub fn start_market(&mut self, market_id: MarketId, caller: Address) -> EngineResult<()> {
        let market = self.store.market(market_id)?;
        if market.creator != caller {
            return Err(EngineError::NotCreator { market_id, caller });
        }
        self.store.mark_started(market_id)?;
        self.stats.markets_started += 1;
        tracing::info!(market = %market_id, "market started");
        Ok(())
    }

    /// Resolve the market to a single winning outcome.
    ///
    /// Aggregates `collateral_in_pool` across every outcome pool into the
    /// settlement pot, commits resolution and stage, records the outcome on
    /// the oracle, and withdraws the engine's seeded liquidity from all pools
    /// (recovering the traded-in collateral that funds claims). The pot is
    /// defined by the counters alone, never by the withdrawal amounts.
    pub fn settle(
        &mut self,
        amm: &mut dyn Amm,
        tokens: &mut dyn TokenLedger,
        oracles: &mut dyn OracleHost,
        market_id: MarketId,
        winning_index: usize,
        caller: Address,
    ) -> EngineResult<U256> {
        let market = self.store.market(market_id)?;
        if market.creator != caller {
            return Err(EngineError::NotCreator { market_id, caller });
        }
        if market.stage != MarketStage::Started {
            return Err(EngineError::NotStarted(market_id));
        }
        let event_id = market.event_id;
        let oracle = market.oracle;

        let event = self.store.event(event_id)?.clone();
        if event.is_outcome_set {
            return Err(EngineError::OutcomeAlreadySet(event_id));
        }
        if winning_index >= event.outcomes.len() {
            return Err(EngineError::InvalidOutcomeIndex {
                index: winning_index as i64,
                len: event.outcomes.len(),
            });
        }

        // Total collateral ever deposited net of withdrawals, regardless of
        // which pool it currently sits in.
        let mut pot = U256::ZERO;
        for pool_id in &event.lp_pools {
            let record = self.registry.get(*pool_id)?;
            pot = pot
                .checked_add(record.collateral_in_pool)
                .ok_or(EngineError::MathOverflow)?;
        }

        // Commit all engine state before touching collaborators.
        self.store.resolve_event(event_id, winning_index)?;
        self.store.mark_resolved(market_id, pot)?;
        self.stats.markets_settled += 1;

        oracles.set_outcome(oracle, self.config.address, winning_index as u32)?;

        // Pull the seeded positions back; from here the engine's balance
        // holds the pot plus unsold outcome tokens.
        for pool_id in &event.lp_pools {
            let Some(provided) = self.registry.clear_seed_liquidity(*pool_id)? else {
                continue;
            };
            let key = self.registry.get(*pool_id)?.key.clone();
            let liquidity_delta =
                i128::try_from(provided.liquidity).map_err(|_| EngineError::MathOverflow)?;
            self.modify_liquidity_locked(
                amm,
                tokens,
                &key,
                ModifyLiquidityParams {
                    tick_lower: provided.tick_lower,
                    tick_upper: provided.tick_upper,
                    liquidity_delta: -liquidity_delta,
                },
            )?;
        }

        tracing::info!(
            market = %market_id,
            winning_index,
            pot = %pot,
            "market settled"
        );
        Ok(pot)
    }

    /// Spot price of a pool's outcome token in collateral units, scaled by
    /// 1e18, derived from the AMM's square-root price.
    pub fn price_in_collateral(&self, amm: &dyn Amm, pool_id: PoolId) -> EngineResult<U256> {
        let record = self.registry.get(pool_id)?;
        let key = &record.key;
        if !key.involves(self.config.collateral_token) {
            return Err(EngineError::InvalidPoolId(pool_id));
        }
        let outcome_is_currency0 = key.currency0 != self.config.collateral_token;

        let sqrt_price = amm.sqrt_price_x96(pool_id)?;
        // (sqrtP/Q96)^2 is the currency1-per-currency0 price.
        let price_x96 = mul_div(sqrt_price, sqrt_price, Q96)?;
        let one = U256::from(10u128.pow(18));
        if outcome_is_currency0 {
            mul_div(price_x96, one, Q96)
        } else {
            mul_div(one, Q96, price_x96)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testbed::{InMemoryAmm, InMemoryOracles, InMemoryTokens};

    fn setup() -> (MarketEngine, InMemoryAmm, InMemoryTokens, InMemoryOracles) {
        let mut tokens = InMemoryTokens::new();
        let collateral = tokens.deploy("USD Market", "USDM", 18);
        let engine = MarketEngine::new(EngineConfig::new(Address::repeat_byte(0xEE), collateral));
        let amm = InMemoryAmm::new(Address::repeat_byte(0xAA));
        (engine, amm, tokens, InMemoryOracles::new())
    }

    fn init_params(outcomes: Vec<OutcomeSpec>) -> InitializeMarket {
        InitializeMarket {
            creator: Address::repeat_byte(0x01),
            fee: 0,
            description_hash: alloy_primitives::keccak256(b"who wins"),
            outcomes,
            seed_collateral: U256::from(100u128 * 10u128.pow(18)),
            block: 42,
        }
    }

    fn two_outcomes() -> Vec<OutcomeSpec> {
        vec![
            OutcomeSpec {
                name: "Alpha".into(),
                details: "team alpha wins".into(),
            },
            OutcomeSpec {
                name: "Beta".into(),
                details: "team beta wins".into(),
            },
        ]
    }

    #[test]
    fn rejects_single_outcome() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let params = init_params(vec![OutcomeSpec {
            name: "only".into(),
            details: String::new(),
        }]);
        match engine.initialize_market(&mut amm, &mut tokens, &mut oracles, params) {
            Err(EngineError::InvalidOutcomeSpec { .. }) => {}
            other => panic!("expected InvalidOutcomeSpec, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_outcome_name() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let mut outcomes = two_outcomes();
        outcomes[1].name = "  ".into();
        match engine.initialize_market(&mut amm, &mut tokens, &mut oracles, init_params(outcomes)) {
            Err(EngineError::InvalidOutcomeSpec { .. }) => {}
            other => panic!("expected InvalidOutcomeSpec, got {other:?}"),
        }
    }

    #[test]
    fn initialize_seeds_every_pool() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let init = engine
            .initialize_market(&mut amm, &mut tokens, &mut oracles, init_params(two_outcomes()))
            .unwrap();

        assert_eq!(init.pools.len(), 2);
        assert_eq!(init.outcome_tokens.len(), 2);

        for pool_id in &init.pools {
            let record = engine.pool(*pool_id).unwrap();
            let provided = record.provided_liquidity.expect("seed liquidity recorded");
            assert!(provided.liquidity > 0);
            assert_eq!(amm.liquidity(*pool_id).unwrap(), provided.liquidity);
            // Counters start untouched: seeding is not a swap.
            assert_eq!(record.outcome_circulating, U256::ZERO);
            assert_eq!(record.collateral_in_pool, U256::ZERO);
        }

        let market = engine.market(init.market_id).unwrap();
        assert_eq!(market.stage, MarketStage::Created);
        assert_eq!(market.usdm_amount_at_settlement, U256::ZERO);
    }

    #[test]
    fn start_requires_creator() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let init = engine
            .initialize_market(&mut amm, &mut tokens, &mut oracles, init_params(two_outcomes()))
            .unwrap();

        let stranger = Address::repeat_byte(0x77);
        match engine.start_market(init.market_id, stranger) {
            Err(EngineError::NotCreator { .. }) => {}
            other => panic!("expected NotCreator, got {other:?}"),
        }
        engine
            .start_market(init.market_id, Address::repeat_byte(0x01))
            .unwrap();
        assert_eq!(
            engine.start_market(init.market_id, Address::repeat_byte(0x01)),
            Err(EngineError::AlreadyStarted(init.market_id))
        );
    }

    #[test]
    fn settle_requires_started_and_valid_index() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let creator = Address::repeat_byte(0x01);
        let init = engine
            .initialize_market(&mut amm, &mut tokens, &mut oracles, init_params(two_outcomes()))
            .unwrap();

        assert_eq!(
            engine.settle(&mut amm, &mut tokens, &mut oracles, init.market_id, 0, creator),
            Err(EngineError::NotStarted(init.market_id))
        );

        engine.start_market(init.market_id, creator).unwrap();
        match engine.settle(&mut amm, &mut tokens, &mut oracles, init.market_id, 9, creator) {
            Err(EngineError::InvalidOutcomeIndex { index: 9, len: 2 }) => {}
            other => panic!("expected InvalidOutcomeIndex, got {other:?}"),
        }

        let pot = engine
            .settle(&mut amm, &mut tokens, &mut oracles, init.market_id, 0, creator)
            .unwrap();
        // No swaps happened, so the pot is empty but settlement still works.
        assert_eq!(pot, U256::ZERO);
        assert!(oracles.is_outcome_set(init.oracle));
        assert_eq!(oracles.outcome(init.oracle).unwrap(), Some(0));

        // Seed liquidity withdrawn and cleared everywhere.
        for pool_id in &init.pools {
            assert!(engine.pool(*pool_id).unwrap().provided_liquidity.is_none());
            assert_eq!(amm.liquidity(*pool_id).unwrap(), 0);
        }

        // Settling twice cannot succeed.
        assert_eq!(
            engine.settle(&mut amm, &mut tokens, &mut oracles, init.market_id, 0, creator),
            Err(EngineError::NotStarted(init.market_id))
        );
    }

    #[test]
    fn launch_price_sits_at_band_floor() {
        let (mut engine, mut amm, mut tokens, mut oracles) = setup();
        let init = engine
            .initialize_market(&mut amm, &mut tokens, &mut oracles, init_params(two_outcomes()))
            .unwrap();

        // One-cent launch price, scaled 1e18: about 1e16.
        for pool_id in &init.pools {
            let price = engine.price_in_collateral(&amm, *pool_id).unwrap();
            let price_f = u128::try_from(price).unwrap() as f64 / 1e18;
            assert!(
                (price_f - 0.01).abs() / 0.01 < 0.01,
                "launch price {price_f} should be ~$0.01"
            );
        }
    }
}
