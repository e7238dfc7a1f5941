//! Event and Market records and the store that exclusively owns them.
//!
//! Ids are derived from record content (keccak-256), so stores are
//! append-only maps keyed by stable identifiers. Stage transitions are owned
//! here and only move forward: `Created -> Started -> Resolved`. `Ended` and
//! `Canceled` are declared for forward compatibility but unreachable.

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::{EventId, MarketId, PoolId};

/// Sentinel for an unresolved event.
pub const UNRESOLVED: i32 = -1;

/// One mutually exclusive result of an event. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Fungible token representing this outcome.
    pub token: Address,
    /// Opaque metadata blob (name, description pointer).
    pub details: String,
}

/// The underlying real-world event a market settles on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub collateral_token: Address,
    /// Content reference to the off-chain description.
    pub description_hash: B256,
    pub is_outcome_set: bool,
    /// Index into `outcomes`/`lp_pools`; [`UNRESOLVED`] until resolution.
    pub outcome_resolution: i32,
    pub outcomes: Vec<Outcome>,
    /// Index-aligned with `outcomes`.
    pub lp_pools: Vec<PoolId>,
}

impl Event {
    /// The winning pool and outcome, once resolved.
    pub fn winning_index(&self) -> Option<usize> {
        if self.is_outcome_set && self.outcome_resolution >= 0 {
            Some(self.outcome_resolution as usize)
        } else {
            None
        }
    }
}

/// Market lifecycle stage. Strictly forward, never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MarketStage {
    #[default]
    Created,
    Started,
    Resolved,
    /// Declared for forward compatibility; unreachable in this engine.
    Ended,
    /// Declared for forward compatibility; unreachable in this engine.
    Canceled,
}

impl MarketStage {
    /// Trading is permitted strictly between start and settlement.
    pub fn trading_open(&self) -> bool {
        matches!(self, MarketStage::Started)
    }
}

/// A tradeable market backed by exactly one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub stage: MarketStage,
    /// Identity allowed to start and settle this market.
    pub creator: Address,
    pub created_at_block: u64,
    pub created_at: DateTime<Utc>,
    pub event_id: EventId,
    /// Judge instance recording the winning outcome.
    pub oracle: Address,
    /// Fee tier applied to every outcome pool, hundredths of a bip.
    pub fee: u32,
    /// Total collateral attributed to the event at settlement; zero before.
    pub usdm_amount_at_settlement: U256,
    /// Collateral paid out by claims so far. Observability only — the claim
    /// formula uses the frozen settlement snapshot, never this counter.
    pub usdm_claimed: U256,
}

/// Exclusive owner of Event and Market records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketStore {
    events: HashMap<EventId, Event>,
    markets: HashMap<MarketId, Market>,
    pool_to_event: HashMap<PoolId, EventId>,
    event_to_market: HashMap<EventId, MarketId>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the content id of an event.
    pub fn derive_event_id(event: &Event) -> EventId {
        let mut buf = Vec::new();
        buf.extend_from_slice(event.description_hash.as_slice());
        buf.extend_from_slice(event.collateral_token.as_slice());
        for outcome in &event.outcomes {
            buf.extend_from_slice(outcome.token.as_slice());
        }
        for pool in &event.lp_pools {
            buf.extend_from_slice(pool.0.as_slice());
        }
        EventId(keccak256(&buf))
    }

    /// Derive a market id from its event, creator and creation point.
    pub fn derive_market_id(
        event_id: EventId,
        creator: Address,
        created_at_block: u64,
        fee: u32,
    ) -> MarketId {
        let mut buf = Vec::with_capacity(32 + 20 + 8 + 4);
        buf.extend_from_slice(event_id.0.as_slice());
        buf.extend_from_slice(creator.as_slice());
        buf.extend_from_slice(&created_at_block.to_be_bytes());
        buf.extend_from_slice(&fee.to_be_bytes());
        MarketId(keccak256(&buf))
    }

    /// Insert an event and index its pools. The outcome/pool sequences are
    /// immutable from here on.
    pub fn insert_event(&mut self, event: Event) -> EventId {
        let event_id = Self::derive_event_id(&event);
        for pool in &event.lp_pools {
            self.pool_to_event.insert(*pool, event_id);
        }
        self.events.insert(event_id, event);
        event_id
    }

    /// Insert a market backing `market.event_id`.
    pub fn insert_market(&mut self, market: Market) -> MarketId {
        let market_id = Self::derive_market_id(
            market.event_id,
            market.creator,
            market.created_at_block,
            market.fee,
        );
        self.event_to_market.insert(market.event_id, market_id);
        self.markets.insert(market_id, market);
        market_id
    }

    pub fn event(&self, event_id: EventId) -> EngineResult<&Event> {
        self.events
            .get(&event_id)
            .ok_or(EngineError::EventNotFound(event_id))
    }

    pub fn market(&self, market_id: MarketId) -> EngineResult<&Market> {
        self.markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    fn market_mut(&mut self, market_id: MarketId) -> EngineResult<&mut Market> {
        self.markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    /// Resolve the pool's event id; an unmapped pool id is the missing
    /// reference, so it doubles as the reported identifier.
    pub fn event_id_for_pool(&self, pool_id: PoolId) -> EngineResult<EventId> {
        self.pool_to_event
            .get(&pool_id)
            .copied()
            .ok_or(EngineError::EventNotFound(EventId(pool_id.0)))
    }

    pub fn market_id_for_event(&self, event_id: EventId) -> EngineResult<MarketId> {
        self.event_to_market
            .get(&event_id)
            .copied()
            .ok_or_else(|| EngineError::MarketNotFound(MarketId(event_id.0)))
    }

    /// `Created -> Started`. Any later stage means the market already left
    /// `Created`.
    pub fn mark_started(&mut self, market_id: MarketId) -> EngineResult<()> {
        let market = self.market_mut(market_id)?;
        match market.stage {
            MarketStage::Created => {
                market.stage = MarketStage::Started;
                Ok(())
            }
            _ => Err(EngineError::AlreadyStarted(market_id)),
        }
    }

    /// `Started -> Resolved`, recording the settlement pot.
    pub fn mark_resolved(&mut self, market_id: MarketId, pot: U256) -> EngineResult<()> {
        let market = self.market_mut(market_id)?;
        match market.stage {
            MarketStage::Started => {
                market.stage = MarketStage::Resolved;
                market.usdm_amount_at_settlement = pot;
                Ok(())
            }
            _ => Err(EngineError::NotStarted(market_id)),
        }
    }

    /// Record a claim payout against a resolved market.
    pub fn add_claimed(&mut self, market_id: MarketId, paid: U256) -> EngineResult<()> {
        let market = self.market_mut(market_id)?;
        market.usdm_claimed = market
            .usdm_claimed
            .checked_add(paid)
            .ok_or(EngineError::MathOverflow)?;
        Ok(())
    }

    /// Mark the event outcome. Index must address an existing outcome and the
    /// outcome must not already be set.
    pub fn resolve_event(&mut self, event_id: EventId, index: usize) -> EngineResult<()> {
        let event = self
            .events
            .get_mut(&event_id)
            .ok_or(EngineError::EventNotFound(event_id))?;
        if event.is_outcome_set {
            return Err(EngineError::OutcomeAlreadySet(event_id));
        }
        if index >= event.outcomes.len() {
            return Err(EngineError::InvalidOutcomeIndex {
                index: index as i64,
                len: event.outcomes.len(),
            });
        }
        event.is_outcome_set = true;
        event.outcome_resolution = index as i32;
        Ok(())
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            collateral_token: Address::repeat_byte(0xcc),
            description_hash: keccak256(b"will it rain tomorrow"),
            is_outcome_set: false,
            outcome_resolution: UNRESOLVED,
            outcomes: vec![
                Outcome {
                    token: Address::repeat_byte(1),
                    details: "yes".into(),
                },
                Outcome {
                    token: Address::repeat_byte(2),
                    details: "no".into(),
                },
            ],
            lp_pools: vec![PoolId(keccak256(b"pool-a")), PoolId(keccak256(b"pool-b"))],
        }
    }

    fn sample_market(event_id: EventId) -> Market {
        Market {
            stage: MarketStage::Created,
            creator: Address::repeat_byte(0xaa),
            created_at_block: 100,
            created_at: Utc::now(),
            event_id,
            oracle: Address::repeat_byte(0xbb),
            fee: 0,
            usdm_amount_at_settlement: U256::ZERO,
            usdm_claimed: U256::ZERO,
        }
    }

    #[test]
    fn event_ids_are_content_derived() {
        let a = MarketStore::derive_event_id(&sample_event());
        let b = MarketStore::derive_event_id(&sample_event());
        assert_eq!(a, b);

        let mut other = sample_event();
        other.description_hash = keccak256(b"different question");
        assert_ne!(a, MarketStore::derive_event_id(&other));
    }

    #[test]
    fn pool_lookup_round_trips() {
        let mut store = MarketStore::new();
        let event = sample_event();
        let pool = event.lp_pools[0];
        let event_id = store.insert_event(event);
        let market_id = store.insert_market(sample_market(event_id));

        assert_eq!(store.event_id_for_pool(pool).unwrap(), event_id);
        assert_eq!(store.market_id_for_event(event_id).unwrap(), market_id);
    }

    #[test]
    fn unmapped_pool_reports_event_not_found() {
        let store = MarketStore::new();
        let missing = PoolId(keccak256(b"nope"));
        match store.event_id_for_pool(missing) {
            Err(EngineError::EventNotFound(_)) => {}
            other => panic!("expected EventNotFound, got {other:?}"),
        }
    }

    #[test]
    fn stage_advances_strictly_forward() {
        let mut store = MarketStore::new();
        let event_id = store.insert_event(sample_event());
        let market_id = store.insert_market(sample_market(event_id));

        // Settling before start is rejected.
        assert_eq!(
            store.mark_resolved(market_id, U256::ZERO),
            Err(EngineError::NotStarted(market_id))
        );

        store.mark_started(market_id).unwrap();
        assert_eq!(
            store.mark_started(market_id),
            Err(EngineError::AlreadyStarted(market_id))
        );

        store.mark_resolved(market_id, U256::from(7u64)).unwrap();
        assert_eq!(store.market(market_id).unwrap().stage, MarketStage::Resolved);
        assert_eq!(
            store.market(market_id).unwrap().usdm_amount_at_settlement,
            U256::from(7u64)
        );

        // No transition out of Resolved.
        assert_eq!(
            store.mark_started(market_id),
            Err(EngineError::AlreadyStarted(market_id))
        );
        assert_eq!(
            store.mark_resolved(market_id, U256::ZERO),
            Err(EngineError::NotStarted(market_id))
        );
    }

    #[test]
    fn resolve_event_guards() {
        let mut store = MarketStore::new();
        let event_id = store.insert_event(sample_event());

        assert_eq!(
            store.resolve_event(event_id, 5),
            Err(EngineError::InvalidOutcomeIndex { index: 5, len: 2 })
        );
        store.resolve_event(event_id, 1).unwrap();
        assert_eq!(store.event(event_id).unwrap().winning_index(), Some(1));
        assert_eq!(
            store.resolve_event(event_id, 0),
            Err(EngineError::OutcomeAlreadySet(event_id))
        );
    }
}
