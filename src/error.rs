//! Engine error taxonomy.
//!
//! Every public operation is transactional: an `Err` aborts the whole call
//! and leaves no partial state behind. Errors split into four user-facing
//! groups (not-found, authorization, state, validation) plus fatal invariant
//! violations that indicate a programming error rather than bad input.
//! Nothing here is retried internally.

use alloy_primitives::{Address, U256};

use crate::types::{EventId, MarketId, PoolId};

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    // ------------------------------------------------------------------
    // Not-found
    // ------------------------------------------------------------------
    #[error("market not found: {0}")]
    MarketNotFound(MarketId),

    #[error("event not found: {0}")]
    EventNotFound(EventId),

    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------
    #[error("caller {caller} is not the creator of market {market_id}")]
    NotCreator { market_id: MarketId, caller: Address },

    #[error("caller {caller} is not authorized on oracle {oracle}")]
    NotAuthorized { oracle: Address, caller: Address },

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------
    #[error("market {0} already started")]
    AlreadyStarted(MarketId),

    #[error("market {0} not started")]
    NotStarted(MarketId),

    #[error("outcome already set for event {0}")]
    OutcomeAlreadySet(EventId),

    #[error("market {0} not resolved")]
    MarketNotResolved(MarketId),

    #[error("swaps disabled for pool {0}")]
    SwapDisabled(PoolId),

    #[error("external liquidity modification disabled for pool {0}")]
    LiquidityDisabled(PoolId),

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    #[error("invalid outcome index {index} (event has {len} outcomes)")]
    InvalidOutcomeIndex { index: i64, len: usize },

    #[error("invalid pool id: {0}")]
    InvalidPoolId(PoolId),

    #[error("invalid outcome spec: {reason}")]
    InvalidOutcomeSpec { reason: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(U256),

    #[error("amount too big: requested {requested}, limit {limit}")]
    AmountTooBig { requested: U256, limit: U256 },

    #[error("insufficient balance of {token}: needed {needed}, available {available}")]
    InsufficientBalance {
        token: Address,
        needed: U256,
        available: U256,
    },

    #[error("insufficient allowance on {token}: needed {needed}, approved {approved}")]
    InsufficientAllowance {
        token: Address,
        needed: U256,
        approved: U256,
    },

    // ------------------------------------------------------------------
    // Invariant violations (fatal: programming errors, never user errors)
    // ------------------------------------------------------------------
    #[error("position liquidity delta mismatch: requested {requested}, applied {applied}")]
    LiquidityMismatch { requested: i128, applied: i128 },

    #[error("arithmetic overflow in fixed-point math")]
    MathOverflow,

    #[error("division by zero in fixed-point math")]
    DivisionByZero,

    #[error("tick {0} outside supported range")]
    TickOutOfRange(i32),

    #[error("liquidity callback already in progress")]
    CallbackReentered,

    #[error("unlock callback invoked outside an engine-initiated unlock")]
    UnexpectedCallback,

    #[error("claim re-entered while a claim is executing")]
    ClaimReentered,
}

impl EngineError {
    /// True for errors that indicate a broken internal invariant rather than
    /// a rejected user request. These must never be swallowed.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EngineError::LiquidityMismatch { .. }
                | EngineError::MathOverflow
                | EngineError::DivisionByZero
                | EngineError::TickOutOfRange(_)
                | EngineError::CallbackReentered
                | EngineError::UnexpectedCallback
                | EngineError::ClaimReentered
        )
    }
}
