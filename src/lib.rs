//! # omen-engine
//!
//! Settlement and accounting engine for outcome (prediction) markets whose
//! outcome tokens trade against a common collateral token in per-outcome
//! concentrated-liquidity pools on an external AMM.
//!
//! The engine:
//! - seeds each outcome pool with one-sided liquidity inside a fixed
//!   ~$0.01–$10 price band at market initialization,
//! - gates trading strictly between `start_market` and `settle` through the
//!   AMM hook surface,
//! - tracks, per pool, the circulating outcome-token supply and the
//!   collateral attributable to it, moved only by the signed swap deltas the
//!   AMM reports,
//! - resolves a market to a single winning outcome, aggregating every pool's
//!   collateral into the settlement pot, and
//! - pays holders of the winning outcome token a pro-rata share of that pot.
//!
//! The AMM, the token contracts and the oracle are external collaborators
//! behind the traits in [`interfaces`]; [`testbed`] provides in-memory
//! reference implementations for tests and the demo binary.

pub mod callback;
pub mod claim;
pub mod error;
pub mod hooks;
pub mod interfaces;
pub mod lifecycle;
pub mod liquidity;
pub mod registry;
pub mod store;
pub mod testbed;
pub mod ticks;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use interfaces::{
    Amm, AmmOps, HookPermissions, OracleHost, PoolHooks, TokenLedger, UnlockCallback,
};
pub use lifecycle::{
    EngineConfig, EngineStats, InitializeMarket, MarketEngine, MarketInit, OutcomeSpec,
};
pub use registry::{PoolRecord, PoolRegistry, ProvidedLiquidity};
pub use store::{Event, Market, MarketStage, MarketStore, Outcome};
pub use types::{
    BalanceDelta, EventId, LiquidityRequest, MarketId, ModifyLiquidityParams,
    ModifyLiquidityReceipt, PoolId, PoolKey, SwapParams,
};
