//! The unlock/callback adapter for atomic liquidity modification.
//!
//! The external AMM only mutates positions while "unlocked": the engine asks
//! for an unlock, the AMM immediately calls back with the request, and the
//! callback performs the modification and squares off every token delta
//! before the outer call returns. This module is a protocol-compliance shim —
//! it owns no state beyond the guard tracking the round-trip.
//!
//! Guard protocol: `Idle -> Armed` when the engine requests an unlock,
//! `Armed -> Entered` when the AMM calls back. Any other entry order is a
//! fatal protocol violation, as is a callback that never happens or a
//! position-liquidity delta that does not echo the request.

use crate::error::{EngineError, EngineResult};
use crate::interfaces::{Amm, AmmOps, TokenLedger, UnlockCallback};
use crate::lifecycle::{MarketEngine, UnlockState};
use crate::types::{BalanceDelta, LiquidityRequest, ModifyLiquidityParams, PoolKey};

impl MarketEngine {
    /// Run one liquidity modification through the AMM's unlock protocol.
    ///
    /// Pays whatever the AMM reports as owed and collects whatever it owes;
    /// the caller must have funded the engine address beforehand (seeding
    /// mints exactly the required outcome tokens).
    pub(crate) fn modify_liquidity_locked(
        &mut self,
        amm: &mut dyn Amm,
        tokens: &mut dyn TokenLedger,
        key: &PoolKey,
        params: ModifyLiquidityParams,
    ) -> EngineResult<BalanceDelta> {
        if self.unlock_state != UnlockState::Idle {
            return Err(EngineError::CallbackReentered);
        }
        self.unlock_state = UnlockState::Armed;

        let request = LiquidityRequest {
            key: key.clone(),
            params,
        };
        let result = amm.unlock(tokens, self, request);

        let entered = self.unlock_state == UnlockState::Entered;
        self.unlock_state = UnlockState::Idle;

        let delta = result?;
        if !entered {
            // The AMM returned without ever invoking the continuation.
            return Err(EngineError::UnexpectedCallback);
        }
        Ok(delta)
    }
}

impl UnlockCallback for MarketEngine {
    fn unlocked(
        &mut self,
        amm: &mut dyn AmmOps,
        tokens: &mut dyn TokenLedger,
        request: &LiquidityRequest,
    ) -> EngineResult<BalanceDelta> {
        // Exactly once, and only for an unlock this engine initiated.
        if self.unlock_state != UnlockState::Armed {
            return Err(EngineError::UnexpectedCallback);
        }
        self.unlock_state = UnlockState::Entered;

        let receipt = amm.modify_liquidity(&request.key, &request.params)?;
        if receipt.applied_liquidity_delta != request.params.liquidity_delta {
            return Err(EngineError::LiquidityMismatch {
                requested: request.params.liquidity_delta,
                applied: receipt.applied_liquidity_delta,
            });
        }

        let engine = self.config.address;
        let legs = [
            (request.key.currency0, receipt.delta.amount0),
            (request.key.currency1, receipt.delta.amount1),
        ];
        for (currency, amount) in legs {
            if amount < 0 {
                amm.settle(
                    tokens,
                    currency,
                    crate::types::leg_magnitude(amount),
                    engine,
                )?;
            } else if amount > 0 {
                amm.take(tokens, currency, crate::types::leg_magnitude(amount), engine)?;
            }
        }
        Ok(receipt.delta)
    }
}
