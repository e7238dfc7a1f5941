//! In-memory reference implementations of the external collaborators: a
//! fungible-token ledger, an oracle host and a single-position
//! concentrated-liquidity AMM.
//!
//! These back the test suite and the demo binary. The AMM is deliberately
//! narrow — exact-input swaps inside the engine's one seeded range, the
//! unlock protocol enforced on every liquidity modification — but its sqrt
//! price arithmetic is the real thing, mirrored off the same Q96 helpers the
//! engine uses, so settle/take amounts reconcile to the wei.

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, U256};

use crate::error::{EngineError, EngineResult};
use crate::interfaces::{Amm, AmmOps, OracleHost, PoolHooks, TokenLedger, UnlockCallback};
use crate::liquidity::{amount0_for_liquidity, amount1_for_liquidity, mul_div, Q96};
use crate::ticks::sqrt_price_x96_at_tick;
use crate::types::{
    BalanceDelta, EventId, LiquidityRequest, MarketId, ModifyLiquidityParams,
    ModifyLiquidityReceipt, PoolId, PoolKey, SwapParams,
};

// =============================================================================
// TOKEN LEDGER
// =============================================================================

#[derive(Debug, Clone, Default)]
struct TokenState {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    /// (owner, spender) -> remaining allowance.
    allowances: HashMap<(Address, Address), U256>,
}

/// Standard fungible-token semantics over an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    tokens: HashMap<Address, TokenState>,
    deploy_nonce: u64,
}

impl InMemoryTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_meta(&self, token: Address) -> Option<(String, String, u8)> {
        self.tokens
            .get(&token)
            .map(|s| (s.name.clone(), s.symbol.clone(), s.decimals))
    }

    pub fn total_supply(&self, token: Address) -> U256 {
        self.tokens
            .get(&token)
            .map(|s| s.total_supply)
            .unwrap_or_default()
    }
}

impl TokenLedger for InMemoryTokens {
    fn deploy(&mut self, name: &str, symbol: &str, decimals: u8) -> Address {
        self.deploy_nonce += 1;
        let mut buf = Vec::with_capacity(5 + 8 + name.len());
        buf.extend_from_slice(b"token");
        buf.extend_from_slice(&self.deploy_nonce.to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        let digest = keccak256(&buf);
        let address = Address::from_slice(&digest[12..]);
        self.tokens.insert(
            address,
            TokenState {
                name: name.to_string(),
                symbol: symbol.to_string(),
                decimals,
                ..TokenState::default()
            },
        );
        address
    }

    fn mint(&mut self, token: Address, to: Address, amount: U256) -> EngineResult<()> {
        let state = self.tokens.entry(token).or_default();
        let balance = state.balances.entry(to).or_default();
        *balance = balance.checked_add(amount).ok_or(EngineError::MathOverflow)?;
        state.total_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow)?;
        Ok(())
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EngineResult<()> {
        let state = self.tokens.entry(token).or_default();
        let available = state.balances.get(&from).copied().unwrap_or_default();
        if available < amount {
            return Err(EngineError::InsufficientBalance {
                token,
                needed: amount,
                available,
            });
        }
        state.balances.insert(from, available - amount);
        let to_balance = state.balances.entry(to).or_default();
        *to_balance = to_balance
            .checked_add(amount)
            .ok_or(EngineError::MathOverflow)?;
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> EngineResult<()> {
        let state = self.tokens.entry(token).or_default();
        let key = (from, spender);
        let approved = state.allowances.get(&key).copied().unwrap_or_default();
        if approved < amount {
            return Err(EngineError::InsufficientAllowance {
                token,
                needed: amount,
                approved,
            });
        }
        if approved != U256::MAX {
            state.allowances.insert(key, approved - amount);
        }
        self.transfer(token, from, to, amount)
    }

    fn approve(
        &mut self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> EngineResult<()> {
        let state = self.tokens.entry(token).or_default();
        state.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|s| s.allowances.get(&(owner, spender)))
            .copied()
            .unwrap_or_default()
    }

    fn balance_of(&self, token: Address, owner: Address) -> U256 {
        self.tokens
            .get(&token)
            .and_then(|s| s.balances.get(&owner))
            .copied()
            .unwrap_or_default()
    }

    fn decimals(&self, token: Address) -> u8 {
        self.tokens.get(&token).map(|s| s.decimals).unwrap_or(18)
    }
}

// =============================================================================
// ORACLE HOST
// =============================================================================

#[derive(Debug, Clone)]
struct OracleState {
    market_id: MarketId,
    authorized: Address,
    outcome: Option<u32>,
}

/// One judge instance per market; only the authorized identity may record.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOracles {
    oracles: HashMap<Address, OracleState>,
    deploy_nonce: u64,
}

impl InMemoryOracles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn market_of(&self, oracle: Address) -> Option<MarketId> {
        self.oracles.get(&oracle).map(|s| s.market_id)
    }
}

impl OracleHost for InMemoryOracles {
    fn deploy(&mut self, market_id: MarketId, authorized: Address) -> Address {
        self.deploy_nonce += 1;
        let mut buf = Vec::with_capacity(6 + 8 + 32);
        buf.extend_from_slice(b"oracle");
        buf.extend_from_slice(&self.deploy_nonce.to_be_bytes());
        buf.extend_from_slice(market_id.0.as_slice());
        let digest = keccak256(&buf);
        let address = Address::from_slice(&digest[12..]);
        self.oracles.insert(
            address,
            OracleState {
                market_id,
                authorized,
                outcome: None,
            },
        );
        address
    }

    fn set_outcome(&mut self, oracle: Address, caller: Address, index: u32) -> EngineResult<()> {
        let state = self
            .oracles
            .get_mut(&oracle)
            .ok_or(EngineError::NotAuthorized { oracle, caller })?;
        if state.authorized != caller {
            return Err(EngineError::NotAuthorized { oracle, caller });
        }
        if state.outcome.is_some() {
            return Err(EngineError::OutcomeAlreadySet(EventId(state.market_id.0)));
        }
        state.outcome = Some(index);
        Ok(())
    }

    fn outcome(&self, oracle: Address) -> EngineResult<Option<u32>> {
        Ok(self.oracles.get(&oracle).and_then(|s| s.outcome))
    }

    fn is_outcome_set(&self, oracle: Address) -> bool {
        self.oracles
            .get(&oracle)
            .map(|s| s.outcome.is_some())
            .unwrap_or(false)
    }
}

// =============================================================================
// AMM
// =============================================================================

/// A single liquidity position (the engine's seed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

/// Per-pool state: price, the one position, and exact token inventories.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub key: PoolKey,
    pub sqrt_price_x96: U256,
    pub position: Option<Position>,
    pub balance0: U256,
    pub balance1: U256,
}

/// Reference concentrated-liquidity AMM: one position per pool, exact-input
/// swaps within that position's range, unlock-gated liquidity modification.
#[derive(Debug)]
pub struct InMemoryAmm {
    address: Address,
    pools: HashMap<PoolId, PoolState>,
    unlocking: bool,
    active_pool: Option<PoolId>,
}

/// One-sided/in-range token amounts a liquidity delta moves, given where the
/// current price sits relative to the range.
fn amounts_for(
    sqrt_price: U256,
    liquidity: u128,
    sqrt_lower: U256,
    sqrt_upper: U256,
) -> EngineResult<(U256, U256)> {
    if sqrt_price <= sqrt_lower {
        Ok((amount0_for_liquidity(liquidity, sqrt_lower, sqrt_upper)?, U256::ZERO))
    } else if sqrt_price >= sqrt_upper {
        Ok((U256::ZERO, amount1_for_liquidity(liquidity, sqrt_lower, sqrt_upper)?))
    } else {
        Ok((
            amount0_for_liquidity(liquidity, sqrt_price, sqrt_upper)?,
            amount1_for_liquidity(liquidity, sqrt_lower, sqrt_price)?,
        ))
    }
}

fn to_i128(v: U256) -> EngineResult<i128> {
    let small = u128::try_from(v).map_err(|_| EngineError::MathOverflow)?;
    i128::try_from(small).map_err(|_| EngineError::MathOverflow)
}

impl InMemoryAmm {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pools: HashMap::new(),
            unlocking: false,
            active_pool: None,
        }
    }

    pub fn pool_state(&self, pool_id: PoolId) -> EngineResult<&PoolState> {
        self.pools
            .get(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))
    }

    /// Execute an exact-input swap for `sender`, invoking the pool hooks
    /// around it. Swaps that would exit the seeded range are rejected with
    /// the remaining capacity as the limit.
    pub fn swap(
        &mut self,
        tokens: &mut dyn TokenLedger,
        hooks: &mut dyn PoolHooks,
        pool_id: PoolId,
        params: SwapParams,
        sender: Address,
    ) -> EngineResult<BalanceDelta> {
        if !self.pools.contains_key(&pool_id) {
            return Err(EngineError::PoolNotFound(pool_id));
        }
        hooks.before_swap(pool_id, &params, sender)?;

        if !params.is_exact_input() {
            return Err(EngineError::InvalidAmount(U256::from(
                params.amount_specified.unsigned_abs(),
            )));
        }
        let amount_in_raw = params.amount_specified.unsigned_abs();
        let amount_in = U256::from(amount_in_raw);

        let (key, sqrt_price, position) = {
            let pool = self
                .pools
                .get(&pool_id)
                .ok_or(EngineError::PoolNotFound(pool_id))?;
            (pool.key.clone(), pool.sqrt_price_x96, pool.position.clone())
        };
        let position = position.ok_or(EngineError::AmountTooBig {
            requested: amount_in,
            limit: U256::ZERO,
        })?;
        let sqrt_lower = sqrt_price_x96_at_tick(position.tick_lower)?;
        let sqrt_upper = sqrt_price_x96_at_tick(position.tick_upper)?;
        let liquidity = U256::from(position.liquidity);
        if liquidity.is_zero() {
            return Err(EngineError::AmountTooBig {
                requested: amount_in,
                limit: U256::ZERO,
            });
        }

        // Input fee accrues to the pool (the sole LP), not to a separate sink.
        let fee_amount = mul_div(amount_in, U256::from(key.fee), U256::from(1_000_000u32))?;
        let effective_in = amount_in - fee_amount;

        let (new_sqrt, amount_out, input_is_currency0) = if params.zero_for_one {
            // currency0 in, price falls toward the lower band edge.
            let current = sqrt_price.min(sqrt_upper);
            if current <= sqrt_lower {
                return Err(EngineError::AmountTooBig {
                    requested: amount_in,
                    limit: U256::ZERO,
                });
            }
            let lq = liquidity.checked_mul(Q96).ok_or(EngineError::MathOverflow)?;
            let in_sqrt = effective_in
                .checked_mul(current)
                .ok_or(EngineError::MathOverflow)?;
            let denominator = lq.checked_add(in_sqrt).ok_or(EngineError::MathOverflow)?;
            let new_sqrt = mul_div(lq, current, denominator)?;
            if new_sqrt < sqrt_lower {
                let capacity = amount0_for_liquidity(position.liquidity, sqrt_lower, current)?;
                return Err(EngineError::AmountTooBig {
                    requested: amount_in,
                    limit: capacity,
                });
            }
            let out = mul_div(liquidity, current - new_sqrt, Q96)?;
            (new_sqrt, out, true)
        } else {
            // currency1 in, price rises toward the upper band edge.
            let current = sqrt_price.max(sqrt_lower);
            if current >= sqrt_upper {
                return Err(EngineError::AmountTooBig {
                    requested: amount_in,
                    limit: U256::ZERO,
                });
            }
            let delta_sqrt = mul_div(effective_in, Q96, liquidity)?;
            let new_sqrt = current
                .checked_add(delta_sqrt)
                .ok_or(EngineError::MathOverflow)?;
            if new_sqrt > sqrt_upper {
                let capacity = amount1_for_liquidity(position.liquidity, current, sqrt_upper)?;
                return Err(EngineError::AmountTooBig {
                    requested: amount_in,
                    limit: capacity,
                });
            }
            let lq = liquidity.checked_mul(Q96).ok_or(EngineError::MathOverflow)?;
            let denominator = current
                .checked_mul(new_sqrt)
                .ok_or(EngineError::MathOverflow)?;
            let out = mul_div(lq, new_sqrt - current, denominator)?;
            (new_sqrt, out, false)
        };

        let (input_currency, output_currency) = if input_is_currency0 {
            (key.currency0, key.currency1)
        } else {
            (key.currency1, key.currency0)
        };

        // Pull the input first (fails cleanly if the sender is underfunded),
        // then commit pool state, then pay out.
        tokens.transfer(input_currency, sender, self.address, amount_in)?;
        {
            let pool = self
                .pools
                .get_mut(&pool_id)
                .ok_or(EngineError::PoolNotFound(pool_id))?;
            pool.sqrt_price_x96 = new_sqrt;
            if input_is_currency0 {
                pool.balance0 = pool
                    .balance0
                    .checked_add(amount_in)
                    .ok_or(EngineError::MathOverflow)?;
                pool.balance1 = pool
                    .balance1
                    .checked_sub(amount_out)
                    .ok_or(EngineError::MathOverflow)?;
            } else {
                pool.balance1 = pool
                    .balance1
                    .checked_add(amount_in)
                    .ok_or(EngineError::MathOverflow)?;
                pool.balance0 = pool
                    .balance0
                    .checked_sub(amount_out)
                    .ok_or(EngineError::MathOverflow)?;
            }
        }
        tokens.transfer(output_currency, self.address, sender, amount_out)?;

        let out_leg = to_i128(amount_out)?;
        let in_leg = i128::try_from(amount_in_raw).map_err(|_| EngineError::MathOverflow)?;
        let delta = if input_is_currency0 {
            BalanceDelta::new(-in_leg, out_leg)
        } else {
            BalanceDelta::new(out_leg, -in_leg)
        };

        hooks.after_swap(pool_id, &params, &delta)?;
        Ok(delta)
    }
}

impl AmmOps for InMemoryAmm {
    fn modify_liquidity(
        &mut self,
        key: &PoolKey,
        params: &ModifyLiquidityParams,
    ) -> EngineResult<ModifyLiquidityReceipt> {
        let pool_id = key.id();
        if !self.unlocking {
            return Err(EngineError::LiquidityDisabled(pool_id));
        }
        if params.tick_lower >= params.tick_upper {
            return Err(EngineError::TickOutOfRange(params.tick_lower));
        }
        let sqrt_lower = sqrt_price_x96_at_tick(params.tick_lower)?;
        let sqrt_upper = sqrt_price_x96_at_tick(params.tick_upper)?;
        let pool = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))?;

        let delta = if params.liquidity_delta >= 0 {
            let add = params.liquidity_delta.unsigned_abs();
            match &mut pool.position {
                Some(pos)
                    if pos.tick_lower == params.tick_lower
                        && pos.tick_upper == params.tick_upper =>
                {
                    pos.liquidity = pos
                        .liquidity
                        .checked_add(add)
                        .ok_or(EngineError::MathOverflow)?;
                }
                // The reference AMM carries a single position per pool.
                Some(_) => return Err(EngineError::LiquidityDisabled(pool_id)),
                None => {
                    pool.position = Some(Position {
                        tick_lower: params.tick_lower,
                        tick_upper: params.tick_upper,
                        liquidity: add,
                    });
                }
            }
            let (owed0, owed1) = amounts_for(pool.sqrt_price_x96, add, sqrt_lower, sqrt_upper)?;
            BalanceDelta::new(-to_i128(owed0)?, -to_i128(owed1)?)
        } else {
            let remove = params.liquidity_delta.unsigned_abs();
            let position = pool.position.as_mut().ok_or(EngineError::LiquidityMismatch {
                requested: params.liquidity_delta,
                applied: 0,
            })?;
            if position.tick_lower != params.tick_lower
                || position.tick_upper != params.tick_upper
                || position.liquidity < remove
            {
                return Err(EngineError::LiquidityMismatch {
                    requested: params.liquidity_delta,
                    applied: 0,
                });
            }
            position.liquidity -= remove;
            let emptied = position.liquidity == 0;
            let (out0, out1) = if emptied {
                // Sole LP leaving: sweep the exact inventories, fees and
                // rounding dust included, so nothing strands in the pool.
                (pool.balance0, pool.balance1)
            } else {
                amounts_for(pool.sqrt_price_x96, remove, sqrt_lower, sqrt_upper)?
            };
            if emptied {
                pool.position = None;
            }
            BalanceDelta::new(to_i128(out0)?, to_i128(out1)?)
        };

        Ok(ModifyLiquidityReceipt {
            delta,
            applied_liquidity_delta: params.liquidity_delta,
        })
    }

    fn settle(
        &mut self,
        tokens: &mut dyn TokenLedger,
        currency: Address,
        amount: U256,
        payer: Address,
    ) -> EngineResult<()> {
        let pool_id = self.active_pool.ok_or(EngineError::UnexpectedCallback)?;
        tokens.transfer(currency, payer, self.address, amount)?;
        let pool = self
            .pools
            .get_mut(&pool_id)
            .ok_or(EngineError::PoolNotFound(pool_id))?;
        if currency == pool.key.currency0 {
            pool.balance0 = pool
                .balance0
                .checked_add(amount)
                .ok_or(EngineError::MathOverflow)?;
        } else if currency == pool.key.currency1 {
            pool.balance1 = pool
                .balance1
                .checked_add(amount)
                .ok_or(EngineError::MathOverflow)?;
        } else {
            return Err(EngineError::InvalidPoolId(pool_id));
        }
        Ok(())
    }

    fn take(
        &mut self,
        tokens: &mut dyn TokenLedger,
        currency: Address,
        amount: U256,
        recipient: Address,
    ) -> EngineResult<()> {
        let pool_id = self.active_pool.ok_or(EngineError::UnexpectedCallback)?;
        {
            let pool = self
                .pools
                .get_mut(&pool_id)
                .ok_or(EngineError::PoolNotFound(pool_id))?;
            if currency == pool.key.currency0 {
                pool.balance0 = pool
                    .balance0
                    .checked_sub(amount)
                    .ok_or(EngineError::MathOverflow)?;
            } else if currency == pool.key.currency1 {
                pool.balance1 = pool
                    .balance1
                    .checked_sub(amount)
                    .ok_or(EngineError::MathOverflow)?;
            } else {
                return Err(EngineError::InvalidPoolId(pool_id));
            }
        }
        tokens.transfer(currency, self.address, recipient, amount)
    }

    fn address(&self) -> Address {
        self.address
    }
}

impl Amm for InMemoryAmm {
    fn create_pool(&mut self, key: &PoolKey, initial_sqrt_price_x96: U256) -> EngineResult<()> {
        let pool_id = key.id();
        if self.pools.contains_key(&pool_id) {
            return Err(EngineError::InvalidPoolId(pool_id));
        }
        if initial_sqrt_price_x96.is_zero() {
            return Err(EngineError::InvalidAmount(initial_sqrt_price_x96));
        }
        self.pools.insert(
            pool_id,
            PoolState {
                key: key.clone(),
                sqrt_price_x96: initial_sqrt_price_x96,
                position: None,
                balance0: U256::ZERO,
                balance1: U256::ZERO,
            },
        );
        Ok(())
    }

    fn sqrt_price_x96(&self, pool_id: PoolId) -> EngineResult<U256> {
        Ok(self.pool_state(pool_id)?.sqrt_price_x96)
    }

    fn liquidity(&self, pool_id: PoolId) -> EngineResult<u128> {
        Ok(self
            .pool_state(pool_id)?
            .position
            .as_ref()
            .map(|p| p.liquidity)
            .unwrap_or(0))
    }

    fn unlock(
        &mut self,
        tokens: &mut dyn TokenLedger,
        callback: &mut dyn UnlockCallback,
        request: LiquidityRequest,
    ) -> EngineResult<BalanceDelta> {
        if self.unlocking {
            return Err(EngineError::CallbackReentered);
        }
        self.unlocking = true;
        self.active_pool = Some(request.key.id());
        let result = callback.unlocked(self, tokens, &request);
        self.unlocking = false;
        self.active_pool = None;
        result
    }
}

// =============================================================================
// TESTS
// =============================================================================
