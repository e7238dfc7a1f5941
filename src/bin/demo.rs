//! End-to-end demo: initialize a two-outcome market against the in-memory
//! reference collaborators, trade both sides, settle, and claim.
//!
//! Run with `RUST_LOG=omen_engine=debug,omen_demo=info` for the full trace.

use alloy_primitives::{keccak256, Address, U256};
use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use omen_engine::testbed::{InMemoryAmm, InMemoryOracles, InMemoryTokens};
use omen_engine::{
    EngineConfig, InitializeMarket, MarketEngine, OutcomeSpec, SwapParams, TokenLedger,
};

const ONE: u128 = 1_000_000_000_000_000_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut tokens = InMemoryTokens::new();
    let mut amm = InMemoryAmm::new(Address::repeat_byte(0xAA));
    let mut oracles = InMemoryOracles::new();

    let collateral = tokens.deploy("USD Market", "USDM", 18);
    let engine_address = Address::repeat_byte(0xEE);
    let mut engine = MarketEngine::new(EngineConfig::new(engine_address, collateral));

    let creator = Address::repeat_byte(0x01);
    let alice = Address::repeat_byte(0x02);
    let bob = Address::repeat_byte(0x03);

    let init = engine.initialize_market(
        &mut amm,
        &mut tokens,
        &mut oracles,
        InitializeMarket {
            creator,
            fee: 0,
            description_hash: keccak256(b"Which team takes the final?"),
            outcomes: vec![
                OutcomeSpec {
                    name: "Team Alpha".into(),
                    details: "Alpha lifts the trophy".into(),
                },
                OutcomeSpec {
                    name: "Team Beta".into(),
                    details: "Beta lifts the trophy".into(),
                },
            ],
            seed_collateral: U256::from(100 * ONE),
            block: 1,
        },
    )?;
    info!(market = %init.market_id, pools = init.pools.len(), "market created");

    engine.start_market(init.market_id, creator)?;

    // Alice backs Alpha with 5 USDM, Bob backs Beta with 2 USDM.
    for (trader, pool_index, spend) in [(alice, 0usize, 5 * ONE), (bob, 1usize, 2 * ONE)] {
        tokens.mint(collateral, trader, U256::from(spend))?;
        let pool_id = init.pools[pool_index];
        let key = engine.pool(pool_id)?.key.clone();
        let zero_for_one = key.currency0 == collateral;
        let delta = amm.swap(
            &mut tokens,
            &mut engine,
            pool_id,
            SwapParams::exact_in(zero_for_one, spend),
            trader,
        )?;
        let price = engine.price_in_collateral(&amm, pool_id)?;
        info!(
            trader = %trader,
            pool = %pool_id,
            spend,
            ?delta,
            spot_price_1e18 = %price,
            "position opened"
        );
    }

    let pot = engine.settle(
        &mut amm,
        &mut tokens,
        &mut oracles,
        init.market_id,
        0,
        creator,
    )?;
    info!(pot = %pot, "settled in favor of Team Alpha");

    // Alice redeems almost her whole position (the strict supply bound keeps
    // the final wei unclaimable).
    let winning_token = init.outcome_tokens[0];
    let balance = tokens.balance_of(winning_token, alice);
    let claimable = engine.amount_to_claim(&tokens, init.market_id, alice)?;
    info!(balance = %balance, claimable = %claimable, "alice claim preview");

    tokens.approve(winning_token, alice, engine_address, balance)?;
    let surrender = balance - U256::from(1_000_000u64);
    let paid = engine.claim(&mut tokens, init.market_id, alice, surrender)?;
    info!(surrendered = %surrender, paid = %paid, "alice claimed");

    let market = engine.market(init.market_id)?;
    info!(
        stage = ?market.stage,
        pot = %market.usdm_amount_at_settlement,
        claimed = %market.usdm_claimed,
        "final market state"
    );
    Ok(())
}
