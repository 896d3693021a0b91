//! CDP client core simulation.
//!
//! Walks the accounting layer through its lifecycle against fixture capabilities:
//! read-model refresh and risk metrics, position open/mint, burn with fragmented
//! holdings, and oracle degradation through the fallback chain.

use cdp_core::*;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cdp_core=info")),
        )
        .init();

    println!("CDP Client Core Simulation");
    println!("Fixture ledger, fixture signer, fixture feeds\n");

    scenario_1_read_model_and_metrics().await;
    scenario_2_open_and_mint().await;
    scenario_3_burn_with_change().await;
    scenario_4_oracle_degradation().await;

    println!("\nAll simulations completed successfully.");
}

struct World {
    ledger: Arc<FixtureLedger>,
    signer: Arc<FixtureSigner>,
    feed: Arc<FixturePriceFeed>,
    fx: Arc<FixtureFxRates>,
    cache: Arc<StateCache<FixtureLedger>>,
    orchestrator: Orchestrator<FixtureLedger, FixtureSigner>,
    oracle: Arc<OracleAggregator<FixtureLedger, FixturePriceFeed, FixtureFxRates>>,
    config: DeploymentConfig,
}

fn seeded_world() -> World {
    let config = DeploymentConfig::devnet();
    let ledger = Arc::new(FixtureLedger::new());
    let signer = Arc::new(FixtureSigner::new());
    let feed = Arc::new(FixturePriceFeed::new());
    let fx = Arc::new(FixtureFxRates::new());

    ledger.insert_object(RawObject {
        id: config.protocol_state_id.clone(),
        type_tag: format!("{}::cdp::ProtocolState", config.package_id),
        package: config.package_id.clone(),
        version: 1,
        fields: json!({
            "total_supply": "250000000000000",
            "total_collateral_value": "600000000000000",
            "global_ratio": 24000,
            "min_ratio": 15000,
            "liquidation_ratio": 12000,
            "stability_fee": 50,
            "liquidation_penalty": 1300,
            "paused": false,
        }),
    });

    ledger.insert_object(RawObject {
        id: config.collateral_config_id.clone(),
        type_tag: format!("{}::cdp::CollateralConfig", config.package_id),
        package: config.package_id.clone(),
        version: 1,
        fields: json!({
            "name": "GAS",
            "min_ratio": 15000,
            "liquidation_threshold": 12000,
            "debt_ceiling": "1000000000000000",
            "current_debt": "250000000000000",
            "active": true,
            "reference_price": "2500000000",
        }),
    });

    let cache = Arc::new(StateCache::new(ledger.clone(), config.clone()));
    let orchestrator = Orchestrator::new(ledger.clone(), signer.clone(), cache.clone(), config.clone());
    let oracle = Arc::new(OracleAggregator::new(
        ledger.clone(),
        feed.clone(),
        fx.clone(),
        config.collateral_config_id.clone(),
        config.decimals,
        config.oracle.clone(),
    ));

    World {
        ledger,
        signer,
        feed,
        fx,
        cache,
        orchestrator,
        oracle,
        config,
    }
}

/// Refresh the read model and derive risk metrics from it.
async fn scenario_1_read_model_and_metrics() {
    println!("Scenario 1: Read Model and Risk Metrics\n");

    let world = seeded_world();
    let alice = Address::new("alice");

    world.ledger.insert_object(RawObject {
        id: ObjectId::new("0xpos-alice"),
        type_tag: world.config.position_type(),
        package: world.config.package_id.clone(),
        version: 4,
        fields: json!({
            "owner": "alice",
            "collateral": "10000000000",
            "debt": "12000000000",
            "collateral_type": "GAS",
            "updated_at": 1700000000,
            "accrued_fee": "35000000",
        }),
    });

    world.cache.refresh_all(Some(&alice)).await;

    let state = world.cache.protocol_state().await.expect("seeded");
    println!("  Protocol: supply {}, paused: {}", format_amount(state.total_supply, 9), state.paused);

    let collateral_price = world.oracle.price(PriceSeries::CollateralUsd).await;
    let peg_price = world.oracle.price(PriceSeries::PegUsd).await;
    println!("  Collateral price ${} (stale: {})", collateral_price.price,
        collateral_price.is_stale(Timestamp::now(), 300));

    for position in world.cache.positions().await {
        let ratio = position.derived_ratio(collateral_price.price, peg_price.price, 9);
        let liq = liquidation_price(position.collateral, position.debt, state.liquidation_ratio);
        println!(
            "  Position {}: collateral {}, debt {}, ratio {}%, liquidates at ${}",
            position.id,
            format_amount(position.collateral, 9),
            format_amount(position.debt, 9),
            ratio,
            liq
        );
    }
    println!();
}

/// Open a position, then mint stable against it.
async fn scenario_2_open_and_mint() {
    println!("Scenario 2: Open Position and Mint\n");

    let world = seeded_world();
    let bob = Address::new("bob");

    world.ledger.insert_coin(
        bob.clone(),
        CoinObject {
            id: ObjectId::new("0xgas-bob"),
            asset: world.config.collateral_asset.clone(),
            balance: BaseUnits::new(50_000_000_000),
        },
    );

    let receipt = world
        .orchestrator
        .open_position(&bob, "25.0")
        .await
        .expect("open position");
    println!("  open_position confirmed: {} phases {:?}", receipt.digest, receipt.log.phases());

    // the position object the remote would have minted
    world.ledger.insert_object(RawObject {
        id: ObjectId::new("0xpos-bob"),
        type_tag: world.config.position_type(),
        package: world.config.package_id.clone(),
        version: 1,
        fields: json!({
            "owner": "bob",
            "collateral": "25000000000",
            "debt": "0",
            "collateral_type": "GAS",
            "updated_at": 1700000500,
            "accrued_fee": "0",
        }),
    });

    let receipt = world
        .orchestrator
        .mint(&bob, &ObjectId::new("0xpos-bob"), "10")
        .await
        .expect("mint");
    println!("  mint confirmed: {} phases {:?}", receipt.digest, receipt.log.phases());
    println!("  signer saw {} submissions\n", world.signer.submitted_count());
}

/// Burn with fragmented holdings: merge both coins, split the exact amount.
async fn scenario_3_burn_with_change() {
    println!("Scenario 3: Burn With Fragmented Holdings\n");

    let world = seeded_world();
    let carol = Address::new("carol");

    world.ledger.insert_object(RawObject {
        id: ObjectId::new("0xpos-carol"),
        type_tag: world.config.position_type(),
        package: world.config.package_id.clone(),
        version: 2,
        fields: json!({
            "owner": "carol",
            "collateral": "40000000000",
            "debt": "20000000000",
            "collateral_type": "GAS",
            "updated_at": 1700001000,
            "accrued_fee": "0",
        }),
    });

    for (id, balance) in [("0xstable-1", 10_000_000_000u128), ("0xstable-2", 5_000_000_000)] {
        world.ledger.insert_coin(
            carol.clone(),
            CoinObject {
                id: ObjectId::new(id),
                asset: world.config.stable_asset.clone(),
                balance: BaseUnits::new(balance),
            },
        );
    }

    // holdings are 10 + 5, burn 12: merge then split, 3 left as change
    let receipt = world
        .orchestrator
        .burn(&carol, &ObjectId::new("0xpos-carol"), "12")
        .await
        .expect("burn");
    println!("  burn confirmed: {}", receipt.digest);

    let plan = world.signer.last_plan().expect("plan submitted");
    for (i, command) in plan.commands.iter().enumerate() {
        match command {
            Command::MergeCoins { sources, .. } => {
                println!("  command {i}: merge {} source(s) into primary", sources.len())
            }
            Command::SplitCoin { amount, .. } => {
                println!("  command {i}: split exactly {} out", format_amount(*amount, 9))
            }
            Command::MoveCall { target, .. } => println!("  command {i}: call {target}"),
        }
    }

    // requesting more than held fails before anything reaches the signer
    let before = world.signer.submitted_count();
    let err = world
        .orchestrator
        .burn(&carol, &ObjectId::new("0xpos-carol"), "99")
        .await
        .expect_err("insufficient balance");
    println!("  burn 99 rejected locally: {err}");
    assert_eq!(world.signer.submitted_count(), before);
    println!();
}

/// Walk the oracle through its fallback chain.
async fn scenario_4_oracle_degradation() {
    println!("Scenario 4: Oracle Degradation\n");

    let world = seeded_world();

    world.feed.set_observation(
        FeedId::new("feed-peg-usd"),
        FeedObservation { price: 108_000_000, expo: -8, conf: 21_000, publish_time: Timestamp::now().as_secs() },
    );
    let data = world.oracle.refresh(PriceSeries::PegUsd).await;
    println!("  feed up: peg ${} ± {}", data.price, data.confidence);

    world.feed.set_healthy(false);
    world.fx.set_rate("EUR", dec!(0.92));
    let data = world.oracle.refresh(PriceSeries::PegUsd).await;
    println!("  feed down, fx up: peg ${} (inverted from 0.92)", data.price.round_dp(6));

    world.fx.set_healthy(false);
    let data = world.oracle.refresh(PriceSeries::PegUsd).await;
    println!(
        "  everything down: peg ${} stale: {}",
        data.price,
        data.is_stale(Timestamp::now(), 300)
    );

    // the periodic poller runs independently of any inflight mutation; its first
    // tick fires immediately
    let poller = tokio::spawn(world.oracle.clone().poll_loop());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    poller.abort();
    println!("  background poller ticked and was shut down");
}
