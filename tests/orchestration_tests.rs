//! End-to-end orchestration scenarios against fixture capabilities.
//!
//! Each test drives the real build → sign → refresh path; the fixtures only stand in
//! for the transport, the signer, and the external feeds.

use cdp_core::*;
use serde_json::json;
use std::sync::Arc;

struct World {
    ledger: Arc<FixtureLedger>,
    signer: Arc<FixtureSigner>,
    cache: Arc<StateCache<FixtureLedger>>,
    orchestrator: Orchestrator<FixtureLedger, FixtureSigner>,
    config: DeploymentConfig,
}

fn world() -> World {
    world_with(|fields| fields)
}

fn world_with(adjust: impl Fn(serde_json::Value) -> serde_json::Value) -> World {
    let config = DeploymentConfig::devnet();
    let ledger = Arc::new(FixtureLedger::new());
    let signer = Arc::new(FixtureSigner::new());

    ledger.insert_object(RawObject {
        id: config.protocol_state_id.clone(),
        type_tag: format!("{}::cdp::ProtocolState", config.package_id),
        package: config.package_id.clone(),
        version: 1,
        fields: adjust(json!({
            "total_supply": "100000000000",
            "total_collateral_value": "250000000000",
            "global_ratio": 25000,
            "min_ratio": 15000,
            "liquidation_ratio": 12000,
            "stability_fee": 50,
            "liquidation_penalty": 1300,
            "paused": false,
        })),
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
            "debt_ceiling": "1000000000000",
            "current_debt": "100000000000",
            "active": true,
            "reference_price": "1500000000",
        }),
    });

    let cache = Arc::new(StateCache::new(ledger.clone(), config.clone()));
    let orchestrator = Orchestrator::new(ledger.clone(), signer.clone(), cache.clone(), config.clone());

    World {
        ledger,
        signer,
        cache,
        orchestrator,
        config,
    }
}

fn seed_position(world: &World, id: &str, owner: &str, collateral: &str, debt: &str) {
    world.ledger.insert_object(RawObject {
        id: ObjectId::new(id),
        type_tag: world.config.position_type(),
        package: world.config.package_id.clone(),
        version: 1,
        fields: json!({
            "owner": owner,
            "collateral": collateral,
            "debt": debt,
            "collateral_type": "GAS",
            "updated_at": 1700000000,
            "accrued_fee": "0",
        }),
    });
}

fn seed_coin(world: &World, owner: &Address, id: &str, asset: &AssetTag, balance: u128) {
    world.ledger.insert_coin(
        owner.clone(),
        CoinObject {
            id: ObjectId::new(id),
            asset: asset.clone(),
            balance: BaseUnits::new(balance),
        },
    );
}

#[tokio::test]
async fn burn_merges_both_holdings_then_splits_exact_amount() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "20000000000");

    // two stable holdings of 100 and 50 units; burn 120, leaving 30 as change
    let stable = world.config.stable_asset.clone();
    seed_coin(&world, &carol, "0xstable-a", &stable, 100_000_000_000);
    seed_coin(&world, &carol, "0xstable-b", &stable, 50_000_000_000);

    let receipt = world
        .orchestrator
        .burn(&carol, &ObjectId::new("0xpos"), "120")
        .await
        .unwrap();
    assert_eq!(receipt.kind, OpKind::Burn);

    let plan = world.signer.last_plan().unwrap();
    assert_eq!(plan.commands.len(), 3);

    let Command::MergeCoins { primary, sources } = &plan.commands[0] else {
        panic!("first command must merge the fragmented holdings");
    };
    assert_eq!(primary, &ObjectId::new("0xstable-a"));
    assert_eq!(sources, &vec![ObjectId::new("0xstable-b")]);

    let Command::SplitCoin { amount, .. } = &plan.commands[1] else {
        panic!("second command must split the exact burn amount");
    };
    assert_eq!(*amount, BaseUnits::new(120_000_000_000));

    // 150 held, 120 burned: 30 units of change stay with the caller
    let holdings = [BaseUnits::new(100_000_000_000), BaseUnits::new(50_000_000_000)];
    let total: BaseUnits = holdings.iter().sum();
    assert_eq!(total.checked_sub(BaseUnits::new(120_000_000_000)).unwrap(), BaseUnits::new(30_000_000_000));
}

#[tokio::test]
async fn burn_beyond_holdings_fails_before_any_network_call() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "20000000000");

    let stable = world.config.stable_asset.clone();
    seed_coin(&world, &carol, "0xstable-a", &stable, 100_000_000_000);
    seed_coin(&world, &carol, "0xstable-b", &stable, 50_000_000_000);

    let err = world
        .orchestrator
        .burn(&carol, &ObjectId::new("0xpos"), "151")
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));
    assert!(err.to_string().contains("insufficient balance"));
    assert_eq!(world.signer.submitted_count(), 0);
}

#[tokio::test]
async fn burn_without_holdings_reports_no_spendable_asset() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "20000000000");

    let err = world
        .orchestrator
        .burn(&carol, &ObjectId::new("0xpos"), "1")
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no spendable"));
    assert_eq!(world.signer.submitted_count(), 0);
}

#[tokio::test]
async fn confirmed_operation_observes_post_mutation_state() {
    let world = world();
    let bob = Address::new("bob");
    seed_coin(&world, &bob, "0xgas", &world.config.collateral_asset.clone(), 50_000_000_000);

    assert!(world.cache.balances().await.is_none());

    let receipt = world.orchestrator.open_position(&bob, "25").await.unwrap();

    assert_eq!(
        receipt.log.phases(),
        vec![
            OpPhase::Idle,
            OpPhase::Building,
            OpPhase::AwaitingSignature,
            OpPhase::Submitted,
            OpPhase::Confirmed,
        ]
    );

    // the unconditional refresh ran: the cache now holds authoritative balances
    let balances = world.cache.balances().await.unwrap();
    assert_eq!(balances.native, BaseUnits::new(50_000_000_000));
    assert!(world.cache.protocol_state().await.is_some());
}

#[tokio::test]
async fn signer_rejection_fails_the_operation_with_no_partial_state() {
    let world = world();
    let bob = Address::new("bob");
    seed_coin(&world, &bob, "0xgas", &world.config.collateral_asset.clone(), 50_000_000_000);
    world.signer.set_mode(SignerMode::Reject("user declined".into()));

    let err = world.orchestrator.open_position(&bob, "25").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Write(WriteError::SignerRejected(_))));
    assert_eq!(world.signer.submitted_count(), 0);
    // no refresh was triggered on failure
    assert!(world.cache.balances().await.is_none());
}

#[tokio::test]
async fn remote_revert_reason_survives_verbatim() {
    let world = world();
    let bob = Address::new("bob");
    seed_coin(&world, &bob, "0xgas", &world.config.collateral_asset.clone(), 50_000_000_000);
    world.signer.set_mode(SignerMode::RevertOnChain("E_BELOW_MIN_COLLATERAL_RATIO".into()));

    let err = world.orchestrator.open_position(&bob, "25").await.unwrap_err();

    assert!(err.to_string().contains("E_BELOW_MIN_COLLATERAL_RATIO"));
}

#[tokio::test]
async fn paused_protocol_blocks_mutations_locally() {
    let world = world_with(|mut fields| {
        fields["paused"] = json!(true);
        fields
    });
    let bob = Address::new("bob");
    seed_coin(&world, &bob, "0xgas", &world.config.collateral_asset.clone(), 50_000_000_000);

    let err = world.orchestrator.open_position(&bob, "25").await.unwrap_err();

    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));
    assert!(err.to_string().contains("paused"));
    assert_eq!(world.signer.submitted_count(), 0);
}

#[tokio::test]
async fn malformed_amount_is_rejected_before_building_a_call() {
    let world = world();
    let bob = Address::new("bob");

    let err = world.orchestrator.open_position(&bob, "12abc").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Amount(AmountError::InvalidAmount { .. })));

    let err = world.orchestrator.open_position(&bob, "0").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));

    assert_eq!(world.signer.submitted_count(), 0);
}

#[tokio::test]
async fn withdraw_all_requires_debt_fully_repaid() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "5000000000");

    let err = world
        .orchestrator
        .withdraw_all(&carol, &ObjectId::new("0xpos"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));
    assert!(err.to_string().contains("outstanding debt"));
    assert_eq!(world.signer.submitted_count(), 0);
}

#[tokio::test]
async fn withdraw_partial_is_bounded_by_position_collateral() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "0");

    let receipt = world
        .orchestrator
        .withdraw_partial(&carol, &ObjectId::new("0xpos"), "15")
        .await
        .unwrap();
    assert_eq!(receipt.kind, OpKind::WithdrawPartial);

    let err = world
        .orchestrator
        .withdraw_partial(&carol, &ObjectId::new("0xpos"), "41")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exceeds position collateral"));
}

#[tokio::test]
async fn mint_respects_the_debt_ceiling_headroom() {
    let world = world();
    let carol = Address::new("carol");
    seed_position(&world, "0xpos", "carol", "40000000000", "0");
    world.cache.refresh_all(Some(&carol)).await;

    // ceiling 1000, current debt 100: headroom is 900 units
    let err = world
        .orchestrator
        .mint(&carol, &ObjectId::new("0xpos"), "901")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));

    let receipt = world
        .orchestrator
        .mint(&carol, &ObjectId::new("0xpos"), "900")
        .await
        .unwrap();
    assert_eq!(receipt.kind, OpKind::Mint);
}

#[tokio::test]
async fn unknown_position_is_a_precheck_failure() {
    let world = world();
    let carol = Address::new("carol");

    let err = world
        .orchestrator
        .mint(&carol, &ObjectId::new("0xmissing"), "1")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::PrecheckFailed(_)));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn position_lifecycle_tracks_the_remote_ledger() {
    let world = world();
    let dave = Address::new("dave");
    seed_coin(&world, &dave, "0xgas", &world.config.collateral_asset.clone(), 100_000_000_000);

    // open: the remote mints a position; the fixture stands in for that transition
    world.orchestrator.open_position(&dave, "50").await.unwrap();
    seed_position(&world, "0xpos-dave", "dave", "50000000000", "0");

    // mint against it; the remote transition raises the position's debt
    world
        .orchestrator
        .mint(&dave, &ObjectId::new("0xpos-dave"), "20")
        .await
        .unwrap();
    world.ledger.remove_object(&ObjectId::new("0xpos-dave"));
    seed_position(&world, "0xpos-dave", "dave", "50000000000", "20000000000");

    // repay in full, then withdraw everything
    let stable = world.config.stable_asset.clone();
    seed_coin(&world, &dave, "0xstable", &stable, 20_000_000_000);
    world
        .orchestrator
        .burn(&dave, &ObjectId::new("0xpos-dave"), "20")
        .await
        .unwrap();
    world.ledger.remove_object(&ObjectId::new("0xpos-dave"));
    seed_position(&world, "0xpos-dave", "dave", "50000000000", "0");
    world.cache.refresh_positions(&dave).await;

    let receipt = world
        .orchestrator
        .withdraw_all(&dave, &ObjectId::new("0xpos-dave"))
        .await
        .unwrap();
    assert_eq!(receipt.kind, OpKind::WithdrawAll);
    assert_eq!(world.signer.submitted_count(), 4);
}
