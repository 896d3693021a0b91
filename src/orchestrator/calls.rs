// 8.2: call assembly. each operation names its target function, its type arguments,
// and an ordered argument list: protocol-state handle, collateral-config handle,
// vault handle, position handle where applicable, asset objects, then scalar amounts.
// the deployed contract checks this shape bit-for-bit; the ledger rejects deviations,
// nothing is caught locally.

use crate::config::DeploymentConfig;
use crate::ledger::{CallArg, CallPlan, Command};
use crate::orchestrator::coins::SpendPlan;
use crate::types::{Address, BaseUnits, ObjectId};

fn protocol_args(config: &DeploymentConfig) -> Vec<CallArg> {
    vec![
        CallArg::Object(config.protocol_state_id.clone()),
        CallArg::Object(config.collateral_config_id.clone()),
        CallArg::Object(config.vault_id.clone()),
    ]
}

fn type_args(config: &DeploymentConfig) -> Vec<String> {
    vec![config.collateral_asset.0.clone()]
}

pub fn open_position(
    config: &DeploymentConfig,
    sender: Address,
    spend: &SpendPlan,
    amount: BaseUnits,
) -> CallPlan {
    let mut plan = CallPlan::new(sender);
    let coin = spend.apply(&mut plan);

    let mut args = protocol_args(config);
    args.push(coin);
    args.push(CallArg::Amount(amount));

    plan.push(Command::MoveCall {
        target: config.call_target("open_position"),
        type_args: type_args(config),
        args,
    });
    plan
}

pub fn add_collateral(
    config: &DeploymentConfig,
    sender: Address,
    position: &ObjectId,
    spend: &SpendPlan,
    amount: BaseUnits,
) -> CallPlan {
    let mut plan = CallPlan::new(sender);
    let coin = spend.apply(&mut plan);

    let mut args = protocol_args(config);
    args.push(CallArg::Object(position.clone()));
    args.push(coin);
    args.push(CallArg::Amount(amount));

    plan.push(Command::MoveCall {
        target: config.call_target("add_collateral"),
        type_args: type_args(config),
        args,
    });
    plan
}

pub fn mint(
    config: &DeploymentConfig,
    sender: Address,
    position: &ObjectId,
    amount: BaseUnits,
) -> CallPlan {
    let mut plan = CallPlan::new(sender);

    let mut args = protocol_args(config);
    args.push(CallArg::Object(position.clone()));
    args.push(CallArg::Amount(amount));

    plan.push(Command::MoveCall {
        target: config.call_target("mint"),
        type_args: type_args(config),
        args,
    });
    plan
}

pub fn burn(
    config: &DeploymentConfig,
    sender: Address,
    position: &ObjectId,
    spend: &SpendPlan,
    amount: BaseUnits,
) -> CallPlan {
    let mut plan = CallPlan::new(sender);
    // merge-then-split runs first; the burn call consumes the exact split
    let coin = spend.apply(&mut plan);

    let mut args = protocol_args(config);
    args.push(CallArg::Object(position.clone()));
    args.push(coin);
    args.push(CallArg::Amount(amount));

    plan.push(Command::MoveCall {
        target: config.call_target("burn"),
        type_args: type_args(config),
        args,
    });
    plan
}

pub fn withdraw_all(config: &DeploymentConfig, sender: Address, position: &ObjectId) -> CallPlan {
    let mut plan = CallPlan::new(sender);

    let mut args = protocol_args(config);
    args.push(CallArg::Object(position.clone()));

    plan.push(Command::MoveCall {
        target: config.call_target("withdraw_all"),
        type_args: type_args(config),
        args,
    });
    plan
}

pub fn withdraw_partial(
    config: &DeploymentConfig,
    sender: Address,
    position: &ObjectId,
    amount: BaseUnits,
) -> CallPlan {
    let mut plan = CallPlan::new(sender);

    let mut args = protocol_args(config);
    args.push(CallArg::Object(position.clone()));
    args.push(CallArg::Amount(amount));

    plan.push(Command::MoveCall {
        target: config.call_target("withdraw_partial"),
        type_args: type_args(config),
        args,
    });
    plan
}
