// 8.0 orchestrator/: mutating operations against the remote ledger. split the same
// way the read side is: coins.rs plans how holdings are spent, calls.rs assembles the
// exact remote calls, ops.rs runs the build → sign → refresh state machine.

pub mod calls;
pub mod coins;
pub mod ops;

pub use coins::{plan_spend, SpendError, SpendPlan};
pub use ops::{OperationReceipt, Orchestrator, OrchestratorError};
