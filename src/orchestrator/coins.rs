// 8.1: spend planning over coin holdings. the remote spend call takes exactly one
// asset object, so fragmented holdings are merged into a primary first and the exact
// amount split out second. merge-then-split ordering is a hard precondition of the
// remote call; nothing here may reorder it.

use crate::ledger::{CallArg, CallPlan, CoinObject, Command};
use crate::types::{BaseUnits, ObjectId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpendError {
    #[error("no spendable asset found")]
    NoSpendableCoins,

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: BaseUnits,
        available: BaseUnits,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendPlan {
    pub primary: ObjectId,
    pub merge_sources: Vec<ObjectId>,
    // None when the consolidated balance matches the amount exactly
    pub split_amount: Option<BaseUnits>,
    pub total: BaseUnits,
}

impl SpendPlan {
    pub fn change(&self, amount: BaseUnits) -> BaseUnits {
        self.total.checked_sub(amount).unwrap_or(BaseUnits::ZERO)
    }

    // 8.1.1: append the merge/split commands to a plan and return the argument that
    // names the spendable object for the subsequent contract call.
    pub fn apply(&self, plan: &mut CallPlan) -> CallArg {
        if !self.merge_sources.is_empty() {
            plan.push(Command::MergeCoins {
                primary: self.primary.clone(),
                sources: self.merge_sources.clone(),
            });
        }

        match self.split_amount {
            Some(amount) => {
                let command = plan.push(Command::SplitCoin {
                    coin: self.primary.clone(),
                    amount,
                });
                CallArg::Result { command }
            }
            None => CallArg::Object(self.primary.clone()),
        }
    }
}

// 8.1.2: validate the holdings against the requested amount. both failure modes are
// prechecks: they must surface before anything reaches the network.
pub fn plan_spend(coins: &[CoinObject], amount: BaseUnits) -> Result<SpendPlan, SpendError> {
    let (first, rest) = coins.split_first().ok_or(SpendError::NoSpendableCoins)?;

    let total: BaseUnits = coins.iter().map(|c| c.balance).sum();
    if total < amount {
        return Err(SpendError::InsufficientBalance {
            requested: amount,
            available: total,
        });
    }

    Ok(SpendPlan {
        primary: first.id.clone(),
        merge_sources: rest.iter().map(|c| c.id.clone()).collect(),
        split_amount: (total != amount).then_some(amount),
        total,
    })
}
