// 8.3: the operation state machine. every mutating operation follows the same path:
// Building gathers prerequisite reads and validates prechecks locally,
// AwaitingSignature hands the assembled plan to the signer (the one suspension point
// with no client-side timeout), and a successful submit is never trusted — the cache
// is refreshed unconditionally and the call resolves only after that settles.

use crate::amount::{parse_amount, AmountError};
use crate::cache::StateCache;
use crate::config::DeploymentConfig;
use crate::events::{OpKind, OpPhase, OperationLog};
use crate::ledger::{CallPlan, LedgerReader, ReadError, TxSigner, WriteError};
use crate::orchestrator::{calls, coins::plan_spend, coins::SpendError, coins::SpendPlan};
use crate::state::CollateralPosition;
use crate::types::{Address, AssetTag, BaseUnits, ObjectId};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("precheck failed: {0}")]
    PrecheckFailed(String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

// 8.3.1: what a confirmed operation hands back: the remote digest plus the full
// phase history for audit.
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    pub kind: OpKind,
    pub digest: String,
    pub log: OperationLog,
}

pub struct Orchestrator<R, S> {
    ledger: Arc<R>,
    signer: Arc<S>,
    cache: Arc<StateCache<R>>,
    config: DeploymentConfig,
}

impl<R: LedgerReader, S: TxSigner> Orchestrator<R, S> {
    pub fn new(ledger: Arc<R>, signer: Arc<S>, cache: Arc<StateCache<R>>, config: DeploymentConfig) -> Self {
        Self {
            ledger,
            signer,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<StateCache<R>> {
        &self.cache
    }

    // 8.3.2: open a new position with collateral taken from the caller's holdings.
    pub async fn open_position(
        &self,
        owner: &Address,
        collateral_amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::OpenPosition);
        log.transition(OpPhase::Building, None);

        let amount = self.parse_positive(collateral_amount)?;
        self.check_not_paused().await?;
        let spend = self.plan_asset_spend(owner, &self.config.collateral_asset, amount).await?;

        let plan = calls::open_position(&self.config, owner.clone(), &spend, amount);
        self.finalize(log, owner, plan).await
    }

    pub async fn add_collateral(
        &self,
        owner: &Address,
        position_id: &ObjectId,
        collateral_amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::AddCollateral);
        log.transition(OpPhase::Building, None);

        let amount = self.parse_positive(collateral_amount)?;
        self.check_not_paused().await?;
        self.find_position(owner, position_id).await?;
        let spend = self.plan_asset_spend(owner, &self.config.collateral_asset, amount).await?;

        let plan = calls::add_collateral(&self.config, owner.clone(), position_id, &spend, amount);
        self.finalize(log, owner, plan).await
    }

    // 8.3.3: mint stable against an existing position. the debt ceiling is checked
    // locally when a collateral-config snapshot is available; the remote check is
    // authoritative either way.
    pub async fn mint(
        &self,
        owner: &Address,
        position_id: &ObjectId,
        stable_amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::Mint);
        log.transition(OpPhase::Building, None);

        let amount = self.parse_positive(stable_amount)?;
        self.check_not_paused().await?;
        self.find_position(owner, position_id).await?;

        if let Some(collateral) = self.cache.collateral_config().await {
            if !collateral.active {
                return Err(OrchestratorError::PrecheckFailed(
                    "collateral type is not active".to_string(),
                ));
            }
            if amount > collateral.headroom() {
                return Err(OrchestratorError::PrecheckFailed(format!(
                    "debt ceiling headroom {} is below requested {}",
                    collateral.headroom(),
                    amount
                )));
            }
        }

        let plan = calls::mint(&self.config, owner.clone(), position_id, amount);
        self.finalize(log, owner, plan).await
    }

    // 8.3.4: burn stable to repay debt. the balance check runs locally over the
    // caller's holdings before anything is signed or submitted.
    pub async fn burn(
        &self,
        owner: &Address,
        position_id: &ObjectId,
        stable_amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::Burn);
        log.transition(OpPhase::Building, None);

        let amount = self.parse_positive(stable_amount)?;
        self.find_position(owner, position_id).await?;
        let spend = self.plan_asset_spend(owner, &self.config.stable_asset, amount).await?;

        let plan = calls::burn(&self.config, owner.clone(), position_id, &spend, amount);
        self.finalize(log, owner, plan).await
    }

    // 8.3.5: close out the collateral of a fully repaid position.
    pub async fn withdraw_all(
        &self,
        owner: &Address,
        position_id: &ObjectId,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::WithdrawAll);
        log.transition(OpPhase::Building, None);

        let position = self.find_position(owner, position_id).await?;
        if !position.debt.is_zero() {
            return Err(OrchestratorError::PrecheckFailed(format!(
                "outstanding debt {} must be repaid before withdrawing all collateral",
                position.debt
            )));
        }

        let plan = calls::withdraw_all(&self.config, owner.clone(), position_id);
        self.finalize(log, owner, plan).await
    }

    pub async fn withdraw_partial(
        &self,
        owner: &Address,
        position_id: &ObjectId,
        collateral_amount: &str,
    ) -> Result<OperationReceipt, OrchestratorError> {
        let mut log = OperationLog::new(OpKind::WithdrawPartial);
        log.transition(OpPhase::Building, None);

        let amount = self.parse_positive(collateral_amount)?;
        let position = self.find_position(owner, position_id).await?;
        if amount > position.collateral {
            return Err(OrchestratorError::PrecheckFailed(format!(
                "requested {} exceeds position collateral {}",
                amount, position.collateral
            )));
        }

        let plan = calls::withdraw_partial(&self.config, owner.clone(), position_id, amount);
        self.finalize(log, owner, plan).await
    }

    fn parse_positive(&self, input: &str) -> Result<BaseUnits, OrchestratorError> {
        let amount = parse_amount(input, self.config.decimals)?;
        if amount.is_zero() {
            return Err(OrchestratorError::PrecheckFailed(
                "amount must be positive".to_string(),
            ));
        }
        Ok(amount)
    }

    async fn check_not_paused(&self) -> Result<(), OrchestratorError> {
        if self.cache.protocol_state().await.is_none() {
            self.cache.refresh_protocol_state().await;
        }
        match self.cache.protocol_state().await {
            Some(state) if state.paused => Err(OrchestratorError::PrecheckFailed(
                "protocol is paused".to_string(),
            )),
            // unknown state is not a local failure; the remote check is authoritative
            _ => Ok(()),
        }
    }

    async fn find_position(
        &self,
        owner: &Address,
        position_id: &ObjectId,
    ) -> Result<CollateralPosition, OrchestratorError> {
        if let Some(position) = self
            .cache
            .positions()
            .await
            .into_iter()
            .find(|p| &p.id == position_id)
        {
            return Ok(position);
        }

        self.cache.refresh_positions(owner).await;
        self.cache
            .positions()
            .await
            .into_iter()
            .find(|p| &p.id == position_id)
            .ok_or_else(|| {
                OrchestratorError::PrecheckFailed(format!("position {position_id} not found"))
            })
    }

    async fn plan_asset_spend(
        &self,
        owner: &Address,
        asset: &AssetTag,
        amount: BaseUnits,
    ) -> Result<SpendPlan, OrchestratorError> {
        let holdings = self.ledger.get_coins(owner, asset).await?;
        plan_spend(&holdings, amount).map_err(|err| match err {
            SpendError::NoSpendableCoins => {
                OrchestratorError::PrecheckFailed(format!("no spendable {asset} found"))
            }
            other => OrchestratorError::PrecheckFailed(other.to_string()),
        })
    }

    // 8.3.6: sign, submit, then re-read authoritative state. the local view is never
    // patched optimistically; on any rejection nothing is committed.
    async fn finalize(
        &self,
        mut log: OperationLog,
        owner: &Address,
        plan: CallPlan,
    ) -> Result<OperationReceipt, OrchestratorError> {
        log.transition(OpPhase::AwaitingSignature, None);

        match self.signer.sign_and_submit(&plan).await {
            Ok(receipt) => {
                log.transition(OpPhase::Submitted, Some(receipt.digest.clone()));
                self.cache.refresh_all(Some(owner)).await;
                log.transition(OpPhase::Confirmed, None);
                tracing::info!(kind = ?log.kind(), digest = %receipt.digest, "operation confirmed");
                Ok(OperationReceipt {
                    kind: log.kind(),
                    digest: receipt.digest,
                    log,
                })
            }
            Err(err) => {
                log.transition(OpPhase::Failed, Some(err.to_string()));
                tracing::warn!(kind = ?log.kind(), %err, "operation failed");
                Err(err.into())
            }
        }
    }
}
