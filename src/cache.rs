// 7.0: protocol & position state cache. one slot per state category, each replaced
// wholesale by a refresh; nothing here patches a snapshot in place. read failures are
// absorbed: the prior snapshot stays usable and the failure lands in a visible
// last-error slot instead of propagating.

use crate::config::DeploymentConfig;
use crate::ledger::LedgerReader;
use crate::state::{Balances, CollateralConfig, CollateralPosition, ProtocolState};
use crate::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// 7.1: one snapshot slot. installs carry the sequence number of the refresh that
// produced them; a slow fetch resolving late cannot clobber a newer snapshot.
#[derive(Debug)]
struct Slot<T> {
    value: RwLock<Option<T>>,
    installed_seq: AtomicU64,
}

impl<T: Clone> Slot<T> {
    fn new() -> Self {
        Self {
            value: RwLock::new(None),
            installed_seq: AtomicU64::new(0),
        }
    }

    async fn read(&self) -> Option<T> {
        self.value.read().await.clone()
    }

    async fn install(&self, seq: u64, value: T) -> bool {
        let mut guard = self.value.write().await;
        if seq <= self.installed_seq.load(Ordering::SeqCst) && guard.is_some() {
            return false;
        }
        self.installed_seq.store(seq, Ordering::SeqCst);
        *guard = Some(value);
        true
    }
}

// 7.2: the cache. owns the read capability and the deployment wiring; exposes read
// snapshots and refreshers, never mutators.
pub struct StateCache<R> {
    ledger: Arc<R>,
    config: DeploymentConfig,
    protocol: Slot<ProtocolState>,
    collateral: Slot<CollateralConfig>,
    positions: Slot<Vec<CollateralPosition>>,
    balances: Slot<Balances>,
    refresh_seq: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl<R: LedgerReader> StateCache<R> {
    pub fn new(ledger: Arc<R>, config: DeploymentConfig) -> Self {
        Self {
            ledger,
            config,
            protocol: Slot::new(),
            collateral: Slot::new(),
            positions: Slot::new(),
            balances: Slot::new(),
            refresh_seq: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    fn next_seq(&self) -> u64 {
        self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn record_error(&self, context: &'static str, detail: String) {
        tracing::warn!(context, %detail, "remote read failed, keeping prior snapshot");
        *self.last_error.write().await = Some(format!("{context}: {detail}"));
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    // 7.3: protocol singleton plus the collateral configuration it governs; the two
    // travel together because every consumer of one wants the other.
    pub async fn refresh_protocol_state(&self) {
        let seq = self.next_seq();
        let (state_res, collateral_res) = tokio::join!(
            self.ledger.get_object(&self.config.protocol_state_id),
            self.ledger.get_object(&self.config.collateral_config_id),
        );

        match state_res.map_err(|e| e.to_string()).and_then(|obj| {
            ProtocolState::decode(&obj).map_err(|e| e.to_string())
        }) {
            Ok(state) => {
                self.protocol.install(seq, state).await;
            }
            Err(detail) => self.record_error("protocol state", detail).await,
        }

        match collateral_res.map_err(|e| e.to_string()).and_then(|obj| {
            CollateralConfig::decode(&obj).map_err(|e| e.to_string())
        }) {
            Ok(collateral) => {
                self.collateral.install(seq, collateral).await;
            }
            Err(detail) => self.record_error("collateral config", detail).await,
        }
    }

    // 7.4: position discovery. the remote answers by type tag; on top of that, any
    // object minted by a different package than the configured deployment is silently
    // excluded — legacy positions from prior deployments are unusable, not live data.
    pub async fn refresh_positions(&self, owner: &Address) {
        let seq = self.next_seq();
        let position_type = self.config.position_type();

        match self.ledger.get_owned_objects(owner, &position_type).await {
            Ok(objects) => {
                let mut positions = Vec::new();
                for obj in &objects {
                    if obj.type_tag != position_type || obj.package != self.config.package_id {
                        tracing::debug!(id = %obj.id, package = %obj.package, "excluding object from stale deployment");
                        continue;
                    }
                    match CollateralPosition::decode(obj) {
                        Ok(position) => positions.push(position),
                        Err(err) => {
                            tracing::warn!(id = %obj.id, %err, "skipping undecodable position object");
                        }
                    }
                }
                self.positions.install(seq, positions).await;
            }
            Err(err) => self.record_error("positions", err.to_string()).await,
        }
    }

    pub async fn refresh_balances(&self, owner: &Address) {
        let seq = self.next_seq();
        let (stable_res, native_res) = tokio::join!(
            self.ledger.get_coins(owner, &self.config.stable_asset),
            self.ledger.get_coins(owner, &self.config.collateral_asset),
        );

        match stable_res.and_then(|stable| native_res.map(|native| (stable, native))) {
            Ok((stable, native)) => {
                self.balances.install(seq, Balances::from_coins(&stable, &native)).await;
            }
            Err(err) => self.record_error("balances", err.to_string()).await,
        }
    }

    // 7.5: the combined refresh. constituent reads run concurrently and the call
    // resolves when all settle. without a connected identity the account-scoped
    // slices are a no-op, not an error.
    pub async fn refresh_all(&self, owner: Option<&Address>) {
        *self.last_error.write().await = None;

        match owner {
            Some(owner) => {
                tokio::join!(
                    self.refresh_protocol_state(),
                    self.refresh_positions(owner),
                    self.refresh_balances(owner),
                );
            }
            None => self.refresh_protocol_state().await,
        }
    }

    pub async fn protocol_state(&self) -> Option<ProtocolState> {
        self.protocol.read().await
    }

    pub async fn collateral_config(&self) -> Option<CollateralConfig> {
        self.collateral.read().await
    }

    pub async fn positions(&self) -> Vec<CollateralPosition> {
        self.positions.read().await.unwrap_or_default()
    }

    pub async fn balances(&self) -> Option<Balances> {
        self.balances.read().await
    }
}
