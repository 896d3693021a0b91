// 5.0: remote ledger capabilities. the transport is not this crate's concern: reads,
// writes and signing are traits the embedding application implements. fixture
// implementations live here too, used by tests and the sim binary.

use crate::types::{Address, AssetTag, BaseUnits, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

// 5.1: a remote object as the read capability returns it: identity, type provenance,
// and an opaque field map. the package field is what lets position discovery exclude
// objects minted by stale deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObject {
    pub id: ObjectId,
    pub type_tag: String,
    pub package: String,
    pub version: u64,
    pub fields: Value,
}

// 5.2: a spendable coin holding of one asset type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinObject {
    pub id: ObjectId,
    pub asset: AssetTag,
    pub balance: BaseUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("remote read failed: {0}")]
    RemoteReadFailed(String),

    #[error("object {0} not found")]
    NotFound(ObjectId),
}

// 5.3: read capability. every method is a suspension point.
pub trait LedgerReader: Send + Sync {
    fn get_object(&self, id: &ObjectId) -> impl Future<Output = Result<RawObject, ReadError>> + Send;

    fn get_owned_objects(
        &self,
        owner: &Address,
        type_tag: &str,
    ) -> impl Future<Output = Result<Vec<RawObject>, ReadError>> + Send;

    fn get_coins(
        &self,
        owner: &Address,
        asset: &AssetTag,
    ) -> impl Future<Output = Result<Vec<CoinObject>, ReadError>> + Send;
}

// 5.4: a mutating call, assembled locally and executed remotely as one transaction.
// commands run in order; later commands reference earlier outputs by index. the target
// string and argument order must match the deployed contract interface exactly — the
// remote ledger rejects any deviation, nothing is caught locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    Object(ObjectId),
    Amount(BaseUnits),
    Addr(Address),
    Result { command: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    MergeCoins { primary: ObjectId, sources: Vec<ObjectId> },
    SplitCoin { coin: ObjectId, amount: BaseUnits },
    MoveCall {
        target: String,
        type_args: Vec<String>,
        args: Vec<CallArg>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPlan {
    pub sender: Address,
    pub commands: Vec<Command>,
}

impl CallPlan {
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            commands: Vec::new(),
        }
    }

    // returns the index of the pushed command so callers can wire Result args
    pub fn push(&mut self, command: Command) -> usize {
        self.commands.push(command);
        self.commands.len() - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    #[error("signer rejected: {0}")]
    SignerRejected(String),

    #[error("remote write failed: {0}")]
    RemoteWriteFailed(String),
}

// 5.5: sign-and-submit capability. resolution depends on an external confirmation,
// so there is deliberately no client-side timeout here.
pub trait TxSigner: Send + Sync {
    fn sign_and_submit(&self, plan: &CallPlan) -> impl Future<Output = Result<TxReceipt, WriteError>> + Send;
}

fn recover<T>(guard: Result<T, PoisonError<T>>) -> T {
    guard.unwrap_or_else(PoisonError::into_inner)
}

// 5.6: in-memory ledger fixture. seeded by tests and the sim binary; selected over a
// live transport through DataSource in the deployment configuration.
#[derive(Debug, Default)]
pub struct FixtureLedger {
    objects: Mutex<HashMap<ObjectId, RawObject>>,
    coins: Mutex<HashMap<(Address, AssetTag), Vec<CoinObject>>>,
    unreachable: AtomicBool,
    reads: AtomicUsize,
}

impl FixtureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_object(&self, obj: RawObject) {
        recover(self.objects.lock()).insert(obj.id.clone(), obj);
    }

    pub fn remove_object(&self, id: &ObjectId) {
        recover(self.objects.lock()).remove(id);
    }

    pub fn insert_coin(&self, owner: Address, coin: CoinObject) {
        recover(self.coins.lock())
            .entry((owner, coin.asset.clone()))
            .or_default()
            .push(coin);
    }

    pub fn clear_coins(&self, owner: &Address, asset: &AssetTag) {
        recover(self.coins.lock()).remove(&(owner.clone(), asset.clone()));
    }

    // flips every read into RemoteReadFailed until cleared
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), ReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            Err(ReadError::RemoteReadFailed("fixture marked unreachable".into()))
        } else {
            Ok(())
        }
    }
}

impl LedgerReader for FixtureLedger {
    async fn get_object(&self, id: &ObjectId) -> Result<RawObject, ReadError> {
        self.check_reachable()?;
        recover(self.objects.lock())
            .get(id)
            .cloned()
            .ok_or_else(|| ReadError::NotFound(id.clone()))
    }

    async fn get_owned_objects(&self, owner: &Address, type_tag: &str) -> Result<Vec<RawObject>, ReadError> {
        self.check_reachable()?;
        let objects = recover(self.objects.lock());
        Ok(objects
            .values()
            .filter(|o| o.type_tag == type_tag)
            .filter(|o| {
                o.fields
                    .get("owner")
                    .and_then(Value::as_str)
                    .is_some_and(|a| a == owner.as_str())
            })
            .cloned()
            .collect())
    }

    async fn get_coins(&self, owner: &Address, asset: &AssetTag) -> Result<Vec<CoinObject>, ReadError> {
        self.check_reachable()?;
        Ok(recover(self.coins.lock())
            .get(&(owner.clone(), asset.clone()))
            .cloned()
            .unwrap_or_default())
    }
}

// 5.7: signer fixture. records every submitted plan so tests can assert that
// prechecks fail before anything reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerMode {
    Approve,
    Reject(String),
    RevertOnChain(String),
}

#[derive(Debug)]
pub struct FixtureSigner {
    mode: Mutex<SignerMode>,
    submitted: Mutex<Vec<CallPlan>>,
    next_digest: AtomicUsize,
}

impl FixtureSigner {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(SignerMode::Approve),
            submitted: Mutex::new(Vec::new()),
            next_digest: AtomicUsize::new(1),
        }
    }

    pub fn set_mode(&self, mode: SignerMode) {
        *recover(self.mode.lock()) = mode;
    }

    pub fn submitted_count(&self) -> usize {
        recover(self.submitted.lock()).len()
    }

    pub fn last_plan(&self) -> Option<CallPlan> {
        recover(self.submitted.lock()).last().cloned()
    }
}

impl Default for FixtureSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl TxSigner for FixtureSigner {
    async fn sign_and_submit(&self, plan: &CallPlan) -> Result<TxReceipt, WriteError> {
        match recover(self.mode.lock()).clone() {
            SignerMode::Reject(reason) => return Err(WriteError::SignerRejected(reason)),
            SignerMode::RevertOnChain(reason) => {
                // the wallet signed, the ledger reverted: the plan did reach the network
                recover(self.submitted.lock()).push(plan.clone());
                return Err(WriteError::RemoteWriteFailed(reason));
            }
            SignerMode::Approve => {}
        }

        recover(self.submitted.lock()).push(plan.clone());
        let n = self.next_digest.fetch_add(1, Ordering::SeqCst);
        Ok(TxReceipt {
            digest: format!("0xsim{n:08x}"),
        })
    }
}
