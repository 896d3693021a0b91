// cdp-core: client-side accounting core for a collateralized stablecoin protocol.
// ledger-authoritative architecture: the remote ledger is the only source of truth,
// and every mutation round-trips through it before the local view changes.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ObjectId, Address, AssetTag, BaseUnits, Bps, Timestamp
//   2.x  amount.rs: fixed-point codec between decimal strings and base units
//   3.x  metrics.rs: collateral ratio, liquidation price, USD valuation
//   4.x  state.rs: remote snapshots: protocol, collateral config, positions, balances
//   5.x  ledger.rs: read/write/sign capabilities + fixtures
//   6.x  oracle.rs: tiered price aggregation, staleness flags, rate inversion
//   7.x  cache.rs: seq-guarded snapshot slots, wholesale-replacement refresh
//   8.x  orchestrator/: spend planning, call assembly, build→sign→refresh machine
//   9.x  config.rs: injected deployment configuration, presets, env loading
//   10.x events.rs: operation phase audit trail

// read side
pub mod amount;
pub mod cache;
pub mod metrics;
pub mod oracle;
pub mod state;
pub mod types;

// write side
pub mod events;
pub mod orchestrator;

// integration modules
pub mod config;
pub mod ledger;

// re exports for convenience
pub use amount::{format_amount, parse_amount, AmountError, AMOUNT_DECIMALS};
pub use cache::StateCache;
pub use config::{ConfigError, DataSource, DeploymentConfig, OracleConfig};
pub use events::{OpEvent, OpKind, OpPhase, OperationLog};
pub use ledger::{
    CallArg, CallPlan, CoinObject, Command, FixtureLedger, FixtureSigner, LedgerReader, RawObject,
    ReadError, SignerMode, TxReceipt, TxSigner, WriteError,
};
pub use metrics::{collateral_ratio, liquidation_price, usd_value};
pub use oracle::{
    FeedError, FeedObservation, FixtureFxRates, FixturePriceFeed, FxRates, OracleAggregator,
    PriceData, PriceFeed, PriceSeries,
};
pub use orchestrator::{plan_spend, OperationReceipt, Orchestrator, OrchestratorError, SpendError, SpendPlan};
pub use state::{Balances, CollateralConfig, CollateralPosition, ProtocolState, StateError};
pub use types::{Address, AssetTag, BaseUnits, Bps, FeedId, ObjectId, Timestamp};
