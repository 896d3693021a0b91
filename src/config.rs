// 9.0: deployment wiring in one place. package and object ids, asset tags, feed ids,
// precision, polling cadence. all of it is injected: the core modules never hardcode
// an identifier, and the fixture/live split is an explicit selector here rather than
// something inferred from ambient environment state.

use crate::types::{AssetTag, FeedId, ObjectId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// 9.1: which data source backs the capabilities. Fixture is the seeded in-memory
// ledger/signer/feeds; Live is whatever transport the embedding application wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Fixture,
}

// 9.2: oracle settings. staleness window and poll cadence are protocol constants in
// practice but still travel through config so tests can tighten them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    pub collateral_feed: FeedId,
    pub peg_feed: FeedId,
    // currency code used against the exchange-rate API, e.g. "EUR"
    pub peg_currency: String,
    pub fallback_collateral_price: Decimal,
    pub fallback_peg_price: Decimal,
    pub staleness_secs: i64,
    pub poll_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            collateral_feed: FeedId::new("feed-collateral-usd"),
            peg_feed: FeedId::new("feed-peg-usd"),
            peg_currency: "EUR".to_string(),
            fallback_collateral_price: dec!(1),
            fallback_peg_price: dec!(1),
            staleness_secs: 300,
            poll_secs: 30,
        }
    }
}

// 9.3: the full deployment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub package_id: String,
    pub protocol_state_id: ObjectId,
    pub collateral_config_id: ObjectId,
    pub vault_id: ObjectId,
    pub stable_asset: AssetTag,
    pub collateral_asset: AssetTag,
    // fixed decimal precision of all base-unit amounts
    pub decimals: u32,
    pub data_source: DataSource,
    pub oracle: OracleConfig,
}

impl DeploymentConfig {
    // fully qualified type tag of live position objects; discovery filters on this
    // AND on the originating package, so stale deployments drop out silently.
    pub fn position_type(&self) -> String {
        format!("{}::cdp::Position", self.package_id)
    }

    pub fn call_target(&self, function: &str) -> String {
        format!("{}::cdp::{function}", self.package_id)
    }

    // Fixture-backed preset used by tests and the sim binary
    pub fn devnet() -> Self {
        Self {
            package_id: "0xcdp".to_string(),
            protocol_state_id: ObjectId::new("0xstate"),
            collateral_config_id: ObjectId::new("0xccfg"),
            vault_id: ObjectId::new("0xvault"),
            stable_asset: AssetTag::new("0xcdp::stable::STABLE"),
            collateral_asset: AssetTag::new("0x2::gas::GAS"),
            decimals: 9,
            data_source: DataSource::Fixture,
            oracle: OracleConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package_id.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "package id must not be empty".to_string(),
            });
        }

        // Decimal::new(1, scale) caps at 28; stay well inside it
        if self.decimals == 0 || self.decimals > 18 {
            return Err(ConfigError::Invalid {
                reason: format!("decimals {} outside supported range 1..=18", self.decimals),
            });
        }

        if self.oracle.staleness_secs <= 0 {
            return Err(ConfigError::Invalid {
                reason: "staleness window must be positive".to_string(),
            });
        }

        if self.oracle.poll_secs == 0 {
            return Err(ConfigError::Invalid {
                reason: "poll interval must be positive".to_string(),
            });
        }

        if self.oracle.fallback_collateral_price <= Decimal::ZERO
            || self.oracle.fallback_peg_price <= Decimal::ZERO
        {
            return Err(ConfigError::Invalid {
                reason: "fallback prices must be positive".to_string(),
            });
        }

        Ok(())
    }

    // 9.4: environment loading, CDP_* variables. `.env` is honored when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            package_id: require("CDP_PACKAGE_ID")?,
            protocol_state_id: ObjectId::new(require("CDP_PROTOCOL_STATE_ID")?),
            collateral_config_id: ObjectId::new(require("CDP_COLLATERAL_CONFIG_ID")?),
            vault_id: ObjectId::new(require("CDP_VAULT_ID")?),
            stable_asset: AssetTag::new(require("CDP_STABLE_ASSET")?),
            collateral_asset: AssetTag::new(require("CDP_COLLATERAL_ASSET")?),
            decimals: optional_parsed("CDP_DECIMALS", 9)?,
            data_source: match optional("CDP_DATA_SOURCE", "live").as_str() {
                "live" => DataSource::Live,
                "fixture" => DataSource::Fixture,
                other => {
                    return Err(ConfigError::InvalidVar {
                        name: "CDP_DATA_SOURCE",
                        value: other.to_string(),
                    })
                }
            },
            oracle: OracleConfig {
                collateral_feed: FeedId::new(require("CDP_COLLATERAL_FEED_ID")?),
                peg_feed: FeedId::new(require("CDP_PEG_FEED_ID")?),
                peg_currency: optional("CDP_PEG_CURRENCY", "EUR"),
                fallback_collateral_price: optional_parsed("CDP_FALLBACK_COLLATERAL_PRICE", dec!(1))?,
                fallback_peg_price: optional_parsed("CDP_FALLBACK_PEG_PRICE", dec!(1))?,
                staleness_secs: optional_parsed("CDP_STALENESS_SECS", 300)?,
                poll_secs: optional_parsed("CDP_POLL_SECS", 30)?,
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar { name })
}

fn optional(name: &'static str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
            name,
            value: raw,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {name}")]
    MissingVar { name: &'static str },

    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidVar { name: &'static str, value: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}
