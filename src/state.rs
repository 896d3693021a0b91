// 4.0: read-model snapshots of remote protocol state. every struct here is an
// immutable snapshot replaced wholesale on refresh; nothing in this layer mutates a
// field in place. decoding is tolerant about integers arriving as JSON numbers or
// strings, because u64+ amounts are quoted on the wire.

use crate::metrics;
use crate::ledger::{CoinObject, RawObject};
use crate::types::{Address, BaseUnits, Bps, ObjectId, Timestamp};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("object {id}: missing field {name:?}")]
    MissingField { id: ObjectId, name: &'static str },

    #[error("object {id}: malformed field {name:?}")]
    MalformedField { id: ObjectId, name: &'static str },
}

fn field<'a>(obj: &'a RawObject, name: &'static str) -> Result<&'a Value, StateError> {
    obj.fields.get(name).ok_or(StateError::MissingField {
        id: obj.id.clone(),
        name,
    })
}

fn field_units(obj: &RawObject, name: &'static str) -> Result<BaseUnits, StateError> {
    let value = field(obj, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_u64().map(|v| v as u128),
        Value::String(s) => s.parse::<u128>().ok(),
        _ => None,
    };
    parsed.map(BaseUnits::new).ok_or(StateError::MalformedField {
        id: obj.id.clone(),
        name,
    })
}

fn field_bps(obj: &RawObject, name: &'static str) -> Result<Bps, StateError> {
    let value = field(obj, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    };
    parsed.map(Bps::new).ok_or(StateError::MalformedField {
        id: obj.id.clone(),
        name,
    })
}

fn field_bool(obj: &RawObject, name: &'static str) -> Result<bool, StateError> {
    field(obj, name)?.as_bool().ok_or(StateError::MalformedField {
        id: obj.id.clone(),
        name,
    })
}

fn field_str(obj: &RawObject, name: &'static str) -> Result<String, StateError> {
    field(obj, name)?
        .as_str()
        .map(str::to_string)
        .ok_or(StateError::MalformedField {
            id: obj.id.clone(),
            name,
        })
}

fn field_i64(obj: &RawObject, name: &'static str) -> Result<i64, StateError> {
    let value = field(obj, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or(StateError::MalformedField {
        id: obj.id.clone(),
        name,
    })
}

// 4.1: protocol-wide singleton. created by a remote read, never locally mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolState {
    pub total_supply: BaseUnits,
    pub total_collateral_value: BaseUnits,
    pub global_ratio: Bps,
    pub min_ratio: Bps,
    pub liquidation_ratio: Bps,
    pub stability_fee: Bps,
    pub liquidation_penalty: Bps,
    pub paused: bool,
}

impl ProtocolState {
    pub fn decode(obj: &RawObject) -> Result<Self, StateError> {
        Ok(Self {
            total_supply: field_units(obj, "total_supply")?,
            total_collateral_value: field_units(obj, "total_collateral_value")?,
            global_ratio: field_bps(obj, "global_ratio")?,
            min_ratio: field_bps(obj, "min_ratio")?,
            liquidation_ratio: field_bps(obj, "liquidation_ratio")?,
            stability_fee: field_bps(obj, "stability_fee")?,
            liquidation_penalty: field_bps(obj, "liquidation_penalty")?,
            paused: field_bool(obj, "paused")?,
        })
    }
}

// 4.2: per-collateral-type parameters, keyed by type name. the embedded reference
// price is the oracle's primary tier; zero means the protocol has not set one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    pub name: String,
    pub min_ratio: Bps,
    pub liquidation_threshold: Bps,
    pub debt_ceiling: BaseUnits,
    pub current_debt: BaseUnits,
    pub active: bool,
    pub reference_price: BaseUnits,
}

impl CollateralConfig {
    pub fn decode(obj: &RawObject) -> Result<Self, StateError> {
        Ok(Self {
            name: field_str(obj, "name")?,
            min_ratio: field_bps(obj, "min_ratio")?,
            liquidation_threshold: field_bps(obj, "liquidation_threshold")?,
            debt_ceiling: field_units(obj, "debt_ceiling")?,
            current_debt: field_units(obj, "current_debt")?,
            active: field_bool(obj, "active")?,
            reference_price: field_units(obj, "reference_price")?,
        })
    }

    pub fn headroom(&self) -> BaseUnits {
        self.debt_ceiling
            .checked_sub(self.current_debt)
            .unwrap_or(BaseUnits::ZERO)
    }
}

// 4.3: one collateral position, owned by exactly one address. mutated only through
// orchestrated remote operations; the local copy is never patched optimistically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralPosition {
    pub id: ObjectId,
    pub owner: Address,
    pub collateral: BaseUnits,
    pub debt: BaseUnits,
    pub collateral_type: String,
    pub updated_at: Timestamp,
    pub accrued_fee: BaseUnits,
}

impl CollateralPosition {
    pub fn decode(obj: &RawObject) -> Result<Self, StateError> {
        Ok(Self {
            id: obj.id.clone(),
            owner: Address::new(field_str(obj, "owner")?),
            collateral: field_units(obj, "collateral")?,
            debt: field_units(obj, "debt")?,
            collateral_type: field_str(obj, "collateral_type")?,
            updated_at: Timestamp::from_secs(field_i64(obj, "updated_at")?),
            accrued_fee: field_units(obj, "accrued_fee")?,
        })
    }

    // recomputed on every call, never stored: the result depends on oracle rates
    // that can be stale, so it is display-only and carries no authority.
    pub fn derived_ratio(
        &self,
        collateral_price_usd: Decimal,
        peg_price_usd: Decimal,
        decimals: u32,
    ) -> Decimal {
        if self.debt.is_zero() {
            return Decimal::ZERO;
        }

        let collateral_usd = metrics::usd_value(self.collateral, collateral_price_usd, decimals);
        let debt_usd = metrics::usd_value(self.debt, peg_price_usd, decimals);
        if debt_usd <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        (collateral_usd / debt_usd * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(1, RoundingStrategy::ToZero)
    }
}

// 4.4: base-unit balances of the current account, replaced wholesale on refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Balances {
    pub stable: BaseUnits,
    pub native: BaseUnits,
}

impl Balances {
    pub fn from_coins(stable_coins: &[CoinObject], native_coins: &[CoinObject]) -> Self {
        Self {
            stable: stable_coins.iter().map(|c| c.balance).sum(),
            native: native_coins.iter().map(|c| c.balance).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn raw(fields: Value) -> RawObject {
        RawObject {
            id: ObjectId::new("0xobj"),
            type_tag: "0xpkg::cdp::ProtocolState".into(),
            package: "0xpkg".into(),
            version: 1,
            fields,
        }
    }

    #[test]
    fn decodes_protocol_state_with_string_amounts() {
        let obj = raw(json!({
            "total_supply": "123456789012345678901",
            "total_collateral_value": 500,
            "global_ratio": 21000,
            "min_ratio": "15000",
            "liquidation_ratio": 12000,
            "stability_fee": 50,
            "liquidation_penalty": 1300,
            "paused": false,
        }));

        let state = ProtocolState::decode(&obj).unwrap();
        assert_eq!(state.total_supply, BaseUnits::new(123456789012345678901));
        assert_eq!(state.min_ratio, Bps::new(15000));
        assert!(!state.paused);
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let obj = raw(json!({"total_supply": "1"}));
        let err = ProtocolState::decode(&obj).unwrap_err();
        assert!(matches!(
            err,
            StateError::MissingField { name: "total_collateral_value", .. }
        ));
    }

    #[test]
    fn malformed_field_is_rejected() {
        let obj = raw(json!({
            "total_supply": true,
        }));
        let err = ProtocolState::decode(&obj).unwrap_err();
        assert!(matches!(err, StateError::MalformedField { name: "total_supply", .. }));
    }

    #[test]
    fn collateral_config_headroom_saturates() {
        let cfg = CollateralConfig {
            name: "GAS".into(),
            min_ratio: Bps::new(15000),
            liquidation_threshold: Bps::new(12000),
            debt_ceiling: BaseUnits::new(100),
            current_debt: BaseUnits::new(250),
            active: true,
            reference_price: BaseUnits::ZERO,
        };
        assert_eq!(cfg.headroom(), BaseUnits::ZERO);
    }

    #[test]
    fn position_decodes_and_derives_ratio() {
        let obj = RawObject {
            id: ObjectId::new("0xpos"),
            type_tag: "0xpkg::cdp::Position".into(),
            package: "0xpkg".into(),
            version: 3,
            fields: json!({
                "owner": "alice",
                "collateral": "1000000000",
                "debt": "500000000",
                "collateral_type": "GAS",
                "updated_at": 1700000000,
                "accrued_fee": "0",
            }),
        };

        let pos = CollateralPosition::decode(&obj).unwrap();
        assert_eq!(pos.owner, Address::new("alice"));

        // 1 collateral unit at $3 against 0.5 peg units at $1 → 600%
        let ratio = pos.derived_ratio(dec!(3), dec!(1), 9);
        assert_eq!(ratio, dec!(600.0));
    }

    #[test]
    fn derived_ratio_zero_debt_is_zero() {
        let pos = CollateralPosition {
            id: ObjectId::new("0xpos"),
            owner: Address::new("alice"),
            collateral: BaseUnits::new(1_000_000_000),
            debt: BaseUnits::ZERO,
            collateral_type: "GAS".into(),
            updated_at: Timestamp::from_secs(0),
            accrued_fee: BaseUnits::ZERO,
        };
        assert_eq!(pos.derived_ratio(dec!(3), dec!(1), 9), Decimal::ZERO);
    }

    #[test]
    fn balances_sum_coin_holdings() {
        let stable = [
            CoinObject {
                id: ObjectId::new("0xs1"),
                asset: crate::types::AssetTag::new("0xpkg::stable::STABLE"),
                balance: BaseUnits::new(100),
            },
            CoinObject {
                id: ObjectId::new("0xs2"),
                asset: crate::types::AssetTag::new("0xpkg::stable::STABLE"),
                balance: BaseUnits::new(50),
            },
        ];
        let balances = Balances::from_coins(&stable, &[]);
        assert_eq!(balances.stable, BaseUnits::new(150));
        assert_eq!(balances.native, BaseUnits::ZERO);
    }
}
