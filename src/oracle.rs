// 6.0: oracle price aggregation. one state machine per price series, each walking an
// ordered list of source tiers with early exit on the first usable observation. a
// failed tier logs and falls through; the aggregator never errors outward — dependent
// risk math always gets a number, degraded to a stale constant in the worst case.
// consumers are expected to check staleness before trusting anything derived from it.

use crate::config::OracleConfig;
use crate::ledger::LedgerReader;
use crate::state::CollateralConfig;
use crate::types::{FeedId, ObjectId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};

// 6.1: the two series this layer cares about. debt is valued with PegUsd, collateral
// with CollateralUsd; the rates are sourced independently and never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSeries {
    CollateralUsd,
    PegUsd,
}

// 6.2: a price observation. replaced on every aggregation cycle, never merged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub price: Decimal,
    pub confidence: Decimal,
    pub publish_time: Timestamp,
    pub expo: i32,
}

impl PriceData {
    pub fn is_stale(&self, now: Timestamp, staleness_secs: i64) -> bool {
        self.publish_time.age_secs(now) > staleness_secs
    }

    // 1/p with first-order error propagation; None when the rate cannot be inverted
    pub fn inverted(&self) -> Option<PriceData> {
        if self.price <= Decimal::ZERO {
            return None;
        }
        Some(PriceData {
            price: Decimal::ONE / self.price,
            confidence: self.confidence / (self.price * self.price),
            publish_time: self.publish_time,
            expo: -self.expo,
        })
    }
}

// 6.3: raw observation as the external feed service publishes it: integer mantissa
// plus exponent, confidence on the same scale, publish time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedObservation {
    pub price: i64,
    pub expo: i32,
    pub conf: u64,
    pub publish_time: i64,
}

fn scaled(mantissa: i64, expo: i32) -> Option<Decimal> {
    if expo >= 0 {
        let factor = 10u64.checked_pow(expo as u32)?;
        Decimal::from(mantissa).checked_mul(Decimal::from(factor))
    } else {
        let scale = u32::try_from(-(expo as i64)).ok()?;
        if scale > 28 {
            return None;
        }
        Some(Decimal::new(mantissa, scale))
    }
}

impl FeedObservation {
    pub fn to_price_data(&self) -> Option<PriceData> {
        if self.price <= 0 {
            return None;
        }
        let price = scaled(self.price, self.expo)?;
        let conf = i64::try_from(self.conf).ok().and_then(|c| scaled(c, self.expo))?;
        Some(PriceData {
            price,
            confidence: conf,
            publish_time: Timestamp::from_secs(self.publish_time),
            expo: self.expo,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source returned malformed data: {0}")]
    Malformed(String),
}

// 6.4: external price-feed capability, keyed by feed id.
pub trait PriceFeed: Send + Sync {
    fn fetch(&self, feed: &FeedId) -> impl Future<Output = Result<FeedObservation, FeedError>> + Send;
}

// 6.5: generic currency-exchange-rate capability. returns units of `currency` per USD.
pub trait FxRates: Send + Sync {
    fn rate(&self, currency: &str) -> impl Future<Output = Result<Decimal, FeedError>> + Send;
}

// 6.6: one fallible source strategy. the always-succeeding constant fallback is not a
// tier; it is what remains when the whole list is exhausted.
#[derive(Debug, Clone)]
enum SourceTier {
    ContractReference,
    ExternalFeed(FeedId),
    ExchangeRate(String),
}

impl SourceTier {
    fn name(&self) -> &'static str {
        match self {
            SourceTier::ContractReference => "contract-reference",
            SourceTier::ExternalFeed(_) => "external-feed",
            SourceTier::ExchangeRate(_) => "exchange-rate",
        }
    }
}

// 6.7: the aggregator. holds the latest observation per series; refreshed on a timer
// and eagerly on first read.
pub struct OracleAggregator<R, F, X> {
    ledger: Arc<R>,
    feed: Arc<F>,
    fx: Arc<X>,
    collateral_config_id: ObjectId,
    decimals: u32,
    config: OracleConfig,
    collateral_slot: RwLock<Option<PriceData>>,
    peg_slot: RwLock<Option<PriceData>>,
}

impl<R: LedgerReader, F: PriceFeed, X: FxRates> OracleAggregator<R, F, X> {
    pub fn new(
        ledger: Arc<R>,
        feed: Arc<F>,
        fx: Arc<X>,
        collateral_config_id: ObjectId,
        decimals: u32,
        config: OracleConfig,
    ) -> Self {
        Self {
            ledger,
            feed,
            fx,
            collateral_config_id,
            decimals,
            config,
            collateral_slot: RwLock::new(None),
            peg_slot: RwLock::new(None),
        }
    }

    pub fn staleness_secs(&self) -> i64 {
        self.config.staleness_secs
    }

    fn slot(&self, series: PriceSeries) -> &RwLock<Option<PriceData>> {
        match series {
            PriceSeries::CollateralUsd => &self.collateral_slot,
            PriceSeries::PegUsd => &self.peg_slot,
        }
    }

    fn tiers(&self, series: PriceSeries) -> Vec<SourceTier> {
        match series {
            // the protocol-governed reference price wins outright when present
            PriceSeries::CollateralUsd => vec![
                SourceTier::ContractReference,
                SourceTier::ExternalFeed(self.config.collateral_feed.clone()),
            ],
            PriceSeries::PegUsd => vec![
                SourceTier::ExternalFeed(self.config.peg_feed.clone()),
                SourceTier::ExchangeRate(self.config.peg_currency.clone()),
            ],
        }
    }

    // publish_time at epoch keeps the constant permanently flagged stale
    fn fallback(&self, series: PriceSeries) -> PriceData {
        let price = match series {
            PriceSeries::CollateralUsd => self.config.fallback_collateral_price,
            PriceSeries::PegUsd => self.config.fallback_peg_price,
        };
        PriceData {
            price,
            confidence: Decimal::ZERO,
            publish_time: Timestamp::from_secs(0),
            expo: 0,
        }
    }

    async fn fetch_tier(&self, tier: &SourceTier, now: Timestamp) -> Result<PriceData, FeedError> {
        match tier {
            SourceTier::ContractReference => {
                let obj = self
                    .ledger
                    .get_object(&self.collateral_config_id)
                    .await
                    .map_err(|e| FeedError::Unavailable(e.to_string()))?;
                let cfg = CollateralConfig::decode(&obj).map_err(|e| FeedError::Malformed(e.to_string()))?;
                if cfg.reference_price.is_zero() {
                    return Err(FeedError::Malformed("reference price unset".to_string()));
                }
                Ok(PriceData {
                    price: cfg.reference_price.to_decimal() * Decimal::new(1, self.decimals),
                    confidence: Decimal::ZERO,
                    publish_time: now,
                    expo: -(self.decimals as i32),
                })
            }
            SourceTier::ExternalFeed(feed_id) => {
                let obs = self.feed.fetch(feed_id).await?;
                obs.to_price_data()
                    .ok_or_else(|| FeedError::Malformed(format!("feed {feed_id} observation unusable")))
            }
            SourceTier::ExchangeRate(currency) => {
                // the API answers in peg units per USD; the consumer wants USD per peg
                let rate = self.fx.rate(currency).await?;
                let direct = PriceData {
                    price: rate,
                    confidence: Decimal::ZERO,
                    publish_time: now,
                    expo: 0,
                };
                direct
                    .inverted()
                    .ok_or_else(|| FeedError::Malformed(format!("rate {rate} for {currency} not invertible")))
            }
        }
    }

    // 6.8: walk the tier list, early-exit on first success, degrade to the constant.
    pub async fn refresh(&self, series: PriceSeries) -> PriceData {
        let now = Timestamp::now();

        for tier in self.tiers(series) {
            match self.fetch_tier(&tier, now).await {
                Ok(data) => {
                    *self.slot(series).write().await = Some(data);
                    return data;
                }
                Err(err) => {
                    tracing::warn!(?series, tier = tier.name(), %err, "price source failed, falling through");
                }
            }
        }

        let fallback = self.fallback(series);
        tracing::warn!(?series, "all price sources failed, serving stale fallback");
        *self.slot(series).write().await = Some(fallback);
        fallback
    }

    // latest observation, fetched eagerly when no poll has landed yet
    pub async fn price(&self, series: PriceSeries) -> PriceData {
        if let Some(data) = *self.slot(series).read().await {
            return data;
        }
        self.refresh(series).await
    }

    pub async fn refresh_all(&self) {
        self.refresh(PriceSeries::CollateralUsd).await;
        self.refresh(PriceSeries::PegUsd).await;
    }

    // 6.9: periodic driver, independent of any inflight mutation.
    pub async fn poll_loop(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.config.poll_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.refresh_all().await;
        }
    }
}

fn recover<T>(guard: Result<T, PoisonError<T>>) -> T {
    guard.unwrap_or_else(PoisonError::into_inner)
}

// 6.10: feed fixture with a call counter, so tier short-circuiting is observable.
#[derive(Debug)]
pub struct FixturePriceFeed {
    observations: Mutex<HashMap<FeedId, FeedObservation>>,
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl FixturePriceFeed {
    pub fn new() -> Self {
        Self {
            observations: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_observation(&self, feed: FeedId, obs: FeedObservation) {
        recover(self.observations.lock()).insert(feed, obs);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceFeed for FixturePriceFeed {
    async fn fetch(&self, feed: &FeedId) -> Result<FeedObservation, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("fixture feed marked down".to_string()));
        }
        recover(self.observations.lock())
            .get(feed)
            .copied()
            .ok_or_else(|| FeedError::Unavailable(format!("no observation for {feed}")))
    }
}

impl Default for FixturePriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

// 6.11: exchange-rate fixture, same shape.
#[derive(Debug)]
pub struct FixtureFxRates {
    rates: Mutex<HashMap<String, Decimal>>,
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl FixtureFxRates {
    pub fn new() -> Self {
        Self {
            rates: Mutex::new(HashMap::new()),
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_rate(&self, currency: impl Into<String>, rate: Decimal) {
        recover(self.rates.lock()).insert(currency.into(), rate);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FixtureFxRates {
    fn default() -> Self {
        Self::new()
    }
}

impl FxRates for FixtureFxRates {
    async fn rate(&self, currency: &str) -> Result<Decimal, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(FeedError::Unavailable("fixture fx api marked down".to_string()));
        }
        recover(self.rates.lock())
            .get(currency)
            .copied()
            .ok_or_else(|| FeedError::Unavailable(format!("no rate for {currency}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{FixtureLedger, RawObject};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn collateral_config_object(reference_price: &str) -> RawObject {
        RawObject {
            id: ObjectId::new("0xccfg"),
            type_tag: "0xcdp::cdp::CollateralConfig".into(),
            package: "0xcdp".into(),
            version: 1,
            fields: json!({
                "name": "GAS",
                "min_ratio": 15000,
                "liquidation_threshold": 12000,
                "debt_ceiling": "1000000000000",
                "current_debt": "0",
                "active": true,
                "reference_price": reference_price,
            }),
        }
    }

    fn aggregator(
        reference_price: &str,
    ) -> (
        Arc<OracleAggregator<FixtureLedger, FixturePriceFeed, FixtureFxRates>>,
        Arc<FixtureLedger>,
        Arc<FixturePriceFeed>,
        Arc<FixtureFxRates>,
    ) {
        let ledger = Arc::new(FixtureLedger::new());
        ledger.insert_object(collateral_config_object(reference_price));
        let feed = Arc::new(FixturePriceFeed::new());
        let fx = Arc::new(FixtureFxRates::new());
        let agg = Arc::new(OracleAggregator::new(
            ledger.clone(),
            feed.clone(),
            fx.clone(),
            ObjectId::new("0xccfg"),
            9,
            OracleConfig::default(),
        ));
        (agg, ledger, feed, fx)
    }

    #[test]
    fn staleness_threshold_is_five_minutes() {
        let data = PriceData {
            price: dec!(1),
            confidence: Decimal::ZERO,
            publish_time: Timestamp::from_secs(1_000),
            expo: 0,
        };

        // one minute old: fresh. exactly at the window: still fresh. ten minutes: stale.
        assert!(!data.is_stale(Timestamp::from_secs(1_060), 300));
        assert!(!data.is_stale(Timestamp::from_secs(1_300), 300));
        assert!(data.is_stale(Timestamp::from_secs(1_600), 300));
    }

    #[test]
    fn inversion_propagates_confidence() {
        let data = PriceData {
            price: dec!(2),
            confidence: dec!(0.08),
            publish_time: Timestamp::from_secs(50),
            expo: -8,
        };

        let inv = data.inverted().unwrap();
        assert_eq!(inv.price, dec!(0.5));
        assert_eq!(inv.confidence, dec!(0.02)); // c / p^2
        assert_eq!(inv.expo, 8);
        assert_eq!(inv.publish_time, data.publish_time);

        let zero = PriceData { price: Decimal::ZERO, ..data };
        assert!(zero.inverted().is_none());
    }

    #[test]
    fn feed_observation_scaling() {
        let obs = FeedObservation {
            price: 123_450_000,
            expo: -8,
            conf: 50_000,
            publish_time: 1_000,
        };
        let data = obs.to_price_data().unwrap();
        assert_eq!(data.price, dec!(1.2345));
        assert_eq!(data.confidence, dec!(0.0005));

        let nonpositive = FeedObservation { price: 0, ..obs };
        assert!(nonpositive.to_price_data().is_none());
    }

    #[tokio::test]
    async fn contract_reference_short_circuits_external_feed() {
        let (agg, _ledger, feed, _fx) = aggregator("2500000000"); // $2.5 at 9 decimals
        feed.set_observation(
            FeedId::new("feed-collateral-usd"),
            FeedObservation { price: 999, expo: 0, conf: 0, publish_time: 0 },
        );

        let data = agg.refresh(PriceSeries::CollateralUsd).await;
        assert_eq!(data.price, dec!(2.5));
        // the secondary source must never have been queried
        assert_eq!(feed.call_count(), 0);
    }

    #[tokio::test]
    async fn absent_reference_falls_through_to_feed() {
        let (agg, _ledger, feed, _fx) = aggregator("0");
        feed.set_observation(
            FeedId::new("feed-collateral-usd"),
            FeedObservation { price: 310_000_000, expo: -8, conf: 100, publish_time: 1_000 },
        );

        let data = agg.refresh(PriceSeries::CollateralUsd).await;
        assert_eq!(data.price, dec!(3.1));
        assert_eq!(feed.call_count(), 1);
    }

    #[tokio::test]
    async fn peg_degrades_feed_to_fx_to_constant() {
        let (agg, _ledger, feed, fx) = aggregator("0");

        // feed down, fx up: rate 0.8 peg per USD inverts to $1.25 per peg
        feed.set_healthy(false);
        fx.set_rate("EUR", dec!(0.8));
        let data = agg.refresh(PriceSeries::PegUsd).await;
        assert_eq!(data.price, dec!(1.25));
        assert_eq!(fx.call_count(), 1);

        // everything down: stale constant, never an error
        fx.set_healthy(false);
        let data = agg.refresh(PriceSeries::PegUsd).await;
        assert_eq!(data.price, dec!(1));
        assert!(data.is_stale(Timestamp::now(), agg.staleness_secs()));
    }

    #[tokio::test]
    async fn first_read_fetches_eagerly_then_serves_the_slot() {
        let (agg, ledger, _feed, _fx) = aggregator("1500000000");

        let reads_before = ledger.read_count();
        let first = agg.price(PriceSeries::CollateralUsd).await;
        assert_eq!(first.price, dec!(1.5));
        assert!(ledger.read_count() > reads_before);

        let reads_after_first = ledger.read_count();
        let second = agg.price(PriceSeries::CollateralUsd).await;
        assert_eq!(second.price, first.price);
        // served from the slot, no further remote read
        assert_eq!(ledger.read_count(), reads_after_first);
    }
}
