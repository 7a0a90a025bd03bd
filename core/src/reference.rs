//! Reference data resolver: rate card, DSP fees and trading deals.
//!
//! RULE: a lookup miss is never an error. A row with no rate-card match
//! keeps its stored currency and buy CPM, an unknown DSP costs 0, and an
//! unknown buying point has no trading deal.
//!
//! All three tables are read through [`Cached`] slots keyed by
//! [`REFERENCE_CACHE_VERSION`]. When a reload fails the last table loaded
//! under the current version keeps being served.

use crate::{
    cache::{Cached, REFERENCE_CACHE_VERSION},
    types::{normalize_fraction, parse_fraction, Currency},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The 4-tuple a plan line is priced by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineIdentity {
    pub country:   String,
    pub channel:   String,
    pub publisher: String,
    pub format:    String,
}

impl LineIdentity {
    /// Composite lookup key: trimmed, lowercased fields joined by `||`.
    pub fn key(&self) -> String {
        [&self.country, &self.channel, &self.publisher, &self.format]
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join("||")
    }

    fn is_complete(&self) -> bool {
        [&self.country, &self.channel, &self.publisher, &self.format]
            .iter()
            .all(|s| !s.trim().is_empty())
    }
}

/// One rate-card row.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    pub identity:              LineIdentity,
    pub currency:              Option<Currency>,
    pub buy_cost_per_thousand: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DspFeeEntry {
    pub name:     String,
    pub fee_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingDealEntry {
    pub buying_point: String,
    pub percentage:   f64,
}

/// Outcome of a trading-deal lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DealLookup {
    Found(f64),
    NotFound,
    /// The table could not be read and no earlier copy is cached.
    Unavailable,
}

/// Tabular source of reference data.
pub trait ReferenceSource {
    fn load_rates(&self) -> anyhow::Result<Vec<RateEntry>>;
    fn load_dsp_fees(&self) -> anyhow::Result<Vec<DspFeeEntry>>;
    fn load_trading_deals(&self) -> anyhow::Result<Vec<TradingDealEntry>>;
}

pub struct ReferenceResolver {
    source:         Box<dyn ReferenceSource>,
    version:        String,
    rates:          Cached<HashMap<String, RateEntry>>,
    dsp_fees:       Cached<Vec<DspFeeEntry>>,
    trading_deals:  Cached<Vec<TradingDealEntry>>,
}

impl ReferenceResolver {
    pub fn new(source: Box<dyn ReferenceSource>, ttl: Duration) -> Self {
        Self {
            source,
            version:       REFERENCE_CACHE_VERSION.to_string(),
            rates:         Cached::new(ttl),
            dsp_fees:      Cached::new(ttl),
            trading_deals: Cached::new(ttl),
        }
    }

    /// Serve the caches under a different key version. Entries loaded under
    /// any other version become misses.
    pub fn with_cache_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn set_cache_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn invalidate(&mut self) {
        self.rates.invalidate();
        self.dsp_fees.invalidate();
        self.trading_deals.invalidate();
    }

    /// Rate-card entry for `identity`, matched case-insensitively.
    pub fn resolve_row(&mut self, identity: &LineIdentity, now: DateTime<Utc>) -> Option<RateEntry> {
        self.refresh_rates(now);
        self.rates
            .get_stale(&self.version)?
            .get(&identity.key())
            .cloned()
    }

    /// Fee for `name` (exact, case-sensitive). Unknown DSPs cost 0.
    pub fn resolve_dsp_fee(&mut self, name: &str, now: DateTime<Utc>) -> f64 {
        self.refresh_dsp_fees(now);
        let fee = self
            .dsp_fees
            .get_stale(&self.version)
            .and_then(|fees| fees.iter().find(|d| d.name == name.trim()))
            .map(|d| d.fee_rate);
        match fee {
            Some(fee) => fee,
            None => {
                log::debug!("reference: no DSP fee for {name:?}, using 0");
                0.0
            }
        }
    }

    /// Trading-deal percentage for `buying_point`, first match in table order.
    pub fn resolve_trading_deal(&mut self, buying_point: &str, now: DateTime<Utc>) -> DealLookup {
        self.refresh_trading_deals(now);
        let Some(deals) = self.trading_deals.get_stale(&self.version) else {
            return DealLookup::Unavailable;
        };
        let wanted = buying_point.trim();
        match deals.iter().find(|t| t.buying_point == wanted) {
            Some(deal) => DealLookup::Found(deal.percentage),
            None => DealLookup::NotFound,
        }
    }

    pub fn dsp_names(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.refresh_dsp_fees(now);
        self.dsp_fees
            .get_stale(&self.version)
            .map(|fees| fees.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn buying_points(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.refresh_trading_deals(now);
        self.trading_deals
            .get_stale(&self.version)
            .map(|deals| deals.iter().map(|t| t.buying_point.clone()).collect())
            .unwrap_or_default()
    }

    fn refresh_rates(&mut self, now: DateTime<Utc>) {
        if self.rates.get(now, &self.version).is_some() {
            return;
        }
        match self.source.load_rates() {
            Ok(rows) => {
                let index = build_rate_index(rows);
                log::debug!("reference: loaded {} rate-card entries", index.len());
                self.rates.put(index, now, &self.version);
            }
            Err(e) => {
                log::warn!("reference: rate card unavailable: {e}");
                if self.rates.get_stale(&self.version).is_some() {
                    log::warn!("reference: serving the last loaded rate card");
                }
            }
        }
    }

    fn refresh_dsp_fees(&mut self, now: DateTime<Utc>) {
        if self.dsp_fees.get(now, &self.version).is_some() {
            return;
        }
        match self.source.load_dsp_fees() {
            Ok(rows) => {
                let fees: Vec<_> = rows
                    .into_iter()
                    .filter(|d| !d.name.trim().is_empty())
                    .map(|d| DspFeeEntry {
                        name:     d.name.trim().to_string(),
                        fee_rate: normalize_fraction(d.fee_rate),
                    })
                    .collect();
                self.dsp_fees.put(fees, now, &self.version);
            }
            Err(e) => {
                log::warn!("reference: DSP fee table unavailable: {e}");
                if self.dsp_fees.get_stale(&self.version).is_some() {
                    log::warn!("reference: serving the last loaded DSP fee table");
                }
            }
        }
    }

    fn refresh_trading_deals(&mut self, now: DateTime<Utc>) {
        if self.trading_deals.get(now, &self.version).is_some() {
            return;
        }
        match self.source.load_trading_deals() {
            Ok(rows) => {
                let deals: Vec<_> = rows
                    .into_iter()
                    .filter(|t| !t.buying_point.trim().is_empty())
                    .map(|t| TradingDealEntry {
                        buying_point: t.buying_point.trim().to_string(),
                        percentage:   normalize_fraction(t.percentage),
                    })
                    .collect();
                self.trading_deals.put(deals, now, &self.version);
            }
            Err(e) => {
                log::warn!("reference: trading deal table unavailable: {e}");
                if self.trading_deals.get_stale(&self.version).is_some() {
                    log::warn!("reference: serving the last loaded trading deal table");
                }
            }
        }
    }
}

/// Index rate-card rows by composite key. Incomplete rows are dropped;
/// a later duplicate key replaces an earlier one.
fn build_rate_index(rows: Vec<RateEntry>) -> HashMap<String, RateEntry> {
    rows.into_iter()
        .filter(|r| r.identity.is_complete())
        .map(|r| (r.identity.key(), r))
        .collect()
}

// ── In-memory source ────────────────────────────────────────────────

/// Reference tables held in memory. Counts loads so cache behavior is
/// observable.
#[derive(Debug, Default)]
pub struct StaticReferenceSource {
    pub rates:         Vec<RateEntry>,
    pub dsp_fees:      Vec<DspFeeEntry>,
    pub trading_deals: Vec<TradingDealEntry>,
    loads:             Cell<usize>,
}

impl StaticReferenceSource {
    pub fn new(
        rates: Vec<RateEntry>,
        dsp_fees: Vec<DspFeeEntry>,
        trading_deals: Vec<TradingDealEntry>,
    ) -> Self {
        Self { rates, dsp_fees, trading_deals, loads: Cell::new(0) }
    }

    /// Total number of table loads served.
    pub fn load_count(&self) -> usize {
        self.loads.get()
    }
}

impl ReferenceSource for StaticReferenceSource {
    fn load_rates(&self) -> anyhow::Result<Vec<RateEntry>> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.rates.clone())
    }

    fn load_dsp_fees(&self) -> anyhow::Result<Vec<DspFeeEntry>> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.dsp_fees.clone())
    }

    fn load_trading_deals(&self) -> anyhow::Result<Vec<TradingDealEntry>> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.trading_deals.clone())
    }
}

impl<T: ReferenceSource + ?Sized> ReferenceSource for std::rc::Rc<T> {
    fn load_rates(&self) -> anyhow::Result<Vec<RateEntry>> {
        (**self).load_rates()
    }

    fn load_dsp_fees(&self) -> anyhow::Result<Vec<DspFeeEntry>> {
        (**self).load_dsp_fees()
    }

    fn load_trading_deals(&self) -> anyhow::Result<Vec<TradingDealEntry>> {
        (**self).load_trading_deals()
    }
}

// ── JSON file source ────────────────────────────────────────────────

/// Reads `reference/{rate_card,dsp_fees,trading_deals}.json` under a data
/// directory on every load.
#[derive(Debug, Clone)]
pub struct JsonReferenceSource {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RateCardFile {
    rates: Vec<RateCardRow>,
}

#[derive(Debug, Deserialize)]
struct RateCardRow {
    #[serde(default)]
    country:   String,
    #[serde(default)]
    channel:   String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    format:    String,
    #[serde(default)]
    currency:  Option<String>,
    #[serde(default)]
    buy_cpm:   serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DspFeesFile {
    dsps: Vec<DspFeeRow>,
}

#[derive(Debug, Deserialize)]
struct DspFeeRow {
    name: String,
    #[serde(default)]
    fee:  serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TradingDealsFile {
    deals: Vec<TradingDealRow>,
}

#[derive(Debug, Deserialize)]
struct TradingDealRow {
    buying_point: String,
    #[serde(default)]
    percentage:   serde_json::Value,
}

impl JsonReferenceSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { dir: data_dir.as_ref().join("reference") }
    }

    fn read<T: serde::de::DeserializeOwned>(&self, file: &str) -> anyhow::Result<T> {
        let path = self.dir.join(file);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A cell that may hold a number or number-like text.
fn number_from_value(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Like [`number_from_value`] but for fee-like cells (`"12%"`, `12`, `0.12`).
fn fraction_from_value(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::Number(n) => normalize_fraction(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => parse_fraction(s),
        _ => 0.0,
    }
}

impl ReferenceSource for JsonReferenceSource {
    fn load_rates(&self) -> anyhow::Result<Vec<RateEntry>> {
        let file: RateCardFile = self.read("rate_card.json")?;
        Ok(file
            .rates
            .into_iter()
            .map(|r| RateEntry {
                identity: LineIdentity {
                    country:   r.country.trim().to_string(),
                    channel:   r.channel.trim().to_string(),
                    publisher: r.publisher.trim().to_string(),
                    format:    r.format.trim().to_string(),
                },
                currency:              r.currency.as_deref().and_then(|c| c.parse().ok()),
                buy_cost_per_thousand: number_from_value(&r.buy_cpm),
            })
            .collect())
    }

    fn load_dsp_fees(&self) -> anyhow::Result<Vec<DspFeeEntry>> {
        let file: DspFeesFile = self.read("dsp_fees.json")?;
        Ok(file
            .dsps
            .into_iter()
            .map(|d| DspFeeEntry { name: d.name, fee_rate: fraction_from_value(&d.fee) })
            .collect())
    }

    fn load_trading_deals(&self) -> anyhow::Result<Vec<TradingDealEntry>> {
        let file: TradingDealsFile = self.read("trading_deals.json")?;
        Ok(file
            .deals
            .into_iter()
            .map(|t| TradingDealEntry {
                buying_point: t.buying_point,
                percentage:   fraction_from_value(&t.percentage),
            })
            .collect())
    }
}
