//! Currency conversion between the plan's fixed currency set.
//!
//! RULE: only three base rates are ever fetched (EUR→GBP, EUR→USD, GBP→USD).
//! The other three directions are derived as exact inverses, so
//! `rate(A→B) == 1 / rate(B→A)` holds for every pair in the table.

use crate::types::Currency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rate substituted when a fetch fails.
pub const FALLBACK_RATE: f64 = 1.0;

/// The base rates a table was built from, as fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseRates {
    pub eur_gbp: f64,
    pub eur_usd: f64,
    pub gbp_usd: f64,
}

/// A day's worth of pairwise rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateTable {
    pub date:  NaiveDate,
    pub base:  BaseRates,
    rates:     BTreeMap<(Currency, Currency), f64>,
}

impl ExchangeRateTable {
    pub fn from_base_rates(date: NaiveDate, base: BaseRates) -> Self {
        let mut rates = BTreeMap::new();
        let forward = [
            (Currency::Eur, Currency::Gbp, base.eur_gbp),
            (Currency::Eur, Currency::Usd, base.eur_usd),
            (Currency::Gbp, Currency::Usd, base.gbp_usd),
        ];
        for (from, to, rate) in forward {
            // A pair without a usable rate stays absent in both directions.
            if rate.is_finite() && rate > 0.0 {
                rates.insert((from, to), rate);
                rates.insert((to, from), 1.0 / rate);
            }
        }
        Self { date, base, rates }
    }

    /// Direct rate for `from → to`, if known.
    pub fn rate(&self, from: Currency, to: Currency) -> Option<f64> {
        self.rates.get(&(from, to)).copied()
    }

    /// Whether this table may still be used on `today`.
    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        self.date == today
    }

    /// Date key used for the persisted daily snapshot.
    pub fn date_key(&self) -> String {
        date_key(self.date)
    }

    /// Human-readable snapshot for the success message.
    pub fn label(&self) -> String {
        format!(
            "Rates today: 1 EUR={:.2} GBP | 1 EUR={:.2} USD | 1 GBP={:.2} USD",
            self.base.eur_gbp, self.base.eur_usd, self.base.gbp_usd
        )
    }
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Convert `amount` from one currency to another.
///
/// Same currency is an exact identity. A missing rate leaves the amount
/// unchanged rather than failing.
pub fn convert(amount: f64, from: Currency, to: Currency, table: &ExchangeRateTable) -> f64 {
    if from == to {
        return amount;
    }
    match table.rate(from, to) {
        Some(rate) => amount * rate,
        None => {
            log::debug!("fx: no {from}->{to} rate for {}, amount left unconverted", table.date);
            amount
        }
    }
}

/// External provider of spot rates.
pub trait FxSource {
    fn fetch_rate(&self, from: Currency, to: Currency) -> anyhow::Result<f64>;
}

/// Rates supplied by configuration instead of a live feed.
#[derive(Debug, Clone, Default)]
pub struct FixedFxSource {
    rates: BTreeMap<(Currency, Currency), f64>,
}

impl FixedFxSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_base_rates(base: BaseRates) -> Self {
        Self::new()
            .with_rate(Currency::Eur, Currency::Gbp, base.eur_gbp)
            .with_rate(Currency::Eur, Currency::Usd, base.eur_usd)
            .with_rate(Currency::Gbp, Currency::Usd, base.gbp_usd)
    }

    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.rates.insert((from, to), rate);
        self
    }
}

impl FxSource for FixedFxSource {
    fn fetch_rate(&self, from: Currency, to: Currency) -> anyhow::Result<f64> {
        self.rates
            .get(&(from, to))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no configured rate for {from}{to}"))
    }
}

/// Query the three base pairs and build the day's table.
/// Failed or unusable fetches degrade to [`FALLBACK_RATE`].
pub fn fetch_table(source: &dyn FxSource, date: NaiveDate) -> ExchangeRateTable {
    let fetch = |from: Currency, to: Currency| match source.fetch_rate(from, to) {
        Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
        Ok(rate) => {
            log::warn!("fx: unusable {from}{to} rate {rate}, using {FALLBACK_RATE}");
            FALLBACK_RATE
        }
        Err(e) => {
            log::warn!("fx: fetch {from}{to} failed: {e}; using {FALLBACK_RATE}");
            FALLBACK_RATE
        }
    };
    let base = BaseRates {
        eur_gbp: fetch(Currency::Eur, Currency::Gbp),
        eur_usd: fetch(Currency::Eur, Currency::Usd),
        gbp_usd: fetch(Currency::Gbp, Currency::Usd),
    };
    log::info!("fx: fetched rates for {date}: {base:?}");
    ExchangeRateTable::from_base_rates(date, base)
}

/// Holds the current day's table in memory.
#[derive(Debug, Default)]
pub struct FxCache {
    table: Option<ExchangeRateTable>,
}

impl FxCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached table, if it is still valid on `today`.
    pub fn get(&self, today: NaiveDate) -> Option<&ExchangeRateTable> {
        self.table.as_ref().filter(|t| t.is_valid_on(today))
    }

    pub fn put(&mut self, table: ExchangeRateTable) {
        self.table = Some(table);
    }

    pub fn clear(&mut self) {
        self.table = None;
    }
}
