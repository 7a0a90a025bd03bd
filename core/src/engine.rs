//! The recalculation engine.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Validate globals         (fatal: nothing is written)
//!   2. Resolve trading deal     (miss: 0, written back; unreadable: stored)
//!   3. Refresh FX table         (memory → stored daily snapshot → source)
//!   4. Ensure output columns    (idempotent schema step)
//!   5. Compute every line       (reference lookup → line → allocation)
//!   6. Write back               (one transaction: lines, outputs, globals,
//!                                events)
//!   7. Replace totals record    (same transaction as step 6)
//!   8. Report
//!
//! RULES:
//!   - Step 6 is the only write of derived data. Steps 3 and 4 may persist
//!     the day's FX snapshot and add schema columns; both are reusable as-is.
//!   - A pass holds no state between invocations beyond caches; running it
//!     twice on unchanged inputs writes identical outputs.
//!   - Lookup misses and source failures degrade to defaults, never abort.

use crate::{
    allocation::{aggregate, calculate_lines, LineResult, TotalsRecord},
    config::PlannerConfig,
    error::{PlanError, PlanResult},
    event::{Notice, PlanEvent},
    fx::{fetch_table, ExchangeRateTable, FxCache, FxSource},
    line::LineItem,
    reference::{DealLookup, JsonReferenceSource, LineIdentity, ReferenceResolver, ReferenceSource},
    store::{global_names, NewLineRow, PlanStore, WriteBack},
    types::{normalize_fraction, Currency, LineId, TOTALS_LINE_ID},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A line as entered by the planner: identity, delivery share and DSP name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLine {
    pub country:        String,
    pub channel:        String,
    pub publisher:      String,
    pub format:         String,
    /// Fraction of total budget.
    pub delivery_share: f64,
    #[serde(default)]
    pub dsp:            String,
}

/// Outcome of one successful pass.
#[derive(Debug, Clone)]
pub struct RecalcReport {
    pub display_currency: Currency,
    pub lines:            Vec<LineResult>,
    pub totals:           TotalsRecord,
    pub fx:               ExchangeRateTable,
    pub columns_added:    Vec<&'static str>,
    pub notices:          Vec<Notice>,
}

pub struct PlanEngine {
    pub store: PlanStore,
    config:    PlannerConfig,
    resolver:  ReferenceResolver,
    fx_source: Box<dyn FxSource>,
    fx_cache:  FxCache,
}

impl PlanEngine {
    pub fn new(
        store: PlanStore,
        config: PlannerConfig,
        reference: Box<dyn ReferenceSource>,
        fx_source: Box<dyn FxSource>,
    ) -> Self {
        let resolver = ReferenceResolver::new(reference, config.reference_cache_ttl());
        Self {
            store,
            config,
            resolver,
            fx_source,
            fx_cache: FxCache::new(),
        }
    }

    /// Build an engine over a migrated store, reading configuration and
    /// reference tables from `data_dir`.
    pub fn build(store: PlanStore, data_dir: &str) -> PlanResult<Self> {
        let config = PlannerConfig::load(data_dir)?;
        let fx_source = Box::new(config.fx_source());
        let engine = Self::new(
            store,
            config,
            Box::new(JsonReferenceSource::new(data_dir)),
            fx_source,
        );
        engine.ensure_display_currency()?;
        Ok(engine)
    }

    /// In-memory engine with test config and the given reference tables.
    pub fn build_test(reference: impl ReferenceSource + 'static) -> PlanResult<Self> {
        let store = PlanStore::in_memory()?;
        store.migrate()?;
        let config = PlannerConfig::default_test();
        let fx_source = Box::new(config.fx_source());
        let engine = Self::new(store, config, Box::new(reference), fx_source);
        engine.ensure_display_currency()?;
        Ok(engine)
    }

    pub fn with_fx_source(mut self, fx_source: Box<dyn FxSource>) -> Self {
        self.fx_source = fx_source;
        self.fx_cache.clear();
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn resolver_mut(&mut self) -> &mut ReferenceResolver {
        &mut self.resolver
    }

    /// Write the configured display currency if none has been chosen.
    pub fn ensure_display_currency(&self) -> PlanResult<()> {
        if self.store.global(global_names::DISPLAY_CURRENCY)?.is_none() {
            self.store.set_global(
                global_names::DISPLAY_CURRENCY,
                self.config.default_display_currency.code(),
            )?;
        }
        Ok(())
    }

    // ── Recalculation ──────────────────────────────────────────

    pub fn recalculate(&mut self) -> PlanResult<RecalcReport> {
        self.recalculate_at(Utc::now())
    }

    /// Run one full pass as of `now`.
    pub fn recalculate_at(&mut self, now: DateTime<Utc>) -> PlanResult<RecalcReport> {
        // 1. Validate globals. Trading deal is filled in at step 2.
        let globals = self.store.load_globals()?;
        let mut inputs = globals.to_inputs(0.0)?;

        let mut events = Vec::new();
        let mut global_updates = Vec::new();
        let mut warnings = Vec::new();

        // 2. Trading deal from the selected buying point.
        inputs.trading_deal_percentage = match globals.buying_point.as_deref() {
            Some(buying_point) => match self.resolver.resolve_trading_deal(buying_point, now) {
                DealLookup::Found(pct) => {
                    global_updates.push((global_names::TRADING_DEAL, pct.to_string()));
                    pct
                }
                DealLookup::NotFound => {
                    log::warn!("engine: no trading deal for buying point {buying_point:?}, using 0");
                    events.push(PlanEvent::TradingDealMiss {
                        buying_point: buying_point.to_string(),
                    });
                    warnings.push(Notice::warning(format!(
                        "No trading deal found for {buying_point}; using 0%."
                    )));
                    global_updates.push((global_names::TRADING_DEAL, "0".to_string()));
                    0.0
                }
                DealLookup::Unavailable => {
                    log::warn!("engine: trading deal table unavailable, keeping stored deal");
                    warnings.push(Notice::warning(
                        "Trading deals could not be read; using the stored trading deal.",
                    ));
                    globals.trading_deal_percentage
                }
            },
            None => globals.trading_deal_percentage,
        };

        // 3. FX table for today.
        let fx = self.exchange_rates(now)?;

        // 4. Output schema.
        let columns_added = self.store.ensure_output_columns()?;

        // 5. Compute.
        let lines = self.store.lines()?;
        let resolved = self.resolve_lines(lines, now, &mut events);
        let results = calculate_lines(resolved, &inputs, &fx)?;
        let totals = aggregate(&results);

        events.push(PlanEvent::RecalcCompleted {
            line_count:       results.len(),
            display_currency: inputs.display_currency,
            fx_date:          fx.date_key(),
            blended_margin:   totals.blended_margin,
        });

        // 6–7. One transaction for everything the pass produced.
        self.store.write_back(&WriteBack {
            results:          &results,
            totals:           &totals,
            display_currency: inputs.display_currency,
            fx_date:          &fx.date_key(),
            globals:          &global_updates,
            events:           &events,
            at:               now,
        })?;

        log::info!(
            "engine: recalculated {} lines in {} (blended margin {:.4})",
            results.len(),
            inputs.display_currency,
            totals.blended_margin
        );

        // 8. Report.
        let mut notices = vec![Notice::info(format!("Recalculated. {}", fx.label()))];
        notices.extend(warnings);
        Ok(RecalcReport {
            display_currency: inputs.display_currency,
            lines: results,
            totals,
            fx,
            columns_added,
            notices,
        })
    }

    /// Refresh each line's currency and buy CPM from the rate card and
    /// normalize its DSP fee. Misses keep the stored values.
    fn resolve_lines(
        &mut self,
        lines: Vec<LineItem>,
        now: DateTime<Utc>,
        events: &mut Vec<PlanEvent>,
    ) -> Vec<LineItem> {
        lines
            .into_iter()
            .map(|mut line| {
                match self.resolver.resolve_row(&line.identity, now) {
                    Some(entry) => {
                        if let Some(currency) = entry.currency {
                            line.currency = currency;
                        }
                        if entry.buy_cost_per_thousand != 0.0 {
                            line.buy_cost_per_thousand = entry.buy_cost_per_thousand;
                        }
                    }
                    None => {
                        log::debug!("engine: no rate card entry for line {}", line.line_id);
                        events.push(PlanEvent::RateCardMiss {
                            line_id: line.line_id.clone(),
                            key:     line.identity.key(),
                        });
                    }
                }
                line.dsp_fee_rate = normalize_fraction(line.dsp_fee_rate);
                line
            })
            .collect()
    }

    /// The FX table for `now`'s calendar day: the in-memory copy, else the
    /// stored snapshot for that day, else a fresh fetch (persisted).
    pub fn exchange_rates(&mut self, now: DateTime<Utc>) -> PlanResult<ExchangeRateTable> {
        let today = now.date_naive();
        if let Some(table) = self.fx_cache.get(today) {
            return Ok(table.clone());
        }

        let table = match self.store.load_fx_snapshot(today)? {
            Some(table) => {
                log::debug!("engine: reusing stored FX snapshot for {today}");
                table
            }
            None => {
                let table = fetch_table(self.fx_source.as_ref(), today);
                self.store.save_fx_snapshot(&table, now)?;
                self.store.append_event(
                    &PlanEvent::FxRefreshed {
                        fx_date: table.date_key(),
                        eur_gbp: table.base.eur_gbp,
                        eur_usd: table.base.eur_usd,
                        gbp_usd: table.base.gbp_usd,
                    },
                    now,
                )?;
                table
            }
        };
        self.fx_cache.put(table.clone());
        Ok(table)
    }

    /// Fetch and store today's rates ahead of the first recalculation.
    pub fn prewarm_fx(&mut self, now: DateTime<Utc>) -> PlanResult<ExchangeRateTable> {
        let table = self.exchange_rates(now)?;
        log::info!("engine: FX cache pre-warmed for {}", table.date);
        Ok(table)
    }

    // ── Plan lines ─────────────────────────────────────────────

    /// Append a line. Its DSP fee is looked up now; currency and buy CPM
    /// are resolved by the next recalculation.
    pub fn append_line(&mut self, new_line: &NewLine, now: DateTime<Utc>) -> PlanResult<LineId> {
        let dsp_fee = self.resolver.resolve_dsp_fee(&new_line.dsp, now);
        let line_id = uuid::Uuid::new_v4().to_string();
        let identity = LineIdentity {
            country:   new_line.country.trim().to_string(),
            channel:   new_line.channel.trim().to_string(),
            publisher: new_line.publisher.trim().to_string(),
            format:    new_line.format.trim().to_string(),
        };
        let delivery_share = if new_line.delivery_share.is_finite() {
            new_line.delivery_share
        } else {
            0.0
        };

        let position = self.store.append_line(&NewLineRow {
            line_id: &line_id,
            identity: &identity,
            delivery_share,
            dsp_fee_rate: dsp_fee,
        })?;
        self.store.append_event(
            &PlanEvent::LineAppended {
                line_id: line_id.clone(),
                dsp:     new_line.dsp.clone(),
                dsp_fee,
            },
            now,
        )?;
        log::info!("engine: appended line {line_id} at position {position}");
        Ok(line_id)
    }

    /// Remove one line and its outputs.
    pub fn remove_line(&mut self, line_id: &str, now: DateTime<Utc>) -> PlanResult<()> {
        if line_id == TOTALS_LINE_ID {
            return Err(PlanError::TotalsRowProtected);
        }
        if !self.store.delete_line(line_id)? {
            return Err(PlanError::LineNotFound { line_id: line_id.to_string() });
        }
        self.store.append_event(
            &PlanEvent::LineRemoved { line_id: line_id.to_string() },
            now,
        )?;
        log::info!("engine: removed line {line_id}");
        Ok(())
    }

    /// Remove every line, output row and the totals record.
    pub fn clear_lines(&mut self, now: DateTime<Utc>) -> PlanResult<usize> {
        let removed = self.store.clear_lines()?;
        self.store
            .append_event(&PlanEvent::LinesCleared { removed }, now)?;
        log::info!("engine: cleared {removed} lines");
        Ok(removed)
    }

    /// Σ delivery share of all lines, shown while entering a new line.
    pub fn total_delivery_share(&self) -> PlanResult<f64> {
        self.store.total_delivery_share()
    }

    // ── Globals ────────────────────────────────────────────────

    /// Write a global cell. Selecting a buying point resolves its trading
    /// deal immediately; clearing it clears the trading deal. An unreadable
    /// deal table leaves the stored deal untouched.
    pub fn set_global(&mut self, name: &str, value: &str, now: DateTime<Utc>) -> PlanResult<()> {
        self.store.set_global(name, value)?;
        if name != global_names::BUYING_POINT {
            return Ok(());
        }

        let buying_point = value.trim();
        if buying_point.is_empty() {
            return self.store.set_global(global_names::TRADING_DEAL, "");
        }
        let pct = match self.resolver.resolve_trading_deal(buying_point, now) {
            DealLookup::Found(pct) => pct,
            DealLookup::NotFound => {
                log::warn!("engine: no trading deal for buying point {buying_point:?}, using 0");
                self.store.append_event(
                    &PlanEvent::TradingDealMiss { buying_point: buying_point.to_string() },
                    now,
                )?;
                0.0
            }
            DealLookup::Unavailable => {
                log::warn!("engine: trading deal table unavailable, trading deal left as is");
                return Ok(());
            }
        };
        self.store.set_global(global_names::TRADING_DEAL, &pct.to_string())
    }

    // ── Pickers ────────────────────────────────────────────────

    pub fn dsp_names(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.resolver.dsp_names(now)
    }

    pub fn buying_points(&mut self, now: DateTime<Utc>) -> Vec<String> {
        self.resolver.buying_points(now)
    }
}

/// The user-facing message for a failed pass.
pub fn failure_notice(err: &PlanError) -> Notice {
    if err.is_input_error() {
        Notice::error(err.to_string())
    } else {
        Notice::error(format!("Recalculation failed: {err}"))
    }
}
