use super::{globals::upsert_global, insert_event, PlanStore};
use crate::{
    allocation::{LineResult, TotalsRecord},
    error::PlanResult,
    event::PlanEvent,
    types::Currency,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Derived metric columns on `line_output`, in write order.
/// Names are fixed; columns are only ever appended.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "gross_budget_native",
    "net_budget_native",
    "impressions",
    "publisher_spend",
    "dsp_fee_value",
    "total_media_spend",
    "gross_budget_plan",
    "net_budget_plan",
    "allocated_hard_cost_plan",
    "allocated_hard_cost_native",
    "gross_margin_native",
    "trading_deal_amount_native",
    "gross_profit_native",
    "gross_margin_plan",
    "gross_profit_plan",
    "margin_ratio",
    "profit_ratio",
];

/// Values for [`OUTPUT_COLUMNS`], same order.
pub fn output_values(r: &LineResult) -> [f64; 17] {
    let f = &r.financials;
    [
        f.gross_budget_native,
        f.net_budget_native,
        f.impressions,
        f.publisher_spend,
        f.dsp_fee_value,
        f.total_media_spend,
        f.gross_budget_plan,
        f.net_budget_plan,
        r.allocated_hard_cost_plan,
        r.allocated_hard_cost_native,
        r.gross_margin_native,
        r.trading_deal_amount_native,
        r.gross_profit_native,
        r.gross_margin_plan,
        r.gross_profit_plan,
        r.margin_ratio,
        r.profit_ratio,
    ]
}

/// One `line_output` row as read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub line_id:  String,
    pub position: i64,
    pub currency: String,
    pub values:   BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTotals {
    pub display_currency: String,
    pub fx_date:          String,
    pub totals:           TotalsRecord,
}

/// Everything one recalculation pass commits.
#[derive(Debug)]
pub struct WriteBack<'a> {
    pub results:          &'a [LineResult],
    pub totals:           &'a TotalsRecord,
    pub display_currency: Currency,
    pub fx_date:          &'a str,
    pub globals:          &'a [(&'static str, String)],
    pub events:           &'a [PlanEvent],
    pub at:               DateTime<Utc>,
}

impl PlanStore {
    // ── Derived outputs ────────────────────────────────────────

    /// Add any missing derived column to `line_output`.
    /// Returns the columns added; empty when the schema is already complete.
    pub fn ensure_output_columns(&self) -> PlanResult<Vec<&'static str>> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(line_output)")?;
        let existing = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<HashSet<_>, _>>()?;

        let mut added = Vec::new();
        for column in OUTPUT_COLUMNS {
            if existing.contains(column) {
                continue;
            }
            self.conn.execute_batch(&format!(
                "ALTER TABLE line_output ADD COLUMN {column} REAL NOT NULL DEFAULT 0;"
            ))?;
            added.push(column);
        }
        if !added.is_empty() {
            log::info!("store: added output columns {added:?}");
        }
        Ok(added)
    }

    /// Commit one pass: resolved line inputs, every output row, the totals
    /// record, global updates and events, in a single transaction.
    pub fn write_back(&self, batch: &WriteBack<'_>) -> PlanResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        for r in batch.results {
            tx.execute(
                "UPDATE plan_line SET currency = ?1, buy_cpm = ?2, dsp_fee = ?3 WHERE line_id = ?4",
                params![
                    r.line.currency.code(),
                    r.line.buy_cost_per_thousand,
                    r.line.dsp_fee_rate,
                    r.line.line_id,
                ],
            )?;
        }

        tx.execute("DELETE FROM line_output", [])?;
        let columns = format!("line_id, position, currency, {}", OUTPUT_COLUMNS.join(", "));
        let placeholders = (1..=OUTPUT_COLUMNS.len() + 3)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO line_output ({columns}) VALUES ({placeholders})");
        for r in batch.results {
            let mut values = vec![
                Value::Text(r.line.line_id.clone()),
                Value::Integer(r.line.position),
                Value::Text(r.line.currency.code().to_string()),
            ];
            values.extend(output_values(r).into_iter().map(Value::Real));
            tx.execute(&sql, params_from_iter(values.iter()))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO plan_totals (id, display_currency, fx_date, totals_json)
             VALUES (1, ?1, ?2, ?3)",
            params![
                batch.display_currency.code(),
                batch.fx_date,
                serde_json::to_string(batch.totals)?,
            ],
        )?;

        for (name, value) in batch.globals {
            upsert_global(&tx, name, value)?;
        }
        for event in batch.events {
            insert_event(&tx, event, batch.at)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Output rows in plan order, keyed by column name.
    pub fn output_rows(&self) -> PlanResult<Vec<OutputRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM line_output ORDER BY position ASC, line_id ASC")?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt.query_map([], |row| {
            let mut values = BTreeMap::new();
            for (i, name) in names.iter().enumerate().skip(3) {
                values.insert(name.clone(), row.get::<_, Option<f64>>(i)?.unwrap_or(0.0));
            }
            Ok(OutputRow {
                line_id: row.get("line_id")?,
                position: row.get("position")?,
                currency: row.get("currency")?,
                values,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn totals(&self) -> PlanResult<Option<StoredTotals>> {
        let row = self
            .conn
            .query_row(
                "SELECT display_currency, fx_date, totals_json FROM plan_totals WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((display_currency, fx_date, json)) => Ok(Some(StoredTotals {
                display_currency,
                fx_date,
                totals: serde_json::from_str(&json)?,
            })),
            None => Ok(None),
        }
    }
}
