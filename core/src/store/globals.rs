use super::PlanStore;
use crate::{
    error::{PlanError, PlanResult},
    line::PlanInputs,
    types::{normalize_fraction, Currency},
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

/// Names of the global input cells.
pub mod names {
    pub const TOTAL_BUDGET: &str = "total_budget";
    pub const SELL_CPM: &str = "sell_cpm";
    pub const DISPLAY_CURRENCY: &str = "display_currency";
    pub const HARD_COST_TOTAL: &str = "hard_cost_total";
    pub const BUYING_POINT: &str = "buying_point";
    pub const TRADING_DEAL: &str = "trading_deal";
}

/// Plan-wide inputs as stored. Required numbers are kept as raw text so a
/// missing cell and a non-numeric one can be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanGlobals {
    pub total_budget:            Option<String>,
    pub sell_price_per_thousand: Option<String>,
    pub display_currency:        Currency,
    /// Missing or non-numeric cells count as 0.
    pub hard_cost_total_plan:    f64,
    pub buying_point:            Option<String>,
    /// Stored fraction, normalized.
    pub trading_deal_percentage: f64,
}

impl PlanGlobals {
    fn from_cells(cells: &HashMap<String, String>) -> Self {
        let text = |name: &str| {
            cells
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |name: &str| {
            text(name)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };

        Self {
            total_budget:            text(names::TOTAL_BUDGET),
            sell_price_per_thousand: text(names::SELL_CPM),
            display_currency:        Currency::parse_display(text(names::DISPLAY_CURRENCY).as_deref()),
            hard_cost_total_plan:    number(names::HARD_COST_TOTAL),
            buying_point:            text(names::BUYING_POINT),
            trading_deal_percentage: normalize_fraction(number(names::TRADING_DEAL)),
        }
    }

    /// Validate the required numbers and build the pass inputs.
    pub fn to_inputs(&self, trading_deal_percentage: f64) -> PlanResult<PlanInputs> {
        let inputs = PlanInputs {
            total_budget:            required_number("Total Budget", self.total_budget.as_deref())?,
            sell_price_per_thousand: required_number("Sell CPM", self.sell_price_per_thousand.as_deref())?,
            display_currency:        self.display_currency,
            hard_cost_total_plan:    self.hard_cost_total_plan,
            trading_deal_percentage,
        };
        inputs.validate()?;
        Ok(inputs)
    }
}

fn required_number(name: &'static str, raw: Option<&str>) -> PlanResult<f64> {
    let raw = raw.ok_or(PlanError::MissingInput { name })?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| PlanError::NonNumericInput { name, value: raw.to_string() })
}

impl PlanStore {
    // ── Globals ────────────────────────────────────────────────

    pub fn load_globals(&self) -> PlanResult<PlanGlobals> {
        let mut stmt = self.conn.prepare("SELECT name, value FROM plan_globals")?;
        let cells = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(PlanGlobals::from_cells(&cells))
    }

    pub fn global(&self, name: &str) -> PlanResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM plan_globals WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_global(&self, name: &str, value: &str) -> PlanResult<()> {
        upsert_global(&self.conn, name, value)
    }
}

pub(super) fn upsert_global(conn: &Connection, name: &str, value: &str) -> PlanResult<()> {
    conn.execute(
        "INSERT INTO plan_globals (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        params![name, value],
    )?;
    Ok(())
}
