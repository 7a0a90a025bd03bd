//! Line calculator: native-currency financials for one plan line.
//!
//! Pure: no store, no caches, no logging. Given the same line, globals
//! and rate table it always returns the same figures.

use crate::{
    error::{PlanError, PlanResult},
    fx::{convert, ExchangeRateTable},
    reference::LineIdentity,
    types::{Currency, LineId},
};
use serde::{Deserialize, Serialize};

/// Share of gross budget left after the fixed 15% deduction.
pub const NET_BUDGET_FACTOR: f64 = 0.85;

/// Impressions are priced per thousand.
pub const IMPRESSIONS_PER_UNIT: f64 = 1000.0;

/// One plan line as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_id:               LineId,
    pub position:              i64,
    pub identity:              LineIdentity,
    /// Fraction of the total budget. Not clamped.
    pub delivery_share:        f64,
    pub currency:              Currency,
    pub buy_cost_per_thousand: f64,
    pub dsp_fee_rate:          f64,
}

/// The validated scalar inputs a pass runs with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanInputs {
    pub total_budget:            f64,
    pub sell_price_per_thousand: f64,
    pub display_currency:        Currency,
    pub hard_cost_total_plan:    f64,
    pub trading_deal_percentage: f64,
}

impl PlanInputs {
    /// Reject inputs the per-line formulas cannot divide by.
    pub fn validate(&self) -> PlanResult<()> {
        if !self.total_budget.is_finite() {
            return Err(PlanError::NonNumericInput {
                name:  "Total Budget",
                value: self.total_budget.to_string(),
            });
        }
        if !self.sell_price_per_thousand.is_finite() {
            return Err(PlanError::NonNumericInput {
                name:  "Sell CPM",
                value: self.sell_price_per_thousand.to_string(),
            });
        }
        if self.sell_price_per_thousand == 0.0 {
            return Err(PlanError::ZeroSellPrice);
        }
        Ok(())
    }
}

/// Per-line figures before hard-cost allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFinancials {
    pub gross_budget_native: f64,
    pub net_budget_native:   f64,
    pub impressions:         f64,
    pub publisher_spend:     f64,
    pub dsp_fee_value:       f64,
    pub total_media_spend:   f64,
    pub gross_budget_plan:   f64,
    pub net_budget_plan:     f64,
}

/// Compute a line's native financials and their plan-currency budgets.
///
/// Fails only when the inputs would divide by zero; callers are expected
/// to have validated them once per pass.
pub fn compute_line(
    line: &LineItem,
    inputs: &PlanInputs,
    fx: &ExchangeRateTable,
) -> PlanResult<LineFinancials> {
    inputs.validate()?;

    let gross_budget_native = inputs.total_budget * line.delivery_share;
    let net_budget_native = gross_budget_native * NET_BUDGET_FACTOR;
    let impressions =
        (gross_budget_native / inputs.sell_price_per_thousand) * IMPRESSIONS_PER_UNIT;
    let thousands = impressions / IMPRESSIONS_PER_UNIT;
    let publisher_spend = thousands * line.buy_cost_per_thousand;
    let dsp_fee_value = line.buy_cost_per_thousand * line.dsp_fee_rate * thousands;
    let total_media_spend = publisher_spend + dsp_fee_value;

    Ok(LineFinancials {
        gross_budget_native,
        net_budget_native,
        impressions,
        publisher_spend,
        dsp_fee_value,
        total_media_spend,
        gross_budget_plan: convert(gross_budget_native, line.currency, inputs.display_currency, fx),
        net_budget_plan:   convert(net_budget_native, line.currency, inputs.display_currency, fx),
    })
}
