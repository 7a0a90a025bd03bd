//! Hard-cost allocation, the per-line profit chain, and plan totals.
//!
//! RULES:
//!   - Hard costs are allocated by each line's share of the summed native
//!     net budget. Zero total net allocates nothing.
//!   - Profit math runs in the line's native currency and is converted to
//!     the display currency afterwards.
//!   - Blended ratios are ratio-of-sums over plan-currency columns, never
//!     an average of per-line ratios.
//!   - Every ratio guards its denominator and yields 0 instead of NaN/inf.

use crate::{
    error::PlanResult,
    fx::{convert, ExchangeRateTable},
    line::{compute_line, LineFinancials, LineItem, PlanInputs},
};
use serde::{Deserialize, Serialize};

/// A fully computed plan line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineResult {
    /// The line with reference-resolved currency and buy CPM.
    pub line:                       LineItem,
    pub financials:                 LineFinancials,
    pub allocated_hard_cost_plan:   f64,
    pub allocated_hard_cost_native: f64,
    /// Profit before the trading deal.
    pub gross_margin_native:        f64,
    pub trading_deal_amount_native: f64,
    /// Profit after the trading deal.
    pub gross_profit_native:        f64,
    pub gross_margin_plan:          f64,
    pub gross_profit_plan:          f64,
    pub margin_ratio:               f64,
    pub profit_ratio:               f64,
}

/// Plan-wide sums and blended ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalsRecord {
    pub line_count:               usize,
    pub delivery_share:           f64,
    pub gross_budget_plan:        f64,
    pub net_budget_plan:          f64,
    pub impressions:              f64,
    // Native-currency columns, summed as stored.
    pub publisher_spend:          f64,
    pub dsp_fee_value:            f64,
    pub total_media_spend:        f64,
    pub allocated_hard_cost_plan: f64,
    pub gross_margin_plan:        f64,
    pub gross_profit_plan:        f64,
    /// Σ gross margin plan / Σ net budget plan.
    pub blended_margin:           f64,
    /// Σ gross profit plan / Σ net budget plan.
    pub blended_profit_ratio:     f64,
}

/// `numerator / denominator`, or 0 when the denominator is 0.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Split `hard_cost_total_plan` across lines by native net budget share.
pub fn allocate_hard_costs(net_budgets_native: &[f64], hard_cost_total_plan: f64) -> Vec<f64> {
    let total_net: f64 = net_budgets_native.iter().sum();
    net_budgets_native
        .iter()
        .map(|net| safe_ratio(*net, total_net) * hard_cost_total_plan)
        .collect()
}

/// Run the profit chain for one line given its allocated hard cost.
pub fn profit_line(
    line: LineItem,
    financials: LineFinancials,
    allocated_hard_cost_plan: f64,
    inputs: &PlanInputs,
    fx: &ExchangeRateTable,
) -> LineResult {
    let native = line.currency;
    let display = inputs.display_currency;

    let allocated_hard_cost_native = convert(allocated_hard_cost_plan, display, native, fx);
    let gross_margin_native =
        financials.net_budget_native - financials.total_media_spend - allocated_hard_cost_native;
    let trading_deal_amount_native = gross_margin_native * inputs.trading_deal_percentage;
    let gross_profit_native = gross_margin_native - trading_deal_amount_native;

    LineResult {
        margin_ratio: safe_ratio(gross_margin_native, financials.net_budget_native),
        profit_ratio: safe_ratio(gross_profit_native, financials.net_budget_native),
        gross_margin_plan: convert(gross_margin_native, native, display, fx),
        gross_profit_plan: convert(gross_profit_native, native, display, fx),
        line,
        financials,
        allocated_hard_cost_plan,
        allocated_hard_cost_native,
        gross_margin_native,
        trading_deal_amount_native,
        gross_profit_native,
    }
}

/// Compute every line and the hard-cost allocation across them.
pub fn calculate_lines(
    lines: Vec<LineItem>,
    inputs: &PlanInputs,
    fx: &ExchangeRateTable,
) -> PlanResult<Vec<LineResult>> {
    inputs.validate()?;

    let financials = lines
        .iter()
        .map(|line| compute_line(line, inputs, fx))
        .collect::<PlanResult<Vec<_>>>()?;

    let nets: Vec<f64> = financials.iter().map(|f| f.net_budget_native).collect();
    let allocations = allocate_hard_costs(&nets, inputs.hard_cost_total_plan);

    Ok(lines
        .into_iter()
        .zip(financials)
        .zip(allocations)
        .map(|((line, fin), hard_cost)| profit_line(line, fin, hard_cost, inputs, fx))
        .collect())
}

/// Sum plan-currency columns and derive the blended ratios.
pub fn aggregate(results: &[LineResult]) -> TotalsRecord {
    let mut t = TotalsRecord { line_count: results.len(), ..TotalsRecord::default() };
    for r in results {
        t.delivery_share += r.line.delivery_share;
        t.gross_budget_plan += r.financials.gross_budget_plan;
        t.net_budget_plan += r.financials.net_budget_plan;
        t.impressions += r.financials.impressions;
        t.publisher_spend += r.financials.publisher_spend;
        t.dsp_fee_value += r.financials.dsp_fee_value;
        t.total_media_spend += r.financials.total_media_spend;
        t.allocated_hard_cost_plan += r.allocated_hard_cost_plan;
        t.gross_margin_plan += r.gross_margin_plan;
        t.gross_profit_plan += r.gross_profit_plan;
    }
    t.blended_margin = safe_ratio(t.gross_margin_plan, t.net_budget_plan);
    t.blended_profit_ratio = safe_ratio(t.gross_profit_plan, t.net_budget_plan);
    t
}
