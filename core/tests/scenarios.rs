//! Worked examples, end to end through the engine and the store.

use chrono::{DateTime, TimeZone, Utc};
use planner_core::{
    engine::{NewLine, PlanEngine},
    reference::{LineIdentity, RateEntry, StaticReferenceSource},
    store::global_names as g,
    types::Currency,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * b.abs().max(1.0)
}

fn identity(publisher: &str) -> LineIdentity {
    LineIdentity {
        country:   "Germany".into(),
        channel:   "Display".into(),
        publisher: publisher.into(),
        format:    "MPU".into(),
    }
}

fn rate(publisher: &str, currency: Currency, buy: f64) -> RateEntry {
    RateEntry {
        identity:              identity(publisher),
        currency:              Some(currency),
        buy_cost_per_thousand: buy,
    }
}

fn new_line(publisher: &str, share: f64) -> NewLine {
    NewLine {
        country:        "Germany".into(),
        channel:        "Display".into(),
        publisher:      publisher.into(),
        format:         "MPU".into(),
        delivery_share: share,
        dsp:            String::new(),
    }
}

fn engine(rates: Vec<RateEntry>, display: &str) -> PlanEngine {
    let mut engine =
        PlanEngine::build_test(StaticReferenceSource::new(rates, vec![], vec![])).unwrap();
    engine.set_global(g::TOTAL_BUDGET, "10000", now()).unwrap();
    engine.set_global(g::SELL_CPM, "5", now()).unwrap();
    engine.set_global(g::DISPLAY_CURRENCY, display, now()).unwrap();
    engine
}

#[test]
fn scenario_a_single_eur_line() {
    let mut engine = engine(vec![rate("Spiegel", Currency::Eur, 2.0)], "EUR");
    engine.append_line(&new_line("Spiegel", 0.5), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    let r = &report.lines[0];
    let f = &r.financials;

    assert_eq!(r.line.currency, Currency::Eur);
    assert!(approx(f.gross_budget_native, 5000.0));
    assert!(approx(f.net_budget_native, 4250.0));
    assert!(approx(f.impressions, 1_000_000.0));
    assert!(approx(f.publisher_spend, 2000.0));
    assert!(approx(r.gross_margin_native, 2250.0));
    assert!(approx(r.gross_profit_native, 2250.0));
    assert!(approx(r.trading_deal_amount_native, 0.0));
    assert!((r.margin_ratio - 0.529).abs() < 1e-3);

    // Same currency: plan figures equal native figures exactly.
    assert_eq!(f.gross_budget_plan, f.gross_budget_native);
    assert_eq!(r.gross_margin_plan, r.gross_margin_native);
}

#[test]
fn scenario_b_trading_deal_reduces_profit_not_margin() {
    let mut engine = engine(vec![rate("Spiegel", Currency::Eur, 2.0)], "EUR");
    engine.set_global(g::TRADING_DEAL, "0.15", now()).unwrap();
    engine.append_line(&new_line("Spiegel", 0.5), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    let r = &report.lines[0];

    assert!(approx(r.gross_margin_native, 2250.0));
    assert!(approx(r.trading_deal_amount_native, 337.5));
    assert!(approx(r.gross_profit_native, 1912.5));
    assert!(approx(r.profit_ratio, 0.45));
}

#[test]
fn scenario_b_trading_deal_entered_as_percentage() {
    let mut engine = engine(vec![rate("Spiegel", Currency::Eur, 2.0)], "EUR");
    engine.set_global(g::TRADING_DEAL, "15", now()).unwrap();
    engine.append_line(&new_line("Spiegel", 0.5), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    assert!(approx(report.lines[0].trading_deal_amount_native, 337.5));
}

#[test]
fn scenario_c_hard_cost_split_by_net_share() {
    let mut engine = engine(
        vec![rate("Spiegel", Currency::Eur, 2.0), rate("Zeit", Currency::Eur, 3.0)],
        "EUR",
    );
    engine.set_global(g::HARD_COST_TOTAL, "100", now()).unwrap();
    engine.append_line(&new_line("Spiegel", 0.3), now()).unwrap();
    engine.append_line(&new_line("Zeit", 0.2), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    let (a, b) = (&report.lines[0], &report.lines[1]);

    // Net budgets 2550 and 1700 → 60% / 40%.
    assert!(approx(a.allocated_hard_cost_plan, 60.0));
    assert!(approx(b.allocated_hard_cost_plan, 40.0));
    assert!(approx(a.allocated_hard_cost_native, 60.0));
    assert!(approx(report.totals.allocated_hard_cost_plan, 100.0));

    let total_net = a.financials.net_budget_native + b.financials.net_budget_native;
    assert!(approx(
        a.allocated_hard_cost_plan / 100.0,
        a.financials.net_budget_native / total_net
    ));
}

#[test]
fn scenario_d_usd_line_reported_in_gbp() {
    // Test config rates: EUR→GBP 0.85, EUR→USD 1.10, GBP→USD 1.25.
    let mut engine = engine(vec![rate("Spiegel", Currency::Usd, 2.0)], "GBP");
    engine.append_line(&new_line("Spiegel", 0.5), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    let r = &report.lines[0];
    let usd_gbp = report.fx.rate(Currency::Usd, Currency::Gbp).unwrap();
    let gbp_usd = report.fx.rate(Currency::Gbp, Currency::Usd).unwrap();

    assert_eq!(r.line.currency, Currency::Usd);
    assert!(approx(usd_gbp * gbp_usd, 1.0));
    assert!(approx(r.financials.gross_budget_plan, 5000.0 / 1.25));
    assert!(approx(r.financials.net_budget_plan, 4250.0 / 1.25));
    assert!(approx(r.gross_margin_plan, r.gross_margin_native * usd_gbp));
    assert_eq!(report.display_currency, Currency::Gbp);
}

#[test]
fn success_notice_carries_fx_label() {
    let mut engine = engine(vec![rate("Spiegel", Currency::Eur, 2.0)], "EUR");
    engine.append_line(&new_line("Spiegel", 0.5), now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    assert_eq!(report.notices.len(), 1);
    assert_eq!(
        report.notices[0].message,
        "Recalculated. Rates today: 1 EUR=0.85 GBP | 1 EUR=1.10 USD | 1 GBP=1.25 USD"
    );
}
