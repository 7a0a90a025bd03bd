//! Recalculating an unchanged plan must write identical outputs.
//!
//! Every derived value is a function of the inputs alone, so a second pass
//! over the same store is byte-for-byte the first one.

use chrono::{DateTime, Duration, TimeZone, Utc};
use planner_core::{
    engine::{NewLine, PlanEngine},
    reference::{DspFeeEntry, LineIdentity, RateEntry, StaticReferenceSource, TradingDealEntry},
    store::global_names as g,
    types::Currency,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn rate(country: &str, publisher: &str, currency: Currency, buy: f64) -> RateEntry {
    RateEntry {
        identity: LineIdentity {
            country:   country.into(),
            channel:   "Video".into(),
            publisher: publisher.into(),
            format:    "Pre-roll".into(),
        },
        currency:              Some(currency),
        buy_cost_per_thousand: buy,
    }
}

fn line(country: &str, publisher: &str, share: f64, dsp: &str) -> NewLine {
    NewLine {
        country:        country.into(),
        channel:        "Video".into(),
        publisher:      publisher.into(),
        format:         "Pre-roll".into(),
        delivery_share: share,
        dsp:            dsp.into(),
    }
}

fn build_plan() -> PlanEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = StaticReferenceSource::new(
        vec![
            rate("UK", "ITVX", Currency::Gbp, 14.5),
            rate("Germany", "Joyn", Currency::Eur, 12.75),
            rate("US", "Hulu", Currency::Usd, 28.0),
        ],
        vec![
            DspFeeEntry { name: "DV360".into(), fee_rate: 0.12 },
            DspFeeEntry { name: "Xandr".into(), fee_rate: 10.0 },
        ],
        vec![TradingDealEntry { buying_point: "Holding Group".into(), percentage: 15.0 }],
    );
    let mut engine = PlanEngine::build_test(source).unwrap();
    engine.set_global(g::TOTAL_BUDGET, "250000", now()).unwrap();
    engine.set_global(g::SELL_CPM, "32.5", now()).unwrap();
    engine.set_global(g::HARD_COST_TOTAL, "4200", now()).unwrap();
    engine.set_global(g::BUYING_POINT, "Holding Group", now()).unwrap();

    engine.append_line(&line("UK", "ITVX", 0.4, "DV360"), now()).unwrap();
    engine.append_line(&line("Germany", "Joyn", 0.35, "Xandr"), now()).unwrap();
    engine.append_line(&line("US", "Hulu", 0.25, "DV360"), now()).unwrap();
    // No rate card entry: keeps its blank currency (EUR) and zero buy CPM.
    engine.append_line(&line("France", "Unknown", 0.1, "Nobody"), now()).unwrap();
    engine
}

#[test]
fn second_pass_writes_identical_outputs() {
    let mut engine = build_plan();

    engine.recalculate_at(now()).unwrap();
    let lines_a = engine.store.lines().unwrap();
    let rows_a = engine.store.output_rows().unwrap();
    let totals_a = engine.store.totals().unwrap();
    let globals_a = engine.store.load_globals().unwrap();

    engine.recalculate_at(now() + Duration::minutes(1)).unwrap();
    let lines_b = engine.store.lines().unwrap();
    let rows_b = engine.store.output_rows().unwrap();
    let totals_b = engine.store.totals().unwrap();
    let globals_b = engine.store.load_globals().unwrap();

    assert_eq!(rows_a.len(), 4);
    assert_eq!(lines_a, lines_b, "resolved line inputs changed between passes");
    assert_eq!(rows_a, rows_b, "output rows changed between passes");
    assert_eq!(totals_a, totals_b, "totals record changed between passes");
    assert_eq!(globals_a, globals_b, "globals changed between passes");

    let json_a = serde_json::to_string(&rows_a).unwrap();
    let json_b = serde_json::to_string(&rows_b).unwrap();
    assert_eq!(json_a, json_b);
}

#[test]
fn two_engines_same_inputs_same_totals() {
    let mut a = build_plan();
    let mut b = build_plan();

    let report_a = a.recalculate_at(now()).unwrap();
    let report_b = b.recalculate_at(now()).unwrap();

    assert_eq!(report_a.totals, report_b.totals);
    let rows_a = a.store.output_rows().unwrap();
    let rows_b = b.store.output_rows().unwrap();
    for (ra, rb) in rows_a.iter().zip(&rows_b) {
        assert_eq!(ra.values, rb.values, "line {} diverged", ra.position);
    }
}

#[test]
fn first_pass_persists_resolved_inputs() {
    let mut engine = build_plan();
    engine.recalculate_at(now()).unwrap();

    let lines = engine.store.lines().unwrap();
    assert_eq!(lines[0].currency, Currency::Gbp);
    assert_eq!(lines[0].buy_cost_per_thousand, 14.5);
    assert_eq!(lines[1].dsp_fee_rate, 0.10);
    assert_eq!(lines[2].currency, Currency::Usd);
    assert_eq!(lines[3].currency, Currency::Eur);
    assert_eq!(lines[3].buy_cost_per_thousand, 0.0);
    assert_eq!(lines[3].dsp_fee_rate, 0.0);
    assert_eq!(engine.store.global(g::TRADING_DEAL).unwrap().as_deref(), Some("0.15"));
}
