use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use planner_core::{
    config::PlannerConfig,
    engine::PlanEngine,
    fx::{convert, fetch_table, BaseRates, ExchangeRateTable, FixedFxSource, FALLBACK_RATE},
    reference::StaticReferenceSource,
    store::PlanStore,
    types::Currency,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn table() -> ExchangeRateTable {
    ExchangeRateTable::from_base_rates(
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        BaseRates { eur_gbp: 0.8567, eur_usd: 1.0849, gbp_usd: 1.2664 },
    )
}

fn temp_db() -> String {
    std::env::temp_dir()
        .join(format!("planner-fx-{}.db", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

#[test]
fn round_trip_returns_original_amount() {
    let t = table();
    for from in Currency::ALL {
        for to in Currency::ALL {
            let there = convert(1234.56, from, to, &t);
            let back = convert(there, to, from, &t);
            assert!((back - 1234.56).abs() < 1e-9, "{from}->{to}->{from} gave {back}");
        }
    }
}

#[test]
fn same_currency_is_exact_identity() {
    let t = table();
    let empty = fetch_table(&FixedFxSource::new(), t.date);
    for c in Currency::ALL {
        assert_eq!(convert(0.1 + 0.2, c, c, &t), 0.1 + 0.2);
        assert_eq!(convert(-7.0, c, c, &empty), -7.0);
        assert_eq!(t.rate(c, c), None);
    }
}

#[test]
fn every_pair_is_the_inverse_of_its_reverse() {
    let t = table();
    for from in Currency::ALL {
        for to in Currency::ALL {
            if from == to {
                continue;
            }
            let forward = t.rate(from, to).unwrap();
            let reverse = t.rate(to, from).unwrap();
            assert!((forward * reverse - 1.0).abs() < 1e-12);
        }
    }
}

#[test]
fn failed_fetch_falls_back_to_one() {
    let source = FixedFxSource::new().with_rate(Currency::Eur, Currency::Gbp, 0.85);
    let t = fetch_table(&source, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());

    assert_eq!(t.base.eur_gbp, 0.85);
    assert_eq!(t.base.eur_usd, FALLBACK_RATE);
    assert_eq!(t.base.gbp_usd, FALLBACK_RATE);
    assert_eq!(convert(100.0, Currency::Usd, Currency::Eur, &t), 100.0);
}

#[test]
fn negative_rate_is_treated_as_failure() {
    let source = FixedFxSource::from_base_rates(BaseRates {
        eur_gbp: -0.85,
        eur_usd: 1.1,
        gbp_usd: 1.25,
    });
    let t = fetch_table(&source, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    assert_eq!(t.base.eur_gbp, FALLBACK_RATE);
}

#[test]
fn engine_fetches_once_per_day() {
    let mut engine = PlanEngine::build_test(StaticReferenceSource::default()).unwrap();

    let first = engine.exchange_rates(now()).unwrap();
    let again = engine.exchange_rates(now() + Duration::hours(8)).unwrap();
    assert_eq!(first, again);
    assert_eq!(engine.store.event_count("fx_refreshed").unwrap(), 1);

    let tomorrow = engine.exchange_rates(now() + Duration::days(1)).unwrap();
    assert_eq!(tomorrow.date, first.date.succ_opt().unwrap());
    assert_eq!(engine.store.event_count("fx_refreshed").unwrap(), 2);
}

#[test]
fn stored_snapshot_survives_restart() {
    let path = temp_db();
    let day_one_rates = BaseRates { eur_gbp: 0.80, eur_usd: 1.05, gbp_usd: 1.30 };

    {
        let store = PlanStore::open(&path).unwrap();
        store.migrate().unwrap();
        let mut engine = PlanEngine::new(
            store,
            PlannerConfig::default_test(),
            Box::new(StaticReferenceSource::default()),
            Box::new(FixedFxSource::from_base_rates(day_one_rates)),
        );
        let fx = engine.prewarm_fx(now()).unwrap();
        assert_eq!(fx.base, day_one_rates);
    }

    // A new process with a dead feed reuses the stored rates today.
    let store = PlanStore::open(&path).unwrap();
    store.migrate().unwrap();
    let mut engine = PlanEngine::new(
        store,
        PlannerConfig::default_test(),
        Box::new(StaticReferenceSource::default()),
        Box::new(FixedFxSource::new()),
    );

    let today = engine.exchange_rates(now() + Duration::hours(2)).unwrap();
    assert_eq!(today.base, day_one_rates);

    let tomorrow = engine.exchange_rates(now() + Duration::days(1)).unwrap();
    assert_eq!(tomorrow.base.eur_gbp, FALLBACK_RATE);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn recalculation_uses_fallback_when_feed_is_down() {
    use planner_core::store::global_names as g;

    let mut engine = PlanEngine::build_test(StaticReferenceSource::default())
        .unwrap()
        .with_fx_source(Box::new(FixedFxSource::new()));
    engine.set_global(g::TOTAL_BUDGET, "1000", now()).unwrap();
    engine.set_global(g::SELL_CPM, "4", now()).unwrap();

    let report = engine.recalculate_at(now()).unwrap();
    assert_eq!(
        report.fx.label(),
        "Rates today: 1 EUR=1.00 GBP | 1 EUR=1.00 USD | 1 GBP=1.00 USD"
    );
}
