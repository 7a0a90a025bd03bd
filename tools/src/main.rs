//! plan-runner: headless runner for the media-buying budget planner.
//!
//! Usage:
//!   plan-runner --db plan.db --data-dir ./data recalc
//!   plan-runner --db plan.db show
//!   plan-runner --db plan.db prewarm-fx
//!   plan-runner --db plan.db --ipc-mode      (JSON-lines PlanCommand loop)

use anyhow::Result;
use chrono::Utc;
use planner_core::{
    allocation::TotalsRecord,
    command::PlanCommand,
    engine::{failure_notice, PlanEngine, RecalcReport},
    event::{Notice, Severity},
    format::{format_count, format_money, format_percent},
    store::{OutputRow, PlanStore},
    types::Currency,
};
use std::env;
use std::io::{self, BufRead, Write};

const FLAGS_WITH_VALUES: [&str; 2] = ["--db", "--data-dir"];

#[derive(serde::Serialize)]
struct UiState {
    display_currency:     String,
    fx_date:              Option<String>,
    total_delivery_share: f64,
    lines:                Vec<OutputRow>,
    totals:               Option<TotalsRecord>,
    notices:              Vec<Notice>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = flag_value(&args, "--db").unwrap_or("plan.db");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let subcommand = subcommand(&args).unwrap_or("recalc");

    if !ipc_mode {
        println!("Budget planner: plan-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!("  command:   {subcommand}");
        println!();
    }

    let store = PlanStore::open(db)?;
    store.migrate()?;
    let mut engine = PlanEngine::build(store, data_dir)?;

    if ipc_mode {
        return run_ipc_loop(&mut engine);
    }

    match subcommand {
        "recalc" => match engine.recalculate() {
            Ok(report) => {
                print_report(&report);
                println!("Saved to {}", engine.store.path().unwrap_or(":memory:"));
            }
            Err(e) => {
                print_notice(&failure_notice(&e));
                std::process::exit(2);
            }
        },
        "show" => print_stored(&engine)?,
        "prewarm-fx" => {
            let fx = engine.prewarm_fx(Utc::now())?;
            println!("FX cache pre-warmed for {}", fx.date);
            println!("  {}", fx.label());
        }
        other => {
            eprintln!("Unknown command '{other}'. Expected recalc, show or prewarm-fx.");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn run_ipc_loop(engine: &mut PlanEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: PlanCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match handle_command(engine, &cmd) {
            Ok(response) => response,
            Err(e) => {
                log::warn!("ipc: {cmd:?} failed: {e}");
                let state = build_ui_state(engine, vec![failure_notice(&e)])?;
                serde_json::to_value(state)?
            }
        };
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &mut PlanEngine,
    cmd: &PlanCommand,
) -> planner_core::error::PlanResult<serde_json::Value> {
    let now = Utc::now();
    let mut notices = Vec::new();

    match cmd {
        PlanCommand::AppendLine(line) => {
            let line_id = engine.append_line(line, now)?;
            notices.push(Notice::info(format!("Line {line_id} added.")));
        }
        PlanCommand::RemoveLine { line_id } => engine.remove_line(line_id, now)?,
        PlanCommand::ClearLines => {
            let removed = engine.clear_lines(now)?;
            notices.push(Notice::info(format!("Cleared {removed} lines.")));
        }
        PlanCommand::SetGlobal { name, value } => engine.set_global(name, value, now)?,
        PlanCommand::Recalculate | PlanCommand::GetState => {}
        PlanCommand::PrewarmFx => {
            let fx = engine.prewarm_fx(now)?;
            notices.push(Notice::info(fx.label()));
        }
        PlanCommand::ListDsps => {
            return Ok(serde_json::json!({ "dsps": engine.dsp_names(now) }));
        }
        PlanCommand::ListBuyingPoints => {
            return Ok(serde_json::json!({ "buying_points": engine.buying_points(now) }));
        }
    }

    // The change above is kept even when the follow-up pass fails.
    if cmd.recalculates() {
        match engine.recalculate_at(now) {
            Ok(report) => notices.extend(report.notices),
            Err(e) => notices.push(failure_notice(&e)),
        }
    }

    let state = build_ui_state(engine, notices).map_err(planner_core::error::PlanError::Other)?;
    Ok(serde_json::to_value(state)?)
}

fn build_ui_state(engine: &PlanEngine, notices: Vec<Notice>) -> Result<UiState> {
    let stored = engine.store.totals()?;
    let globals = engine.store.load_globals()?;
    Ok(UiState {
        display_currency:     globals.display_currency.code().to_string(),
        fx_date:              stored.as_ref().map(|t| t.fx_date.clone()),
        total_delivery_share: engine.total_delivery_share()?,
        lines:                engine.store.output_rows()?,
        totals:               stored.map(|t| t.totals),
        notices,
    })
}

fn print_report(report: &RecalcReport) {
    let display = report.display_currency;

    if !report.columns_added.is_empty() {
        println!("Added output columns: {}", report.columns_added.join(", "));
        println!();
    }

    println!("=== PLAN LINES ===");
    if report.lines.is_empty() {
        println!("  (No lines yet)");
    }
    for r in &report.lines {
        let f = &r.financials;
        println!(
            "  #{:<3} {:<36} {} | gross {} | net {} | impr {} | margin {} | profit {}",
            r.line.position,
            r.line.identity.key(),
            r.line.currency,
            format_money(f.gross_budget_plan, display),
            format_money(f.net_budget_plan, display),
            format_count(f.impressions),
            format_percent(r.margin_ratio, 1),
            format_percent(r.profit_ratio, 1),
        );
    }
    println!();
    print_totals(&report.totals, display);
    println!();
    for notice in &report.notices {
        print_notice(notice);
    }
}

fn print_stored(engine: &PlanEngine) -> Result<()> {
    let Some(stored) = engine.store.totals()? else {
        println!("No recalculation stored yet. Run `plan-runner recalc` first.");
        return Ok(());
    };
    let display: Currency = stored.display_currency.parse().unwrap_or(Currency::Gbp);

    println!("=== PLAN LINES (as of FX {}) ===", stored.fx_date);
    for row in engine.store.output_rows()? {
        let value = |name: &str| row.values.get(name).copied().unwrap_or(0.0);
        println!(
            "  #{:<3} {} {} | gross {} | net {} | margin {}",
            row.position,
            row.line_id,
            row.currency,
            format_money(value("gross_budget_plan"), display),
            format_money(value("net_budget_plan"), display),
            format_percent(value("margin_ratio"), 1),
        );
    }
    println!();
    print_totals(&stored.totals, display);
    Ok(())
}

fn print_totals(t: &TotalsRecord, display: Currency) {
    println!("=== TOTALS ({display}) ===");
    println!("  lines:          {}", t.line_count);
    println!("  delivery share: {}", format_percent(t.delivery_share, 1));
    println!("  gross budget:   {}", format_money(t.gross_budget_plan, display));
    println!("  net budget:     {}", format_money(t.net_budget_plan, display));
    println!("  impressions:    {}", format_count(t.impressions));
    println!("  hard costs:     {}", format_money(t.allocated_hard_cost_plan, display));
    println!("  gross margin:   {}", format_money(t.gross_margin_plan, display));
    println!("  gross profit:   {}", format_money(t.gross_profit_plan, display));
    println!("  blended margin: {}", format_percent(t.blended_margin, 1));
    println!("  blended profit: {}", format_percent(t.blended_profit_ratio, 1));
}

fn print_notice(notice: &Notice) {
    match notice.severity {
        Severity::Info => println!("{}", notice.message),
        Severity::Warning => println!("WARNING: {}", notice.message),
        Severity::Error => eprintln!("ERROR: {}", notice.message),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// First positional argument that is neither a flag nor a flag's value.
fn subcommand(args: &[String]) -> Option<&str> {
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if FLAGS_WITH_VALUES.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            return Some(arg.as_str());
        }
    }
    None
}
