use chrono::NaiveDate;
use pricing_tool::{
    EngineError, EngineState, StrategyName, StrategyRequest, load_state_from_json,
    save_state_to_json,
};
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "Usage: cli <command> [args]

Commands:
  analyze <project_id> <item_id> <spec.json>   Analyze one BoQ item with the
                                               decomposition spec in the file
  strategy apply <project_id> <name>           Apply one pricing strategy
  strategy compare <project_id>                Compare all six strategies
  local-content <project_id>                   Local-content report
  allocate <project_id>                        Allocate departments to a project
  coverage                                     Department coverage report
  risk matrix                                  Print the 4x4 risk matrix
  risk plan [min_score]                        High risks needing a response
  price-trend <resource_id> [start] [end]      Price trend for a resource
  init                                         Write an empty state document

State document: $PRICING_STATE_PATH (default pricing_state.json).
Exit codes: 0 ok, 1 validation failure, 2 missing resource,
3 inconsistent decomposition.";

fn state_path() -> PathBuf {
    std::env::var("PRICING_STATE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("pricing_state.json"))
}

fn load_state(path: &PathBuf) -> Result<EngineState, ExitCode> {
    if !path.exists() {
        eprintln!("state document {} does not exist (run 'init')", path.display());
        return Err(ExitCode::from(2));
    }
    load_state_from_json(path).map_err(|err| {
        eprintln!("failed to load state: {err}");
        ExitCode::from(1)
    })
}

fn save_state(state: &EngineState, path: &PathBuf) -> Result<(), ExitCode> {
    save_state_to_json(state, path).map_err(|err| {
        eprintln!("failed to save state: {err}");
        ExitCode::from(1)
    })
}

fn engine_failure(err: EngineError) -> ExitCode {
    eprintln!("{} ({})", err, err.kind());
    ExitCode::from(err.exit_code() as u8)
}

fn parse_date(input: &str) -> Result<NaiveDate, ExitCode> {
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| {
        eprintln!("invalid date '{input}', expected YYYY-MM-DD");
        ExitCode::from(1)
    })
}

fn cmd_init(path: &PathBuf) -> Result<(), ExitCode> {
    let state = EngineState::new();
    save_state(&state, path)?;
    println!("wrote empty state to {}", path.display());
    Ok(())
}

fn cmd_analyze(
    path: &PathBuf,
    project_id: &str,
    item_id: &str,
    spec_path: &str,
) -> Result<(), ExitCode> {
    let mut state = load_state(path)?;
    let spec_text = std::fs::read_to_string(spec_path).map_err(|err| {
        eprintln!("failed to read spec file {spec_path}: {err}");
        ExitCode::from(1)
    })?;
    let spec = serde_json::from_str(&spec_text).map_err(|err| {
        eprintln!("invalid decomposition spec: {err}");
        ExitCode::from(1)
    })?;
    let analyzed_at = chrono::Local::now().naive_local();
    let analysis = state
        .analyze_item(project_id, item_id, &spec, analyzed_at)
        .map_err(engine_failure)?;
    save_state(&state, path)?;
    println!(
        "item={} direct={:.2} overhead={:.2} profit={:.2} contingency={:.2} total={:.2}",
        analysis.item_id,
        analysis.direct_cost,
        analysis.overhead.amount,
        analysis.profit.amount,
        analysis.contingency.amount,
        analysis.total_cost
    );
    Ok(())
}

fn cmd_strategy_apply(path: &PathBuf, project_id: &str, name: &str) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let Some(strategy) = StrategyName::from_str(name) else {
        eprintln!("unknown strategy '{name}'");
        return Err(ExitCode::from(1));
    };
    let request = default_request_for(&state, project_id, strategy).map_err(engine_failure)?;
    let outcome = state
        .apply_strategy(project_id, &request)
        .map_err(engine_failure)?;
    println!("{}", outcome.to_cli_summary());
    for item in &outcome.items {
        println!(
            "  {:<16} cost={:>12.2} price={:>12.2} profit={:>10.2}",
            item.item_id, item.cost, item.price, item.profit
        );
    }
    Ok(())
}

fn default_request_for(
    state: &EngineState,
    project_id: &str,
    strategy: StrategyName,
) -> Result<StrategyRequest, EngineError> {
    // Reuse the comparison defaults so `strategy apply standard` and the
    // comparison column agree.
    let project = state.project(project_id)?;
    let items = state.boq_ref(project_id)?.items()?;
    let analyses = std::collections::HashMap::new();
    let input = pricing_tool::PricingInput {
        project,
        items: &items,
        analyses: &analyses,
        catalogs: &state.catalogs,
    };
    Ok(pricing_tool::strategy::default_request(strategy, &input))
}

fn cmd_strategy_compare(path: &PathBuf, project_id: &str) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let entries = state
        .compare_strategies(project_id)
        .map_err(engine_failure)?;
    for entry in entries {
        match (entry.outcome, entry.error) {
            (Some(outcome), _) => println!("{}", outcome.to_cli_summary()),
            (None, Some(error)) => {
                println!("strategy={} error={} ({})", entry.strategy, error.message, error.kind)
            }
            (None, None) => {}
        }
    }
    Ok(())
}

fn cmd_local_content(path: &PathBuf, project_id: &str) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let report = state.local_content(project_id).map_err(engine_failure)?;
    println!(
        "local={:.2} total={:.2} percentage={:.2}% target={:.2}% gap={:.2}%",
        report.local_cost,
        report.total_cost,
        report.percentage * 100.0,
        report.target * 100.0,
        report.gap * 100.0
    );
    for entry in &report.classes {
        if let Some(class) = entry.class {
            println!(
                "  {:<15} local={:>12.2} total={:>12.2} share={:>6.2}%",
                class.as_str(),
                entry.local_cost,
                entry.total_cost,
                entry.percentage * 100.0
            );
        }
    }
    for recommendation in &report.recommendations {
        match recommendation.required_local_share {
            Some(required) => println!(
                "  raise {} local share from {:.1}% to {:.1}%",
                recommendation.class.as_str(),
                recommendation.current_local_share * 100.0,
                required * 100.0
            ),
            None => println!(
                "  {} alone cannot close the gap (leverage {:.3})",
                recommendation.class.as_str(),
                recommendation.leverage
            ),
        }
    }
    Ok(())
}

fn cmd_allocate(path: &PathBuf, project_id: &str) -> Result<(), ExitCode> {
    let mut state = load_state(path)?;
    let rows = state.allocate(project_id).map_err(engine_failure)?;
    save_state(&state, path)?;
    for row in rows {
        println!(
            "department={} method={} amount={:.2}",
            row.department_id, row.method, row.allocation_amount
        );
    }
    Ok(())
}

fn cmd_coverage(path: &PathBuf) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    for row in state.coverage_report() {
        println!(
            "department={} annual={:.2} allocated={:.2} coverage={:.1}%",
            row.department_id,
            row.annual_cost,
            row.allocated_total,
            row.coverage * 100.0
        );
    }
    Ok(())
}

fn cmd_risk_matrix(path: &PathBuf) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let grid = state.risks.matrix();
    println!("probability \\ impact   low  medium  high  critical");
    let labels = ["rare", "possible", "likely", "almost_certain"];
    for (row_idx, label) in labels.iter().enumerate() {
        let row = grid[row_idx];
        println!(
            "{:<20} {:>5} {:>7} {:>5} {:>9}",
            label, row[0], row[1], row[2], row[3]
        );
    }
    Ok(())
}

fn cmd_risk_plan(path: &PathBuf, min_score: u8) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let plan = state.risks.response_plan(min_score);
    if plan.is_empty() {
        println!("no risks at or above score {min_score}");
        return Ok(());
    }
    for risk in plan {
        println!(
            "{} score={} bucket={} strategy={:?} :: {}",
            risk.id,
            risk.score(),
            risk.bucket(),
            risk.response_strategy,
            risk.description
        );
    }
    Ok(())
}

fn cmd_price_trend(
    path: &PathBuf,
    resource_id: &str,
    window: Option<(NaiveDate, NaiveDate)>,
) -> Result<(), ExitCode> {
    let state = load_state(path)?;
    let report = state
        .price_trend(resource_id, window)
        .map_err(engine_failure)?;
    if let Some(stats) = &report.stats {
        println!(
            "samples={} min={:.2} max={:.2} mean={:.2} median={:.2} stddev={:.2}",
            stats.count, stats.min, stats.max, stats.mean, stats.median, stats.std_dev
        );
    }
    if let Some(change) = &report.change {
        println!(
            "change={:.2} ({:+.2}%) annualized={:+.2}%",
            change.absolute,
            change.percentage * 100.0,
            change.annualized * 100.0
        );
    }
    if let Some(trend) = &report.trend {
        println!(
            "trend={} slope={:.4}/day r2={:.4} p={:.4}",
            trend.direction.as_str(),
            trend.slope,
            trend.r_squared,
            trend.p_value
        );
    }
    if let Some(volatility) = &report.volatility {
        println!(
            "volatility={:.2}% bucket={}",
            volatility.coefficient_of_variation,
            volatility.bucket.as_str()
        );
    }
    Ok(())
}

fn run() -> Result<(), ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = state_path();

    let mut parts = args.iter().map(String::as_str);
    match parts.next() {
        None | Some("help") | Some("--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some("init") => cmd_init(&path),
        Some("analyze") => match (parts.next(), parts.next(), parts.next()) {
            (Some(project_id), Some(item_id), Some(spec_path)) => {
                cmd_analyze(&path, project_id, item_id, spec_path)
            }
            _ => {
                eprintln!("Usage: cli analyze <project_id> <item_id> <spec.json>");
                Err(ExitCode::from(1))
            }
        },
        Some("strategy") => match (parts.next(), parts.next(), parts.next()) {
            (Some("apply"), Some(project_id), Some(name)) => {
                cmd_strategy_apply(&path, project_id, name)
            }
            (Some("compare"), Some(project_id), None) => cmd_strategy_compare(&path, project_id),
            _ => {
                eprintln!("Usage: cli strategy apply <project_id> <name> | strategy compare <project_id>");
                Err(ExitCode::from(1))
            }
        },
        Some("local-content") => match parts.next() {
            Some(project_id) => cmd_local_content(&path, project_id),
            None => {
                eprintln!("Usage: cli local-content <project_id>");
                Err(ExitCode::from(1))
            }
        },
        Some("allocate") => match parts.next() {
            Some(project_id) => cmd_allocate(&path, project_id),
            None => {
                eprintln!("Usage: cli allocate <project_id>");
                Err(ExitCode::from(1))
            }
        },
        Some("coverage") => cmd_coverage(&path),
        Some("risk") => match parts.next() {
            Some("matrix") => cmd_risk_matrix(&path),
            Some("plan") => {
                let min_score = match parts.next() {
                    Some(raw) => raw.parse::<u8>().map_err(|_| {
                        eprintln!("invalid min_score '{raw}'");
                        ExitCode::from(1)
                    })?,
                    None => 9,
                };
                cmd_risk_plan(&path, min_score)
            }
            _ => {
                eprintln!("Usage: cli risk matrix | risk plan [min_score]");
                Err(ExitCode::from(1))
            }
        },
        Some("price-trend") => match parts.next() {
            Some(resource_id) => {
                let window = match (parts.next(), parts.next()) {
                    (Some(start), Some(end)) => Some((parse_date(start)?, parse_date(end)?)),
                    _ => None,
                };
                cmd_price_trend(&path, resource_id, window)
            }
            None => {
                eprintln!("Usage: cli price-trend <resource_id> [start] [end]");
                Err(ExitCode::from(1))
            }
        },
        Some(other) => {
            eprintln!("unknown command '{other}'\n\n{USAGE}");
            Err(ExitCode::from(1))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => code,
    }
}
