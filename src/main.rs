use anyhow::{bail, Context, Result};

use factorbench::config::Config;
use factorbench::logging::{log, obj, run_id, v_str, Domain, Level};
use factorbench::service::HttpComputeService;
use factorbench::{Workbench, WorkbenchError};

const USAGE: &str = "usage: factorbench [--json] <catalog | series <factor> | train <factor> [model] | backtest <factor> [model] | run <factor> [model]>";

fn print_view(bench: &Workbench<HttpComputeService>, json: bool) -> Result<()> {
    let view = bench.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", view);
    }
    Ok(())
}

/// The factor stays selected even when its series fails to load, so the
/// train or backtest that follows still runs.
async fn inspect(bench: &Workbench<HttpComputeService>, factor: &str) {
    if let Err(e) = bench.select_factor(factor).await {
        log_series_failure(factor, &e);
    }
}

fn log_series_failure(factor: &str, err: &WorkbenchError) {
    log(
        Level::Warn,
        Domain::System,
        "series_unavailable",
        obj(&[
            ("factor", v_str(factor)),
            ("kind", v_str(err.kind())),
            ("msg", v_str(&err.to_string())),
        ]),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json = match args.iter().position(|a| a == "--json") {
        Some(i) => {
            args.remove(i);
            true
        }
        None => false,
    };
    let command = match args.first() {
        Some(c) => c.clone(),
        None => bail!(USAGE),
    };
    let factor = args.get(1).cloned();
    let mut cfg = Config::from_env();
    if let Some(model) = args.get(2) {
        cfg = cfg.with_model(model);
    }

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("run_id", v_str(run_id())),
            ("command", v_str(&command)),
            ("base_url", v_str(&cfg.base_url)),
            ("model", v_str(&cfg.model)),
        ]),
    );

    let service = HttpComputeService::new(&cfg).context("configuring compute service")?;
    let bench = Workbench::new(service, cfg.clone());

    // Failures are already on the view's status lines; print the view first.
    let outcome = match (command.as_str(), factor) {
        ("catalog", _) => bench.load_catalog().await,
        ("series", Some(f)) => bench.select_factor(&f).await.map(|_| ()),
        ("train", Some(f)) => {
            inspect(&bench, &f).await;
            bench.train(&cfg.train_inputs()).await.map(|_| ())
        }
        ("backtest", Some(f)) => {
            inspect(&bench, &f).await;
            bench.backtest(&cfg.backtest_inputs()).await.map(|_| ())
        }
        ("run", Some(f)) => {
            inspect(&bench, &f).await;
            match bench.train(&cfg.train_inputs()).await {
                Ok(_) => bench.backtest(&cfg.backtest_inputs()).await.map(|_| ()),
                Err(e) => Err(e),
            }
        }
        _ => bail!(USAGE),
    };

    print_view(&bench, json)?;
    outcome.with_context(|| format!("{} failed", command))
}
