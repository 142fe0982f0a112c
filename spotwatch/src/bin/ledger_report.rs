use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use spotwatch::{
    MasterLedger, PipelineConfig, QualityGate, TimeService, UtcJulianClock,
};
use std::path::PathBuf;

/// Command line arguments for the ledger history report
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Print recent nights from the spot drift ledger with their quality verdicts"
)]
struct Args {
    /// Ledger file (overrides the one named in --config)
    #[arg(short, long)]
    ledger: Option<PathBuf>,

    /// Pipeline configuration JSON supplying the ledger path and thresholds
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Length of the trailing window in days
    #[arg(short, long, default_value_t = 180)]
    days: i64,

    /// Julian Date treated as today (defaults to the current UTC time)
    #[arg(long)]
    today_jd: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Some(
            PipelineConfig::load_from_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
        ),
        None => None,
    };

    let ledger_path = args
        .ledger
        .clone()
        .or_else(|| config.as_ref().map(|c| c.ledger_path.clone()))
        .context("either --ledger or --config is required")?;
    let thresholds = config
        .as_ref()
        .map(|c| c.thresholds)
        .unwrap_or_default();

    let ledger = MasterLedger::open_existing(&ledger_path)
        .with_context(|| format!("opening ledger {}", ledger_path.display()))?;

    let today = args
        .today_jd
        .unwrap_or_else(|| UtcJulianClock.to_julian_date(&Utc::now()));
    let since = today.trunc() as i64 - args.days;
    let gate = QualityGate::new(thresholds);

    println!(
        "Ledger {} - nights since JD {} ({} days)",
        ledger_path.display(),
        since,
        args.days
    );
    println!(
        "{:>8}  {:>9}  {:>9}  {:>10}  {:<13}  {:<13}  {:<13}",
        "night", "meanDX", "meanDY", "intensity", "dX", "dY", "intensity"
    );

    let mut shown = 0;
    let mut flagged = 0;
    for row in ledger.history(since) {
        let report = gate.check_row(row);
        println!(
            "{:>8}  {:>9.4}  {:>9.4}  {:>10.6}  {:<13}  {:<13}  {:<13}",
            row.night_id,
            row.mean_dx,
            row.mean_dy,
            row.normalized_intensity,
            report.dx.to_string(),
            report.dy.to_string(),
            report.intensity.to_string()
        );
        shown += 1;
        if !report.all_pass() {
            flagged += 1;
        }
    }

    println!("{shown} nights shown, {flagged} with at least one check failing");
    log::info!(
        "Reported {} of {} ledger rows",
        shown,
        ledger.rows().len()
    );

    Ok(())
}
