//! barsim CLI: run, batch and synth commands.
//!
//! Commands:
//! - `run`: one backtest from a TOML config over a CSV file
//! - `batch`: every config against every data file, in parallel
//! - `synth`: write seeded random-walk bars as CSV

mod logging;

use anyhow::{bail, Context, Result};
use barsim_core::data::{random_walk, SyntheticSpec};
use barsim_runner::{
    load_csv, run_backtest, run_batch, write_bars, BacktestReport, RunConfig, WorkUnit,
};
use clap::{Parser, Subcommand};
use logging::{init_logging, LogFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "barsim", about = "barsim: event-driven bar backtester")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest from a TOML config.
    Run {
        /// Path to the TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// CSV bars. Overrides the config's `data` entry.
        #[arg(long)]
        data: Option<PathBuf>,

        /// Symbol name. Defaults to the CSV file stem.
        #[arg(long)]
        symbol: Option<String>,

        /// Write the full JSON report here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run every config against every data file.
    Batch {
        /// TOML run configs.
        #[arg(long = "config", required = true, num_args = 1..)]
        configs: Vec<PathBuf>,

        /// CSV bar files.
        #[arg(long = "data", required = true, num_args = 1..)]
        data: Vec<PathBuf>,

        /// Worker threads. Defaults to available parallelism.
        #[arg(long)]
        threads: Option<usize>,

        /// Write all outcomes as a JSON array here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Write synthetic random-walk bars as CSV.
    Synth {
        /// Number of bars.
        #[arg(long, default_value_t = 1000)]
        bars: usize,

        /// RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First price.
        #[arg(long, default_value_t = 100.0)]
        start_price: f64,

        /// Output CSV path.
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    match cli.command {
        Commands::Run {
            config,
            data,
            symbol,
            output,
        } => run_cmd(&config, data, symbol.as_deref(), output.as_deref()),
        Commands::Batch {
            configs,
            data,
            threads,
            output,
        } => batch_cmd(&configs, &data, threads, output.as_deref()),
        Commands::Synth {
            bars,
            seed,
            start_price,
            output,
        } => synth_cmd(bars, seed, start_price, &output),
    }
}

fn run_cmd(
    config_path: &Path,
    data: Option<PathBuf>,
    symbol: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let config = RunConfig::from_file(config_path)?;
    let Some(data) = data.or_else(|| config.data.clone()) else {
        bail!("no data file: pass --data or set `data` in the config");
    };
    info!(config = %config_path.display(), data = %data.display(), "starting run");
    let series = load_csv(&data, symbol)?;
    let report = run_backtest(&series, &config)?;

    print_summary(&report);
    if let Some(path) = output {
        write_json(path, &report)?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn batch_cmd(
    config_paths: &[PathBuf],
    data_paths: &[PathBuf],
    threads: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let configs = config_paths
        .iter()
        .map(|p| RunConfig::from_file(p).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let series = data_paths
        .iter()
        .map(|p| load_csv(p, None).map(Arc::new).with_context(|| format!("loading {}", p.display())))
        .collect::<Result<Vec<_>>>()?;

    let mut units = Vec::with_capacity(configs.len() * series.len());
    for s in &series {
        for (path, config) in config_paths.iter().zip(&configs) {
            let name = path.file_stem().map_or_else(
                || path.display().to_string(),
                |stem| stem.to_string_lossy().into_owned(),
            );
            units.push(WorkUnit {
                label: format!("{}:{name}", s.symbol()),
                series: Arc::clone(s),
                run: config.clone(),
            });
        }
    }

    let threads = threads.unwrap_or_else(|| {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    });
    info!(units = units.len(), threads, "starting batch");
    let outcomes = run_batch(units, threads)?;

    println!();
    println!("{:<32} {:>8} {:>10} {:>8} {:>9}", "Unit", "Trades", "Return", "Sharpe", "MaxDD");
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => {
                let s = &report.statistics;
                println!(
                    "{:<32} {:>8} {:>9.2}% {:>8.3} {:>8.2}%",
                    outcome.label,
                    s.trade_count,
                    s.total_return * 100.0,
                    s.sharpe,
                    s.max_drawdown * 100.0
                );
            }
            Err(e) => println!("{:<32} FAILED: {e}", outcome.label),
        }
    }

    if let Some(path) = output {
        write_json(path, &outcomes)?;
        println!("Outcomes saved to: {}", path.display());
    }
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        bail!("{failed} of {} units failed", outcomes.len());
    }
    Ok(())
}

fn synth_cmd(bars: usize, seed: u64, start_price: f64, output: &Path) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be at least 1");
    }
    let data = random_walk(SyntheticSpec {
        bars,
        seed,
        start_price,
        ..SyntheticSpec::default()
    });
    let file = std::fs::File::create(output)
        .with_context(|| format!("creating {}", output.display()))?;
    write_bars(file, &data)?;
    println!("Wrote {bars} bars to {}", output.display());
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)?;
    Ok(())
}

fn print_summary(report: &BacktestReport) {
    let s = &report.statistics;
    println!();
    println!("=== Backtest Report ===");
    println!("Run ID:         {}", &report.run_id[..16]);
    println!("Symbol:         {}", report.symbol);
    println!("Strategy:       {}", report.strategy);
    if let (Some(start), Some(end)) = (s.start, s.end) {
        println!("Period:         {} to {}", start.date_naive(), end.date_naive());
    }
    println!("Bars:           {} ({} warmup)", s.bars, report.warmup_bars);
    println!("Exposure:       {:.1}%", s.exposure_pct);
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", s.equity_final);
    println!("Peak Equity:    {:.2}", s.equity_peak);
    println!("Total Return:   {:.2}%", s.total_return * 100.0);
    println!("Buy & Hold:     {:.2}%", s.buy_hold_return * 100.0);
    println!("Annual Return:  {:.2}%", s.annual_return * 100.0);
    println!("Annual Vol:     {:.2}%", s.annual_volatility * 100.0);
    println!("Sharpe:         {:.3}", s.sharpe);
    println!("Sortino:        {:.3}", s.sortino);
    println!("Calmar:         {:.3}", s.calmar);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    println!("Avg Drawdown:   {:.2}%", s.avg_drawdown * 100.0);
    println!("Max DD Bars:    {}", s.max_drawdown_duration);
    println!();
    println!("--- Trades ---");
    println!("Trades:         {}", s.trade_count);
    println!("Win Rate:       {:.1}%", s.win_rate * 100.0);
    println!("Best Trade:     {:.2}%", s.best_trade * 100.0);
    println!("Worst Trade:    {:.2}%", s.worst_trade * 100.0);
    println!("Avg Trade:      {:.2}%", s.avg_trade * 100.0);
    println!("Profit Factor:  {:.2}", s.profit_factor);
    println!("Expectancy:     {:.2}", s.expectancy);
    println!("SQN:            {:.2}", s.sqn);
    println!("Avg Duration:   {:.1} bars", s.avg_trade_duration);
    println!("Max Duration:   {} bars", s.max_trade_duration);
    println!("Commissions:    {:.2}", s.commissions);
    if let Some(bar) = report.liquidated_at {
        println!();
        println!("WARNING: account liquidated at bar {bar}");
    }
    for warning in &report.warnings {
        println!("WARNING: {:?} at bar {}: {}", warning.kind, warning.bar_index, warning.message);
    }
}
