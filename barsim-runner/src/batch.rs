//! Batch executor: many independent runs on a private rayon pool.
//!
//! Work units are immutable and owned by the worker that runs them. Results
//! travel back over an mpsc channel; nothing is shared mutably between units.
//! A unit that fails or panics is reported in its own outcome only.

use barsim_core::data::BarSeries;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::runner::{run_backtest, BacktestReport, RunError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// One backtest to run.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub label: String,
    pub series: Arc<BarSeries>,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub label: String,
    pub result: Result<BacktestReport, String>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every unit with `threads` workers. Outcomes come back in submission order.
pub fn run_batch(units: Vec<WorkUnit>, threads: usize) -> Result<Vec<BatchOutcome>, BatchError> {
    run_batch_with(units, threads, run_backtest)
}

/// [`run_batch`] with a custom job in place of [`run_backtest`].
pub fn run_batch_with<F>(
    units: Vec<WorkUnit>,
    threads: usize,
    job: F,
) -> Result<Vec<BatchOutcome>, BatchError>
where
    F: Fn(&BarSeries, &RunConfig) -> Result<BacktestReport, RunError> + Send + Sync + 'static,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("barsim-batch-{i}"))
        .build()?;
    let job = Arc::new(job);
    let total = units.len();
    info!(units = total, threads = pool.current_num_threads(), "batch started");

    let (tx, rx) = mpsc::channel::<(usize, BatchOutcome)>();
    let mut labels = Vec::with_capacity(total);
    for (index, unit) in units.into_iter().enumerate() {
        labels.push(unit.label.clone());
        let tx = tx.clone();
        let job = Arc::clone(&job);
        pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| job(&unit.series, &unit.run)));
            let result = match result {
                Ok(Ok(report)) => Ok(report),
                Ok(Err(e)) => Err(e.to_string()),
                Err(payload) => Err(format!("run panicked: {}", panic_message(&*payload))),
            };
            // The receiver outlives every job; a failed send means the caller is gone.
            let _ = tx.send((
                index,
                BatchOutcome {
                    label: unit.label,
                    result,
                },
            ));
        });
    }
    drop(tx);

    let mut slots: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
    for (index, outcome) in rx {
        match &outcome.result {
            Ok(report) => debug!(label = %outcome.label, trades = report.statistics.trade_count, "unit finished"),
            Err(e) => warn!(label = %outcome.label, error = %e, "unit failed"),
        }
        slots[index] = Some(outcome);
    }

    let outcomes: Vec<BatchOutcome> = slots
        .into_iter()
        .zip(labels)
        .map(|(slot, label)| {
            slot.unwrap_or_else(|| BatchOutcome {
                label,
                result: Err("worker exited without a result".into()),
            })
        })
        .collect();
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!(units = total, failed, "batch finished");
    Ok(outcomes)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
