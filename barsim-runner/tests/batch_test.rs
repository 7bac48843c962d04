//! Batch executor: ordering, determinism and failure isolation.

use barsim_core::data::{random_walk, BarSeries, SyntheticSpec};
use barsim_core::strategy::{AdxTrendParams, SmaCrossParams};
use barsim_runner::{
    run_backtest, run_batch, run_batch_with, RunConfig, StrategyConfig, WorkUnit,
};
use std::sync::Arc;

fn series(seed: u64, bars: usize) -> Arc<BarSeries> {
    Arc::new(
        BarSeries::new(
            format!("RW{seed}"),
            random_walk(SyntheticSpec {
                bars,
                seed,
                ..SyntheticSpec::default()
            }),
        )
        .unwrap(),
    )
}

fn sma(fast: usize, slow: usize) -> RunConfig {
    RunConfig::new(StrategyConfig::SmaCross(SmaCrossParams {
        fast,
        slow,
        size_fraction: 0.5,
    }))
}

fn unit(label: &str, series: Arc<BarSeries>, run: RunConfig) -> WorkUnit {
    WorkUnit {
        label: label.to_string(),
        series,
        run,
    }
}

#[test]
fn outcomes_follow_submission_order() {
    let units: Vec<WorkUnit> = (0..12)
        .map(|i| unit(&format!("u{i}"), series(i, 200), sma(5 + (i as usize % 3), 30)))
        .collect();
    let outcomes = run_batch(units, 4).unwrap();
    let labels: Vec<_> = outcomes.iter().map(|o| o.label.as_str()).collect();
    let expected: Vec<String> = (0..12).map(|i| format!("u{i}")).collect();
    assert_eq!(labels, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert!(outcomes.iter().all(|o| o.is_ok()));
}

#[test]
fn parallel_matches_sequential() {
    let s = series(3, 300);
    let adx = RunConfig::new(StrategyConfig::AdxTrend(AdxTrendParams::default()));
    let configs = [sma(5, 20), sma(10, 40), adx];
    let units = configs
        .iter()
        .enumerate()
        .map(|(i, c)| unit(&i.to_string(), Arc::clone(&s), c.clone()))
        .collect();
    let outcomes = run_batch(units, 3).unwrap();

    for (config, outcome) in configs.iter().zip(&outcomes) {
        let sequential = run_backtest(&s, config).unwrap();
        let parallel = outcome.result.as_ref().unwrap();
        assert_eq!(parallel.run_id, sequential.run_id);
        assert_eq!(parallel.statistics, sequential.statistics);
        assert_eq!(parallel.equity_curve, sequential.equity_curve);
    }
}

#[test]
fn failures_stay_in_their_own_outcome() {
    let units = vec![
        unit("good", series(1, 200), sma(5, 20)),
        unit("bad-config", series(2, 200), sma(30, 20)),
        unit("too-short", series(3, 10), sma(5, 20)),
        unit("good-too", series(4, 200), sma(5, 20)),
    ];
    let outcomes = run_batch(units, 2).unwrap();

    assert!(outcomes[0].is_ok());
    assert!(outcomes[1].result.as_ref().unwrap_err().contains("slow"));
    assert!(outcomes[2].result.as_ref().unwrap_err().contains("warm-up"));
    assert!(outcomes[3].is_ok());
}

#[test]
fn panicking_unit_is_isolated() {
    let units = vec![
        unit("a", series(1, 100), sma(5, 20)),
        unit("boom", series(2, 100), sma(5, 20)),
        unit("c", series(3, 100), sma(5, 20)),
    ];
    let outcomes = run_batch_with(units, 2, |series, config| {
        if series.symbol() == "RW2" {
            panic!("injected failure");
        }
        run_backtest(series, config)
    })
    .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    let err = outcomes[1].result.as_ref().unwrap_err();
    assert!(err.contains("panicked") && err.contains("injected failure"));
    assert!(outcomes[2].is_ok());
}

#[test]
fn empty_batch_is_empty() {
    assert!(run_batch(Vec::new(), 2).unwrap().is_empty());
}
