//! Criterion benchmarks for barsim hot paths.
//!
//! Benchmarks:
//! 1. Full driver loop with the reference strategies
//! 2. Broker matching with many resting exit levels
//! 3. Indicator computation over the full history

use barsim_core::components::Indicator;
use barsim_core::data::{random_walk, BarSeries, SyntheticSpec};
use barsim_core::domain::{ExitPlan, OrderRequest, OrderSide};
use barsim_core::engine::{run, Broker, EngineConfig, LookaheadCheck};
use barsim_core::indicators::{Adx, Atr, Ema, Sma};
use barsim_core::strategy::{AdxTrend, AdxTrendParams, SmaCross, SmaCrossParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn series(n: usize) -> BarSeries {
    BarSeries::new(
        "BENCH",
        random_walk(SyntheticSpec {
            bars: n,
            seed: 11,
            ..SyntheticSpec::default()
        }),
    )
    .unwrap()
}

fn bench_driver(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver");
    let config = EngineConfig {
        lookahead_check: LookaheadCheck::Off,
        ..EngineConfig::default()
    };
    for n in [1_000usize, 10_000] {
        let s = series(n);
        group.bench_with_input(BenchmarkId::new("sma_cross", n), &s, |b, s| {
            b.iter(|| {
                let mut strategy = SmaCross::new(SmaCrossParams::default()).unwrap();
                black_box(run(s, &mut strategy, &config).unwrap())
            })
        });
        group.bench_with_input(BenchmarkId::new("adx_trend", n), &s, |b, s| {
            b.iter(|| {
                let mut strategy = AdxTrend::new(AdxTrendParams::default()).unwrap();
                black_box(run(s, &mut strategy, &config).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let bars = random_walk(SyntheticSpec {
        bars: 500,
        seed: 3,
        ..SyntheticSpec::default()
    });
    let config = EngineConfig {
        hedging: true,
        cash: 1e9,
        ..EngineConfig::default()
    };
    c.bench_function("broker_50_multi_level_trades", |b| {
        b.iter(|| {
            let mut broker = Broker::new(config.clone()).unwrap();
            for (i, bar) in bars.iter().enumerate() {
                if i < 50 {
                    let plan = (1..=4).fold(ExitPlan::new(), |plan, k| {
                        let k = k as f64;
                        plan.stop_loss(bar.close * (1.0 - 0.02 * k), 1.0)
                            .take_profit(bar.close * (1.0 + 0.02 * k), 1.0)
                    });
                    broker
                        .submit(
                            OrderSide::Buy,
                            OrderRequest::units(40.0).exit_plan(plan),
                            i,
                            bar,
                        )
                        .unwrap();
                }
                broker.process_bar(i, bar).unwrap();
                broker.mark_extremes(bar.close);
            }
            black_box(broker.into_record())
        })
    });
}

fn bench_indicators(c: &mut Criterion) {
    let bars = random_walk(SyntheticSpec {
        bars: 10_000,
        seed: 5,
        ..SyntheticSpec::default()
    });
    let indicators: Vec<Box<dyn Indicator>> = vec![
        Box::new(Sma::new(50).unwrap()),
        Box::new(Ema::new(50).unwrap()),
        Box::new(Atr::new(14).unwrap()),
        Box::new(Adx::new(14).unwrap()),
    ];
    let mut group = c.benchmark_group("indicators_10k");
    for indicator in &indicators {
        group.bench_function(indicator.name(), |b| {
            b.iter(|| black_box(indicator.compute(black_box(&bars))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_driver, bench_matching, bench_indicators);
criterion_main!(benches);
