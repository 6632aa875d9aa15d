//! Criterion benchmarks for the analytics stages

use chrono::{TimeDelta, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use us30_analytics::{
    AnalysisRequest, AnalyticsPipeline, PipelineConfig, Sample, Series, detect_anomalies,
    resample, rolling_bands, summary_stats,
};

/// Deterministic random walk sampled every `step_secs`
fn walk(n: usize, step_secs: i64) -> Vec<Sample> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
    let mut price = 37_000.0;
    (0..n)
        .map(|i| {
            let x = (i.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fff_ffff;
            price += (x as f64 / 0x7fff_ffff as f64 - 0.5) * 10.0;
            Sample::new(base + TimeDelta::seconds(i as i64 * step_secs), price)
        })
        .collect()
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stages");

    for size in [1_000usize, 10_000, 100_000] {
        let series = Series::from_samples(walk(size, 5));

        group.bench_with_input(BenchmarkId::new("resample_5m", size), &series, |b, s| {
            b.iter(|| resample(black_box(s), TimeDelta::minutes(5)))
        });
        group.bench_with_input(BenchmarkId::new("rolling_bands_1h", size), &series, |b, s| {
            b.iter(|| rolling_bands(black_box(s), TimeDelta::hours(1), 2.0))
        });
        group.bench_with_input(BenchmarkId::new("summary_anomalies", size), &series, |b, s| {
            b.iter(|| (summary_stats(black_box(s)), detect_anomalies(black_box(s), 2.0)))
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline");
    let pipeline = AnalyticsPipeline::new(PipelineConfig::default());
    let request = AnalysisRequest::at(Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap());

    for size in [1_000usize, 10_000] {
        let csv: String = walk(size, 5)
            .iter()
            .map(|s| format!("{},\"{:.2}\"\n", s.timestamp.to_rfc3339(), s.value))
            .collect();

        group.bench_with_input(BenchmarkId::new("analyze_csv", size), &csv, |b, feed| {
            b.iter(|| {
                pipeline.analyze_feed(
                    black_box(feed.as_bytes()),
                    us30_analytics::FeedFormat::Csv,
                    &request,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stages, bench_pipeline);
criterion_main!(benches);
