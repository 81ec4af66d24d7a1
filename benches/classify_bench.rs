// Benchmark for line classification and the full per-line dispatch path
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use drift_monitor::time_source::FixedTimeSource;
use drift_monitor::{DriftMonitor, HostSample, LineKind, MemoryLogSink, RawLine, classify};

fn sample_lines() -> Vec<RawLine> {
    let mut lines = Vec::with_capacity(10_000);
    for i in 0..10_000u64 {
        let line = if i % 300 == 299 {
            format!("uC drift correction {}\r\n", -(i as i64) * 1000)
        } else {
            format!("{:016X}\r\n", (1_700_000_000u64 + i) << 32)
        };
        lines.push(RawLine::from(line));
    }
    lines
}

fn bench_classify(c: &mut Criterion) {
    let lines = sample_lines();
    c.bench_function("classify 10k device lines", |b| {
        b.iter(|| {
            let timestamps = lines
                .iter()
                .filter(|line| matches!(classify(line), LineKind::Timestamp(_)))
                .count();
            assert_eq!(timestamps, 10_000 - 33);
        });
    });
}

fn bench_process(c: &mut Criterion) {
    let lines = sample_lines();
    c.bench_function("process 10k device lines into memory logs", |b| {
        b.iter(|| {
            let source = FixedTimeSource(HostSample::new(1_700_000_500, 0));
            let mut monitor = DriftMonitor::new(source, MemoryLogSink::new());
            for line in &lines {
                monitor.process(line);
            }
            assert_eq!(monitor.stats().lines, 10_000);
        });
    });
}

criterion_group!(benches, bench_classify, bench_process);
criterion_main!(benches);
