//! Throughput of the detection stages
//!
//! Covers filter design, zero-phase filtering, the adaptive detector on its
//! own and the full per-modality pipeline on recordings of growing length.

use bsp_core::Modality;
use bsp_processing::{Emphasis, EventDetector, FilterDesigner, FilterRequest, Pipeline, ProcessingConfig, SignalConditioner};
use bsp_simulation::{PulseTrain, PulseTrainConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const FS: f64 = 500.0;
const DURATIONS_S: [f64; 3] = [10.0, 60.0, 300.0];

fn recording(duration_s: f64) -> bsp_core::Signal {
    let config = PulseTrainConfig::ecg(FS, 0.8, duration_s).with_noise(0.05).with_baseline_wander(0.2, 0.3);
    PulseTrain::new(config).unwrap().generate().unwrap().signal
}

/// Uncached Butterworth design for increasing order
fn bench_filter_design(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_design");

    for order in [2, 4, 8] {
        let request = FilterRequest::bandpass(3.0, 45.0, order);
        group.bench_with_input(BenchmarkId::new("bandpass", order), &request, |b, request| {
            b.iter(|| {
                let designer = FilterDesigner::new();
                black_box(designer.design_request(black_box(request), FS).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_filtfilt(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtfilt");
    let designer = FilterDesigner::new();
    let spec = designer.design_request(&FilterRequest::bandpass(3.0, 45.0, 4), FS).unwrap();
    let conditioner = SignalConditioner::new(designer);

    for duration in DURATIONS_S {
        let signal = recording(duration);
        group.bench_with_input(BenchmarkId::new("bandpass_4", format!("{}s", duration)), &signal, |b, signal| {
            b.iter(|| black_box(conditioner.apply(black_box(signal), &spec).unwrap()));
        });
    }

    group.finish();
}

/// Detector alone on a pre-emphasized signal
fn bench_detector(c: &mut Criterion) {
    let mut group = c.benchmark_group("detector");
    let config = ProcessingConfig::ecg();
    let detector = EventDetector::new(config.detector.clone()).unwrap();
    let designer = FilterDesigner::new();
    let spec = designer.design_request(&config.conditioning.filter, FS).unwrap();
    let conditioner = SignalConditioner::new(designer);
    let emphasis = Emphasis::EnergyEnvelope {
        window_s: config.detector.emphasis_window_s,
    };

    for duration in DURATIONS_S {
        let conditioned = conditioner.apply(&recording(duration), &spec).unwrap();
        let emphasized = emphasis.apply(&conditioned).unwrap();
        group.bench_with_input(BenchmarkId::new("ecg", format!("{}s", duration)), &emphasized, |b, signal| {
            b.iter(|| black_box(detector.detect(black_box(signal)).unwrap()));
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);
    let pipeline = Pipeline::for_modality(Modality::Ecg).unwrap();

    for duration in DURATIONS_S {
        let signal = recording(duration);
        group.bench_with_input(BenchmarkId::new("ecg", format!("{}s", duration)), &signal, |b, signal| {
            b.iter(|| black_box(pipeline.process(black_box(signal)).unwrap()));
        });
    }

    let batch: Vec<_> = (0..8).map(|_| recording(60.0)).collect();
    group.bench_function("ecg_batch_8x60s", |b| {
        b.iter(|| black_box(pipeline.process_batch(black_box(&batch))));
    });

    group.finish();
}

criterion_group!(benches, bench_filter_design, bench_filtfilt, bench_detector, bench_pipeline);
criterion_main!(benches);
