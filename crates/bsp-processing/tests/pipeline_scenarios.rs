//! End-to-end detection scenarios on synthetic recordings

use anyhow::{ensure, Context, Result};
use bsp_core::{EventSeries, FeatureDomain, Modality, QualityLabel, Signal};
use bsp_processing::features::names;
use bsp_processing::{
    FeatureExtractor, FilterDesigner, FilterFamily, FilterRequest, Pipeline, PipelineBuilder, ProcessingConfig,
    SignalConditioner,
};
use bsp_simulation::{sinusoid, PulseShape, PulseTrain, PulseTrainConfig, Recording};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn record(config: PulseTrainConfig) -> Result<Recording> {
    Ok(PulseTrain::new(config)?.generate()?)
}

fn assert_matches_truth(events: &EventSeries, truth: &[usize], tolerance: usize) -> Result<()> {
    ensure!(
        events.len() == truth.len(),
        "expected {} events, found {}: {:?}",
        truth.len(),
        events.len(),
        events.indices()
    );
    for (found, expected) in events.indices().iter().zip(truth) {
        ensure!(
            found.abs_diff(*expected) <= tolerance,
            "event at {} too far from true location {}",
            found,
            expected
        );
    }
    Ok(())
}

fn assert_refractory(events: &EventSeries) -> Result<()> {
    for pair in events.events().windows(2) {
        ensure!(
            pair[1].index - pair[0].index >= events.refractory_samples(),
            "events at {} and {} violate the refractory period",
            pair[0].index,
            pair[1].index
        );
    }
    Ok(())
}

#[test]
fn periodic_waveform_end_to_end() -> Result<()> {
    init_tracing();
    let recording = record(PulseTrainConfig::ecg(1000.0, 0.8, 10.0))?;
    let result = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?;

    let count = result.events.len();
    ensure!((11..=13).contains(&count), "expected about 12 events, found {}", count);
    for interval in result.events.intervals() {
        ensure!((interval - 0.8).abs() <= 0.05, "interval {}s off the 0.8s period", interval);
    }

    let mean_nn = result
        .features
        .value(names::MEAN_NN)
        .context("mean_nn should be defined")?;
    ensure!((mean_nn - 800.0).abs() <= 20.0, "mean_nn {}ms", mean_nn);
    Ok(())
}

#[test]
fn noisy_recording_matches_truth() -> Result<()> {
    init_tracing();
    let config = PulseTrainConfig::ecg(1000.0, 0.8, 10.0)
        .with_noise(0.05)
        .with_baseline_wander(0.3, 0.3)
        .with_powerline(0.1, 50.0)
        .with_seed(11);
    let recording = record(config)?;
    let result = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?;

    assert_matches_truth(&result.events, &recording.pulse_indices, 5)?;
    assert_refractory(&result.events)
}

#[test]
fn search_back_recovers_suppressed_event() -> Result<()> {
    init_tracing();
    let recording = record(PulseTrainConfig::ecg(1000.0, 0.8, 10.0).with_suppressed(6, 0.2))?;
    let result = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?;

    let truth = recording.pulse_indices[6];
    let refractory = result.events.refractory_samples();
    let recovered = result
        .events
        .iter()
        .find(|e| e.index.abs_diff(truth) <= refractory)
        .context("suppressed event should be recovered")?;

    ensure!(recovered.flags.search_back, "event at {} not flagged as recovered", recovered.index);
    ensure!(result.events.len() == recording.pulse_indices.len());
    Ok(())
}

#[test]
fn detection_is_shift_equivariant() -> Result<()> {
    init_tracing();
    let recording = record(PulseTrainConfig::ecg(1000.0, 0.8, 10.0).with_noise(0.03).with_seed(5))?;
    let pipeline = Pipeline::for_modality(Modality::Ecg)?;
    let original = pipeline.process(&recording.signal)?.events;

    // 2500 samples is longer than the 2s learning window
    for k in [1, 37, 250, 2500] {
        let delayed = pipeline.process(&recording.delayed(k)?.signal)?.events;
        ensure!(delayed.len() == original.len(), "shift {} changed the event count", k);
        for (a, b) in original.indices().iter().zip(delayed.indices()) {
            let moved = b as i64 - *a as i64;
            ensure!((moved - k as i64).abs() <= 1, "shift {} moved event {} to {}", k, a, b);
        }
    }
    Ok(())
}

#[test]
fn boundary_signals_yield_empty_series() -> Result<()> {
    init_tracing();
    let pipeline = Pipeline::for_modality(Modality::Ecg)?;

    for signal in [Signal::new(Vec::new(), 1000.0)?, Signal::new(vec![0.0; 5000], 1000.0)?] {
        let result = pipeline.process(&signal)?;
        ensure!(result.events.is_empty());
        ensure!(result.conditions.iter().all(|c| c.is_recoverable()));
        ensure!(!result.conditions.is_empty());
        ensure!(result.features.features.values().all(|v| !v.is_valid()));
        ensure!(!result.features.is_empty());
        ensure!(result.events.clone().require_events().is_err());
    }
    Ok(())
}

#[test]
fn feature_extraction_is_idempotent() -> Result<()> {
    let recording = record(PulseTrainConfig::ecg(500.0, 0.8, 60.0).with_modulation(0.04, 0.1).with_noise(0.02))?;
    let events = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?.events;

    let extractor = FeatureExtractor::new(ProcessingConfig::ecg().features)?;
    let first = extractor.extract_configured(&events);
    let second = extractor.extract_configured(&events);
    ensure!(first == second);
    Ok(())
}

#[test]
fn respiratory_modulation_shows_in_high_frequency_band() -> Result<()> {
    init_tracing();
    let recording = record(PulseTrainConfig::ecg(250.0, 0.8, 300.0).with_modulation(0.05, 0.25))?;
    let result = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?;

    let hf = result.features.value(names::HF_POWER).context("hf_power")?;
    let lf = result.features.value(names::LF_POWER).context("lf_power")?;
    ensure!(hf > lf, "hf {} should dominate lf {}", hf, lf);

    let peak = result.features.value(names::HF_PEAK).context("hf_peak")?;
    ensure!((peak - 0.25).abs() < 0.05, "hf peak at {}Hz", peak);
    Ok(())
}

#[test]
fn zero_phase_filter_keeps_peak_locations() -> Result<()> {
    let fs = 250.0;
    let signal = sinusoid(2.0, 1.0, fs, 10.0)?;
    let designer = FilterDesigner::new();
    let spec = designer.design_request(&FilterRequest::bandpass(1.0, 8.0, 4), fs)?;
    let filtered = SignalConditioner::new(designer).apply(&signal, &spec)?;

    // sine peaks every 125 samples, starting at 31.25
    // forward and backward passes square the magnitude
    let expected_gain = spec.magnitude_at(2.0).powi(2);
    for k in 2..18 {
        let center = (31.25 + 125.0 * k as f64).round() as usize;
        let window = &filtered.samples()[center - 10..=center + 10];
        let (offset, peak) = window
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .context("non-empty window")?;
        ensure!(offset.abs_diff(10) <= 1, "peak near {} moved by {}", center, offset as i64 - 10);
        ensure!((peak - expected_gain).abs() < 0.02, "peak {} vs gain {}", peak, expected_gain);
    }
    Ok(())
}

#[test]
fn causal_filtering_is_delay_corrected() -> Result<()> {
    init_tracing();
    let recording = record(PulseTrainConfig::ecg(1000.0, 0.8, 10.0))?;
    let mut builder = PipelineBuilder::new(Modality::Ecg);
    builder.filter(FilterRequest::bandpass(3.0, 45.0, 4).causal());
    let result = builder.build()?.process(&recording.signal)?;

    ensure!(!result.filter.zero_phase());
    ensure!(result.refinement.delay_samples > 10, "delay {}", result.refinement.delay_samples);
    assert_matches_truth(&result.events, &recording.pulse_indices, 2)
}

#[test]
fn quality_separates_clean_and_noisy_recordings() -> Result<()> {
    init_tracing();
    let pipeline = Pipeline::for_modality(Modality::Ecg)?;
    let clean = pipeline.process(&record(PulseTrainConfig::ecg(500.0, 0.8, 20.0))?.signal)?;
    let noisy = pipeline.process(&record(PulseTrainConfig::ecg(500.0, 0.8, 20.0).with_noise(0.4).with_seed(3))?.signal)?;

    ensure!(clean.quality.label >= QualityLabel::Acceptable, "clean rated {}", clean.quality.label);
    ensure!(clean.quality.score > noisy.quality.score);
    ensure!(clean.quality.component("ecg_level3").is_some());
    ensure!(clean.quality.score >= 0.0 && clean.quality.score <= 1.0);
    Ok(())
}

#[test]
fn batch_processing_matches_sequential() -> Result<()> {
    init_tracing();
    let pipeline = Pipeline::for_modality(Modality::Ecg)?;
    let signals = (0..4)
        .map(|seed| {
            record(PulseTrainConfig::ecg(500.0, 0.7 + 0.05 * seed as f64, 10.0).with_noise(0.03).with_seed(seed))
                .map(|r| r.signal)
        })
        .collect::<Result<Vec<_>>>()?;

    let batch = pipeline.process_batch(&signals);
    ensure!(batch.len() == signals.len());
    for (signal, result) in signals.iter().zip(batch) {
        let sequential = pipeline.process(signal)?;
        let parallel = result?;
        ensure!(parallel.events == sequential.events);
        ensure!(parallel.features == sequential.features);
    }
    Ok(())
}

#[test]
fn report_serializes_events_and_features() -> Result<()> {
    let recording = record(PulseTrainConfig::ecg(500.0, 0.8, 10.0))?;
    let result = Pipeline::for_modality(Modality::Ecg)?.process(&recording.signal)?;
    let json: serde_json::Value = serde_json::from_str(&result.report().to_json()?)?;

    ensure!(json["sampling_rate"] == 500.0);
    ensure!(json["events"].as_array().map(Vec::len) == Some(result.events.len()));
    ensure!(json["features"]["features"]["mean_nn"]["validity"] == "valid");
    ensure!(json["features"]["features"]["lf_power"]["validity"] == "undefined");
    Ok(())
}

#[test]
fn configuration_round_trips_through_json() -> Result<()> {
    let mut config = ProcessingConfig::ecg();
    config.features.domains = vec![FeatureDomain::Time];
    let restored = ProcessingConfig::from_json(&config.to_json()?)?;
    ensure!(restored == config);

    let recording = record(PulseTrainConfig::ecg(500.0, 0.8, 10.0))?;
    let a = Pipeline::new(config)?.process(&recording.signal)?;
    let b = Pipeline::new(restored)?.process(&recording.signal)?;
    ensure!(a.events == b.events);
    ensure!(a.features.len() == names::TIME.len());
    Ok(())
}

#[test]
fn invalid_filter_request_fails_at_design() -> Result<()> {
    let mut builder = PipelineBuilder::new(Modality::Ecg);
    builder.filter(FilterRequest::bandpass(3.0, 300.0, 4));
    let pipeline = builder.build()?;

    let recording = record(PulseTrainConfig::ecg(500.0, 0.8, 5.0))?;
    let error = pipeline
        .process(&recording.signal)
        .err()
        .context("cutoff above Nyquist must fail")?;
    ensure!(matches!(error, bsp_core::BspError::InvalidFilterSpec { .. }));
    ensure!(pipeline.filter_spec(500.0).is_err());
    ensure!(matches!(pipeline.filter_spec(1000.0)?.family(), FilterFamily::Bandpass));
    Ok(())
}

#[test]
fn pulse_shapes_are_exposed_for_custom_fixtures() -> Result<()> {
    let config = PulseTrainConfig {
        shape: PulseShape::Gaussian { width_s: 0.05 },
        ..PulseTrainConfig::ppg(500.0, 1.0, 10.0)
    };
    let recording = record(config)?;
    let result = Pipeline::for_modality(Modality::Ppg)?.process(&recording.signal)?;
    assert_matches_truth(&result.events, &recording.pulse_indices, 3)
}
