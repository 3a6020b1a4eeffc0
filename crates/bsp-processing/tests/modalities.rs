//! Per-modality fixtures: each preset pipeline on a matching synthetic recording

use anyhow::{ensure, Result};
use bsp_core::{EventKind, EventSeries, Modality};
use bsp_processing::{Pipeline, PipelineBuilder, PipelineResult};
use bsp_simulation::{PulseShape, PulseTrain, PulseTrainConfig, Recording};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn run(modality: Modality, config: PulseTrainConfig) -> Result<(Recording, PipelineResult)> {
    let recording = PulseTrain::new(config)?.generate()?;
    let result = Pipeline::for_modality(modality)?.process(&recording.signal)?;
    Ok((recording, result))
}

/// Every event falls in `[onset + from_s, onset + to_s]` of its own pulse
fn assert_within_pulses(events: &EventSeries, onsets: &[usize], from_s: f64, to_s: f64) -> Result<()> {
    ensure!(
        events.len() == onsets.len(),
        "expected {} events, found {}: {:?}",
        onsets.len(),
        events.len(),
        events.indices()
    );
    let fs = events.sampling_rate();
    for (event, onset) in events.iter().zip(onsets) {
        let lag = (event.index as f64 - *onset as f64) / fs;
        ensure!(
            (from_s..=to_s).contains(&lag),
            "event at {} lags its pulse at {} by {:.3}s",
            event.index,
            onset,
            lag
        );
    }
    Ok(())
}

fn assert_refractory(events: &EventSeries) -> Result<()> {
    for pair in events.events().windows(2) {
        ensure!(pair[1].index - pair[0].index >= events.refractory_samples());
    }
    Ok(())
}

#[test]
fn ppg_systolic_peaks() -> Result<()> {
    init_tracing();
    let (recording, result) = run(Modality::Ppg, PulseTrainConfig::ppg(250.0, 0.8, 30.0))?;

    ensure!(recording.pulse_indices.len() == 37);
    assert_within_pulses(&result.events, &recording.pulse_indices, -0.008, 0.008)?;
    ensure!(result.events.iter().all(|e| e.kind == EventKind::SystolicPeak));
    Ok(())
}

#[test]
fn ppg_tolerates_noise() -> Result<()> {
    init_tracing();
    let config = PulseTrainConfig::ppg(250.0, 0.8, 30.0).with_noise(0.05).with_seed(9);
    let (recording, result) = run(Modality::Ppg, config)?;
    assert_within_pulses(&result.events, &recording.pulse_indices, -0.02, 0.02)
}

#[test]
fn eda_response_onsets() -> Result<()> {
    init_tracing();
    let (recording, result) = run(Modality::Eda, PulseTrainConfig::eda(50.0, 8.0, 120.0))?;

    assert_within_pulses(&result.events, &recording.pulse_indices, 0.0, 0.5)?;
    ensure!(result.events.iter().all(|e| e.kind == EventKind::ScrOnset));

    let audit = result.quality.component("eda_bottcher");
    ensure!(audit.is_some_and(|c| c.weight == 0.0), "EDA audit missing: {:?}", result.quality);
    Ok(())
}

#[test]
fn respiration_breaths() -> Result<()> {
    init_tracing();
    let (recording, result) = run(Modality::Respiration, PulseTrainConfig::respiration(50.0, 4.0, 120.0))?;

    assert_within_pulses(&result.events, &recording.pulse_indices, -0.25, 0.25)?;
    assert_refractory(&result.events)
}

#[test]
fn emg_activations_fall_inside_bursts() -> Result<()> {
    init_tracing();
    let (recording, result) = run(Modality::Emg, PulseTrainConfig::emg(1000.0, 2.0, 20.0))?;

    // bursts last 0.8s from their start
    assert_within_pulses(&result.events, &recording.pulse_indices, 0.0, 0.8)?;
    assert_refractory(&result.events)
}

#[test]
fn pcg_heart_sounds() -> Result<()> {
    init_tracing();
    let config = PulseTrainConfig {
        shape: PulseShape::Burst {
            duration_s: 0.1,
            carrier_hz: 60.0,
        },
        modality: Some(Modality::Pcg),
        ..PulseTrainConfig::new(2000.0, 0.8, 10.0)
    };
    let (recording, result) = run(Modality::Pcg, config)?;

    ensure!(recording.pulse_indices.len() == 12);
    assert_within_pulses(&result.events, &recording.pulse_indices, 0.0, 0.1)
}

#[test]
fn resampled_pipeline_reports_target_rate() -> Result<()> {
    init_tracing();
    let recording = PulseTrain::new(PulseTrainConfig::ecg(1000.0, 0.8, 10.0))?.generate()?;
    let mut builder = PipelineBuilder::new(Modality::Ecg);
    builder.resample(250.0);
    let result = builder.build()?.process(&recording.signal)?;

    ensure!(result.conditioned.sampling_rate() == 250.0);
    ensure!(result.events.sampling_rate() == 250.0);
    let truth: Vec<usize> = recording.pulse_indices.iter().map(|i| i / 4).collect();
    ensure!(result.events.len() == truth.len());
    for (found, expected) in result.events.indices().iter().zip(&truth) {
        ensure!(found.abs_diff(*expected) <= 1, "event {} vs {}", found, expected);
    }
    Ok(())
}

#[test]
fn every_modality_respects_refractory_period() -> Result<()> {
    init_tracing();
    let fixtures = [
        (Modality::Ecg, PulseTrainConfig::ecg(500.0, 0.6, 20.0).with_noise(0.1)),
        (Modality::Ppg, PulseTrainConfig::ppg(250.0, 0.7, 20.0).with_noise(0.1)),
        (Modality::Eda, PulseTrainConfig::eda(50.0, 5.0, 60.0).with_noise(0.01)),
        (Modality::Respiration, PulseTrainConfig::respiration(50.0, 3.0, 60.0).with_noise(0.05)),
        (Modality::Emg, PulseTrainConfig::emg(1000.0, 1.5, 15.0).with_noise(0.05)),
    ];
    for (modality, config) in fixtures {
        let (_, result) = run(modality, config)?;
        ensure!(!result.events.is_empty(), "{} found nothing", modality);
        assert_refractory(&result.events)?;
        ensure!((0.0..=1.0).contains(&result.quality.score));
    }
    Ok(())
}
