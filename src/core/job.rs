//! One separation job, from device resolution to canonical stems.

use crate::{
    core::{
        audio,
        engine::SeparationEngine,
        estimator::{self, Estimator},
        normalize,
    },
    device::{
        catalog::Enumeration,
        selector::{self, Resolution},
    },
    error::{Result, StemError},
    io::progress::ProgressReporter,
    types::{DeviceRequest, JobResult, WorkerOptions},
};

use std::{fs, time::Instant};

/// Run a full separation job and report progress along the way.
///
/// Progress goes 0, 1, 3 (then the loading estimator), 11 (then the processing
/// estimator), 92 and 100. Both estimators are stopped before the next fixed
/// value is emitted, including when the engine fails.
pub fn run_job(
    opts: &WorkerOptions,
    enumeration: &Enumeration,
    engine: &mut dyn SeparationEngine,
    reporter: &ProgressReporter,
) -> Result<JobResult> {
    if !opts.input.is_file() {
        return Err(StemError::InputNotFound(opts.input.clone()));
    }
    fs::create_dir_all(&opts.output_dir)?;
    reporter.emit(0, "Initializing");

    let request = DeviceRequest::parse(&opts.device);
    let Resolution { device, warnings } = selector::resolve(&request, enumeration);
    log_devices(enumeration, &device.id);
    if !warnings.is_empty() {
        log::debug!("{} device warning(s) for request '{}'", warnings.len(), request);
    }

    let tag = device.display_name.clone();
    let engine_device = selector::engine_device(&device.id);
    log::info!(
        "Using device {} ({}) via engine '{}' as '{}'",
        device.id,
        tag,
        engine.name(),
        engine_device
    );

    reporter.emit(1, &format!("Initializing [{}]", tag));
    reporter.emit(3, &format!("Loading AI model [{}]", tag));

    let started = Instant::now();
    let loading = Estimator::loading(&tag, reporter.clone());
    let loaded = engine.load_model(&opts.model_name, &engine_device);
    loading.stop();
    loaded?;
    log::info!("Model loaded in {:.1}s", started.elapsed().as_secs_f64());

    reporter.emit(11, &format!("Starting separation [{}]", tag));

    let duration = audio::duration_or_default(&opts.input);
    let estimate = estimator::estimated_processing_secs(duration, device.is_cpu());
    log::info!("Audio duration {:.1}s, estimated processing {:.1}s", duration, estimate);

    let started = Instant::now();
    let processing = Estimator::processing(estimate, &tag, reporter.clone());
    let separated = engine.separate(&opts.input, &engine_device);
    processing.stop();
    let raw = separated?;
    log::info!("Separation finished in {:.1}s", started.elapsed().as_secs_f64());

    reporter.emit(92, "Writing stems");
    let result = normalize::normalize(&raw, &opts.output_dir)?;
    if result.is_empty() {
        log::warn!("no recognisable stems among {} output file(s)", raw.len());
    }

    reporter.emit(100, "Complete");
    Ok(result)
}

fn log_devices(enumeration: &Enumeration, selected: &str) {
    log::info!("Devices:");
    for d in &enumeration.available {
        let mark = if d.id == selected { " <-- SELECTED" } else { "" };
        log::info!("  {}: {} ({}){}", d.id, d.display_name, d.backend_type, mark);
    }
    for s in &enumeration.skipped {
        log::info!("  {}: {} (skipped: {})", s.id, s.display_name, s.reason);
    }
}
