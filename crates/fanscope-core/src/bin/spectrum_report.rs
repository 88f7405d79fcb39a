//! Print the spectrum of a model file at one operating point
//!
//! ```text
//! spectrum-report <model.json | entity_condition> <rpm> [1_3|1_12|1_48]
//! ```
//!
//! Accepts either a spectrum cache file (`{"type": "spectrum_v2", "model": ..}`)
//! or a bare model object. A model key instead of a path is looked up in the
//! configured model directory. The aggregation range comes from the user
//! config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use fanscope_core::cache::{DirectoryModelProvider, SpectrumFile};
use fanscope_core::config::{default_config_path, load_config, FanscopeConfig};
use fanscope_core::models::{FanCurve, SpectrumModel};
use fanscope_core::octave::OctaveResolution;
use fanscope_core::spectrum::SpectrumAssembler;
use fanscope_core::types::{ModelKey, OperatingPoint};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        bail!("usage: spectrum-report <model.json | entity_condition> <rpm> [1_3|1_12|1_48]");
    }

    let rpm: f64 = args[1]
        .parse()
        .with_context(|| format!("Invalid RPM: {:?}", args[1]))?;

    let config: FanscopeConfig = load_config(&default_config_path());
    let resolution = match args.get(2) {
        Some(name) => OctaveResolution::from_name(name)
            .with_context(|| format!("Unknown resolution: {:?}", name))?,
        None => config.spectrum.default_resolution,
    };

    let path = resolve_path(&args[0], &config);
    let model = read_model(&path)?;
    let key = key_from_path(&path);
    log::info!(
        "Model {}: {} bands at 1/{} octave",
        key,
        model.centers.len(),
        model.native_resolution()
    );

    let curves = [FanCurve::new(key.to_string(), key)];
    let models: HashMap<ModelKey, Arc<SpectrumModel>> = [(key, Arc::new(model))].into();
    let mut assembler =
        SpectrumAssembler::new(config.spectrum.clone(), config.cache.eval_cache_capacity);

    let series = assembler.build_series(&curves, OperatingPoint::rpm(rpm), resolution, &models);
    let axis_max = assembler.level_axis_max(&curves, resolution, &models, true);

    let Some(series) = series.into_iter().next() else {
        bail!("No series produced");
    };
    match series.rpm {
        Some(evaluated) => println!("# {} at {:.0} RPM, {}", key, evaluated, resolution),
        None => bail!("No usable speed for RPM {}", rpm),
    }
    for [freq, level] in &series.points {
        println!("{:>10.1} Hz  {:>6.1} dB", freq, level);
    }
    println!("# level axis max {:.0} dB", axis_max);

    Ok(())
}

/// A model key that isn't an existing file names a file in the model directory
fn resolve_path(arg: &str, config: &FanscopeConfig) -> PathBuf {
    let path = PathBuf::from(arg);
    if path.exists() {
        return path;
    }
    match arg.parse::<ModelKey>() {
        Ok(key) => DirectoryModelProvider::new(config.cache.model_dir()).path_for(key),
        Err(_) => path,
    }
}

fn read_model(path: &Path) -> Result<SpectrumModel> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;

    if let Ok(file) = serde_json::from_slice::<SpectrumFile>(&bytes) {
        if !file.has_known_type() {
            log::warn!("Unexpected file type {:?}, reading anyway", file.kind);
        }
        return Ok(file.model);
    }
    let model: SpectrumModel = serde_json::from_slice(&bytes)
        .with_context(|| format!("{:?} is neither a spectrum file nor a model", path))?;
    if !model.is_usable() {
        bail!("{:?} has no band data", path);
    }
    Ok(model)
}

/// `{entity}_{condition}_spectrum.json` names carry the key
fn key_from_path(path: &Path) -> ModelKey {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches("_spectrum"))
        .and_then(|s| s.parse().ok())
        .unwrap_or(ModelKey::new(0, 0))
}
