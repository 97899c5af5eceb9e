//! Measurement drivers built on repeated single conversions.
//!
//! Every driver validates its own settings, resolves the run seed once, and
//! derives one generator per trial and per input from it, so results are
//! reproducible regardless of how the work is scheduled.

pub mod dac;
pub mod dynamic;
pub mod nonlinearity;

pub use dac::{DacLinearity, measure_dac_linearity};
pub use dynamic::{DynamicResults, EnergyResults, SineSettings, measure_conversion_energy, measure_enob};
pub use nonlinearity::{Linearity, MonteCarloSummary, NonlinearityResults, SweepSettings, measure_nonlinearity};

use serde::{Deserialize, Serialize};

use crate::config::SarConfig;
use crate::sar::controller::{ConversionRecord, ConvertOptions, SarAdc};
use crate::seed::{AUXILIARY_STREAM, MISMATCH_STREAM, resolve_seed, stream_rng};

/// Converter for Monte-Carlo trial `trial`: the array is drawn from the
/// trial's mismatch stream (nominal when mismatch is zero).
pub(crate) fn trial_adc(config: &SarConfig, seed: u64, trial: u64) -> SarAdc<'_> {
    let mut rng = stream_rng(seed, trial, MISMATCH_STREAM);
    SarAdc::manufacture(config, &mut rng)
}

/// Convert one `(Vp, Vn)` pair on the trial-0 array of `seed`.
pub fn convert_point(
    config: &SarConfig,
    vin_p: f64,
    vin_n: f64,
    seed: Option<u64>,
    options: ConvertOptions,
) -> ConversionRecord {
    let seed = resolve_seed(seed);
    let adc = trial_adc(config, seed, 0);
    let mut rng = stream_rng(seed, 0, AUXILIARY_STREAM);
    adc.convert(vin_p, vin_n, &mut rng, options)
}

/// One converted testbench point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestbenchSample {
    pub time: f64,
    pub positive: f64,
    pub negative: f64,
    pub code: Option<u32>,
    pub energy: f64,
}

/// Convert every point of the configured testbench stimulus.
pub fn run_testbench(config: &SarConfig, seed: Option<u64>) -> Vec<TestbenchSample> {
    let seed = resolve_seed(seed);
    let adc = trial_adc(config, seed, 0);
    let mut rng = stream_rng(seed, 0, AUXILIARY_STREAM);
    let mut conversion = adc.conversion();
    let options = ConvertOptions {
        track_energy: true,
        record_trace: false,
    };
    config
        .testbench
        .iter()
        .map(|p| {
            let code = conversion.run(&adc, p.positive, p.negative, &mut rng, options);
            TestbenchSample {
                time: p.time,
                positive: p.positive,
                negative: p.negative,
                code,
                energy: conversion.energy().unwrap_or(0.0),
            }
        })
        .collect()
}
