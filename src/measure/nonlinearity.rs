//! Histogram-based static linearity (DNL/INL) with optional Monte-Carlo
//! mismatch trials.

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::trial_adc;
use crate::config::SarConfig;
use crate::error::MeasureError;
use crate::sar::controller::{Conversion, ConvertOptions};
use crate::seed::{SWEEP_STREAM_BASE, resolve_seed, stream_rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Swept inputs per ideal code.
    pub values_per_bin: usize,
    /// Conversions per swept input.
    pub samples_per_bin: usize,
    /// Mismatch realizations. 1 runs a single array.
    pub trials: usize,
    pub seed: Option<u64>,
    /// Keep every trial's DNL/INL arrays in the results.
    pub keep_trial_arrays: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            values_per_bin: 16,
            samples_per_bin: 1,
            trials: 1,
            seed: None,
            keep_trial_arrays: true,
        }
    }
}

impl SweepSettings {
    fn check(&self) -> Result<(), MeasureError> {
        if self.values_per_bin == 0 {
            return Err(MeasureError::ZeroCount("values_per_bin"));
        }
        if self.samples_per_bin == 0 {
            return Err(MeasureError::ZeroCount("samples_per_bin"));
        }
        if self.trials == 0 {
            return Err(MeasureError::ZeroCount("trials"));
        }
        Ok(())
    }
}

/// Linearity of one array, all quantities in LSB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linearity {
    pub histogram: Vec<u64>,
    pub dnl: Vec<f64>,
    /// End-point corrected.
    pub inl: Vec<f64>,
    /// Corrected INL at mid-scale.
    pub offset_error: f64,
    /// Uncorrected `INL[last] - INL[0]`.
    pub gain_error: f64,
    pub missing_codes: Vec<u32>,
    pub worst_dnl: f64,
    pub worst_inl: f64,
    /// Conversions dropped because a node voltage was not finite.
    pub numeric_faults: u64,
}

impl Linearity {
    pub fn from_histogram(histogram: Vec<u64>, expected_per_code: f64, numeric_faults: u64) -> Self {
        let n = histogram.len();
        // DNL: hits per code against the uniform expectation.
        let dnl: Vec<f64> = histogram
            .iter()
            .map(|&h| h as f64 / expected_per_code - 1.0)
            .collect();

        // INL: running sum of DNL, then the endpoint line removed.
        let mut raw = Vec::with_capacity(n);
        let mut acc = 0.0;
        for d in &dnl {
            acc += d;
            raw.push(acc);
        }

        let (first, last) = match (raw.first(), raw.last()) {
            (Some(&a), Some(&b)) => (a, b),
            _ => (0.0, 0.0),
        };
        let span = n.saturating_sub(1).max(1) as f64;
        let inl: Vec<f64> = raw
            .iter()
            .enumerate()
            .map(|(k, r)| {
                let t = k as f64 / span;
                r - (first * (1.0 - t) + last * t)
            })
            .collect();

        // Missing: codes that never fired.
        let missing_codes = histogram
            .iter()
            .enumerate()
            .filter(|(_, h)| **h == 0)
            .map(|(k, _)| k as u32)
            .collect();

        Self {
            offset_error: inl.get(n / 2).copied().unwrap_or(0.0),
            gain_error: last - first,
            worst_dnl: max_abs(&dnl),
            worst_inl: max_abs(&inl),
            missing_codes,
            histogram,
            dnl,
            inl,
            numeric_faults,
        }
    }

    /// Number of codes hit at least once.
    pub fn codes_hit(&self) -> usize {
        self.histogram.iter().filter(|h| **h > 0).count()
    }
}

/// DNL/INL arrays of one Monte-Carlo trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialArrays {
    pub dnl: Vec<f64>,
    pub inl: Vec<f64>,
}

/// Statistics across Monte-Carlo trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSummary {
    pub trials: usize,
    pub dnl_mean: Vec<f64>,
    pub dnl_std: Vec<f64>,
    pub inl_mean: Vec<f64>,
    pub inl_std: Vec<f64>,
    pub worst_dnl_per_trial: Vec<f64>,
    pub worst_inl_per_trial: Vec<f64>,
    pub worst_dnl_std: f64,
    pub worst_inl_std: f64,
    pub worst_dnl: f64,
    pub worst_inl: f64,
    /// Trials with at least one missing code.
    pub trials_with_missing_codes: usize,
    pub numeric_faults: u64,
}

impl MonteCarloSummary {
    pub fn from_trials(trials: &[Linearity]) -> Self {
        let codes = trials.first().map_or(0, |t| t.dnl.len());
        let (dnl_mean, dnl_std) = per_code_stats(trials, codes, |t| &t.dnl);
        let (inl_mean, inl_std) = per_code_stats(trials, codes, |t| &t.inl);
        let worst_dnl_per_trial: Vec<f64> = trials.iter().map(|t| t.worst_dnl).collect();
        let worst_inl_per_trial: Vec<f64> = trials.iter().map(|t| t.worst_inl).collect();
        Self {
            trials: trials.len(),
            worst_dnl_std: mean_std(&worst_dnl_per_trial).1,
            worst_inl_std: mean_std(&worst_inl_per_trial).1,
            worst_dnl: worst_dnl_per_trial.iter().copied().fold(0.0, f64::max),
            worst_inl: worst_inl_per_trial.iter().copied().fold(0.0, f64::max),
            trials_with_missing_codes: trials.iter().filter(|t| !t.missing_codes.is_empty()).count(),
            numeric_faults: trials.iter().map(|t| t.numeric_faults).sum(),
            dnl_mean,
            dnl_std,
            inl_mean,
            inl_std,
            worst_dnl_per_trial,
            worst_inl_per_trial,
        }
    }
}

/// Code returned for one swept input (first repeat of trial 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferPoint {
    pub input: f64,
    pub code: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonlinearityResults {
    pub resolution: u32,
    pub seed: u64,
    pub values_per_bin: usize,
    pub samples_per_bin: usize,
    /// Differential sweep range `[low, high]` in volts.
    pub input_range: [f64; 2],
    pub lsb: f64,
    /// Sum of the nominal weights.
    pub code_span: f64,
    pub weights_nominal: Vec<f64>,
    pub weights_calibrated: Option<Vec<f64>>,
    /// Trial 0.
    #[serde(flatten)]
    pub linearity: Linearity,
    pub transfer: Vec<TransferPoint>,
    pub monte_carlo: Option<MonteCarloSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_trial: Vec<TrialArrays>,
}

struct TrialSweep {
    linearity: Linearity,
    transfer: Vec<Option<u32>>,
    calibrated: Option<Vec<f64>>,
}

/// Sweep the differential input across full scale and histogram the codes.
pub fn measure_nonlinearity(
    config: &SarConfig,
    settings: &SweepSettings,
) -> Result<NonlinearityResults, MeasureError> {
    settings.check()?;
    let seed = resolve_seed(settings.seed);
    let codes = config.code_count();
    let (low, high) = config.cdac.input_range();
    let lsb = config.lsb();
    let vpb = settings.values_per_bin;
    // Midpoints of vpb equal slices of every LSB bin, so each ideal code
    // receives exactly vpb inputs.
    let inputs: Vec<f64> = (0..vpb * codes)
        .map(|j| low + (j as f64 + 0.5) * lsb / vpb as f64)
        .collect();

    log::info!(
        "nonlinearity sweep: {} bits, {} inputs x {} samples, {} trial(s), seed {}",
        config.resolution,
        inputs.len(),
        settings.samples_per_bin,
        settings.trials,
        seed
    );
    let start = web_time::Instant::now();

    // One mismatch draw per trial; trials are independent.
    let run = |trial: usize| sweep_trial(config, settings, seed, trial, &inputs);
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    let mut sweeps: Vec<TrialSweep> = (0..settings.trials).into_par_iter().map(run).collect();
    #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
    let mut sweeps: Vec<TrialSweep> = (0..settings.trials).map(run).collect();

    let faults: u64 = sweeps.iter().map(|s| s.linearity.numeric_faults).sum();
    if faults > 0 {
        log::warn!("{faults} conversions produced non-finite node voltages and were dropped");
    }

    // Spread over trials only makes sense with more than one.
    let (monte_carlo, per_trial) = if settings.trials > 1 {
        let trials: Vec<Linearity> = sweeps.iter().map(|s| s.linearity.clone()).collect();
        let summary = MonteCarloSummary::from_trials(&trials);
        let arrays = if settings.keep_trial_arrays {
            trials
                .into_iter()
                .map(|t| TrialArrays {
                    dnl: t.dnl,
                    inl: t.inl,
                })
                .collect()
        } else {
            Vec::new()
        };
        (Some(summary), arrays)
    } else {
        (None, Vec::new())
    };

    // Trial 0 is the reported converter.
    let first = sweeps.swap_remove(0);
    let transfer = inputs
        .iter()
        .zip(&first.transfer)
        .map(|(&input, &code)| TransferPoint { input, code })
        .collect();

    log::info!(
        "sweep finished in {:.1} ms: worst DNL {:.3} LSB, worst INL {:.3} LSB, {} missing codes",
        start.elapsed().as_secs_f64() * 1000.0,
        first.linearity.worst_dnl,
        first.linearity.worst_inl,
        first.linearity.missing_codes.len()
    );

    Ok(NonlinearityResults {
        resolution: config.resolution,
        seed,
        values_per_bin: vpb,
        samples_per_bin: settings.samples_per_bin,
        input_range: [low, high],
        lsb,
        code_span: config.cdac.weights.sum(),
        weights_nominal: config.cdac.weights.as_slice().to_vec(),
        weights_calibrated: first.calibrated,
        linearity: first.linearity,
        transfer,
        monte_carlo,
        per_trial,
    })
}

fn sweep_trial(
    config: &SarConfig,
    settings: &SweepSettings,
    seed: u64,
    trial: usize,
    inputs: &[f64],
) -> TrialSweep {
    let adc = trial_adc(config, seed, trial as u64);
    let spb = settings.samples_per_bin;
    let vcm = config.common_mode();
    let mut codes: Vec<Option<u32>> = vec![None; inputs.len() * spb];

    // Input j owns spb slots and its own noise stream, so the result does
    // not depend on how inputs are split across threads.
    let fill = |conversion: &mut Conversion, (j, out): (usize, &mut [Option<u32>])| {
        let mut rng = stream_rng(seed, trial as u64, SWEEP_STREAM_BASE + j as u64);
        let x = inputs[j];
        // Drive the difference symmetrically about Vcm.
        for slot in out.iter_mut() {
            *slot = conversion.run(&adc, vcm + 0.5 * x, vcm - 0.5 * x, &mut rng, ConvertOptions::default());
        }
    };

    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    codes
        .par_chunks_mut(spb)
        .enumerate()
        .for_each_init(|| adc.conversion(), |conversion, item| fill(conversion, item));
    #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
    {
        let mut conversion = adc.conversion();
        codes
            .chunks_mut(spb)
            .enumerate()
            .for_each(|item| fill(&mut conversion, item));
    }

    // Histogram the codes; a None is a conversion dropped on a numeric fault.
    let mut histogram = vec![0u64; config.code_count()];
    let mut faults = 0;
    for code in &codes {
        match code {
            Some(c) => histogram[*c as usize] += 1,
            None => faults += 1,
        }
    }
    log::debug!("trial {trial}: {faults} numeric faults");

    // Ideal hits per code.
    let expected = (settings.values_per_bin * spb) as f64;
    TrialSweep {
        linearity: Linearity::from_histogram(histogram, expected, faults),
        // First repeat of each input.
        transfer: codes.iter().step_by(spb).copied().collect(),
        calibrated: adc.calibrated_weights(),
    }
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Population mean and standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn per_code_stats<F>(trials: &[Linearity], codes: usize, pick: F) -> (Vec<f64>, Vec<f64>)
where
    F: Fn(&Linearity) -> &Vec<f64>,
{
    let mut column = Vec::with_capacity(trials.len());
    (0..codes)
        .map(|k| {
            column.clear();
            column.extend(trials.iter().map(|t| pick(t)[k]));
            mean_std(&column)
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_histogram_is_perfectly_linear() {
        let lin = Linearity::from_histogram(vec![4; 16], 4.0, 0);
        assert!(lin.dnl.iter().all(|d| *d == 0.0));
        assert!(lin.inl.iter().all(|d| *d == 0.0));
        assert!(lin.missing_codes.is_empty());
        assert_eq!(lin.codes_hit(), 16);
    }

    #[test]
    fn missing_code_has_dnl_minus_one() {
        let mut h = vec![4u64; 8];
        h[3] = 0;
        h[4] = 8;
        let lin = Linearity::from_histogram(h, 4.0, 0);
        assert_eq!(lin.missing_codes, vec![3]);
        assert_eq!(lin.dnl[3], -1.0);
        assert_eq!(lin.dnl[4], 1.0);
        assert_relative_eq!(lin.inl[3], -1.0, epsilon = 1e-12);
        assert_eq!(lin.worst_dnl, 1.0);
    }

    #[test]
    fn endpoint_correction_zeroes_the_ends() {
        let h = vec![3, 5, 4, 6, 2, 4, 4, 5];
        let lin = Linearity::from_histogram(h, 4.0, 0);
        assert_eq!(lin.inl[0], 0.0);
        assert_eq!(lin.inl[7], 0.0);
        // raw INL: -0.25 at code 0 and 0.25 at code 7
        assert_relative_eq!(lin.gain_error, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn monte_carlo_statistics() {
        let a = Linearity::from_histogram(vec![3, 5, 4, 4], 4.0, 0);
        let b = Linearity::from_histogram(vec![5, 3, 4, 4], 4.0, 1);
        let mc = MonteCarloSummary::from_trials(&[a, b]);
        assert_eq!(mc.trials, 2);
        assert_relative_eq!(mc.dnl_mean[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(mc.dnl_std[0], 0.25, epsilon = 1e-12);
        assert_eq!(mc.worst_dnl_std, 0.0);
        assert_eq!(mc.numeric_faults, 1);
        assert_eq!(mc.trials_with_missing_codes, 0);
    }

    #[test]
    fn zero_counts_are_rejected() {
        let config = crate::config::SarParams::default().validate().unwrap();
        let settings = SweepSettings {
            values_per_bin: 0,
            ..SweepSettings::default()
        };
        assert!(matches!(
            measure_nonlinearity(&config, &settings),
            Err(MeasureError::ZeroCount("values_per_bin"))
        ));
    }

    #[test]
    fn ideal_binary_sweep_hits_every_code_evenly() {
        let config = crate::config::SarParams::default().validate().unwrap();
        let settings = SweepSettings {
            values_per_bin: 4,
            seed: Some(1),
            ..SweepSettings::default()
        };
        let r = measure_nonlinearity(&config, &settings).unwrap();
        assert!(r.linearity.histogram.iter().all(|h| *h == 4), "{:?}", r.linearity.histogram);
        assert_eq!(r.linearity.worst_inl, 0.0);
        assert!(r.monte_carlo.is_none());
        assert_eq!(r.transfer.len(), 4 * 256);
    }
}
