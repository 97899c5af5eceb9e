//! Dynamic performance: sine-wave ENOB and switching energy per conversion.

use std::f64::consts::PI;

use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::trial_adc;
use crate::config::SarConfig;
use crate::error::MeasureError;
use crate::sar::controller::ConvertOptions;
use crate::seed::{AUXILIARY_STREAM, resolve_seed, stream_rng};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SineSettings {
    pub samples: usize,
    /// Whole signal periods in the record. Coprime with `samples` for
    /// coherent sampling.
    pub signal_cycles: usize,
    /// Peak amplitude as a fraction of half the input range.
    pub amplitude: f64,
    pub seed: Option<u64>,
}

impl Default for SineSettings {
    fn default() -> Self {
        Self {
            samples: 4096,
            signal_cycles: 127,
            amplitude: 0.95,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicResults {
    pub samples: usize,
    /// Hz
    pub input_frequency: f64,
    /// Differential peak amplitude, V.
    pub amplitude: f64,
    /// RMS of code minus ideal continuous code, LSB.
    pub residual_rms: f64,
    pub enob: f64,
    pub sinad_db: f64,
    pub numeric_faults: u64,
}

/// Convert a coherently sampled sine and compute ENOB from the residual
/// against the ideal continuous transfer, `N - log2(rms * sqrt(12))`.
///
/// Sampling instants carry the configured aperture jitter.
pub fn measure_enob(config: &SarConfig, settings: &SineSettings) -> Result<DynamicResults, MeasureError> {
    if settings.samples < 2 {
        return Err(MeasureError::Invalid(format!(
            "sine test needs at least 2 samples, got {}",
            settings.samples
        )));
    }
    if settings.signal_cycles == 0 || 2 * settings.signal_cycles >= settings.samples {
        return Err(MeasureError::Invalid(format!(
            "signal_cycles must be in 1..{} for {} samples",
            settings.samples / 2,
            settings.samples
        )));
    }
    if !(settings.amplitude > 0.0 && settings.amplitude <= 1.0) {
        return Err(MeasureError::Invalid(format!(
            "amplitude fraction must be in (0, 1], got {}",
            settings.amplitude
        )));
    }

    let seed = resolve_seed(settings.seed);
    let adc = trial_adc(config, seed, 0);
    let mut rng = stream_rng(seed, 0, AUXILIARY_STREAM);
    let jitter = if config.aperture_jitter > 0.0 {
        Normal::new(0.0, config.aperture_jitter).ok()
    } else {
        None
    };

    let fs = config.sampling_frequency;
    let f_in = fs * settings.signal_cycles as f64 / settings.samples as f64;
    let (low, high) = config.cdac.input_range();
    let amplitude = settings.amplitude * 0.5 * (high - low);
    let lsb = config.lsb();
    let vcm = config.common_mode();

    let mut conversion = adc.conversion();
    let mut sum_sq = 0.0;
    let mut converted = 0u64;
    let mut faults = 0u64;
    for k in 0..settings.samples {
        let t = k as f64 / fs;
        let t_jittered = t + jitter.map_or(0.0, |d| d.sample(&mut rng));
        let x = amplitude * (2.0 * PI * f_in * t_jittered).sin();
        match conversion.run(&adc, vcm + 0.5 * x, vcm - 0.5 * x, &mut rng, ConvertOptions::default()) {
            Some(code) => {
                let ideal = amplitude * (2.0 * PI * f_in * t).sin();
                let residual = code as f64 - ((ideal - low) / lsb - 0.5);
                sum_sq += residual * residual;
                converted += 1;
            }
            None => faults += 1,
        }
    }

    if converted == 0 {
        return Err(MeasureError::Invalid("every conversion hit a numeric fault".into()));
    }
    if faults > 0 {
        log::warn!("{faults} sine samples produced non-finite node voltages");
    }
    let residual_rms = (sum_sq / converted as f64).sqrt();
    let enob = config.resolution as f64 - (residual_rms * 12f64.sqrt()).log2();
    log::info!("sine test at {:.3} kHz: ENOB {enob:.2} bits", f_in / 1e3);

    Ok(DynamicResults {
        samples: settings.samples,
        input_frequency: f_in,
        amplitude,
        residual_rms,
        enob,
        sinad_db: 6.02 * enob + 1.76,
        numeric_faults: faults,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyResults {
    pub conversions: usize,
    /// J per conversion
    pub average_energy: f64,
    pub min_energy: f64,
    pub max_energy: f64,
    /// Average energy divided by the resolution in bits.
    pub energy_per_bit: f64,
    /// Energy at each code centre, lowest code first.
    pub per_code: Vec<f64>,
}

/// Reference energy drawn per conversion, one input at every code centre.
pub fn measure_conversion_energy(config: &SarConfig, seed: Option<u64>) -> Result<EnergyResults, MeasureError> {
    let seed = resolve_seed(seed);
    let adc = trial_adc(config, seed, 0);
    let mut rng = stream_rng(seed, 0, AUXILIARY_STREAM);
    let options = ConvertOptions {
        track_energy: true,
        record_trace: false,
    };
    let (low, _) = config.cdac.input_range();
    let lsb = config.lsb();
    let vcm = config.common_mode();
    let codes = config.code_count();

    let mut conversion = adc.conversion();
    let mut per_code = Vec::with_capacity(codes);
    for k in 0..codes {
        let x = low + (k as f64 + 0.5) * lsb;
        conversion.run(&adc, vcm + 0.5 * x, vcm - 0.5 * x, &mut rng, options);
        per_code.push(conversion.energy().unwrap_or(f64::NAN));
    }

    let finite: Vec<f64> = per_code.iter().copied().filter(|e| e.is_finite()).collect();
    if finite.is_empty() {
        return Err(MeasureError::Invalid("no finite conversion energy".into()));
    }
    let average_energy = finite.iter().sum::<f64>() / finite.len() as f64;
    Ok(EnergyResults {
        conversions: codes,
        average_energy,
        min_energy: finite.iter().copied().fold(f64::INFINITY, f64::min),
        max_energy: finite.iter().copied().fold(0.0, f64::max),
        energy_per_bit: average_energy / f64::from(config.resolution),
        per_code,
    })
}
