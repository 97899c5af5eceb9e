//! Parameter bundle, validation and presets.
//!
//! [`SarParams`] mirrors the four-section configuration file (`ADC`, `COMP`,
//! `CDAC`, `TESTBENCH`). [`SarParams::validate`] checks it once and builds
//! the immutable [`SarConfig`] that every component reads from.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::sar::{CdacDesign, ComparatorModel, References, SwitchingStrategy, Weights};

/// Largest supported output resolution. Histograms are `2^N` long.
pub const MAX_RESOLUTION: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarParams {
    #[serde(rename = "ADC")]
    pub adc: AdcParams,
    #[serde(rename = "COMP", default)]
    pub comp: ComparatorParams,
    #[serde(rename = "CDAC")]
    pub cdac: CdacParams,
    #[serde(rename = "TESTBENCH", default)]
    pub testbench: TestbenchParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcParams {
    pub resolution: u32,
    /// Hz
    pub sampling_frequency: f64,
    #[serde(default)]
    pub use_calibration: bool,
    /// RMS sampling-instant jitter in seconds. Only the sine-wave test uses it.
    #[serde(default)]
    pub aperture_jitter: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorParams {
    pub offset_voltage: f64,
    pub threshold_voltage_noise: f64,
    pub common_mode_dependent_offset_gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdacParams {
    pub positive_reference_voltage: f64,
    pub negative_reference_voltage: f64,
    #[serde(default)]
    pub reference_voltage_noise: f64,
    pub unit_capacitance: f64,
    pub array_size: usize,
    #[serde(default)]
    pub use_individual_weights: bool,
    #[serde(default)]
    pub individual_weights: Vec<f64>,
    #[serde(default = "default_radix")]
    pub radix: f64,
    #[serde(default)]
    pub parasitic_capacitance: f64,
    /// Percent of a unit capacitor, one sigma.
    #[serde(default)]
    pub capacitor_mismatch_error: f64,
    #[serde(default)]
    pub settling_time: f64,
    #[serde(default = "default_switching_strat")]
    pub switching_strat: String,
}

/// Piecewise-linear stimulus endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbenchParams {
    pub simulation_times: Vec<f64>,
    pub positive_input_voltages: Vec<f64>,
    pub negative_input_voltages: Vec<f64>,
}

fn default_radix() -> f64 {
    2.0
}

fn default_switching_strat() -> String {
    SwitchingStrategy::Monotonic.name().to_string()
}

impl Default for SarParams {
    fn default() -> Self {
        DesignPreset::Binary8.params()
    }
}

/// One testbench point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusPoint {
    pub time: f64,
    pub positive: f64,
    pub negative: f64,
}

/// Validated, immutable configuration.
#[derive(Debug, Clone)]
pub struct SarConfig {
    pub resolution: u32,
    pub sampling_frequency: f64,
    pub use_calibration: bool,
    pub aperture_jitter: f64,
    pub comparator: ComparatorModel,
    pub cdac: CdacDesign,
    pub strategy: SwitchingStrategy,
    pub testbench: Vec<StimulusPoint>,
}

impl SarConfig {
    /// Comparator decisions per conversion: one per capacitor plus the closing one.
    pub fn cycles(&self) -> usize {
        self.cdac.array_size() + 1
    }

    pub fn code_count(&self) -> usize {
        1usize << self.resolution
    }

    pub fn max_code(&self) -> u32 {
        (self.code_count() - 1) as u32
    }

    /// Ideal code width in volts (differential).
    pub fn lsb(&self) -> f64 {
        let (lo, hi) = self.cdac.input_range();
        (hi - lo) / self.code_count() as f64
    }

    pub fn common_mode(&self) -> f64 {
        self.cdac.references.common_mode()
    }

    /// Time a switching step gets to settle: half of one decision slot.
    pub fn settling_window(&self) -> f64 {
        1.0 / (2.0 * self.cycles() as f64 * self.sampling_frequency)
    }

    pub fn settling_factor(&self) -> f64 {
        self.cdac.settling_factor(self.settling_window())
    }
}

impl SarParams {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Copy with every non-ideality (noise, offset, mismatch, parasitic,
    /// settling, jitter) switched off.
    pub fn ideal(&self) -> Self {
        let mut p = self.clone();
        p.adc.aperture_jitter = 0.0;
        p.comp = ComparatorParams::default();
        p.cdac.reference_voltage_noise = 0.0;
        p.cdac.parasitic_capacitance = 0.0;
        p.cdac.capacitor_mismatch_error = 0.0;
        p.cdac.settling_time = 0.0;
        p
    }

    /// Replace the weight vector with an explicit one.
    pub fn with_weights(mut self, weights: &[f64]) -> Self {
        self.cdac.use_individual_weights = true;
        self.cdac.individual_weights = weights.to_vec();
        self.cdac.array_size = weights.len();
        self
    }

    pub fn validate(&self) -> Result<SarConfig> {
        let adc = &self.adc;
        let comp = &self.comp;
        let cdac = &self.cdac;

        if adc.resolution == 0 || adc.resolution > MAX_RESOLUTION {
            return Err(ConfigError::Resolution {
                got: adc.resolution,
                max: MAX_RESOLUTION,
            });
        }
        positive("sampling_frequency", adc.sampling_frequency)?;
        non_negative("aperture_jitter", adc.aperture_jitter)?;

        finite("offset_voltage", comp.offset_voltage)?;
        non_negative("threshold_voltage_noise", comp.threshold_voltage_noise)?;
        finite(
            "common_mode_dependent_offset_gain",
            comp.common_mode_dependent_offset_gain,
        )?;

        finite("positive_reference_voltage", cdac.positive_reference_voltage)?;
        finite("negative_reference_voltage", cdac.negative_reference_voltage)?;
        if cdac.positive_reference_voltage <= cdac.negative_reference_voltage {
            return Err(ConfigError::ReferenceOrder {
                positive: cdac.positive_reference_voltage,
                negative: cdac.negative_reference_voltage,
            });
        }
        non_negative("reference_voltage_noise", cdac.reference_voltage_noise)?;
        positive("unit_capacitance", cdac.unit_capacitance)?;
        non_negative("parasitic_capacitance", cdac.parasitic_capacitance)?;
        non_negative("capacitor_mismatch_error", cdac.capacitor_mismatch_error)?;
        non_negative("settling_time", cdac.settling_time)?;
        if cdac.array_size < 1 {
            return Err(ConfigError::EmptyArray);
        }

        let weights = if cdac.use_individual_weights {
            if cdac.individual_weights.len() != cdac.array_size {
                return Err(ConfigError::WeightCount {
                    expected: cdac.array_size,
                    got: cdac.individual_weights.len(),
                });
            }
            Weights::explicit(cdac.individual_weights.clone())?
        } else {
            finite("radix", cdac.radix)?;
            if cdac.radix <= 1.0 {
                return Err(ConfigError::Radix(cdac.radix));
            }
            Weights::from_radix(cdac.array_size, cdac.radix)
        };

        let strategy: SwitchingStrategy = cdac.switching_strat.parse()?;

        let tb = &self.testbench;
        if tb.simulation_times.len() != tb.positive_input_voltages.len()
            || tb.simulation_times.len() != tb.negative_input_voltages.len()
        {
            return Err(ConfigError::TestbenchLength {
                times: tb.simulation_times.len(),
                positive: tb.positive_input_voltages.len(),
                negative: tb.negative_input_voltages.len(),
            });
        }
        for &v in tb
            .simulation_times
            .iter()
            .chain(&tb.positive_input_voltages)
            .chain(&tb.negative_input_voltages)
        {
            finite("testbench", v)?;
        }
        if tb.simulation_times.windows(2).any(|w| w[1] < w[0]) {
            return Err(ConfigError::TestbenchOrder);
        }
        let testbench = tb
            .simulation_times
            .iter()
            .zip(&tb.positive_input_voltages)
            .zip(&tb.negative_input_voltages)
            .map(|((&time, &positive), &negative)| StimulusPoint {
                time,
                positive,
                negative,
            })
            .collect();

        let references = References::new(
            cdac.positive_reference_voltage,
            cdac.negative_reference_voltage,
        );
        let comparator = ComparatorModel::new(
            comp.offset_voltage,
            comp.threshold_voltage_noise,
            comp.common_mode_dependent_offset_gain,
            references.common_mode(),
        )
        .map_err(|e| ConfigError::Distribution {
            field: "threshold_voltage_noise",
            reason: e.to_string(),
        })?;

        if !weights.is_convergent() {
            log::warn!(
                "weight vector {:?} has stages larger than the rest of the array; expect missing codes",
                weights.as_slice()
            );
        }
        let span = 2.0 * (weights.sum() + 1.0);
        if span < (1u64 << adc.resolution) as f64 {
            log::warn!(
                "{} capacitors span {span} raw codes, fewer than the {} output codes",
                weights.len(),
                1u64 << adc.resolution
            );
        }

        let design = CdacDesign::new(
            references,
            weights,
            cdac.unit_capacitance,
            cdac.parasitic_capacitance,
            cdac.capacitor_mismatch_error,
            cdac.reference_voltage_noise,
            cdac.settling_time,
        )
        .map_err(|e| ConfigError::Distribution {
            field: "reference_voltage_noise",
            reason: e.to_string(),
        })?;

        log::debug!(
            "validated {}-bit {} design: {} capacitors, weight sum {}",
            adc.resolution,
            strategy,
            design.array_size(),
            design.weights.sum()
        );

        Ok(SarConfig {
            resolution: adc.resolution,
            sampling_frequency: adc.sampling_frequency,
            use_calibration: adc.use_calibration,
            aperture_jitter: adc.aperture_jitter,
            comparator,
            cdac: design,
            strategy,
            testbench,
        })
    }
}

fn finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field })
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<()> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

/// Reference designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignPreset {
    /// 8-bit binary array, ideal components.
    Binary8,
    /// 4-bit binary array with 0.5 % unit mismatch.
    Binary4,
    /// 12-bit redundant split-capacitor array with reference noise,
    /// settling error and one unit of parasitic.
    SplitCap12,
    /// 8-bit output from seven radix-1.8 capacitors.
    SubRadix8,
}

impl DesignPreset {
    pub const ALL: &[DesignPreset] = &[
        DesignPreset::Binary8,
        DesignPreset::Binary4,
        DesignPreset::SplitCap12,
        DesignPreset::SubRadix8,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DesignPreset::Binary8 => "binary8",
            DesignPreset::Binary4 => "binary4",
            DesignPreset::SplitCap12 => "splitcap12",
            DesignPreset::SubRadix8 => "subradix8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn params(self) -> SarParams {
        let base = SarParams {
            adc: AdcParams {
                resolution: 8,
                sampling_frequency: 10.0e6,
                use_calibration: false,
                aperture_jitter: 0.0,
            },
            comp: ComparatorParams::default(),
            cdac: CdacParams {
                positive_reference_voltage: 1.2,
                negative_reference_voltage: 0.0,
                reference_voltage_noise: 0.0,
                unit_capacitance: 1e-15,
                array_size: 8,
                use_individual_weights: false,
                individual_weights: Vec::new(),
                radix: 2.0,
                parasitic_capacitance: 0.0,
                capacitor_mismatch_error: 0.0,
                settling_time: 0.0,
                switching_strat: default_switching_strat(),
            },
            testbench: TestbenchParams::default(),
        };

        match self {
            DesignPreset::Binary8 => base,
            DesignPreset::Binary4 => {
                let mut p = base.with_weights(&[8.0, 4.0, 2.0, 1.0]);
                p.adc.resolution = 4;
                p.cdac.capacitor_mismatch_error = 0.5;
                p
            }
            DesignPreset::SplitCap12 => {
                let mut p = base.with_weights(&[
                    896.0, 512.0, 288.0, 160.0, 80.0, 48.0, 24.0, 16.0, 8.0, 6.0, 3.0, 2.0, 2.0,
                    1.0, 1.0,
                ]);
                p.adc.resolution = 12;
                p.cdac.parasitic_capacitance = p.cdac.unit_capacitance;
                p.cdac.reference_voltage_noise = 0.5e-3;
                p.cdac.settling_time = 0.5e-9;
                p
            }
            DesignPreset::SubRadix8 => {
                let mut p = base;
                p.cdac.array_size = 7;
                p.cdac.radix = 1.8;
                p
            }
        }
    }
}
