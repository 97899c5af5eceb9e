//! Successive-approximation controller.
//!
//! A conversion samples the inputs, then makes `array_size + 1` comparator
//! decisions. After decision `i < array_size` the switching strategy moves
//! capacitor `i`; the last decision only resolves the remaining half step.
//!
//! Decisions are weighted `[2 W[0], .., 2 W[M-1], 1]` into a raw code `R`,
//! which maps onto `2^N` output codes as
//! `floor(R * 2^N / (sum(d) + d_last))`. For a binary array with one
//! capacitor per output bit this is exactly `sum(b[i] * W[i])`.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::cdac::{sampled_charge, sampled_top_plates, switching_energy, top_plate_voltage};
use super::{CapacitorArray, Plate, Side, SwitchVector, SwitchingScheme, Weights};
use crate::config::SarConfig;

/// Fixed-point scale of calibrated weights (six fractional bits).
pub const CALIBRATION_SCALE: f64 = 64.0;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionPhase {
    Idle,
    Sampling,
    Converting(usize),
    Done,
}

/// Maps comparator decisions to output codes.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeMap {
    decision_weights: Vec<f64>,
    scale: f64,
    max_code: u32,
}

impl CodeMap {
    /// Reconstruction with the nominal weights.
    pub fn nominal(weights: &Weights, resolution: u32) -> Self {
        Self::from_decision_weights(weights.decision_weights(), resolution)
    }

    /// Reconstruction with weights measured from the actual capacitors,
    /// `round(C[i] / Cu * k)` with `k = CALIBRATION_SCALE`.
    pub fn calibrated(capacitors: &[f64], unit_capacitance: f64, resolution: u32) -> Self {
        let decision_weights = capacitors
            .iter()
            .map(|c| 2.0 * (c / unit_capacitance * CALIBRATION_SCALE).round())
            .chain(std::iter::once(CALIBRATION_SCALE))
            .collect();
        Self::from_decision_weights(decision_weights, resolution)
    }

    fn from_decision_weights(decision_weights: Vec<f64>, resolution: u32) -> Self {
        let codes = (1u64 << resolution) as f64;
        let last = decision_weights.last().copied().unwrap_or(1.0);
        let span: f64 = decision_weights.iter().sum::<f64>() + last;
        Self {
            decision_weights,
            scale: codes / span,
            max_code: ((1u64 << resolution) - 1) as u32,
        }
    }

    pub fn decision_weights(&self) -> &[f64] {
        &self.decision_weights
    }

    /// Capacitor weights in unit capacitors as used by the reconstruction.
    pub fn capacitor_weights(&self) -> Vec<f64> {
        let unit = self.decision_weights.last().copied().unwrap_or(1.0);
        let n = self.decision_weights.len().saturating_sub(1);
        self.decision_weights[..n]
            .iter()
            .map(|d| d / (2.0 * unit))
            .collect()
    }

    pub fn raw_code(&self, bits: &[bool]) -> f64 {
        bits.iter()
            .zip(&self.decision_weights)
            .filter(|(b, _)| **b)
            .map(|(_, d)| d)
            .sum()
    }

    /// Output code of a raw code, or `None` if it is not finite.
    pub fn code(&self, raw: f64) -> Option<u32> {
        if !raw.is_finite() {
            return None;
        }
        let code = (raw * self.scale).floor().max(0.0) as u64;
        Some(code.min(self.max_code as u64) as u32)
    }
}

/// Top-plate voltages seen by the comparator in one cycle, and its decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleTrace {
    pub top_positive: f64,
    pub top_negative: f64,
    pub bit: bool,
}

/// Result of one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// Decisions, MSB first, `array_size + 1` long.
    pub bits: Vec<bool>,
    pub switches: SwitchVector,
    pub raw_code: f64,
    /// `None` when a node voltage was not finite.
    pub code: Option<u32>,
    /// Energy drawn from the references (J), when tracked.
    pub energy: Option<f64>,
    pub trace: Option<Vec<CycleTrace>>,
}

/// What to keep besides the code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    pub track_energy: bool,
    pub record_trace: bool,
}

/// A converter bound to one capacitor realization.
#[derive(Debug, Clone)]
pub struct SarAdc<'a> {
    config: &'a SarConfig,
    capacitors: CapacitorArray,
    code_map: CodeMap,
    settling: f64,
}

impl<'a> SarAdc<'a> {
    pub fn new(config: &'a SarConfig, capacitors: CapacitorArray) -> Self {
        let code_map = if config.use_calibration {
            CodeMap::calibrated(
                &capacitors.positive,
                config.cdac.unit_capacitance,
                config.resolution,
            )
        } else {
            CodeMap::nominal(&config.cdac.weights, config.resolution)
        };
        Self {
            config,
            capacitors,
            code_map,
            settling: config.settling_factor(),
        }
    }

    pub fn nominal(config: &'a SarConfig) -> Self {
        Self::new(config, config.cdac.nominal_capacitors())
    }

    /// Draw a mismatched array for one trial.
    pub fn manufacture<R: Rng + ?Sized>(config: &'a SarConfig, rng: &mut R) -> Self {
        Self::new(config, config.cdac.draw_capacitors(rng))
    }

    pub fn config(&self) -> &SarConfig {
        self.config
    }

    pub fn capacitors(&self) -> &CapacitorArray {
        &self.capacitors
    }

    pub fn code_map(&self) -> &CodeMap {
        &self.code_map
    }

    /// Weights used for reconstruction when calibration is on.
    pub fn calibrated_weights(&self) -> Option<Vec<f64>> {
        self.config
            .use_calibration
            .then(|| self.code_map.capacitor_weights())
    }

    /// Scratch state sized for this converter.
    pub fn conversion(&self) -> Conversion {
        Conversion::new(self.config.cdac.array_size())
    }

    /// Convert one differential input and return the full record.
    pub fn convert<R: Rng + ?Sized>(
        &self,
        vin_p: f64,
        vin_n: f64,
        rng: &mut R,
        options: ConvertOptions,
    ) -> ConversionRecord {
        let mut conversion = self.conversion();
        conversion.run(self, vin_p, vin_n, rng, options);
        conversion.record()
    }
}

/// Per-conversion transient state, reusable across conversions.
#[derive(Debug, Clone)]
pub struct Conversion {
    phase: ConversionPhase,
    switches: SwitchVector,
    bits: Vec<bool>,
    charge: [f64; 2],
    top: [f64; 2],
    raw_code: f64,
    code: Option<u32>,
    energy: Option<f64>,
    trace: Vec<CycleTrace>,
    recorded_trace: bool,
}

impl Conversion {
    pub fn new(array_size: usize) -> Self {
        Self {
            phase: ConversionPhase::Idle,
            switches: SwitchVector::uniform(array_size, Plate::Vrefp, Plate::Vrefp),
            bits: Vec::with_capacity(array_size + 1),
            charge: [0.0; 2],
            top: [0.0; 2],
            raw_code: 0.0,
            code: None,
            energy: None,
            trace: Vec::new(),
            recorded_trace: false,
        }
    }

    pub fn phase(&self) -> ConversionPhase {
        self.phase
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn switches(&self) -> &SwitchVector {
        &self.switches
    }

    /// Settled top-plate voltages `(positive, negative)`.
    pub fn top_plates(&self) -> (f64, f64) {
        (self.top[0], self.top[1])
    }

    pub fn code(&self) -> Option<u32> {
        self.code
    }

    pub fn energy(&self) -> Option<f64> {
        self.energy
    }

    /// Run a full conversion and return the output code.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        adc: &SarAdc<'_>,
        vin_p: f64,
        vin_n: f64,
        rng: &mut R,
        options: ConvertOptions,
    ) -> Option<u32> {
        let config = adc.config;
        let refs = config.cdac.references;
        let caps = &adc.capacitors;
        let strategy = config.strategy;
        let array_size = caps.len();

        self.phase = ConversionPhase::Sampling;
        self.bits.clear();
        self.trace.clear();
        self.recorded_trace = options.record_trace;
        strategy.reset(&mut self.switches);

        // Sample: top plates take the input difference around Vcm while the
        // bottom plates sit on the initial pattern, then float.
        let (sampled_p, sampled_n) = sampled_top_plates(vin_p, vin_n, &refs);
        for (side, v) in [(Side::Positive, sampled_p), (Side::Negative, sampled_n)] {
            let k = side.index();
            let plates = self.switches.side(side);
            self.charge[k] = sampled_charge(v, caps.side(side), caps.parasitic, plates, &refs);
            self.top[k] = top_plate_voltage(self.charge[k], caps.side(side), caps.parasitic, plates, &refs);
        }

        let mut energy = 0.0;
        // Last top-plate step per side, still settling when the comparator fires
        let mut step = [0.0; 2];
        let mut fault = false;

        for i in 0..=array_size {
            self.phase = ConversionPhase::Converting(i);

            // Reference bus noise moves every plate on a rail for this cycle only
            let mut seen = self.top;
            if let Some(noisy) = config.cdac.cycle_references(rng) {
                for side in Side::BOTH {
                    let k = side.index();
                    seen[k] = top_plate_voltage(
                        self.charge[k],
                        caps.side(side),
                        caps.parasitic,
                        self.switches.side(side),
                        &noisy,
                    );
                }
            }
            // Incomplete settling: only a fraction alpha of the last step has arrived
            for k in 0..2 {
                seen[k] -= (1.0 - adc.settling) * step[k];
            }
            // NaN/Inf anywhere poisons the code, not the run
            fault |= !seen[0].is_finite() || !seen[1].is_finite();

            // Decide
            let bit = config.comparator.compare(seen[0], seen[1], rng);
            self.bits.push(bit);
            if options.record_trace {
                self.trace.push(CycleTrace {
                    top_positive: seen[0],
                    top_negative: seen[1],
                    bit,
                });
            }

            // Switch capacitor i; the closing decision moves nothing
            step = [0.0; 2];
            if i < array_size {
                let event = strategy.update_after_bit(&mut self.switches, i, bit);
                let k = event.side.index();
                let plates = self.switches.side(event.side);
                let before = self.top[k];
                self.top[k] = top_plate_voltage(
                    self.charge[k],
                    caps.side(event.side),
                    caps.parasitic,
                    plates,
                    &refs,
                );
                step[k] = self.top[k] - before;
                // Energy is taken on the noise-free rails
                if options.track_energy {
                    energy += switching_energy(
                        caps.side(event.side),
                        plates,
                        event.index,
                        event.from,
                        step[k],
                        &refs,
                    );
                }
            }
        }

        // Reconstruct
        self.raw_code = adc.code_map.raw_code(&self.bits);
        self.code = if fault {
            None
        } else {
            adc.code_map.code(self.raw_code)
        };
        self.energy = options.track_energy.then_some(energy);
        self.phase = ConversionPhase::Done;
        self.code
    }

    /// Snapshot of the finished conversion.
    pub fn record(&self) -> ConversionRecord {
        ConversionRecord {
            bits: self.bits.clone(),
            switches: self.switches.clone(),
            raw_code: self.raw_code,
            code: self.code,
            energy: self.energy,
            trace: self.recorded_trace.then(|| self.trace.clone()),
        }
    }
}
