//! Static linearity of the CDAC alone: step a register through every code
//! on the positive side and read the differential output directly.

use serde::{Deserialize, Serialize};

use crate::config::SarConfig;
use crate::error::MeasureError;
use crate::sar::cdac::{sampled_charge, top_plate_voltage};
use crate::sar::{CapacitorArray, Plate};

/// Largest array the exhaustive register sweep accepts.
pub const MAX_DAC_SWEEP_BITS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DacLinearity {
    /// Differential output per register code, V.
    pub outputs: Vec<f64>,
    /// Step error between neighbouring register codes, in unit steps.
    pub dnl: Vec<f64>,
    pub inl: Vec<f64>,
    pub dnl_std: f64,
    pub inl_std: f64,
    /// Nominal unit step, V.
    pub lsb: f64,
}

/// Register bit `M-1-i` drives capacitor `i` to `Vrefp`; all other plates
/// and the negative side sit on `Vrefn` with zero input sampled.
pub fn measure_dac_linearity(
    config: &SarConfig,
    capacitors: &CapacitorArray,
) -> Result<DacLinearity, MeasureError> {
    let m = capacitors.len();
    if m > MAX_DAC_SWEEP_BITS {
        return Err(MeasureError::Invalid(format!(
            "register sweep over {m} capacitors is too large (max {MAX_DAC_SWEEP_BITS})"
        )));
    }
    let refs = config.cdac.references;
    let lsb = config.cdac.unit_step();
    let reset = vec![Plate::Vrefn; m];
    let q_p = sampled_charge(0.0, &capacitors.positive, capacitors.parasitic, &reset, &refs);
    let q_n = sampled_charge(0.0, &capacitors.negative, capacitors.parasitic, &reset, &refs);
    let out_n = top_plate_voltage(q_n, &capacitors.negative, capacitors.parasitic, &reset, &refs);

    let mut plates = reset.clone();
    let outputs: Vec<f64> = (0..1usize << m)
        .map(|reg| {
            for (i, plate) in plates.iter_mut().enumerate() {
                *plate = if reg & (1 << (m - 1 - i)) != 0 {
                    Plate::Vrefp
                } else {
                    Plate::Vrefn
                };
            }
            top_plate_voltage(q_p, &capacitors.positive, capacitors.parasitic, &plates, &refs) - out_n
        })
        .collect();

    let dnl: Vec<f64> = outputs.windows(2).map(|w| (w[1] - w[0] - lsb) / lsb).collect();
    let mut acc = 0.0;
    let inl: Vec<f64> = dnl
        .iter()
        .map(|d| {
            acc += d;
            acc
        })
        .collect();

    Ok(DacLinearity {
        dnl_std: std_dev(&dnl),
        inl_std: std_dev(&inl),
        outputs,
        dnl,
        inl,
        lsb,
    })
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
