//! Per-trial capacitor realizations.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use super::{Side, Weights};

/// Capacitor values (farads) of one manufactured array, MSB first.
///
/// Drawn once per Monte-Carlo trial and shared by every conversion of
/// that trial. Both halves of the differential array are drawn
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacitorArray {
    pub positive: Vec<f64>,
    pub negative: Vec<f64>,
    /// Top-plate parasitic to ground, per side.
    pub parasitic: f64,
}

impl CapacitorArray {
    pub fn nominal(weights: &Weights, unit_capacitance: f64, parasitic: f64) -> Self {
        let caps: Vec<f64> = weights
            .as_slice()
            .iter()
            .map(|w| w * unit_capacitance)
            .collect();
        Self {
            positive: caps.clone(),
            negative: caps,
            parasitic,
        }
    }

    /// Draw `C[i] = w[i] * Cu * (1 + e)` with `e ~ N(0, mismatch / 100 / sqrt(w[i]))`.
    ///
    /// `mismatch_percent` is the relative standard deviation of a single
    /// unit capacitor; larger capacitors average it down by `1/sqrt(w)`.
    pub fn draw<R: Rng + ?Sized>(
        weights: &Weights,
        unit_capacitance: f64,
        parasitic: f64,
        mismatch_percent: f64,
        rng: &mut R,
    ) -> Self {
        if mismatch_percent <= 0.0 {
            return Self::nominal(weights, unit_capacitance, parasitic);
        }
        let sigma = mismatch_percent / 100.0;
        let mut realize = |w: f64| -> f64 {
            let e: f64 = StandardNormal.sample(rng);
            w * unit_capacitance * (1.0 + e * sigma / w.sqrt())
        };
        let positive = weights.as_slice().iter().map(|&w| realize(w)).collect();
        let negative = weights.as_slice().iter().map(|&w| realize(w)).collect();
        Self {
            positive,
            negative,
            parasitic,
        }
    }

    pub fn side(&self, side: Side) -> &[f64] {
        match side {
            Side::Positive => &self.positive,
            Side::Negative => &self.negative,
        }
    }

    /// Array plus parasitic capacitance of one side.
    pub fn total(&self, side: Side) -> f64 {
        self.side(side).iter().sum::<f64>() + self.parasitic
    }

    pub fn len(&self) -> usize {
        self.positive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty()
    }
}
