use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Single-bit latch with offset, common-mode sensitivity and input-referred
/// noise. No hysteresis and no metastability window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparatorModel {
    pub offset_voltage: f64,
    pub noise_rms: f64,
    pub common_mode_gain: f64,
    /// Common mode at which the common-mode term vanishes.
    pub nominal_common_mode: f64,
    noise: Option<Normal<f64>>,
}

impl ComparatorModel {
    pub fn new(
        offset_voltage: f64,
        noise_rms: f64,
        common_mode_gain: f64,
        nominal_common_mode: f64,
    ) -> Result<Self, rand_distr::NormalError> {
        let noise = if noise_rms > 0.0 {
            Some(Normal::new(0.0, noise_rms)?)
        } else {
            None
        };
        Ok(Self {
            offset_voltage,
            noise_rms,
            common_mode_gain,
            nominal_common_mode,
            noise,
        })
    }

    pub fn ideal(nominal_common_mode: f64) -> Self {
        Self {
            offset_voltage: 0.0,
            noise_rms: 0.0,
            common_mode_gain: 0.0,
            nominal_common_mode,
            noise: None,
        }
    }

    /// Noise-free input of the decision.
    pub fn decision_input(&self, vp: f64, vn: f64) -> f64 {
        (vp - vn)
            + self.offset_voltage
            + self.common_mode_gain * (0.5 * (vp + vn) - self.nominal_common_mode)
    }

    /// Returns `true` (bit 1) when the noisy decision input is `>= 0`.
    /// Exact equality resolves to 1.
    pub fn compare<R: Rng + ?Sized>(&self, vp: f64, vn: f64, rng: &mut R) -> bool {
        let n = match self.noise {
            Some(d) => d.sample(rng),
            None => 0.0,
        };
        self.decision_input(vp, vn) + n >= 0.0
    }
}
