//! Capacitor weight vectors, MSB first, in units of the unit capacitor.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Weights {
    values: Vec<f64>,
}

impl Weights {
    /// `w[i] = radix^(array_size - 1 - i)`.
    pub fn from_radix(array_size: usize, radix: f64) -> Self {
        let values = (0..array_size)
            .map(|i| radix.powi((array_size - 1 - i) as i32))
            .collect();
        Self { values }
    }

    /// Binary weights `2^(array_size-1) .. 1`.
    pub fn binary(array_size: usize) -> Self {
        Self::from_radix(array_size, 2.0)
    }

    pub fn explicit(values: Vec<f64>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::EmptyArray);
        }
        for &w in &values {
            if !w.is_finite() {
                return Err(ConfigError::NotFinite {
                    field: "individual_weights",
                });
            }
            if w <= 0.0 {
                return Err(ConfigError::NotPositive {
                    field: "individual_weights",
                    value: w,
                });
            }
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn msb(&self) -> f64 {
        self.values.first().copied().unwrap_or(0.0)
    }

    /// Weights that a decision of 1 contributes to the raw code: every
    /// capacitor counts twice, the closing comparison counts once.
    pub fn decision_weights(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|w| 2.0 * w)
            .chain(std::iter::once(1.0))
            .collect()
    }

    /// Per-stage redundancy `(sum of later weights + 1 - w[i]) / w[i]`, where
    /// the `1` is the closing comparison.
    ///
    /// Zero for every stage of a binary array, positive where a stage can
    /// absorb decision errors made before it.
    pub fn redundancy(&self) -> Vec<f64> {
        let mut remaining = self.sum();
        self.values
            .iter()
            .map(|&w| {
                remaining -= w;
                (remaining + 1.0 - w) / w
            })
            .collect()
    }

    /// Whether the search can always converge: `w[i] <= sum(w[i+1..]) + 1`.
    /// Arrays violating this leave gaps in the transfer function.
    pub fn is_convergent(&self) -> bool {
        self.redundancy().iter().all(|r| *r >= -1e-12)
    }

    /// Geometric mean ratio between neighbouring weights.
    pub fn effective_radix(&self) -> f64 {
        match self.values.len() {
            0 | 1 => 2.0,
            n => (self.values[0] / self.values[n - 1]).powf(1.0 / (n - 1) as f64),
        }
    }

    pub fn is_integral(&self) -> bool {
        self.values.iter().all(|w| w.fract() == 0.0)
    }
}

/// Smallest radix-weighted array whose code span covers `2^resolution` codes.
pub fn required_array_size(resolution: u32, radix: f64) -> usize {
    let target = 2f64.powi(resolution as i32);
    let mut size = 1;
    while 2.0 * (Weights::from_radix(size, radix).sum() + 1.0) < target && size < 64 {
        size += 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn binary_weights() {
        let w = Weights::binary(8);
        assert_eq!(w.as_slice()[0], 128.0);
        assert_eq!(w.as_slice()[7], 1.0);
        assert_eq!(w.sum(), 255.0);
        assert!(w.is_integral());
        assert_relative_eq!(w.effective_radix(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn radix_weights_are_msb_first() {
        let w = Weights::from_radix(4, 1.8);
        assert_relative_eq!(w.as_slice()[0], 1.8f64.powi(3), epsilon = 1e-12);
        assert_relative_eq!(w.as_slice()[3], 1.0);
        assert!(!w.is_integral());
    }

    #[test]
    fn explicit_weights_reject_bad_entries() {
        assert!(matches!(Weights::explicit(vec![]), Err(ConfigError::EmptyArray)));
        assert!(matches!(
            Weights::explicit(vec![4.0, 0.0]),
            Err(ConfigError::NotPositive { .. })
        ));
        assert!(matches!(
            Weights::explicit(vec![f64::NAN]),
            Err(ConfigError::NotFinite { .. })
        ));
    }

    #[test]
    fn decision_weights_double_caps_and_close_with_one() {
        let w = Weights::explicit(vec![4.0, 2.0, 1.0]).unwrap();
        assert_eq!(w.decision_weights(), vec![8.0, 4.0, 2.0, 1.0]);
    }

    #[test]
    fn binary_array_has_no_redundancy() {
        let r = Weights::binary(6).redundancy();
        assert!(r.iter().all(|x| x.abs() < 1e-12), "{r:?}");
        assert!(Weights::binary(6).is_convergent());
    }

    #[test]
    fn split_cap_array_is_redundant() {
        let w = Weights::explicit(vec![
            896.0, 512.0, 288.0, 160.0, 80.0, 48.0, 24.0, 16.0, 8.0, 6.0, 3.0, 2.0, 2.0, 1.0, 1.0,
        ])
        .unwrap();
        assert_eq!(w.sum(), 2047.0);
        assert!(w.is_convergent());
        let r = w.redundancy();
        assert!(r[0] > 0.0, "MSB stage should carry redundancy: {}", r[0]);
        // 1151 later + 1 closing - 896
        assert_relative_eq!(r[0], 256.0 / 896.0, epsilon = 1e-12);
        assert_relative_eq!(r[13], 1.0, epsilon = 1e-12);
        assert_relative_eq!(r[14], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn super_binary_array_does_not_converge() {
        let w = Weights::from_radix(5, 2.5);
        assert!(!w.is_convergent());
    }

    #[test]
    fn required_size_grows_as_radix_shrinks() {
        assert_eq!(required_array_size(8, 2.0), 7);
        let sub = required_array_size(8, 1.8);
        assert!(sub > 7, "radix 1.8 needs more than 7 caps, got {sub}");
        assert!(2.0 * (Weights::from_radix(sub, 1.8).sum() + 1.0) >= 256.0);
    }
}
