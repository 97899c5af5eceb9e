//! Capacitive DAC.
//!
//! Top-plate sampling: while sampling, the top plates carry the input
//! difference around the reference common mode `Vcm`, so each side samples
//! `V_s = Vcm +- (Vin_p - Vin_n) / 2` and the input common mode is rejected.
//! The bottom plates sit on the strategy's initial pattern. The charge
//! trapped on the floating top-plate node is then fixed, and every later
//! bottom-plate configuration `S` gives
//!
//! ```text
//! V_top = (Q + sum_i C[i] * ref(S[i])) / (sum_i C[i] + Cp)
//! Q     = sum_i C[i] * (V_s - ref(S_init[i])) + Cp * V_s
//! ```
//!
//! with the parasitic `Cp` tied to ground.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{CapacitorArray, Plate, References, Weights};

/// Geometry and non-idealities of the differential array.
#[derive(Debug, Clone)]
pub struct CdacDesign {
    pub references: References,
    pub weights: Weights,
    pub unit_capacitance: f64,
    pub parasitic_capacitance: f64,
    pub mismatch_percent: f64,
    pub reference_noise_rms: f64,
    pub settling_time: f64,
    reference_noise: Option<Normal<f64>>,
}

impl CdacDesign {
    pub fn new(
        references: References,
        weights: Weights,
        unit_capacitance: f64,
        parasitic_capacitance: f64,
        mismatch_percent: f64,
        reference_noise_rms: f64,
        settling_time: f64,
    ) -> Result<Self, rand_distr::NormalError> {
        let reference_noise = if reference_noise_rms > 0.0 {
            Some(Normal::new(0.0, reference_noise_rms)?)
        } else {
            None
        };
        Ok(Self {
            references,
            weights,
            unit_capacitance,
            parasitic_capacitance,
            mismatch_percent,
            reference_noise_rms,
            settling_time,
            reference_noise,
        })
    }

    pub fn array_size(&self) -> usize {
        self.weights.len()
    }

    /// Parasitic capacitance in unit capacitors.
    pub fn parasitic_ratio(&self) -> f64 {
        self.parasitic_capacitance / self.unit_capacitance
    }

    /// Nominal array plus parasitic, one side.
    pub fn total_capacitance(&self) -> f64 {
        self.weights.sum() * self.unit_capacitance + self.parasitic_capacitance
    }

    /// Ideal differential full-scale range `(Vrefp - Vrefn) * 2 * sum(W) / (sum(W) + p)`.
    pub fn full_scale_range(&self) -> f64 {
        let sum = self.weights.sum();
        self.references.span() * 2.0 * sum / (sum + self.parasitic_ratio())
    }

    /// Differential input range spanned by the outer code edges,
    /// `+-(Vrefp - Vrefn) * (sum(W) + 1) / (sum(W) + p)`.
    pub fn input_range(&self) -> (f64, f64) {
        let sum = self.weights.sum();
        let half = self.references.span() * (sum + 1.0) / (sum + self.parasitic_ratio());
        (-half, half)
    }

    /// Differential step produced by moving one unit capacitor.
    pub fn unit_step(&self) -> f64 {
        self.references.span() * self.unit_capacitance / self.total_capacitance()
    }

    pub fn nominal_capacitors(&self) -> CapacitorArray {
        CapacitorArray::nominal(&self.weights, self.unit_capacitance, self.parasitic_capacitance)
    }

    /// One manufactured array. Returns the nominal one when mismatch is zero.
    pub fn draw_capacitors<R: Rng + ?Sized>(&self, rng: &mut R) -> CapacitorArray {
        CapacitorArray::draw(
            &self.weights,
            self.unit_capacitance,
            self.parasitic_capacitance,
            self.mismatch_percent,
            rng,
        )
    }

    /// Fraction of a switching step that has settled after `t_avail`.
    pub fn settling_factor(&self, available_time: f64) -> f64 {
        if self.settling_time > 0.0 {
            1.0 - (-available_time / self.settling_time).exp()
        } else {
            1.0
        }
    }

    /// Reference rails for one conversion cycle, with bus noise drawn if enabled.
    pub fn cycle_references<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<References> {
        self.reference_noise.map(|n| {
            let np = n.sample(rng);
            let nn = n.sample(rng);
            self.references.perturbed(np, nn)
        })
    }
}

/// Top-plate voltages `(positive, negative)` at the sampling instant: the
/// input difference centred on the reference common mode.
pub fn sampled_top_plates(vin_p: f64, vin_n: f64, refs: &References) -> (f64, f64) {
    let half = 0.5 * (vin_p - vin_n);
    let vcm = refs.common_mode();
    (vcm + half, vcm - half)
}

/// Charge on one floating top-plate node sampled at `vin`.
pub fn sampled_charge(
    vin: f64,
    caps: &[f64],
    parasitic: f64,
    plates: &[Plate],
    refs: &References,
) -> f64 {
    let array: f64 = caps
        .iter()
        .zip(plates)
        .map(|(c, p)| c * (vin - refs.voltage(*p)))
        .sum();
    array + parasitic * vin
}

/// Top-plate voltage for a given trapped charge and plate configuration.
///
/// A zero total capacitance yields a non-finite result, which the
/// controller reports as a numeric fault.
pub fn top_plate_voltage(
    charge: f64,
    caps: &[f64],
    parasitic: f64,
    plates: &[Plate],
    refs: &References,
) -> f64 {
    let mut q = charge;
    let mut total = parasitic;
    for (c, p) in caps.iter().zip(plates) {
        q += c * refs.voltage(*p);
        total += c;
    }
    q / total
}

/// Charge stored between the top plate and the bottom plates (plus the
/// parasitic to ground). Invariant for a floating node.
pub fn top_plate_charge(top: f64, caps: &[f64], parasitic: f64, plates: &[Plate], refs: &References) -> f64 {
    caps.iter()
        .zip(plates)
        .map(|(c, p)| c * (top - refs.voltage(*p)))
        .sum::<f64>()
        + parasitic * top
}

/// Energy drawn from the reference buses by moving capacitor `moved` of one
/// side from `from` to its current position.
///
/// Each capacitor on bus `r` after the move takes `C (dV_bottom - dV_top)`
/// of charge from that bus at potential `V_r`.
pub fn switching_energy(
    caps: &[f64],
    plates: &[Plate],
    moved: usize,
    from: Plate,
    top_delta: f64,
    refs: &References,
) -> f64 {
    caps.iter()
        .zip(plates)
        .enumerate()
        .map(|(j, (c, p))| {
            let bottom_delta = if j == moved {
                refs.voltage(*p) - refs.voltage(from)
            } else {
                0.0
            };
            refs.voltage(*p) * c * (bottom_delta - top_delta)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn design(parasitic: f64) -> CdacDesign {
        CdacDesign::new(
            References::new(1.2, 0.0),
            Weights::binary(4),
            1e-15,
            parasitic,
            0.0,
            0.0,
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn sampling_reproduces_input() {
        let d = design(3e-15);
        let caps = d.nominal_capacitors();
        let plates = vec![Plate::Vrefp; 4];
        let q = sampled_charge(0.37, &caps.positive, caps.parasitic, &plates, &d.references);
        let v = top_plate_voltage(q, &caps.positive, caps.parasitic, &plates, &d.references);
        assert_relative_eq!(v, 0.37, epsilon = 1e-12);
    }

    #[test]
    fn sampled_plates_sit_on_reference_common_mode() {
        let refs = References::new(1.2, 0.0);
        let (p, n) = sampled_top_plates(0.35, 0.25, &refs);
        assert_relative_eq!(p, 0.65, epsilon = 1e-12);
        assert_relative_eq!(n, 0.55, epsilon = 1e-12);
        let (p2, n2) = sampled_top_plates(0.65, 0.55, &refs);
        assert_relative_eq!(p2, p, epsilon = 1e-12);
        assert_relative_eq!(n2, n, epsilon = 1e-12);
    }

    #[test]
    fn msb_step_is_weight_over_total() {
        let d = design(0.0);
        let caps = d.nominal_capacitors();
        let mut plates = vec![Plate::Vrefp; 4];
        let q = sampled_charge(0.9, &caps.positive, 0.0, &plates, &d.references);
        plates[0] = Plate::Vrefn;
        let v = top_plate_voltage(q, &caps.positive, 0.0, &plates, &d.references);
        assert_relative_eq!(v, 0.9 - 1.2 * 8.0 / 15.0, epsilon = 1e-12);
    }

    #[test]
    fn ranges() {
        let d = design(0.0);
        assert_relative_eq!(d.full_scale_range(), 2.4, epsilon = 1e-12);
        let (lo, hi) = d.input_range();
        assert_relative_eq!(hi, 1.2 * 16.0 / 15.0, epsilon = 1e-12);
        assert_relative_eq!(lo, -hi);

        let p = design(15e-15);
        assert_relative_eq!(p.full_scale_range(), 1.2, epsilon = 1e-12);
    }

    #[test]
    fn zero_capacitance_is_not_finite() {
        let refs = References::new(1.0, 0.0);
        let v = top_plate_voltage(0.0, &[0.0, 0.0], 0.0, &[Plate::Vrefp, Plate::Vrefn], &refs);
        assert!(!v.is_finite());
    }

    #[test]
    fn settling_factor_limits() {
        let d = design(0.0);
        assert_eq!(d.settling_factor(1e-9), 1.0);
        let mut slow = design(0.0);
        slow.settling_time = 1e-9;
        assert_relative_eq!(slow.settling_factor(1e-9), 1.0 - (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn downward_switch_energy_matches_closed_form() {
        // C_i * Vref^2 * (Ctot - C_i) / Ctot for Vrefn = 0 and no parasitic
        let d = design(0.0);
        let caps = d.nominal_capacitors();
        let mut plates = vec![Plate::Vrefp; 4];
        let q = sampled_charge(0.3, &caps.positive, 0.0, &plates, &d.references);
        let before = top_plate_voltage(q, &caps.positive, 0.0, &plates, &d.references);
        plates[1] = Plate::Vrefn;
        let after = top_plate_voltage(q, &caps.positive, 0.0, &plates, &d.references);
        let e = switching_energy(&caps.positive, &plates, 1, Plate::Vrefp, after - before, &d.references);
        let (ci, ct) = (4e-15, 15e-15);
        assert_relative_eq!(e, ci * 1.44 * (ct - ci) / ct, max_relative = 1e-9);
        assert!(e > 0.0);
    }

    #[test]
    fn cycle_references_off_without_noise() {
        let d = design(0.0);
        let mut rng = rand::rng();
        assert!(d.cycle_references(&mut rng).is_none());
    }
}
