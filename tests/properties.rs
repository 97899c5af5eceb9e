//! Behavioral properties that must hold for any design.

use rand::SeedableRng;
use rand::rngs::StdRng;

use sar_adc_sim::config::{DesignPreset, SarConfig, SarParams};
use sar_adc_sim::measure::{SweepSettings, measure_nonlinearity};
use sar_adc_sim::sar::cdac::{sampled_top_plates, top_plate_charge};
use sar_adc_sim::sar::controller::ConvertOptions;
use sar_adc_sim::sar::{SarAdc, Side, SwitchingScheme, SwitchingStrategy};

fn ideal(preset: DesignPreset) -> SarConfig {
    preset.params().ideal().validate().unwrap()
}

fn sweep(config: &SarConfig, values_per_bin: usize, seed: u64) -> sar_adc_sim::NonlinearityResults {
    let settings = SweepSettings {
        values_per_bin,
        seed: Some(seed),
        ..SweepSettings::default()
    };
    measure_nonlinearity(config, &settings).unwrap()
}

#[test]
fn charge_is_conserved_for_every_strategy() {
    for strategy in SwitchingStrategy::ALL {
        let mut p = DesignPreset::Binary8.params();
        p.cdac.parasitic_capacitance = 5e-15;
        p.cdac.capacitor_mismatch_error = 2.0;
        p.cdac.switching_strat = strategy.name().to_string();
        let config = p.validate().unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let adc = SarAdc::manufacture(&config, &mut rng);
        let caps = adc.capacitors();
        let refs = config.cdac.references;
        let initial = strategy.initial_switch_vector(caps.len());

        for (vp, vn) in [(0.9, 0.3), (0.55, 0.65), (0.1, 1.1)] {
            let mut conv = adc.conversion();
            conv.run(&adc, vp, vn, &mut rng, ConvertOptions::default());
            let (tp, tn) = conv.top_plates();
            let (sp, sn) = sampled_top_plates(vp, vn, &refs);
            for (side, sampled, top) in [(Side::Positive, sp, tp), (Side::Negative, sn, tn)] {
                let before = top_plate_charge(sampled, caps.side(side), caps.parasitic, initial.side(side), &refs);
                let after = top_plate_charge(
                    top,
                    caps.side(side),
                    caps.parasitic,
                    conv.switches().side(side),
                    &refs,
                );
                let tol = 1e-12 * caps.total(side) * refs.span();
                assert!(
                    (before - after).abs() < tol,
                    "{} {side:?}: {before} -> {after}",
                    strategy.name()
                );
            }
        }
    }
}

#[test]
fn ideal_transfer_matches_quantizer() {
    for preset in [DesignPreset::Binary8, DesignPreset::SplitCap12] {
        let config = ideal(preset);
        let r = sweep(&config, 2, 0);
        let low = r.input_range[0];
        let max = config.max_code() as i64;
        for point in &r.transfer {
            let expected = (((point.input - low) / r.lsb).floor() as i64).clamp(0, max);
            let got = point.code.unwrap() as i64;
            assert!(
                (got - expected).abs() <= 1,
                "{}: input {} gave {got}, expected {expected}",
                preset.name(),
                point.input
            );
        }
    }
}

fn transfer_codes(preset: DesignPreset) -> Vec<u32> {
    let r = sweep(&ideal(preset), 4, 0);
    r.transfer.iter().map(|p| p.code.unwrap()).collect()
}

#[test]
fn ideal_transfer_is_monotonic() {
    for preset in [DesignPreset::Binary8, DesignPreset::Binary4, DesignPreset::SplitCap12] {
        let codes = transfer_codes(preset);
        assert!(
            codes.windows(2).all(|w| w[0] <= w[1]),
            "{} transfer is not monotonic",
            preset.name()
        );
    }
}

#[test]
fn non_integer_weights_step_back_at_most_one_code() {
    // rounding of the raw code can swap neighbours, never more
    let codes = transfer_codes(DesignPreset::SubRadix8);
    let worst = codes
        .windows(2)
        .map(|w| w[0] as i64 - w[1] as i64)
        .max()
        .unwrap_or(0);
    assert!(worst <= 1, "transfer steps back by {worst} codes");
}

#[test]
fn dnl_sums_to_zero() {
    let mut p = SarParams::default();
    p.cdac.capacitor_mismatch_error = 1.0;
    p.comp.threshold_voltage_noise = 1e-3;
    let config = p.validate().unwrap();
    let r = sweep(&config, 8, 3);
    let total: f64 = r.linearity.dnl.iter().sum();
    assert!(total.abs() < 1e-9, "sum of DNL {total}");
    assert_eq!(r.linearity.numeric_faults, 0);
}

#[test]
fn inl_endpoints_are_zero() {
    let mut p = DesignPreset::SubRadix8.params();
    p.cdac.capacitor_mismatch_error = 3.0;
    let config = p.validate().unwrap();
    let r = sweep(&config, 8, 5);
    let inl = &r.linearity.inl;
    assert!(inl[0].abs() < 1e-12, "INL[0] = {}", inl[0]);
    assert!(inl[inl.len() - 1].abs() < 1e-12, "INL[last] = {}", inl[inl.len() - 1]);
}

#[test]
fn same_seed_reproduces_noisy_monte_carlo() {
    let mut p = SarParams::default();
    p.comp.threshold_voltage_noise = 1e-3;
    p.comp.offset_voltage = 0.4e-3;
    p.cdac.reference_voltage_noise = 0.5e-3;
    p.cdac.capacitor_mismatch_error = 1.0;
    p.cdac.settling_time = 5e-9;
    let config = p.validate().unwrap();
    let settings = SweepSettings {
        values_per_bin: 4,
        samples_per_bin: 2,
        trials: 4,
        seed: Some(1234),
        keep_trial_arrays: true,
    };
    let a = measure_nonlinearity(&config, &settings).unwrap();
    let b = measure_nonlinearity(&config, &settings).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.per_trial.len(), 4);

    let other = SweepSettings {
        seed: Some(4321),
        ..settings
    };
    let c = measure_nonlinearity(&config, &other).unwrap();
    assert_ne!(a.linearity.histogram, c.linearity.histogram);
}

#[test]
fn dnl_spread_scales_with_mismatch() {
    let ratios: Vec<f64> = [0.1, 1.0, 10.0]
        .iter()
        .map(|&mismatch| {
            let mut p = SarParams::default();
            p.adc.resolution = 6;
            p.cdac.array_size = 6;
            p.cdac.capacitor_mismatch_error = mismatch;
            let config = p.validate().unwrap();
            let settings = SweepSettings {
                values_per_bin: 256,
                trials: 40,
                seed: Some(77),
                keep_trial_arrays: false,
                ..SweepSettings::default()
            };
            let r = measure_nonlinearity(&config, &settings).unwrap();
            r.monte_carlo.unwrap().worst_dnl_std / mismatch
        })
        .collect();
    let lo = ratios.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ratios.iter().copied().fold(0.0, f64::max);
    assert!(lo > 0.0, "ratios {ratios:?}");
    assert!(hi / lo < 2.0, "sigma(worst DNL) / mismatch not constant: {ratios:?}");
}

/// Spread of the worst DNL over trials, for a binary array of `bits` capacitors.
fn worst_dnl_spread(bits: u32, mismatch: f64) -> f64 {
    let mut p = SarParams::default();
    p.adc.resolution = bits;
    p.cdac.array_size = bits as usize;
    p.cdac.capacitor_mismatch_error = mismatch;
    let config = p.validate().unwrap();
    let settings = SweepSettings {
        values_per_bin: 64,
        trials: 40,
        seed: Some(21),
        keep_trial_arrays: false,
        ..SweepSettings::default()
    };
    let r = measure_nonlinearity(&config, &settings).unwrap();
    r.monte_carlo.unwrap().worst_dnl_std
}

#[test]
fn dnl_spread_follows_msb_area() {
    // Relative to the MSB weight the spread goes as mismatch / sqrt(W_msb),
    // so in LSB it grows as mismatch * sqrt(W_msb).
    let mismatch = 4.0;
    let normalized: Vec<f64> = [5u32, 8]
        .iter()
        .map(|&bits| {
            let msb = f64::from(1u32 << (bits - 1));
            let sigma_msb_units = worst_dnl_spread(bits, mismatch) / msb;
            sigma_msb_units / (mismatch / msb.sqrt())
        })
        .collect();
    let ratio = normalized[0].max(normalized[1]) / normalized[0].min(normalized[1]);
    assert!(ratio < 2.0, "sigma(worst DNL) / W_msb not ~ mismatch / sqrt(W_msb): {normalized:?}");
}
