//! SAR ADC simulation driver.
//!
//! Loads a design (TOML file or built-in preset), runs the static linearity
//! sweep and the optional dynamic, energy and testbench measurements, prints
//! a datasheet and optionally stores the full results as JSON.
//!
//! Usage: cargo run --release --bin sar_sim -- --preset splitcap12 --trials 50

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;

use sar_adc_sim::config::{DesignPreset, SarConfig, SarParams};
use sar_adc_sim::measure::{
    SineSettings, SweepSettings, measure_conversion_energy, measure_dac_linearity, measure_enob,
    measure_nonlinearity, run_testbench,
};
use sar_adc_sim::report::{Datasheet, JsonFileSink, ResultSink, RunReport};
use sar_adc_sim::sar::controller::ConvertOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML design file. Overrides --preset.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in design: binary8, binary4, splitcap12 or subradix8.
    #[arg(short, long, default_value = "binary8")]
    preset: String,

    /// Input values placed in every ideal code bin.
    #[arg(long, default_value_t = 16)]
    values_per_bin: usize,

    /// Conversions per input value.
    #[arg(long, default_value_t = 1)]
    samples_per_bin: usize,

    /// Monte-Carlo mismatch trials.
    #[arg(short, long, default_value_t = 1)]
    trials: usize,

    /// Base seed. Drawn from entropy and logged when omitted.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Also run the sine test and report ENOB.
    #[arg(long)]
    enob: bool,

    /// Also sweep switching energy over the input range.
    #[arg(long)]
    energy: bool,

    /// Report CDAC-only static linearity of the nominal array.
    #[arg(long)]
    dac: bool,

    /// Convert the configured testbench stimulus and print the codes.
    #[arg(long)]
    testbench: bool,

    /// Directory to which the JSON results should be saved.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Run the built-in self checks and exit.
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    env_logger::init();

    let args = Args::parse();

    if args.check {
        if self_check() {
            return Ok(());
        }
        bail!("self check failed");
    }

    let (name, params) = match &args.config {
        Some(path) => {
            let params = SarParams::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sar_adc".to_string());
            (name, params)
        }
        None => {
            let Some(preset) = DesignPreset::from_name(&args.preset) else {
                let names: Vec<_> = DesignPreset::ALL.iter().map(|p| p.name()).collect();
                bail!("unknown preset `{}` (expected one of: {})", args.preset, names.join(", "));
            };
            (preset.name().to_string(), preset.params())
        }
    };
    let config = params.validate().context("invalid design")?;

    println!("=== SAR ADC simulation: {name} ===\n");

    let settings = SweepSettings {
        values_per_bin: args.values_per_bin,
        samples_per_bin: args.samples_per_bin,
        trials: args.trials,
        seed: args.seed,
        keep_trial_arrays: false,
    };
    let nonlinearity = measure_nonlinearity(&config, &settings)?;
    // Follow-up measurements reuse the sweep's seed so one number reproduces the run.
    let seed = Some(nonlinearity.seed);

    let dynamic = if args.enob {
        let sine = SineSettings {
            seed,
            ..SineSettings::default()
        };
        Some(measure_enob(&config, &sine)?)
    } else {
        None
    };
    let energy = if args.energy {
        Some(measure_conversion_energy(&config, seed)?)
    } else {
        None
    };

    if args.testbench {
        print_testbench(&config, seed);
    }

    if args.dac {
        let dac = measure_dac_linearity(&config, &config.cdac.nominal_capacitors())?;
        println!(
            "CDAC linearity: {} register codes, DNL sigma {:.4}, INL sigma {:.4} (unit steps)\n",
            dac.outputs.len(),
            dac.dnl_std,
            dac.inl_std
        );
    }

    let lin = &nonlinearity.linearity;
    if !lin.missing_codes.is_empty() {
        println!("Missing codes: {:?}\n", lin.missing_codes);
    }

    let datasheet = Datasheet::new(&config, Some(&nonlinearity), dynamic.as_ref(), energy.as_ref());
    println!("{datasheet}");

    if let Some(dir) = &args.output_dir {
        let report = RunReport {
            name,
            params,
            datasheet,
            nonlinearity: Some(nonlinearity),
            dynamic,
            energy,
        };
        let mut sink = JsonFileSink::new(dir);
        sink.store(&report)?;
        for path in sink.written() {
            println!("Results saved to {}", path.display());
        }
    }

    Ok(())
}

fn print_testbench(config: &SarConfig, seed: Option<u64>) {
    if config.testbench.is_empty() {
        println!("Testbench: no stimulus configured\n");
        return;
    }
    println!("Testbench:");
    println!("  {:>12} {:>10} {:>10} {:>6} {:>12}", "time [s]", "Vp [V]", "Vn [V]", "code", "energy [J]");
    for s in run_testbench(config, seed) {
        let code = s.code.map_or_else(|| "fault".to_string(), |c| c.to_string());
        println!(
            "  {:>12.4e} {:>10.4} {:>10.4} {:>6} {:>12.4e}",
            s.time, s.positive, s.negative, code, s.energy
        );
    }
    println!();
}

fn print_result(name: &str, pass: bool, detail: &str) {
    let status = if pass { "PASS" } else { "FAIL" };
    println!("  [{}] {} - {}", status, name, detail);
}

// === Self checks ===

fn self_check() -> bool {
    println!("=== SAR ADC self check ===\n");
    let mut all_pass = true;

    all_pass &= check_reference_codes();
    all_pass &= check_ideal_sweeps();
    all_pass &= check_presets_validate();

    println!();
    if all_pass {
        println!("All checks passed.");
    } else {
        println!("Some checks FAILED.");
    }
    all_pass
}

fn check_reference_codes() -> bool {
    println!("Check: reference codes (8-bit binary, 1.2 V)");
    let Ok(config) = SarParams::default().validate() else {
        print_result("default design", false, "does not validate");
        return false;
    };

    let mut pass = true;
    for (vp, vn, expected) in [(1.2, 0.0, 255), (0.6, 0.6, 128), (0.0, 1.2, 0)] {
        let record = sar_adc_sim::measure::convert_point(&config, vp, vn, Some(0), ConvertOptions::default());
        let ok = record.code == Some(expected);
        print_result(
            &format!("Vp={vp} Vn={vn}"),
            ok,
            &format!("code={:?} expected={}", record.code, expected),
        );
        pass &= ok;
    }
    pass
}

fn check_ideal_sweeps() -> bool {
    println!("Check: ideal histogram sweeps");
    let mut pass = true;
    for preset in [DesignPreset::Binary8, DesignPreset::SplitCap12] {
        let Ok(config) = preset.params().ideal().validate() else {
            print_result(preset.name(), false, "does not validate");
            pass = false;
            continue;
        };
        let settings = SweepSettings {
            values_per_bin: 2,
            seed: Some(0),
            ..SweepSettings::default()
        };
        let ok = match measure_nonlinearity(&config, &settings) {
            Ok(r) => {
                let lin = &r.linearity;
                let ok = lin.missing_codes.is_empty() && lin.worst_inl <= 0.5;
                print_result(
                    preset.name(),
                    ok,
                    &format!(
                        "missing={} worst_dnl={:.3} worst_inl={:.3}",
                        lin.missing_codes.len(),
                        lin.worst_dnl,
                        lin.worst_inl
                    ),
                );
                ok
            }
            Err(e) => {
                print_result(preset.name(), false, &e.to_string());
                false
            }
        };
        pass &= ok;
    }
    pass
}

fn check_presets_validate() -> bool {
    println!("Check: built-in presets");
    let mut pass = true;
    for preset in DesignPreset::ALL {
        let (ok, detail) = match preset.params().validate() {
            Ok(c) => (true, format!("{} caps", c.cdac.array_size())),
            Err(e) => (false, e.to_string()),
        };
        print_result(preset.name(), ok, &detail);
        pass &= ok;
    }
    pass
}
