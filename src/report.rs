//! Datasheet summary and result persistence.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{SarConfig, SarParams};
use crate::error::SinkError;
use crate::measure::{DynamicResults, EnergyResults, NonlinearityResults};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasheetRow {
    pub parameter: String,
    pub value: String,
    pub unit: String,
}

/// Parameter and performance table of one design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datasheet {
    pub rows: Vec<DatasheetRow>,
}

impl Datasheet {
    pub fn new(
        config: &SarConfig,
        nonlinearity: Option<&NonlinearityResults>,
        dynamic: Option<&DynamicResults>,
        energy: Option<&EnergyResults>,
    ) -> Self {
        let cdac = &config.cdac;
        let weights = &cdac.weights;
        let redundancy = weights.redundancy();
        let max_redundancy = redundancy.iter().copied().fold(0.0, f64::max);

        let mut sheet = Datasheet::default();
        sheet.push("Resolution", config.resolution.to_string(), "bit");
        sheet.push("Sample rate", format!("{:.3}", config.sampling_frequency / 1e6), "MS/s");
        sheet.push("Switching", config.strategy.name().to_string(), "");
        sheet.push("Calibration", on_off(config.use_calibration).to_string(), "");
        sheet.push("LSB size", format!("{:.3}", config.lsb() * 1e3), "mV");
        sheet.push("Full scale (diff)", format!("{:.4}", cdac.full_scale_range()), "V");
        sheet.push("DAC array size", cdac.array_size().to_string(), "");
        sheet.push("DAC radix", format!("{:.3}", weights.effective_radix()), "");
        sheet.push("Max stage redundancy", format!("{:.1}", max_redundancy * 100.0), "%");
        sheet.push("Unit capacitance", format!("{:.3}", cdac.unit_capacitance * 1e15), "fF");
        sheet.push("Parasitic capacitance", format!("{:.3}", cdac.parasitic_capacitance * 1e15), "fF");
        sheet.push("Total capacitance", format!("{:.3}", cdac.total_capacitance() * 1e15), "fF");
        sheet.push("Capacitor mismatch", format!("{:.3}", cdac.mismatch_percent), "%");
        sheet.push(
            "Settling error",
            format!("{:.3e}", 1.0 - config.settling_factor()),
            "",
        );
        sheet.push("Reference noise", format!("{:.3}", cdac.reference_noise_rms * 1e3), "mV");
        sheet.push("Comparator noise", format!("{:.3}", config.comparator.noise_rms * 1e3), "mV");
        sheet.push("Comparator offset", format!("{:.3}", config.comparator.offset_voltage * 1e3), "mV");
        sheet.push("Aperture jitter", format!("{:.3}", config.aperture_jitter * 1e12), "ps");

        if let Some(nl) = nonlinearity {
            let lin = &nl.linearity;
            sheet.push("DNL (worst)", format!("{:.3}", lin.worst_dnl), "LSB");
            sheet.push("INL (worst)", format!("{:.3}", lin.worst_inl), "LSB");
            sheet.push("Offset error", format!("{:.3}", lin.offset_error), "LSB");
            sheet.push("Gain error", format!("{:.3}", lin.gain_error), "LSB");
            sheet.push("Missing codes", lin.missing_codes.len().to_string(), "");
            if let Some(mc) = &nl.monte_carlo {
                sheet.push("Monte-Carlo trials", mc.trials.to_string(), "");
                sheet.push("DNL sigma (worst case)", format!("{:.3}", mc.worst_dnl_std), "LSB");
                sheet.push("INL sigma (worst case)", format!("{:.3}", mc.worst_inl_std), "LSB");
            }
        }
        if let Some(d) = dynamic {
            sheet.push("ENOB", format!("{:.2}", d.enob), "bit");
            sheet.push("SINAD", format!("{:.1}", d.sinad_db), "dB");
        }
        if let Some(e) = energy {
            sheet.push("Energy per conversion", format!("{:.3}", e.average_energy * 1e12), "pJ");
            sheet.push("Energy per bit", format!("{:.3}", e.energy_per_bit * 1e15), "fJ");
        }
        sheet
    }

    fn push(&mut self, parameter: &str, value: String, unit: &str) {
        self.rows.push(DatasheetRow {
            parameter: parameter.to_string(),
            value,
            unit: unit.to_string(),
        });
    }

    pub fn get(&self, parameter: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.parameter == parameter)
            .map(|r| r.value.as_str())
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "on" } else { "off" }
}

impl fmt::Display for Datasheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_w = self.rows.iter().map(|r| r.parameter.len()).max().unwrap_or(0);
        let value_w = self.rows.iter().map(|r| r.value.len()).max().unwrap_or(0);
        for row in &self.rows {
            writeln!(
                f,
                "{:<name_w$}  {:>value_w$} {}",
                row.parameter, row.value, row.unit
            )?;
        }
        Ok(())
    }
}

/// Everything one run produced, as handed to a [`ResultSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub params: SarParams,
    pub datasheet: Datasheet,
    pub nonlinearity: Option<NonlinearityResults>,
    pub dynamic: Option<DynamicResults>,
    pub energy: Option<EnergyResults>,
}

/// Receives finished results. The simulator never persists anything itself.
pub trait ResultSink {
    fn store(&mut self, report: &RunReport) -> Result<(), SinkError>;
}

/// Writes each report as pretty JSON into a directory, never overwriting:
/// `name.json`, then `name_1.json`, `name_2.json`, ...
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Files written so far, oldest first.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ResultSink for JsonFileSink {
    fn store(&mut self, report: &RunReport) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, &report.name, "json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;
        log::info!("wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

/// First `stem[_k].ext` in `dir` that does not exist yet.
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|k| dir.join(format!("{stem}_{k}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
