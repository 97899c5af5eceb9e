//! Behavioral SAR ADC simulator - library crate.
//!
//! Models a differential charge-redistribution SAR converter (capacitive DAC,
//! comparator, successive-approximation controller) with its non-idealities,
//! and measures it: histogram DNL/INL with Monte-Carlo mismatch, ENOB from a
//! sine test, switching energy, and CDAC-only linearity.

pub mod config;
pub mod error;
pub mod measure;
pub mod report;
pub mod sar;
pub mod seed;

pub use config::{DesignPreset, SarConfig, SarParams};
pub use error::{ConfigError, MeasureError, SinkError};
pub use measure::{NonlinearityResults, SweepSettings, measure_nonlinearity};
pub use report::{Datasheet, JsonFileSink, ResultSink, RunReport};
pub use sar::{SarAdc, SwitchingStrategy, Weights};
