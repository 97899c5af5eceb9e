//! Behavioral model of a differential SAR ADC: the capacitive DAC, the
//! comparator, and the controller that runs the bit-by-bit search.

pub mod cdac;
pub mod comparator;
pub mod controller;
pub mod mismatch;
pub mod switching;
pub mod weights;

pub use cdac::CdacDesign;
pub use comparator::ComparatorModel;
pub use controller::{CodeMap, Conversion, ConversionPhase, ConversionRecord, CycleTrace, SarAdc};
pub use mismatch::CapacitorArray;
pub use switching::{SwitchEvent, SwitchVector, SwitchingScheme, SwitchingStrategy};
pub use weights::Weights;

use serde::{Deserialize, Serialize};

/// One half of the differential array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Positive,
    Negative,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Positive, Side::Negative];

    pub fn index(self) -> usize {
        match self {
            Side::Positive => 0,
            Side::Negative => 1,
        }
    }
}

/// Bottom-plate connection of a single capacitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Plate {
    /// Tied to the positive reference (`+1`).
    Vrefp,
    /// Tied to the negative reference (`-1`).
    Vrefn,
}

impl Plate {
    pub fn sign(self) -> i8 {
        match self {
            Plate::Vrefp => 1,
            Plate::Vrefn => -1,
        }
    }

    pub fn flipped(self) -> Plate {
        match self {
            Plate::Vrefp => Plate::Vrefn,
            Plate::Vrefn => Plate::Vrefp,
        }
    }
}

/// The reference rail pair seen by the bottom plates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub positive: f64,
    pub negative: f64,
}

impl References {
    pub fn new(positive: f64, negative: f64) -> Self {
        Self { positive, negative }
    }

    pub fn voltage(&self, plate: Plate) -> f64 {
        match plate {
            Plate::Vrefp => self.positive,
            Plate::Vrefn => self.negative,
        }
    }

    pub fn span(&self) -> f64 {
        self.positive - self.negative
    }

    pub fn common_mode(&self) -> f64 {
        0.5 * (self.positive + self.negative)
    }

    /// Rails shifted by per-cycle noise samples.
    pub fn perturbed(&self, noise_positive: f64, noise_negative: f64) -> Self {
        Self {
            positive: self.positive + noise_positive,
            negative: self.negative + noise_negative,
        }
    }
}
