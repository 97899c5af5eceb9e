//! Switching strategies: how each comparator decision moves the bottom plates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Plate, Side};
use crate::error::ConfigError;

/// Bottom-plate connections of both halves of the array, MSB first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchVector {
    pub positive: Vec<Plate>,
    pub negative: Vec<Plate>,
}

impl SwitchVector {
    pub fn uniform(len: usize, positive: Plate, negative: Plate) -> Self {
        Self {
            positive: vec![positive; len],
            negative: vec![negative; len],
        }
    }

    pub fn len(&self) -> usize {
        self.positive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty()
    }

    pub fn side(&self, side: Side) -> &[Plate] {
        match side {
            Side::Positive => &self.positive,
            Side::Negative => &self.negative,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut [Plate] {
        match side {
            Side::Positive => &mut self.positive,
            Side::Negative => &mut self.negative,
        }
    }
}

/// A single bottom-plate move made after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchEvent {
    pub side: Side,
    pub index: usize,
    pub from: Plate,
    pub to: Plate,
}

/// Behaviour every switching strategy has to define.
pub trait SwitchingScheme {
    /// Plate connection of capacitor `index` right after sampling.
    fn initial_plate(&self, side: Side, index: usize) -> Plate;

    /// Move the plates for the decision `bit` made in cycle `index`.
    fn update_after_bit(&self, switches: &mut SwitchVector, index: usize, bit: bool) -> SwitchEvent;

    /// Whether an already decided capacitor may be switched again later.
    fn permits_redundancy(&self) -> bool;

    fn initial_switch_vector(&self, array_size: usize) -> SwitchVector {
        let mut switches = SwitchVector::uniform(array_size, Plate::Vrefp, Plate::Vrefp);
        self.reset(&mut switches);
        switches
    }

    /// Reinitialise an existing vector in place.
    fn reset(&self, switches: &mut SwitchVector) {
        for side in Side::BOTH {
            for (i, plate) in switches.side_mut(side).iter_mut().enumerate() {
                *plate = self.initial_plate(side, i);
            }
        }
    }
}

/// Monotonic switching: every plate starts on `Vrefp` and each decision
/// pulls one capacitor down to `Vrefn` on the side that is higher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Monotonic;

impl SwitchingScheme for Monotonic {
    fn initial_plate(&self, _side: Side, _index: usize) -> Plate {
        Plate::Vrefp
    }

    fn update_after_bit(&self, switches: &mut SwitchVector, index: usize, bit: bool) -> SwitchEvent {
        let side = if bit { Side::Positive } else { Side::Negative };
        move_plate(switches, side, index, Plate::Vrefn)
    }

    fn permits_redundancy(&self) -> bool {
        false
    }
}

/// Bidirectional single-side switching. The MSB capacitor starts on `Vrefn`
/// and is raised on the lower side; all others start on `Vrefp` and are
/// lowered on the higher side.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bss;

impl SwitchingScheme for Bss {
    fn initial_plate(&self, _side: Side, index: usize) -> Plate {
        if index == 0 { Plate::Vrefn } else { Plate::Vrefp }
    }

    fn update_after_bit(&self, switches: &mut SwitchVector, index: usize, bit: bool) -> SwitchEvent {
        match (self.initial_plate(Side::Positive, index), bit) {
            (Plate::Vrefn, true) => move_plate(switches, Side::Negative, index, Plate::Vrefp),
            (Plate::Vrefn, false) => move_plate(switches, Side::Positive, index, Plate::Vrefp),
            (Plate::Vrefp, true) => move_plate(switches, Side::Positive, index, Plate::Vrefn),
            (Plate::Vrefp, false) => move_plate(switches, Side::Negative, index, Plate::Vrefn),
        }
    }

    fn permits_redundancy(&self) -> bool {
        false
    }
}

fn move_plate(switches: &mut SwitchVector, side: Side, index: usize, to: Plate) -> SwitchEvent {
    let plates = switches.side_mut(side);
    let from = plates[index];
    plates[index] = to;
    SwitchEvent { side, index, from, to }
}

/// Named switching strategy, resolved once during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchingStrategy {
    #[default]
    Monotonic,
    Bss,
}

impl SwitchingStrategy {
    pub const ALL: &[SwitchingStrategy] = &[SwitchingStrategy::Monotonic, SwitchingStrategy::Bss];

    pub fn name(self) -> &'static str {
        match self {
            SwitchingStrategy::Monotonic => "monotonic",
            SwitchingStrategy::Bss => "bss",
        }
    }

    fn scheme(self) -> &'static dyn SwitchingScheme {
        match self {
            SwitchingStrategy::Monotonic => &Monotonic,
            SwitchingStrategy::Bss => &Bss,
        }
    }
}

impl fmt::Display for SwitchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SwitchingStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownStrategy(s.to_string()))
    }
}

impl SwitchingScheme for SwitchingStrategy {
    fn initial_plate(&self, side: Side, index: usize) -> Plate {
        self.scheme().initial_plate(side, index)
    }

    fn update_after_bit(&self, switches: &mut SwitchVector, index: usize, bit: bool) -> SwitchEvent {
        self.scheme().update_after_bit(switches, index, bit)
    }

    fn permits_redundancy(&self) -> bool {
        self.scheme().permits_redundancy()
    }
}
