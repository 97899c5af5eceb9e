//! Deterministic seed derivation.
//!
//! Every random stream in a run (one mismatch draw per trial, one noise
//! stream per swept input) gets its own generator seeded from the run seed
//! and its coordinates, so results do not depend on evaluation order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Stream index reserved for the per-trial capacitor draw.
pub const MISMATCH_STREAM: u64 = 0;

/// First stream index used for swept input points.
pub const SWEEP_STREAM_BASE: u64 = 1;

/// Stream used by the dynamic (sine) and energy drivers.
pub const AUXILIARY_STREAM: u64 = u64::MAX;

/// Mix a run seed with a trial index and a stream index.
pub fn derive_seed(base: u64, trial: u64, stream: u64) -> u64 {
    let mut z = splitmix(base ^ splitmix(trial.wrapping_add(0x632B_E59B_D9B4_E019)));
    z = splitmix(z ^ stream.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z
}

/// Generator for one `(trial, stream)` coordinate.
pub fn stream_rng(base: u64, trial: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(derive_seed(base, trial, stream))
}

/// Use the caller's seed, or draw one from system entropy.
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    match seed {
        Some(s) => s,
        None => {
            let s: u64 = rand::rng().random();
            log::warn!("no seed given, drew {s} from system entropy; pass it back to reproduce this run");
            s
        }
    }
}

fn splitmix(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_coordinates_same_seed() {
        for trial in 0..8 {
            for stream in 0..8 {
                assert_eq!(
                    derive_seed(42, trial, stream),
                    derive_seed(42, trial, stream),
                    "trial={trial} stream={stream}"
                );
            }
        }
    }

    #[test]
    fn coordinates_are_not_interchangeable() {
        assert_ne!(derive_seed(1, 2, 3), derive_seed(1, 3, 2));
        assert_ne!(derive_seed(1, 0, 0), derive_seed(2, 0, 0));
    }

    #[test]
    fn seeds_spread_across_streams() {
        let mut seen = std::collections::HashSet::new();
        for trial in 0..32 {
            for stream in 0..32 {
                seen.insert(derive_seed(7, trial, stream));
            }
        }
        assert_eq!(seen.len(), 32 * 32, "derived seeds should not collide");
    }

    #[test]
    fn explicit_seed_is_kept() {
        assert_eq!(resolve_seed(Some(99)), 99);
    }

    struct Capture(std::sync::Mutex<Vec<(log::Level, String)>>);

    impl log::Log for Capture {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut records) = self.0.lock() {
                records.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture(std::sync::Mutex::new(Vec::new()));

    #[test]
    fn drawn_seed_is_reported_as_a_warning() {
        let _ = log::set_logger(&CAPTURE);
        log::set_max_level(log::LevelFilter::Trace);
        let s = resolve_seed(None);
        let records = CAPTURE.0.lock().unwrap();
        let needle = format!("drew {s} ");
        let (level, _) = records
            .iter()
            .find(|(_, msg)| msg.contains(&needle))
            .expect("drawn seed was not logged");
        assert_eq!(*level, log::Level::Warn);
    }
}
