//! Execution order of tasks within a batch.
//!
//! Light-based captures go first because the light source degrades the
//! sample, electron captures follow, and the cross-modality overlay runs
//! last since it needs every other capture in place.

use std::sync::Arc;

use tracing::{debug, warn};

use super::traits::AcquisitionTask;
use super::types::TaskKind;

pub const FLUORESCENCE_WEIGHT: f64 = 100.0;
pub const OPTICAL_WEIGHT: f64 = 90.0;
pub const ELECTRON_WEIGHT: f64 = 50.0;
pub const COMPOSITE_WEIGHT: f64 = 40.0;
pub const OVERLAY_WEIGHT: f64 = 10.0;
pub const UNKNOWN_WEIGHT: f64 = 0.0;

/// Upper bound of the wavelength bonus; keeps every fluorescence task
/// above the optical weight.
const MAX_WAVELENGTH_BONUS: f64 = 9.0;

/// Priority of a task kind. Higher runs earlier.
pub fn weight(kind: &TaskKind) -> f64 {
    match kind {
        TaskKind::Fluorescence { excitation_nm } => {
            FLUORESCENCE_WEIGHT + wavelength_bonus(*excitation_nm)
        }
        TaskKind::Optical => OPTICAL_WEIGHT,
        TaskKind::Electron => ELECTRON_WEIGHT,
        TaskKind::Composite => COMPOSITE_WEIGHT,
        TaskKind::Overlay => OVERLAY_WEIGHT,
        TaskKind::Other { .. } => UNKNOWN_WEIGHT,
    }
}

/// Longer excitation wavelengths bleach less, so they run first.
fn wavelength_bonus(excitation_nm: f64) -> f64 {
    if !excitation_nm.is_finite() {
        return 0.0;
    }
    (excitation_nm / 1000.0).clamp(0.0, MAX_WAVELENGTH_BONUS)
}

/// Indices of `weights` sorted by descending weight, ties kept in input order.
pub fn order_by_weight(weights: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    // sort_by is stable
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]));
    order
}

/// Indices into `tasks` in the order they must execute.
pub fn execution_order(tasks: &[Arc<dyn AcquisitionTask>]) -> Vec<usize> {
    let weights: Vec<f64> = tasks
        .iter()
        .map(|task| {
            let kind = task.kind();
            if let TaskKind::Other { name } = &kind {
                warn!(task = %task.name(), kind = %name, "Unrecognized task kind, scheduling last");
            }
            weight(&kind)
        })
        .collect();

    let order = order_by_weight(&weights);
    debug!(
        order = ?order.iter().map(|&i| tasks[i].name()).collect::<Vec<_>>(),
        "Computed execution order"
    );
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_weights() {
        assert_eq!(weight(&TaskKind::Optical), 90.0);
        assert_eq!(weight(&TaskKind::Electron), 50.0);
        assert_eq!(weight(&TaskKind::Composite), 40.0);
        assert_eq!(weight(&TaskKind::Overlay), 10.0);
        assert_eq!(
            weight(&TaskKind::Other {
                name: "spectrum".into()
            }),
            0.0
        );
    }

    #[test]
    fn test_fluorescence_longest_wavelength_first() {
        let red = weight(&TaskKind::Fluorescence { excitation_nm: 650.0 });
        let blue = weight(&TaskKind::Fluorescence { excitation_nm: 405.0 });
        assert!(red > blue);
        assert!(blue > weight(&TaskKind::Optical));
        assert!(red < 110.0);
    }

    #[test]
    fn test_fluorescence_bonus_is_bounded() {
        assert_eq!(
            weight(&TaskKind::Fluorescence {
                excitation_nm: f64::NAN
            }),
            100.0
        );
        assert_eq!(
            weight(&TaskKind::Fluorescence {
                excitation_nm: -20.0
            }),
            100.0
        );
        assert_eq!(
            weight(&TaskKind::Fluorescence {
                excitation_nm: 1.0e9
            }),
            109.0
        );
    }

    #[test]
    fn test_reference_scenario() {
        // A optical, B fluorescence, C electron
        let weights = [90.0, 100.0, 50.0];
        assert_eq!(order_by_weight(&weights), vec![1, 0, 2]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let weights = [50.0, 90.0, 50.0, 90.0, 50.0];
        assert_eq!(order_by_weight(&weights), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_empty() {
        assert!(order_by_weight(&[]).is_empty());
    }

    /// Every assignment of a small weight alphabet to every length up to 6.
    #[test]
    fn test_order_is_descending_and_stable_exhaustive() {
        let alphabet = [0.0, 10.0, 50.0, 90.0];
        for len in 0..=6u32 {
            let combos = (alphabet.len() as u32).pow(len);
            for mut code in 0..combos {
                let weights: Vec<f64> = (0..len)
                    .map(|_| {
                        let w = alphabet[(code % alphabet.len() as u32) as usize];
                        code /= alphabet.len() as u32;
                        w
                    })
                    .collect();

                let order = order_by_weight(&weights);

                let mut seen = order.clone();
                seen.sort_unstable();
                assert_eq!(seen, (0..weights.len()).collect::<Vec<_>>());

                for pair in order.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    assert!(weights[a] >= weights[b], "not descending: {:?}", weights);
                    if weights[a] == weights[b] {
                        assert!(a < b, "tie reordered: {:?}", weights);
                    }
                }
            }
        }
    }
}
