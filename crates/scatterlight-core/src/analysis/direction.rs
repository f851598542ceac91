//! Fiber direction and inter-peak distance classification.
//!
//! Classification is keyed purely on the number of detected peaks: each
//! arity has its own pairing rule, written out as one match arm per case so
//! every rule is independently testable. Directions are undirected fiber
//! orientations in [0, 180); unresolvable pixels report [`BACKGROUND`].

use crate::consts::{BACKGROUND, PAIR_TOLERANCE_DEGREES, RESULT_SLOTS};

/// Convert peak indices plus their centroid offsets to angles in degrees.
///
/// `centroid` is the per-sample centroid array for the pixel; only entries
/// at peak positions are meaningful.
pub fn peak_angles(peaks: &[usize], centroid: &[f32], samples: usize) -> Vec<f32> {
    peaks
        .iter()
        .map(|&pos| (pos as f32 + centroid[pos]) * 360.0 / samples as f32)
        .collect()
}

/// One or two fiber directions from the ordered peak-angle list.
///
/// A pair of peaks separated by close to half a rotation (within
/// [`PAIR_TOLERANCE_DEGREES`] of 180) is one fiber seen twice; its direction
/// comes from the pair midpoint. The measurement geometry maps profile angle
/// to fiber orientation as `(270 - angle) mod 180`.
pub fn classify_directions(angles: &[f32]) -> [f32; RESULT_SLOTS] {
    let mut result = [BACKGROUND; RESULT_SLOTS];
    match *angles {
        [] => {}
        [a0] => {
            result[0] = mod180(270.0 - a0);
        }
        [a0, a1] => {
            result[0] = mod180(270.0 - (a0 + a1) / 2.0);
        }
        [a0, a1, a2] => {
            // Three peaks: one opposite pair plus a leftover steep fiber.
            // Candidate pairs are tried in a fixed order; the leftover
            // peak's direction comes from its own angle, not a midpoint.
            let pairs = [(a0, a2, a1), (a0, a1, a2), (a1, a2, a0)];
            for (first, second, leftover) in pairs {
                if paired(first, second) {
                    result[0] = mod180(270.0 - (first + second) / 2.0);
                    result[1] = mod180(270.0 - leftover);
                    break;
                }
            }
        }
        [a0, a1, a2, a3] => {
            // Two crossing fibers: peaks pair at offset two. Each pair
            // fills its slot independently.
            if paired(a0, a2) {
                result[0] = mod180(270.0 - (a0 + a2) / 2.0);
            }
            if paired(a1, a3) {
                result[1] = mod180(270.0 - (a1 + a3) / 2.0);
            }
        }
        _ => {}
    }
    result
}

/// Angular gaps between paired peaks, one slot per pair.
///
/// A lone peak has no partner and reports the full period. For even counts
/// each peak pairs with the one `count / 2` positions ahead; slot 0 carries
/// the first pair's gap and, for two peaks, slot 1 its complement.
pub fn pair_distances(angles: &[f32]) -> [f32; RESULT_SLOTS] {
    let mut result = [BACKGROUND; RESULT_SLOTS];
    match *angles {
        [_] => {
            result[0] = 360.0;
        }
        [a0, a1] => {
            result[0] = a1 - a0;
            result[1] = 360.0 - (a1 - a0);
        }
        [a0, a1, a2, a3] => {
            result[0] = a2 - a0;
            result[1] = a3 - a1;
        }
        _ => {}
    }
    result
}

fn paired(first: f32, second: f32) -> bool {
    ((second - first) - 180.0).abs() < PAIR_TOLERANCE_DEGREES
}

fn mod180(value: f32) -> f32 {
    value.rem_euclid(180.0)
}
