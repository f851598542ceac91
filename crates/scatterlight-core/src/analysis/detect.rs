//! Peak detection on circular profiles.
//!
//! A sample is a peak when it is a strict local maximum (plateaus report
//! their midpoint) and survives three constraints applied in order: minimum
//! separation, minimum prominence, minimum width. Suppressed candidates are
//! removed entirely, not flagged.

use crate::consts::{MIN_PEAK_WIDTH, SEPARATION_DIVISOR};
use crate::pipeline::config::AnalysisConfig;
use crate::signal::CircularSignal;

use super::prominence::peak_prominence;
use super::width::peak_width;

/// Minimum allowed separation between peaks, in samples.
pub fn min_peak_distance(samples: usize) -> usize {
    ((samples as f64 / SEPARATION_DIVISOR as f64).ceil() as usize).max(1)
}

/// Indices of plateau-centered local maxima, ascending.
pub fn local_maxima(signal: &CircularSignal) -> Vec<usize> {
    plateau_extrema(signal, false)
}

/// Indices of plateau-centered local minima, ascending. These are the
/// "reverse peaks" used to bound centroid base regions.
pub fn local_minima(signal: &CircularSignal) -> Vec<usize> {
    plateau_extrema(signal, true)
}

/// Scan one period for runs of equal samples entered by a strict rise and
/// left by a strict fall (reversed when `invert`). Runs may span the period
/// boundary; a fully flat profile has no extrema.
fn plateau_extrema(signal: &CircularSignal, invert: bool) -> Vec<usize> {
    let n = signal.len();
    let sample = |i: isize| {
        if invert {
            -signal.get(i)
        } else {
            signal.get(i)
        }
    };

    let mut extrema = Vec::new();
    let mut i = 0usize;
    while i < n {
        let value = sample(i as isize);
        if sample(i as isize - 1) < value {
            // Run of equal samples starting at i.
            let mut run = 0usize;
            while run + 1 < n && sample((i + run + 1) as isize) == value {
                run += 1;
            }
            if run + 1 < n && sample((i + run + 1) as isize) < value {
                extrema.push(signal.wrap((i + run / 2) as isize));
            }
            i += run + 1;
        } else {
            i += 1;
        }
    }
    extrema.sort_unstable();
    extrema
}

/// Keep candidates highest-value-first, suppressing any remaining candidate
/// closer than `min_distance` (circular) to a kept one.
///
/// Equal values resolve toward the higher index so that both executors make
/// the same choice.
pub fn select_by_distance(
    signal: &CircularSignal,
    candidates: &[usize],
    min_distance: usize,
) -> Vec<usize> {
    if min_distance <= 1 || candidates.len() <= 1 {
        return candidates.to_vec();
    }

    const CANDIDATE: u8 = 1;
    const KEPT: u8 = 2;
    let mut state = vec![CANDIDATE; candidates.len()];

    loop {
        let mut best: Option<usize> = None;
        for (k, &pos) in candidates.iter().enumerate() {
            if state[k] != CANDIDATE {
                continue;
            }
            best = match best {
                None => Some(k),
                Some(b) => {
                    let (vb, vp) = (signal.get(candidates[b] as isize), signal.get(pos as isize));
                    if vp > vb || (vp == vb && pos > candidates[b]) {
                        Some(k)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        let Some(b) = best else { break };
        state[b] = KEPT;
        for (k, &pos) in candidates.iter().enumerate() {
            if state[k] == CANDIDATE
                && signal.circular_distance(pos, candidates[b]) < min_distance
            {
                state[k] = 0;
            }
        }
    }

    candidates
        .iter()
        .zip(&state)
        .filter(|(_, &s)| s == KEPT)
        .map(|(&pos, _)| pos)
        .collect()
}

/// Detect peaks satisfying all constraints, ascending.
pub fn detect_peaks(signal: &CircularSignal, config: &AnalysisConfig) -> Vec<usize> {
    let min_distance = min_peak_distance(signal.len());
    let candidates = local_maxima(signal);
    let candidates = select_by_distance(signal, &candidates, min_distance);

    let mut peaks = Vec::with_capacity(candidates.len());
    for pos in candidates {
        let prominence = peak_prominence(signal, pos);
        if prominence < config.min_prominence {
            continue;
        }
        if peak_width(signal, pos, prominence, config.rel_height) < MIN_PEAK_WIDTH {
            continue;
        }
        peaks.push(pos);
    }
    peaks
}
