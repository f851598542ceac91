mod common;

use common::{gaussian_profile, Lcg};

use scatterlight_core::analysis::{
    centroid_offset, correction_bases, detect_peaks, local_minima, peak_prominence, peak_width,
};
use scatterlight_core::pipeline::AnalysisConfig;
use scatterlight_core::signal::CircularSignal;

fn minima_mask(signal: &CircularSignal) -> Vec<bool> {
    let mut mask = vec![false; signal.len()];
    for pos in local_minima(signal) {
        mask[pos] = true;
    }
    mask
}

// ---------------------------------------------------------------------------
// Prominence
// ---------------------------------------------------------------------------

#[test]
fn test_prominence_of_isolated_peak() {
    let profile = gaussian_profile(360, 0.2, &[(90.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let prominence = peak_prominence(&signal, 90);
    assert!((prominence - 1.0).abs() < 1e-3, "got {prominence}");
}

#[test]
fn test_prominence_bounded_by_global_minimum() {
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0), (200.0, 0.6, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let global_min = profile.iter().copied().fold(f32::INFINITY, f32::min);
    for pos in [90usize, 200] {
        let prominence = peak_prominence(&signal, pos);
        assert!(prominence >= 0.0);
        assert!(prominence <= signal.get(pos as isize) - global_min + 1e-6);
    }
}

#[test]
fn test_prominence_of_smaller_peak() {
    // The smaller peak's bases reach the near-zero valleys on both sides,
    // so its prominence is its own height.
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0), (200.0, 0.6, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let prominence = peak_prominence(&signal, 200);
    assert!((prominence - 0.6).abs() < 1e-3, "got {prominence}");
}

#[test]
fn test_prominence_wraps_across_boundary() {
    let profile = gaussian_profile(360, 0.0, &[(2.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let prominence = peak_prominence(&signal, 2);
    assert!((prominence - 1.0).abs() < 1e-3, "got {prominence}");
}

// ---------------------------------------------------------------------------
// Width
// ---------------------------------------------------------------------------

#[test]
fn test_width_of_gaussian_near_fwhm() {
    // Full width at half prominence of a Gaussian is 2*sqrt(2 ln 2)*sigma.
    let sigma = 4.0f32;
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, sigma)]);
    let signal = CircularSignal::new(&profile);
    let prominence = peak_prominence(&signal, 90);
    let width = peak_width(&signal, 90, prominence, 0.5);
    let expected = 2.0 * (2.0f32 * std::f32::consts::LN_2).sqrt() * sigma;
    assert!(
        (width - expected).abs() < 0.1,
        "width {width}, expected {expected}"
    );
}

#[test]
fn test_width_of_single_sample_spike_is_one() {
    let mut profile = vec![0.0f32; 360];
    profile[100] = 1.0;
    let signal = CircularSignal::new(&profile);
    let width = peak_width(&signal, 100, 1.0, 0.5);
    assert!((width - 1.0).abs() < 1e-6, "got {width}");
}

#[test]
fn test_width_monotonic_in_rel_height() {
    // The intersection height is value - h * prominence: larger h measures
    // lower on the peak, so width must not decrease as h grows.
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let prominence = peak_prominence(&signal, 90);
    let mut previous = 0.0f32;
    for rel_height in [0.1f32, 0.25, 0.5, 0.75, 0.9] {
        let width = peak_width(&signal, 90, prominence, rel_height);
        assert!(width >= 0.0);
        assert!(
            width >= previous,
            "width shrank at rel_height {rel_height}: {width} < {previous}"
        );
        previous = width;
    }
}

// ---------------------------------------------------------------------------
// Centroid correction
// ---------------------------------------------------------------------------

#[test]
fn test_centroid_of_symmetric_peak_is_zero() {
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let config = AnalysisConfig::default();
    let minima = minima_mask(&signal);
    let (left, right) = correction_bases(&signal, &minima, 90, signal.max_value(), &config);
    let offset = centroid_offset(&signal, 90, left, right, &config);
    assert!(offset.abs() < 1e-3, "got {offset}");
}

#[test]
fn test_centroid_leans_toward_heavier_side() {
    // Right flank decays slower than the left near the top.
    let mut profile = vec![0.0f32; 24];
    profile[10] = 0.5;
    profile[11] = 0.9;
    profile[12] = 1.0;
    profile[13] = 0.97;
    profile[14] = 0.5;
    profile[15] = 0.1;
    let signal = CircularSignal::new(&profile);
    let config = AnalysisConfig::default();
    let minima = minima_mask(&signal);
    let (left, right) = correction_bases(&signal, &minima, 12, signal.max_value(), &config);
    let offset = centroid_offset(&signal, 12, left, right, &config);
    assert!(offset > 0.0, "got {offset}");
    assert!(offset <= 1.0);
}

#[test]
fn test_centroid_always_within_unit_range() {
    let mut rng = Lcg::new(7);
    for _ in 0..50 {
        let profile: Vec<f32> = (0..72).map(|_| rng.next_f32()).collect();
        let signal = CircularSignal::new(&profile);
        let config = AnalysisConfig::default();
        let minima = minima_mask(&signal);
        let max_value = signal.max_value();
        for pos in detect_peaks(&signal, &config) {
            let (left, right) = correction_bases(&signal, &minima, pos, max_value, &config);
            let offset = centroid_offset(&signal, pos, left, right, &config);
            assert!(
                (-1.0..=1.0).contains(&offset),
                "offset {offset} out of range at {pos}"
            );
            assert!(offset.is_finite());
        }
    }
}

#[test]
fn test_centroid_bases_bounded_by_radius() {
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 8.0)]);
    let signal = CircularSignal::new(&profile);
    let config = AnalysisConfig::default();
    let minima = minima_mask(&signal);
    let (left, right) = correction_bases(&signal, &minima, 90, signal.max_value(), &config);
    assert!(left <= config.centroid_radius);
    assert!(right <= config.centroid_radius);
}
