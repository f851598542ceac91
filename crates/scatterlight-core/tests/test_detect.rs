mod common;

use common::{gaussian_profile, single_profile_stack};

use scatterlight_core::analysis::{
    detect_peaks, local_maxima, local_minima, min_peak_distance,
};
use scatterlight_core::pipeline::AnalysisConfig;
use scatterlight_core::signal::CircularSignal;

// ---------------------------------------------------------------------------
// min_peak_distance
// ---------------------------------------------------------------------------

#[test]
fn test_min_distance_scales_with_period() {
    assert_eq!(min_peak_distance(360), 5);
    assert_eq!(min_peak_distance(72), 1);
    assert_eq!(min_peak_distance(73), 2);
    assert_eq!(min_peak_distance(24), 1);
}

// ---------------------------------------------------------------------------
// local_maxima / local_minima
// ---------------------------------------------------------------------------

#[test]
fn test_flat_signal_has_no_extrema() {
    let samples = vec![0.5f32; 24];
    let signal = CircularSignal::new(&samples);
    assert!(local_maxima(&signal).is_empty());
    assert!(local_minima(&signal).is_empty());
}

#[test]
fn test_single_maximum() {
    let profile = gaussian_profile(24, 0.0, &[(12.0, 1.0, 2.0)]);
    let signal = CircularSignal::new(&profile);
    assert_eq!(local_maxima(&signal), vec![12]);
}

#[test]
fn test_plateau_reports_midpoint() {
    let mut profile = vec![0.0f32; 24];
    profile[10] = 1.0;
    profile[11] = 1.0;
    profile[12] = 1.0;
    let signal = CircularSignal::new(&profile);
    assert_eq!(local_maxima(&signal), vec![11]);
}

#[test]
fn test_maximum_wraps_period_boundary() {
    let profile = gaussian_profile(24, 0.0, &[(0.0, 1.0, 2.0)]);
    let signal = CircularSignal::new(&profile);
    assert_eq!(local_maxima(&signal), vec![0]);
}

#[test]
fn test_plateau_spanning_boundary() {
    // Plateau at indices 23 and 0; midpoint in extended coordinates is 23.
    let mut profile = vec![0.0f32; 24];
    profile[23] = 1.0;
    profile[0] = 1.0;
    let signal = CircularSignal::new(&profile);
    assert_eq!(local_maxima(&signal), vec![23]);
}

#[test]
fn test_minima_are_inverted_maxima() {
    let profile = gaussian_profile(24, 0.0, &[(12.0, 1.0, 2.0)]);
    let inverted: Vec<f32> = profile.iter().map(|v| -v).collect();
    let signal = CircularSignal::new(&profile);
    let inv_signal = CircularSignal::new(&inverted);
    assert_eq!(local_minima(&signal), local_maxima(&inv_signal));
}

// ---------------------------------------------------------------------------
// detect_peaks — constraint filters
// ---------------------------------------------------------------------------

#[test]
fn test_detect_single_peak() {
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let peaks = detect_peaks(&signal, &AnalysisConfig::default());
    assert_eq!(peaks, vec![90]);
}

#[test]
fn test_detect_two_opposite_peaks() {
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0), (270.0, 1.0, 4.0)]);
    let signal = CircularSignal::new(&profile);
    let peaks = detect_peaks(&signal, &AnalysisConfig::default());
    assert_eq!(peaks, vec![90, 270]);
}

#[test]
fn test_detect_flat_signal_yields_no_peaks() {
    let profile = vec![1.0f32; 360];
    let signal = CircularSignal::new(&profile);
    assert!(detect_peaks(&signal, &AnalysisConfig::default()).is_empty());
}

#[test]
fn test_low_prominence_suppressed() {
    // Amplitude below the 0.125 prominence threshold.
    let profile = gaussian_profile(360, 0.0, &[(90.0, 0.1, 4.0)]);
    let signal = CircularSignal::new(&profile);
    assert!(detect_peaks(&signal, &AnalysisConfig::default()).is_empty());
}

#[test]
fn test_close_peaks_keep_higher() {
    // 360 samples -> minimum separation 5; the lower spike 2 samples away
    // from the higher one must be suppressed.
    let mut profile = vec![0.0f32; 360];
    profile[100] = 1.0;
    profile[102] = 0.9;
    let signal = CircularSignal::new(&profile);
    let peaks = detect_peaks(&signal, &AnalysisConfig::default());
    assert_eq!(peaks, vec![100]);
}

#[test]
fn test_separated_peaks_both_kept() {
    let mut profile = vec![0.0f32; 360];
    profile[100] = 1.0;
    profile[110] = 0.9;
    let signal = CircularSignal::new(&profile);
    let peaks = detect_peaks(&signal, &AnalysisConfig::default());
    assert_eq!(peaks, vec![100, 110]);
}

#[test]
fn test_separation_wraps_period_boundary() {
    // Indices 358 and 2 are 4 samples apart circularly, under the
    // 5-sample separation; only the higher survives.
    let mut profile = vec![0.0f32; 360];
    profile[358] = 1.0;
    profile[2] = 0.9;
    let signal = CircularSignal::new(&profile);
    let peaks = detect_peaks(&signal, &AnalysisConfig::default());
    assert_eq!(peaks, vec![358]);
}

#[test]
fn test_extension_form_matches_circular_detection() {
    // Detecting on the folded extended form is the same as detecting on the
    // period directly.
    let profile = gaussian_profile(360, 0.0, &[(90.0, 1.0, 4.0), (270.0, 0.8, 4.0)]);
    let extended = common::extend_profile(&profile);
    let from_extended = scatterlight_core::stack::SignalStack::from_extended(
        ndarray::Array3::from_shape_vec((1, 1, 720), extended).expect("shape"),
    )
    .expect("valid stack");
    let direct = single_profile_stack(&profile);

    let config = AnalysisConfig::default();
    let a = detect_peaks(&direct.signal(0, 0), &config);
    let b = detect_peaks(&from_extended.signal(0, 0), &config);
    assert_eq!(a, b);
}
