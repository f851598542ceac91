use scatterlight_core::consts::{
    DEFAULT_CENTROID_RADIUS, DEFAULT_CENTROID_TARGET_FRACTION, DEFAULT_MIN_PROMINENCE,
    DEFAULT_REL_HEIGHT,
};
use scatterlight_core::pipeline::{AnalysisConfig, CpuConfig};

#[test]
fn test_analysis_config_defaults() {
    let config = AnalysisConfig::default();
    assert_eq!(config.min_prominence, DEFAULT_MIN_PROMINENCE);
    assert_eq!(config.rel_height, DEFAULT_REL_HEIGHT);
    assert_eq!(config.centroid_radius, DEFAULT_CENTROID_RADIUS);
    assert_eq!(config.centroid_target_fraction, DEFAULT_CENTROID_TARGET_FRACTION);
}

#[test]
fn test_analysis_config_roundtrip() {
    let config = AnalysisConfig {
        min_prominence: 0.2,
        rel_height: 0.4,
        centroid_radius: 5,
        centroid_target_fraction: 0.9,
    };
    let json = serde_json::to_string(&config).expect("serialize");
    let back: AnalysisConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.min_prominence, 0.2);
    assert_eq!(back.rel_height, 0.4);
    assert_eq!(back.centroid_radius, 5);
    assert_eq!(back.centroid_target_fraction, 0.9);
}

#[test]
fn test_analysis_config_empty_json_uses_defaults() {
    let config: AnalysisConfig = serde_json::from_str("{}").expect("deserialize");
    assert_eq!(config.min_prominence, DEFAULT_MIN_PROMINENCE);
    assert_eq!(config.rel_height, DEFAULT_REL_HEIGHT);
}

#[test]
fn test_cpu_config_explicit_thread_count() {
    let config = CpuConfig {
        worker_threads: Some(3),
    };
    assert_eq!(config.effective_threads(), 3);
}

#[test]
fn test_cpu_config_default_is_at_least_one_thread() {
    let config = CpuConfig::default();
    assert!(config.effective_threads() >= 1);
}

#[test]
fn test_cpu_config_empty_json_uses_defaults() {
    let config: CpuConfig = serde_json::from_str("{}").expect("deserialize");
    assert!(config.worker_threads.is_none());
}
