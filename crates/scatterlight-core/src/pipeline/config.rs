use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_CENTROID_RADIUS, DEFAULT_CENTROID_TARGET_FRACTION, DEFAULT_MIN_PROMINENCE,
    DEFAULT_REL_HEIGHT,
};

/// Tunable thresholds for the peak-analysis stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum prominence for a peak to survive detection.
    #[serde(default = "default_min_prominence")]
    pub min_prominence: f32,
    /// Relative height fraction at which widths are measured.
    #[serde(default = "default_rel_height")]
    pub rel_height: f32,
    /// Search radius (samples) for centroid base bounds.
    #[serde(default = "default_centroid_radius")]
    pub centroid_radius: usize,
    /// Fraction of the peak value bounding the centroid accumulation.
    #[serde(default = "default_centroid_target_fraction")]
    pub centroid_target_fraction: f32,
}

fn default_min_prominence() -> f32 {
    DEFAULT_MIN_PROMINENCE
}
fn default_rel_height() -> f32 {
    DEFAULT_REL_HEIGHT
}
fn default_centroid_radius() -> usize {
    DEFAULT_CENTROID_RADIUS
}
fn default_centroid_target_fraction() -> f32 {
    DEFAULT_CENTROID_TARGET_FRACTION
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_prominence: DEFAULT_MIN_PROMINENCE,
            rel_height: DEFAULT_REL_HEIGHT,
            centroid_radius: DEFAULT_CENTROID_RADIUS,
            centroid_target_fraction: DEFAULT_CENTROID_TARGET_FRACTION,
        }
    }
}

/// Sizing for the host-parallel executor's worker pool.
///
/// The pool is owned by the executor and sized at construction; nothing in
/// this crate touches the process-global Rayon pool.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CpuConfig {
    /// Worker thread count. `None` uses half the available cores, matching
    /// the acquisition machines this runs next to.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl CpuConfig {
    pub fn effective_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2)
                    / 2
            })
            .max(1)
    }
}
