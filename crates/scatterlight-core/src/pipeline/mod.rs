//! Full-grid orchestration of the analysis stages.

pub mod config;

pub use config::{AnalysisConfig, CpuConfig};

use std::time::Instant;

use ndarray::{Array2, Array3};

use crate::compute::ComputeBackend;
use crate::consts::BACKGROUND;
use crate::error::Result;
use crate::stack::SignalStack;

/// Per-pixel results of one analysis run.
///
/// Directions and distances hold up to two slots per pixel with
/// [`BACKGROUND`] marking empty slots; the mean arrays are 0 where a pixel
/// has no peaks.
#[derive(Clone, Debug)]
pub struct AnalysisOutput {
    pub peak_count: Array2<u32>,
    pub mean_prominence: Array2<f32>,
    pub mean_width: Array2<f32>,
    pub direction: Array3<f32>,
    pub distance: Array3<f32>,
}

/// Run every stage over the grid on the given executor.
///
/// Stages run strictly in order; each consumes only completed outputs of
/// earlier stages, so the executor's stage boundaries act as full barriers.
pub fn analyze(
    stack: &SignalStack,
    config: &AnalysisConfig,
    backend: &dyn ComputeBackend,
) -> Result<AnalysisOutput> {
    let started = Instant::now();

    let signals = backend.upload(stack);
    let peaks = backend.detect_peaks(&signals, config);
    let peak_count = backend.peak_count(&peaks);
    let prominence = backend.prominence(&signals, &peaks);
    let width = backend.width(&signals, &peaks, &prominence, config.rel_height);
    let centroids = backend.centroid_correction(&signals, &peaks, config);
    let direction = backend.direction(&peaks, &centroids);
    let distance = backend.peak_distance(&peaks, &centroids);

    let mask = backend.download(&peaks);
    let mean_prominence = mean_over_peaks(&backend.download(&prominence), &mask);
    let mean_width = mean_over_peaks(&backend.download(&width), &mask);

    tracing::debug!(
        backend = backend.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analysis run finished"
    );

    Ok(AnalysisOutput {
        peak_count,
        mean_prominence,
        mean_width,
        direction,
        distance,
    })
}

/// Single-direction view for pixels without crossing fibers: one or two
/// peaks report their slot-0 direction, anything else is background.
pub fn non_crossing_direction(peak_count: &Array2<u32>, direction: &Array3<f32>) -> Array2<f32> {
    let (x, y) = peak_count.dim();
    Array2::from_shape_fn((x, y), |(ix, iy)| {
        if (1..=2).contains(&peak_count[[ix, iy]]) {
            direction[[ix, iy, 0]]
        } else {
            BACKGROUND
        }
    })
}

/// Mean of `values` over mask positions, per pixel; 0 where the mask is
/// empty.
fn mean_over_peaks(values: &Array3<f32>, mask: &Array3<f32>) -> Array2<f32> {
    let (x, y, n) = values.dim();
    Array2::from_shape_fn((x, y), |(ix, iy)| {
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for pos in 0..n {
            if mask[[ix, iy, pos]] > 0.5 {
                sum += values[[ix, iy, pos]];
                count += 1;
            }
        }
        if count > 0 {
            sum / count as f32
        } else {
            0.0
        }
    })
}
