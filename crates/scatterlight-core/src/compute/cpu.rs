use ndarray::{s, Array2, Array3};
use rayon::prelude::*;

use crate::analysis;
use crate::consts::{BACKGROUND, PARALLEL_PIXEL_THRESHOLD, RESULT_SLOTS};
use crate::error::{Result, ScatterlightError};
use crate::pipeline::config::{AnalysisConfig, CpuConfig};
use crate::signal::CircularSignal;
use crate::stack::SignalStack;

use super::{count_peak_mask, BufferInner, ComputeBackend, GridBuffer};

/// Host executor using a Rayon pool sized from [`CpuConfig`].
pub struct CpuBackend {
    pool: rayon::ThreadPool,
}

impl CpuBackend {
    pub fn new(config: &CpuConfig) -> Result<Self> {
        let threads = config.effective_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| ScatterlightError::Executor(err.to_string()))?;
        tracing::debug!("CPU executor with {threads} worker threads");
        Ok(Self { pool })
    }

    /// Run `per_row` over every pixel row and assemble the `[x, y, k]`
    /// result, row-parallel above the pixel threshold.
    fn map_rows<F>(&self, x: usize, y: usize, k: usize, per_row: F) -> Array3<f32>
    where
        F: Fn(usize) -> Vec<f32> + Send + Sync,
    {
        let rows: Vec<Vec<f32>> = if x * y >= PARALLEL_PIXEL_THRESHOLD {
            self.pool
                .install(|| (0..x).into_par_iter().map(|ix| per_row(ix)).collect())
        } else {
            (0..x).map(per_row).collect()
        };

        let mut result = Array3::<f32>::zeros((x, y, k));
        for (ix, row) in rows.into_iter().enumerate() {
            for (flat, value) in row.into_iter().enumerate() {
                result[[ix, flat / k, flat % k]] = value;
            }
        }
        result
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn upload(&self, stack: &SignalStack) -> GridBuffer {
        GridBuffer::from_array(stack.as_array().clone())
    }

    fn download(&self, buf: &GridBuffer) -> Array3<f32> {
        cpu_array(buf).clone()
    }

    fn detect_peaks(&self, signals: &GridBuffer, config: &AnalysisConfig) -> GridBuffer {
        let data = cpu_array(signals);
        let (x, y, n) = signals.dim;
        let mask = self.map_rows(x, y, n, |ix| {
            let mut row = vec![0.0f32; y * n];
            for iy in 0..y {
                let signal = signal_at(data, ix, iy);
                for pos in analysis::detect_peaks(&signal, config) {
                    row[iy * n + pos] = 1.0;
                }
            }
            row
        });
        GridBuffer::from_array(mask)
    }

    fn peak_count(&self, peaks: &GridBuffer) -> Array2<u32> {
        count_peak_mask(cpu_array(peaks))
    }

    fn prominence(&self, signals: &GridBuffer, peaks: &GridBuffer) -> GridBuffer {
        let data = cpu_array(signals);
        let mask = cpu_array(peaks);
        let (x, y, n) = signals.dim;
        let result = self.map_rows(x, y, n, |ix| {
            let mut row = vec![0.0f32; y * n];
            for iy in 0..y {
                let signal = signal_at(data, ix, iy);
                for pos in 0..n {
                    if mask[[ix, iy, pos]] > 0.5 {
                        row[iy * n + pos] = analysis::peak_prominence(&signal, pos);
                    }
                }
            }
            row
        });
        GridBuffer::from_array(result)
    }

    fn width(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        prominence: &GridBuffer,
        rel_height: f32,
    ) -> GridBuffer {
        let data = cpu_array(signals);
        let mask = cpu_array(peaks);
        let prom = cpu_array(prominence);
        let (x, y, n) = signals.dim;
        let result = self.map_rows(x, y, n, |ix| {
            let mut row = vec![0.0f32; y * n];
            for iy in 0..y {
                let signal = signal_at(data, ix, iy);
                for pos in 0..n {
                    if mask[[ix, iy, pos]] > 0.5 {
                        row[iy * n + pos] =
                            analysis::peak_width(&signal, pos, prom[[ix, iy, pos]], rel_height);
                    }
                }
            }
            row
        });
        GridBuffer::from_array(result)
    }

    fn centroid_correction(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        config: &AnalysisConfig,
    ) -> GridBuffer {
        let data = cpu_array(signals);
        let mask = cpu_array(peaks);
        let (x, y, n) = signals.dim;
        let result = self.map_rows(x, y, n, |ix| {
            let mut row = vec![0.0f32; y * n];
            for iy in 0..y {
                let signal = signal_at(data, ix, iy);
                let mut minima = vec![false; n];
                for pos in analysis::local_minima(&signal) {
                    minima[pos] = true;
                }
                let max_value = signal.max_value();
                for pos in 0..n {
                    if mask[[ix, iy, pos]] > 0.5 {
                        let (left, right) =
                            analysis::correction_bases(&signal, &minima, pos, max_value, config);
                        row[iy * n + pos] =
                            analysis::centroid_offset(&signal, pos, left, right, config);
                    }
                }
            }
            row
        });
        GridBuffer::from_array(result)
    }

    fn direction(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32> {
        let mask = cpu_array(peaks);
        let cent = cpu_array(centroids);
        let (x, y, n) = peaks.dim;
        self.map_rows(x, y, RESULT_SLOTS, |ix| {
            let mut row = vec![BACKGROUND; y * RESULT_SLOTS];
            for iy in 0..y {
                let angles = pixel_angles(mask, cent, ix, iy, n);
                let slots = analysis::classify_directions(&angles);
                row[iy * RESULT_SLOTS..(iy + 1) * RESULT_SLOTS].copy_from_slice(&slots);
            }
            row
        })
    }

    fn peak_distance(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32> {
        let mask = cpu_array(peaks);
        let cent = cpu_array(centroids);
        let (x, y, n) = peaks.dim;
        self.map_rows(x, y, RESULT_SLOTS, |ix| {
            let mut row = vec![BACKGROUND; y * RESULT_SLOTS];
            for iy in 0..y {
                let angles = pixel_angles(mask, cent, ix, iy, n);
                let slots = analysis::pair_distances(&angles);
                row[iy * RESULT_SLOTS..(iy + 1) * RESULT_SLOTS].copy_from_slice(&slots);
            }
            row
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cpu_array(buf: &GridBuffer) -> &Array3<f32> {
    match &buf.inner {
        BufferInner::Cpu(arr) => arr,
        #[cfg(feature = "gpu")]
        _ => panic!("CpuBackend received non-CPU buffer"),
    }
}

fn signal_at<'a>(data: &'a Array3<f32>, ix: usize, iy: usize) -> CircularSignal<'a> {
    let slice = data
        .slice(s![ix, iy, ..])
        .to_slice()
        .expect("grid stored in standard layout");
    CircularSignal::new(slice)
}

/// Centroid-corrected angles of the masked peaks at one pixel, ascending.
fn pixel_angles(
    mask: &Array3<f32>,
    centroid: &Array3<f32>,
    ix: usize,
    iy: usize,
    n: usize,
) -> Vec<f32> {
    let positions: Vec<usize> = (0..n).filter(|&pos| mask[[ix, iy, pos]] > 0.5).collect();
    let cent_slice = centroid
        .slice(s![ix, iy, ..])
        .to_slice()
        .expect("grid stored in standard layout");
    analysis::peak_angles(&positions, cent_slice, n)
}
