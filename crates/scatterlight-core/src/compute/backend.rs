use ndarray::{Array2, Array3, Axis};

use crate::error::Result;
use crate::pipeline::config::{AnalysisConfig, CpuConfig};
use crate::stack::SignalStack;

use super::cpu::CpuBackend;

/// Storage behind a [`GridBuffer`]: host array or device buffer.
pub(crate) enum BufferInner {
    Cpu(Array3<f32>),
    #[cfg(feature = "gpu")]
    Wgpu { buffer: wgpu::Buffer },
}

/// A grid-shaped f32 array owned by a backend.
///
/// Stage outputs stay wherever the backend computed them (host memory or a
/// device storage buffer) so chained stages never round-trip through the
/// host; [`ComputeBackend::download`] materializes a buffer when the caller
/// needs it.
pub struct GridBuffer {
    pub(crate) inner: BufferInner,
    /// Shape `(x, y, k)` where `k` is the sample count or result slots.
    pub dim: (usize, usize, usize),
}

impl GridBuffer {
    pub fn from_array(data: Array3<f32>) -> Self {
        let dim = data.dim();
        Self {
            inner: BufferInner::Cpu(data),
            dim,
        }
    }

    /// Borrow the host array, if this buffer lives on the host.
    pub fn as_array(&self) -> Option<&Array3<f32>> {
        match &self.inner {
            BufferInner::Cpu(arr) => Some(arr),
            #[cfg(feature = "gpu")]
            _ => None,
        }
    }
}

/// The five analysis stages over a full pixel grid.
///
/// Both executors implement this trait from the same per-signal routines in
/// [`crate::analysis`]; they must stay numerically interchangeable
/// (identical peak masks, floating results within 1e-4 absolute). Every
/// method is data-parallel over pixels: no pixel reads or writes another
/// pixel's slot.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;

    fn is_gpu(&self) -> bool {
        false
    }

    fn upload(&self, stack: &SignalStack) -> GridBuffer;

    fn download(&self, buf: &GridBuffer) -> Array3<f32>;

    /// Peak mask `[X, Y, n]`, 1.0 at detected peak indices.
    fn detect_peaks(&self, signals: &GridBuffer, config: &AnalysisConfig) -> GridBuffer;

    /// Detected peaks per pixel.
    fn peak_count(&self, peaks: &GridBuffer) -> Array2<u32>;

    /// Prominence per sample, nonzero only at peak indices.
    fn prominence(&self, signals: &GridBuffer, peaks: &GridBuffer) -> GridBuffer;

    /// Width per sample at `rel_height`, nonzero only at peak indices.
    fn width(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        prominence: &GridBuffer,
        rel_height: f32,
    ) -> GridBuffer;

    /// Sub-sample centroid offset per sample, in [-1, 1].
    fn centroid_correction(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        config: &AnalysisConfig,
    ) -> GridBuffer;

    /// Up to two fiber directions per pixel, `[X, Y, 2]` degrees.
    fn direction(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32>;

    /// Up to two paired angular gaps per pixel, `[X, Y, 2]` degrees.
    fn peak_distance(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32>;
}

/// Which executor [`create_backend`] should construct.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DevicePreference {
    /// Use the GPU when one is available, otherwise the CPU pool.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

/// Construct an executor according to `preference`.
pub fn create_backend(
    preference: DevicePreference,
    cpu_config: &CpuConfig,
) -> Result<Box<dyn ComputeBackend>> {
    match preference {
        DevicePreference::Cpu => Ok(Box::new(CpuBackend::new(cpu_config)?)),
        DevicePreference::Gpu => create_gpu_backend(),
        DevicePreference::Auto => {
            #[cfg(feature = "gpu")]
            match super::wgpu_backend::WgpuBackend::new() {
                Ok(gpu) => {
                    tracing::info!("Using GPU executor: {}", gpu.name());
                    return Ok(Box::new(gpu));
                }
                Err(err) => {
                    tracing::warn!("GPU unavailable, falling back to CPU: {err}");
                }
            }
            Ok(Box::new(CpuBackend::new(cpu_config)?))
        }
    }
}

#[cfg(feature = "gpu")]
fn create_gpu_backend() -> Result<Box<dyn ComputeBackend>> {
    use crate::error::ScatterlightError;
    let gpu = super::wgpu_backend::WgpuBackend::new().map_err(ScatterlightError::GpuError)?;
    Ok(Box::new(gpu))
}

#[cfg(not(feature = "gpu"))]
fn create_gpu_backend() -> Result<Box<dyn ComputeBackend>> {
    use crate::error::ScatterlightError;
    Err(ScatterlightError::GpuError(
        "built without the gpu feature".into(),
    ))
}

/// Count mask entries per pixel. Both executors produce bit-identical masks,
/// so this cheap reduction runs on the host for both.
pub(crate) fn count_peak_mask(mask: &Array3<f32>) -> Array2<u32> {
    mask.map_axis(Axis(2), |profile| {
        profile.iter().filter(|&&v| v > 0.5).count() as u32
    })
}
