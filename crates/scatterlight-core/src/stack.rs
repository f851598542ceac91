//! Validated grid of per-pixel rotation profiles.

use ndarray::{s, Array2, Array3, Axis};

use crate::error::{Result, ScatterlightError};
use crate::signal::CircularSignal;

/// A 2D grid of period-length circular intensity profiles, shape `[X, Y, n]`.
///
/// The stack is immutable once constructed: every analysis stage reads it and
/// writes its own result array. Input validation happens here, before any
/// stage runs — a malformed grid is rejected as an error, never discovered
/// mid-computation.
#[derive(Clone, Debug)]
pub struct SignalStack {
    data: Array3<f32>,
}

impl SignalStack {
    /// Build a stack from period-length profiles, shape `[X, Y, n]`.
    ///
    /// Rejects empty dimensions and non-finite samples.
    pub fn new(data: Array3<f32>) -> Result<Self> {
        let data = data.as_standard_layout().into_owned();
        validate(&data)?;
        Ok(Self { data })
    }

    /// Build a stack from profiles stored in the extended convention,
    /// shape `[X, Y, 2n]`: half a period duplicated on each side so that
    /// windowed algorithms on flat buffers never had to wrap. The margins
    /// are stripped here; all analysis in this crate wraps circularly.
    pub fn from_extended(data: Array3<f32>) -> Result<Self> {
        let len = data.len_of(Axis(2));
        if len % 2 != 0 {
            return Err(ScatterlightError::InvalidExtendedLength { len });
        }
        let n = len / 2;
        // The extension prepends the last ceil(n/2) samples, so the core
        // period starts there.
        let start = n - n / 2;
        let core = data.slice(s![.., .., start..start + n]).to_owned();
        Self::new(core)
    }

    pub fn x(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn y(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Samples per profile (one full rotation period).
    pub fn samples(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Circular view of the profile at pixel `(x, y)`.
    pub fn signal(&self, x: usize, y: usize) -> CircularSignal<'_> {
        let slice = self
            .data
            .slice(s![x, y, ..])
            .to_slice()
            .expect("stack stored in standard layout");
        CircularSignal::new(slice)
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Per-pixel profile minimum.
    pub fn min_image(&self) -> Array2<f32> {
        self.data
            .map_axis(Axis(2), |profile| {
                profile.iter().copied().fold(f32::INFINITY, f32::min)
            })
    }

    /// Per-pixel profile maximum.
    pub fn max_image(&self) -> Array2<f32> {
        self.data
            .map_axis(Axis(2), |profile| {
                profile.iter().copied().fold(f32::NEG_INFINITY, f32::max)
            })
    }

    /// Per-pixel profile mean.
    pub fn mean_image(&self) -> Array2<f32> {
        let n = self.samples() as f64;
        self.data.map_axis(Axis(2), |profile| {
            (profile.iter().map(|&v| v as f64).sum::<f64>() / n) as f32
        })
    }

    /// Apply the acquisition pipeline's normalization, `(v - std) / mean`,
    /// with std and mean taken over the whole stack.
    ///
    /// The peak detector expects its input already normalized this way;
    /// this helper exists for callers (and tests) holding raw stacks.
    pub fn normalized(&self) -> Result<Self> {
        let count = self.data.len() as f64;
        let mean = self.data.iter().map(|&v| v as f64).sum::<f64>() / count;
        let var = self
            .data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / count;
        let std = var.sqrt();
        let normalized = self.data.mapv(|v| ((v as f64 - std) / mean) as f32);
        Self::new(normalized)
    }
}

fn validate(data: &Array3<f32>) -> Result<()> {
    let (x, y, samples) = data.dim();
    if x == 0 || y == 0 || samples == 0 {
        return Err(ScatterlightError::EmptyGrid { x, y, samples });
    }
    for ((ix, iy, index), &value) in data.indexed_iter() {
        if !value.is_finite() {
            return Err(ScatterlightError::NonFiniteSample {
                x: ix,
                y: iy,
                index,
            });
        }
    }
    Ok(())
}
