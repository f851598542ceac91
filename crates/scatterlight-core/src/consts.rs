/// Sentinel value for pixels without a reliable direction or distance.
pub const BACKGROUND: f32 = -1.0;

/// Minimum prominence for a detected peak, on signals normalized by the
/// acquisition pipeline as `(signal - std) / mean`.
pub const DEFAULT_MIN_PROMINENCE: f32 = 0.125;

/// Relative height fraction at which peak widths are measured.
pub const DEFAULT_REL_HEIGHT: f32 = 0.5;

/// Minimum peak width in sample units; narrower maxima are noise.
pub const MIN_PEAK_WIDTH: f32 = 1.0;

/// Minimum peak separation is `ceil(samples / SEPARATION_DIVISOR)`.
/// For a 360-sample rotation this keeps peaks at least 5 degrees apart.
pub const SEPARATION_DIVISOR: usize = 72;

/// Search radius (in samples) around a peak for its centroid base bounds.
pub const DEFAULT_CENTROID_RADIUS: usize = 3;

/// Fraction of the peak value above which interpolated samples contribute
/// to the centroid; also sets the base-bound height cutoff.
pub const DEFAULT_CENTROID_TARGET_FRACTION: f32 = 0.94;

/// Linear-interpolation subdivisions per unit step in the centroid sum.
pub const CENTROID_SUBDIVISIONS: usize = 100;

/// A peak pair counts as one crossing fiber when its angular gap is within
/// this tolerance of 180 degrees.
pub const PAIR_TOLERANCE_DEGREES: f32 = 35.0;

/// Number of direction/distance slots reported per pixel.
pub const RESULT_SLOTS: usize = 2;

/// Minimum pixel count (x*y) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 4096;
