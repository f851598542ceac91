use ndarray::Array3;

use scatterlight_core::stack::SignalStack;

/// Circular profile of length `n` with Gaussian bumps on a flat baseline.
///
/// Each bump is `(center, amplitude, sigma)` in sample units; distances wrap
/// around the period so bumps near index 0 spill over correctly.
pub fn gaussian_profile(n: usize, baseline: f32, bumps: &[(f32, f32, f32)]) -> Vec<f32> {
    let mut profile = vec![baseline; n];
    for (i, value) in profile.iter_mut().enumerate() {
        for &(center, amplitude, sigma) in bumps {
            let d = (i as f32 - center).abs();
            let d = d.min(n as f32 - d);
            *value += amplitude * (-d * d / (2.0 * sigma * sigma)).exp();
        }
    }
    profile
}

/// A 1x1 grid holding one profile.
pub fn single_profile_stack(profile: &[f32]) -> SignalStack {
    let data = Array3::from_shape_vec((1, 1, profile.len()), profile.to_vec())
        .expect("profile shape");
    SignalStack::new(data).expect("valid stack")
}

/// Build the extended form of a profile: the last half-period prepended and
/// the first half-period appended, as the acquisition tooling stores it.
pub fn extend_profile(profile: &[f32]) -> Vec<f32> {
    let n = profile.len();
    let front = n - n / 2;
    let mut extended = Vec::with_capacity(2 * n);
    extended.extend_from_slice(&profile[n - front..]);
    extended.extend_from_slice(profile);
    extended.extend_from_slice(&profile[..n / 2]);
    extended
}

/// Deterministic LCG so synthetic grids are reproducible without an RNG
/// dependency.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform value in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) & 0xFF_FFFF) as f32 / 16_777_216.0
    }
}

/// Seeded grid of two-peak fiber profiles with mild noise: each pixel gets
/// a fiber at a random angle, seen as bumps half a period apart.
pub fn synthetic_fiber_stack(x: usize, y: usize, n: usize, seed: u64) -> SignalStack {
    let mut rng = Lcg::new(seed);
    let mut data = Vec::with_capacity(x * y * n);
    for _ in 0..x * y {
        let center = rng.next_f32() * n as f32 / 2.0;
        let amplitude = 0.5 + rng.next_f32() * 0.5;
        let sigma = 2.0 + rng.next_f32() * 3.0;
        let mut profile = gaussian_profile(
            n,
            0.0,
            &[
                (center, amplitude, sigma),
                (center + n as f32 / 2.0, amplitude, sigma),
            ],
        );
        for value in profile.iter_mut() {
            *value += rng.next_f32() * 0.01;
        }
        data.extend_from_slice(&profile);
    }
    let data = Array3::from_shape_vec((x, y, n), data).expect("grid shape");
    SignalStack::new(data).expect("valid stack")
}
