//! wgpu-based GPU executor (Metal / Vulkan / DX12).
//!
//! One thread per pixel; each kernel is a WGSL port of the matching routine
//! in [`crate::analysis`], kept operation-for-operation in step with the CPU
//! executor so the two stay numerically interchangeable. Stage outputs live
//! in storage buffers between dispatches; every queue submission is a stage
//! barrier.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use ndarray::{Array2, Array3};
use wgpu::util::DeviceExt;

use crate::analysis::min_peak_distance;
use crate::consts::{CENTROID_SUBDIVISIONS, MIN_PEAK_WIDTH};
use crate::pipeline::config::AnalysisConfig;
use crate::stack::SignalStack;

use super::{count_peak_mask, BufferInner, ComputeBackend, GridBuffer};

// ---------------------------------------------------------------------------
// WGSL kernels
// ---------------------------------------------------------------------------

const DETECT_WGSL: &str = r"
struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       signals: array<f32>;
@group(0) @binding(1) var<storage, read_write> peaks:   array<f32>;
@group(0) @binding(2) var<uniform>             params:  Params;

fn wrap(i: i32) -> u32 {
    let n = i32(params.samples);
    var r = i % n;
    if r < 0 { r += n; }
    return u32(r);
}

fn sig(base: u32, i: i32) -> f32 {
    return signals[base + wrap(i)];
}

fn circular_distance(a: u32, b: u32) -> u32 {
    var d: u32;
    if a > b { d = a - b; } else { d = b - a; }
    return min(d, params.samples - d);
}

fn prominence_at(base: u32, pos: u32) -> f32 {
    let n = i32(params.samples);
    let value = sig(base, i32(pos));
    let i_min = -(n / 2);
    let i_max = i32(f32(n) * 1.5);

    var i = i32(pos);
    var left_min = value;
    var budget = n - 1;
    while i_min <= i && sig(base, i) <= value && budget > 0 {
        if sig(base, i) < left_min { left_min = sig(base, i); }
        i -= 1;
        budget -= 1;
    }

    i = i32(pos);
    var right_min = value;
    budget = n - 1;
    while i <= i_max && sig(base, i) <= value && budget > 0 {
        if sig(base, i) < right_min { right_min = sig(base, i); }
        i += 1;
        budget -= 1;
    }

    return value - max(left_min, right_min);
}

fn width_at(base: u32, pos: u32, prominence: f32) -> f32 {
    let n = i32(params.samples);
    let value = sig(base, i32(pos));
    let height = value - prominence * params.rel_height;
    let i_min = -(n / 2);
    let i_max = i32(f32(n) * 1.5);

    var i = i32(pos);
    while i_min < i && height < sig(base, i) { i -= 1; }
    var left_ip = f32(i);
    if sig(base, i) < height {
        left_ip += (height - sig(base, i)) / (sig(base, i + 1) - sig(base, i));
    }

    i = i32(pos);
    while i < i_max && height < sig(base, i) { i += 1; }
    var right_ip = f32(i);
    if sig(base, i) < height {
        right_ip -= (height - sig(base, i)) / (sig(base, i - 1) - sig(base, i));
    }

    return right_ip - left_ip;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let base = (ix * params.cols + iy) * n;

    // Plateau-centered local maxima become candidates (1.0).
    for (var j = 0u; j < n; j++) { peaks[base + j] = 0.0; }
    var i = 0u;
    while i < n {
        let value = sig(base, i32(i));
        if sig(base, i32(i) - 1) < value {
            var run = 0u;
            while run + 1u < n && sig(base, i32(i + run + 1u)) == value { run += 1u; }
            if run + 1u < n && sig(base, i32(i + run + 1u)) < value {
                peaks[base + wrap(i32(i + run / 2u))] = 1.0;
            }
            i += run + 1u;
        } else {
            i += 1u;
        }
    }

    // Separation: keep highest-value candidates first (ties resolve toward
    // the higher index), suppress remaining candidates inside the exclusion
    // distance.
    if params.min_distance > 1u {
        loop {
            var best = -1;
            var best_value = 0.0;
            for (var j = 0u; j < n; j++) {
                if peaks[base + j] != 1.0 { continue; }
                let value = sig(base, i32(j));
                if best < 0 || value >= best_value {
                    best = i32(j);
                    best_value = value;
                }
            }
            if best < 0 { break; }
            peaks[base + u32(best)] = 2.0;
            for (var j = 0u; j < n; j++) {
                if peaks[base + j] == 1.0 && circular_distance(j, u32(best)) < params.min_distance {
                    peaks[base + j] = 0.0;
                }
            }
        }
    } else {
        for (var j = 0u; j < n; j++) {
            if peaks[base + j] == 1.0 { peaks[base + j] = 2.0; }
        }
    }

    // Prominence and width constraints.
    for (var j = 0u; j < n; j++) {
        if peaks[base + j] != 2.0 { continue; }
        let prominence = prominence_at(base, j);
        if prominence < params.min_prominence {
            peaks[base + j] = 0.0;
            continue;
        }
        if width_at(base, j, prominence) < params.min_width {
            peaks[base + j] = 0.0;
            continue;
        }
        peaks[base + j] = 1.0;
    }
}
";

const REVERSE_WGSL: &str = r"
struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       signals: array<f32>;
@group(0) @binding(1) var<storage, read_write> minima:  array<f32>;
@group(0) @binding(2) var<uniform>             params:  Params;

fn wrap(i: i32) -> u32 {
    let n = i32(params.samples);
    var r = i % n;
    if r < 0 { r += n; }
    return u32(r);
}

fn nsig(base: u32, i: i32) -> f32 {
    return -signals[base + wrap(i)];
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let base = (ix * params.cols + iy) * n;

    for (var j = 0u; j < n; j++) { minima[base + j] = 0.0; }
    var i = 0u;
    while i < n {
        let value = nsig(base, i32(i));
        if nsig(base, i32(i) - 1) < value {
            var run = 0u;
            while run + 1u < n && nsig(base, i32(i + run + 1u)) == value { run += 1u; }
            if run + 1u < n && nsig(base, i32(i + run + 1u)) < value {
                minima[base + wrap(i32(i + run / 2u))] = 1.0;
            }
            i += run + 1u;
        } else {
            i += 1u;
        }
    }
}
";

const PROMINENCE_WGSL: &str = r"
struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       signals: array<f32>;
@group(0) @binding(1) var<storage, read>       peaks:   array<f32>;
@group(0) @binding(2) var<storage, read_write> output:  array<f32>;
@group(0) @binding(3) var<uniform>             params:  Params;

fn wrap(i: i32) -> u32 {
    let n = i32(params.samples);
    var r = i % n;
    if r < 0 { r += n; }
    return u32(r);
}

fn sig(base: u32, i: i32) -> f32 {
    return signals[base + wrap(i)];
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let base = (ix * params.cols + iy) * n;

    for (var pos = 0u; pos < n; pos++) {
        if peaks[base + pos] != 1.0 {
            output[base + pos] = 0.0;
            continue;
        }
        let ni = i32(n);
        let value = sig(base, i32(pos));
        let i_min = -(ni / 2);
        let i_max = i32(f32(ni) * 1.5);

        var i = i32(pos);
        var left_min = value;
        var budget = ni - 1;
        while i_min <= i && sig(base, i) <= value && budget > 0 {
            if sig(base, i) < left_min { left_min = sig(base, i); }
            i -= 1;
            budget -= 1;
        }

        i = i32(pos);
        var right_min = value;
        budget = ni - 1;
        while i <= i_max && sig(base, i) <= value && budget > 0 {
            if sig(base, i) < right_min { right_min = sig(base, i); }
            i += 1;
            budget -= 1;
        }

        output[base + pos] = value - max(left_min, right_min);
    }
}
";

const WIDTH_WGSL: &str = r"
struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       signals:    array<f32>;
@group(0) @binding(1) var<storage, read>       peaks:      array<f32>;
@group(0) @binding(2) var<storage, read>       prominence: array<f32>;
@group(0) @binding(3) var<storage, read_write> output:     array<f32>;
@group(0) @binding(4) var<uniform>             params:     Params;

fn wrap(i: i32) -> u32 {
    let n = i32(params.samples);
    var r = i % n;
    if r < 0 { r += n; }
    return u32(r);
}

fn sig(base: u32, i: i32) -> f32 {
    return signals[base + wrap(i)];
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let base = (ix * params.cols + iy) * n;

    for (var pos = 0u; pos < n; pos++) {
        if peaks[base + pos] != 1.0 {
            output[base + pos] = 0.0;
            continue;
        }
        let ni = i32(n);
        let value = sig(base, i32(pos));
        let height = value - prominence[base + pos] * params.rel_height;
        let i_min = -(ni / 2);
        let i_max = i32(f32(ni) * 1.5);

        var i = i32(pos);
        while i_min < i && height < sig(base, i) { i -= 1; }
        var left_ip = f32(i);
        if sig(base, i) < height {
            left_ip += (height - sig(base, i)) / (sig(base, i + 1) - sig(base, i));
        }

        i = i32(pos);
        while i < i_max && height < sig(base, i) { i += 1; }
        var right_ip = f32(i);
        if sig(base, i) < height {
            right_ip -= (height - sig(base, i)) / (sig(base, i - 1) - sig(base, i));
        }

        output[base + pos] = right_ip - left_ip;
    }
}
";

const CENTROID_WGSL: &str = r"
struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    radius: u32,
    target_fraction: f32,
    subdivisions: u32,
    _pad0: u32,
    _pad1: u32,
}
@group(0) @binding(0) var<storage, read>       signals: array<f32>;
@group(0) @binding(1) var<storage, read>       peaks:   array<f32>;
@group(0) @binding(2) var<storage, read>       minima:  array<f32>;
@group(0) @binding(3) var<storage, read_write> output:  array<f32>;
@group(0) @binding(4) var<uniform>             params:  Params;

fn wrap(i: i32) -> u32 {
    let n = i32(params.samples);
    var r = i % n;
    if r < 0 { r += n; }
    return u32(r);
}

fn sig(base: u32, i: i32) -> f32 {
    return signals[base + wrap(i)];
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let base = (ix * params.cols + iy) * n;

    var max_value = signals[base];
    for (var j = 1u; j < n; j++) {
        max_value = max(max_value, signals[base + j]);
    }

    for (var pos = 0u; pos < n; pos++) {
        if peaks[base + pos] != 1.0 {
            output[base + pos] = 0.0;
            continue;
        }
        let value = sig(base, i32(pos));
        let target_height = max(0.0, value - max_value * (1.0 - params.target_fraction));

        // Base bounds: nearest flanking minimum inside the radius, then the
        // first sample below the target height.
        var left = params.radius;
        var right = params.radius;
        for (var off = 1u; off < params.radius; off++) {
            if minima[base + wrap(i32(pos) - i32(off))] == 1.0 { left = off; break; }
        }
        for (var off = 1u; off < params.radius; off++) {
            if minima[base + wrap(i32(pos) + i32(off))] == 1.0 { right = off; break; }
        }
        for (var off = 0u; off < left; off++) {
            if sig(base, i32(pos) - i32(off)) < target_height { left = off; break; }
        }
        for (var off = 0u; off < right; off++) {
            if sig(base, i32(pos) + i32(off)) < target_height { right = off; break; }
        }

        let threshold = params.target_fraction * value;
        var weighted_sum = 0.0;
        var weight = 0.0;
        for (var xo = -i32(left); xo < i32(right); xo++) {
            let a = sig(base, i32(pos) + xo);
            let b = sig(base, i32(pos) + xo + 1);
            for (var s = 0u; s <= params.subdivisions; s++) {
                let step = f32(s) / f32(params.subdivisions);
                let v = a + (b - a) * step;
                if v > threshold {
                    weighted_sum += (f32(xo) + step) * v;
                    weight += v;
                }
            }
        }

        if weight > 0.0 {
            output[base + pos] = clamp(weighted_sum / weight, -1.0, 1.0);
        } else {
            output[base + pos] = 0.0;
        }
    }
}
";

const DIRECTION_WGSL: &str = r"
const BACKGROUND: f32 = -1.0;
const PAIR_TOLERANCE: f32 = 35.0;

struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       peaks:    array<f32>;
@group(0) @binding(1) var<storage, read>       centroid: array<f32>;
@group(0) @binding(2) var<storage, read_write> output:   array<f32>;
@group(0) @binding(3) var<uniform>             params:   Params;

fn angle_at(base: u32, j: u32) -> f32 {
    return (f32(j) + centroid[base + j]) * 360.0 / f32(params.samples);
}

fn mod180(v: f32) -> f32 {
    var r = v % 180.0;
    if r < 0.0 { r += 180.0; }
    return r;
}

fn paired(first: f32, second: f32) -> bool {
    return abs((second - first) - 180.0) < PAIR_TOLERANCE;
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let pixel = ix * params.cols + iy;
    let base = pixel * n;
    let o = pixel * 2u;

    var positions: array<u32, 4>;
    var count = 0u;
    for (var j = 0u; j < n; j++) {
        if peaks[base + j] == 1.0 {
            if count < 4u { positions[count] = j; }
            count += 1u;
        }
    }

    output[o] = BACKGROUND;
    output[o + 1u] = BACKGROUND;

    if count == 1u {
        output[o] = mod180(270.0 - angle_at(base, positions[0]));
    } else if count == 2u {
        let a0 = angle_at(base, positions[0]);
        let a1 = angle_at(base, positions[1]);
        output[o] = mod180(270.0 - (a0 + a1) / 2.0);
    } else if count == 3u {
        let a0 = angle_at(base, positions[0]);
        let a1 = angle_at(base, positions[1]);
        let a2 = angle_at(base, positions[2]);
        if paired(a0, a2) {
            output[o] = mod180(270.0 - (a0 + a2) / 2.0);
            output[o + 1u] = mod180(270.0 - a1);
        } else if paired(a0, a1) {
            output[o] = mod180(270.0 - (a0 + a1) / 2.0);
            output[o + 1u] = mod180(270.0 - a2);
        } else if paired(a1, a2) {
            output[o] = mod180(270.0 - (a1 + a2) / 2.0);
            output[o + 1u] = mod180(270.0 - a0);
        }
    } else if count == 4u {
        let a0 = angle_at(base, positions[0]);
        let a1 = angle_at(base, positions[1]);
        let a2 = angle_at(base, positions[2]);
        let a3 = angle_at(base, positions[3]);
        if paired(a0, a2) {
            output[o] = mod180(270.0 - (a0 + a2) / 2.0);
        }
        if paired(a1, a3) {
            output[o + 1u] = mod180(270.0 - (a1 + a3) / 2.0);
        }
    }
}
";

const DISTANCE_WGSL: &str = r"
const BACKGROUND: f32 = -1.0;

struct Params {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}
@group(0) @binding(0) var<storage, read>       peaks:    array<f32>;
@group(0) @binding(1) var<storage, read>       centroid: array<f32>;
@group(0) @binding(2) var<storage, read_write> output:   array<f32>;
@group(0) @binding(3) var<uniform>             params:   Params;

fn angle_at(base: u32, j: u32) -> f32 {
    return (f32(j) + centroid[base + j]) * 360.0 / f32(params.samples);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let ix = gid.y;
    let iy = gid.x;
    if ix >= params.rows || iy >= params.cols { return; }
    let n = params.samples;
    let pixel = ix * params.cols + iy;
    let base = pixel * n;
    let o = pixel * 2u;

    var positions: array<u32, 4>;
    var count = 0u;
    for (var j = 0u; j < n; j++) {
        if peaks[base + j] == 1.0 {
            if count < 4u { positions[count] = j; }
            count += 1u;
        }
    }

    output[o] = BACKGROUND;
    output[o + 1u] = BACKGROUND;

    if count == 1u {
        output[o] = 360.0;
    } else if count == 2u {
        let gap = angle_at(base, positions[1]) - angle_at(base, positions[0]);
        output[o] = gap;
        output[o + 1u] = 360.0 - gap;
    } else if count == 4u {
        output[o] = angle_at(base, positions[2]) - angle_at(base, positions[0]);
        output[o + 1u] = angle_at(base, positions[3]) - angle_at(base, positions[1]);
    }
}
";

// ---------------------------------------------------------------------------
// Uniform parameter structs (must match WGSL layouts exactly)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GridParams {
    rows: u32,
    cols: u32,
    samples: u32,
    min_distance: u32,
    min_prominence: f32,
    min_width: f32,
    rel_height: f32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CentroidParams {
    rows: u32,
    cols: u32,
    samples: u32,
    radius: u32,
    target_fraction: f32,
    subdivisions: u32,
    _pad0: u32,
    _pad1: u32,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn gpu_buf(buf: &GridBuffer) -> &wgpu::Buffer {
    match &buf.inner {
        BufferInner::Wgpu { buffer, .. } => buffer,
        _ => panic!("WgpuBackend: expected GPU buffer"),
    }
}

const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

// ---------------------------------------------------------------------------
// WgpuBackend
// ---------------------------------------------------------------------------

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    detect_pipeline: wgpu::ComputePipeline,
    reverse_pipeline: wgpu::ComputePipeline,
    prominence_pipeline: wgpu::ComputePipeline,
    width_pipeline: wgpu::ComputePipeline,
    centroid_pipeline: wgpu::ComputePipeline,
    direction_pipeline: wgpu::ComputePipeline,
    distance_pipeline: wgpu::ComputePipeline,
}

impl WgpuBackend {
    pub fn new() -> Result<Self, String> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| format!("No suitable GPU adapter found: {e}"))?;

        let adapter_name = adapter.get_info().name.clone();
        tracing::info!("GPU adapter: {adapter_name}");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("scatterlight"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
        ))
        .map_err(|e| format!("Failed to create GPU device: {e}"))?;

        let device: Arc<wgpu::Device> = Arc::new(device);
        let queue: Arc<wgpu::Queue> = Arc::new(queue);

        let mk = |label, src: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            })
        };

        let detect_mod = mk("detect_peaks", DETECT_WGSL);
        let reverse_mod = mk("reverse_peaks", REVERSE_WGSL);
        let prom_mod = mk("prominence", PROMINENCE_WGSL);
        let width_mod = mk("peak_width", WIDTH_WGSL);
        let cent_mod = mk("centroid", CENTROID_WGSL);
        let dir_mod = mk("direction", DIRECTION_WGSL);
        let dist_mod = mk("peak_distance", DISTANCE_WGSL);

        let pipe = |module: &wgpu::ShaderModule, entry: &str| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: None,
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Ok(Self {
            adapter_name,
            detect_pipeline: pipe(&detect_mod, "main"),
            reverse_pipeline: pipe(&reverse_mod, "main"),
            prominence_pipeline: pipe(&prom_mod, "main"),
            width_pipeline: pipe(&width_mod, "main"),
            centroid_pipeline: pipe(&cent_mod, "main"),
            direction_pipeline: pipe(&dir_mod, "main"),
            distance_pipeline: pipe(&dist_mod, "main"),
            device,
            queue,
        })
    }

    // --- Buffer helpers ---

    fn create_storage(&self, data: &[f32]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn create_storage_uninit(&self, byte_size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_uniform<T: Pod>(&self, data: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(data),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn download_f32(&self, buffer: &wgpu::Buffer) -> Vec<f32> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut enc = self.device.create_command_encoder(&Default::default());
        enc.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(std::iter::once(enc.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |r| {
            tx.send(r).ok();
        });
        self.device.poll(wgpu::PollType::wait_indefinitely()).ok();
        rx.recv()
            .expect("GPU channel closed")
            .expect("Buffer mapping failed");

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        result
    }

    /// Dispatch a single compute pass with one bind group at group(0).
    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        workgroups: (u32, u32, u32),
    ) {
        let layout = pipeline.get_bind_group_layout(0);
        let bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries,
        });
        let mut enc = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = enc.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bg, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(std::iter::once(enc.finish()));
    }

    fn make_grid_buffer(&self, buffer: wgpu::Buffer, dim: (usize, usize, usize)) -> GridBuffer {
        GridBuffer {
            inner: BufferInner::Wgpu { buffer },
            dim,
        }
    }

    fn grid_params(&self, dim: (usize, usize, usize), config: Option<&AnalysisConfig>) -> GridParams {
        let (x, y, n) = dim;
        match config {
            Some(config) => GridParams {
                rows: x as u32,
                cols: y as u32,
                samples: n as u32,
                min_distance: min_peak_distance(n) as u32,
                min_prominence: config.min_prominence,
                min_width: MIN_PEAK_WIDTH,
                rel_height: config.rel_height,
                _pad: 0,
            },
            None => GridParams {
                rows: x as u32,
                cols: y as u32,
                samples: n as u32,
                min_distance: 0,
                min_prominence: 0.0,
                min_width: 0.0,
                rel_height: 0.0,
                _pad: 0,
            },
        }
    }

    fn pixel_workgroups(&self, dim: (usize, usize, usize)) -> (u32, u32, u32) {
        let (x, y, _) = dim;
        (div_ceil(y as u32, 16), div_ceil(x as u32, 16), 1)
    }
}

// ---------------------------------------------------------------------------
// ComputeBackend implementation
// ---------------------------------------------------------------------------

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn upload(&self, stack: &SignalStack) -> GridBuffer {
        let flat: Vec<f32> = stack.as_array().iter().copied().collect();
        let buffer = self.create_storage(&flat);
        self.make_grid_buffer(buffer, stack.dim())
    }

    fn download(&self, buf: &GridBuffer) -> Array3<f32> {
        let data = self.download_f32(gpu_buf(buf));
        Array3::from_shape_vec(buf.dim, data).expect("shape mismatch in download")
    }

    fn detect_peaks(&self, signals: &GridBuffer, config: &AnalysisConfig) -> GridBuffer {
        let buf = gpu_buf(signals);
        let out = self.create_storage_uninit(buf.size());
        let uniform = self.create_uniform(&self.grid_params(signals.dim, Some(config)));

        self.dispatch(
            &self.detect_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(signals.dim),
        );
        self.make_grid_buffer(out, signals.dim)
    }

    fn peak_count(&self, peaks: &GridBuffer) -> Array2<u32> {
        count_peak_mask(&self.download(peaks))
    }

    fn prominence(&self, signals: &GridBuffer, peaks: &GridBuffer) -> GridBuffer {
        let sig_buf = gpu_buf(signals);
        let peak_buf = gpu_buf(peaks);
        let out = self.create_storage_uninit(sig_buf.size());
        let uniform = self.create_uniform(&self.grid_params(signals.dim, None));

        self.dispatch(
            &self.prominence_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sig_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: peak_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(signals.dim),
        );
        self.make_grid_buffer(out, signals.dim)
    }

    fn width(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        prominence: &GridBuffer,
        rel_height: f32,
    ) -> GridBuffer {
        let sig_buf = gpu_buf(signals);
        let peak_buf = gpu_buf(peaks);
        let prom_buf = gpu_buf(prominence);
        let out = self.create_storage_uninit(sig_buf.size());
        let mut params = self.grid_params(signals.dim, None);
        params.rel_height = rel_height;
        let uniform = self.create_uniform(&params);

        self.dispatch(
            &self.width_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sig_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: peak_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: prom_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(signals.dim),
        );
        self.make_grid_buffer(out, signals.dim)
    }

    fn centroid_correction(
        &self,
        signals: &GridBuffer,
        peaks: &GridBuffer,
        config: &AnalysisConfig,
    ) -> GridBuffer {
        let sig_buf = gpu_buf(signals);
        let peak_buf = gpu_buf(peaks);
        let (x, y, n) = signals.dim;

        // Reverse peaks (plateau minima) bound the centroid base regions.
        let minima = self.create_storage_uninit(sig_buf.size());
        let reverse_uniform = self.create_uniform(&self.grid_params(signals.dim, None));
        self.dispatch(
            &self.reverse_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sig_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: minima.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: reverse_uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(signals.dim),
        );

        let out = self.create_storage_uninit(sig_buf.size());
        let uniform = self.create_uniform(&CentroidParams {
            rows: x as u32,
            cols: y as u32,
            samples: n as u32,
            radius: config.centroid_radius as u32,
            target_fraction: config.centroid_target_fraction,
            subdivisions: CENTROID_SUBDIVISIONS as u32,
            _pad0: 0,
            _pad1: 0,
        });
        self.dispatch(
            &self.centroid_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: sig_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: peak_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: minima.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(signals.dim),
        );
        self.make_grid_buffer(out, signals.dim)
    }

    fn direction(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32> {
        let peak_buf = gpu_buf(peaks);
        let cent_buf = gpu_buf(centroids);
        let (x, y, _) = peaks.dim;
        let out = self.create_storage_uninit((x as u64) * (y as u64) * 2 * 4);
        let uniform = self.create_uniform(&self.grid_params(peaks.dim, None));

        self.dispatch(
            &self.direction_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: peak_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: cent_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(peaks.dim),
        );

        let data = self.download_f32(&out);
        Array3::from_shape_vec((x, y, 2), data).expect("shape mismatch in direction download")
    }

    fn peak_distance(&self, peaks: &GridBuffer, centroids: &GridBuffer) -> Array3<f32> {
        let peak_buf = gpu_buf(peaks);
        let cent_buf = gpu_buf(centroids);
        let (x, y, _) = peaks.dim;
        let out = self.create_storage_uninit((x as u64) * (y as u64) * 2 * 4);
        let uniform = self.create_uniform(&self.grid_params(peaks.dim, None));

        self.dispatch(
            &self.distance_pipeline,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: peak_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: cent_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: out.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: uniform.as_entire_binding(),
                },
            ],
            self.pixel_workgroups(peaks.dim),
        );

        let data = self.download_f32(&out);
        Array3::from_shape_vec((x, y, 2), data).expect("shape mismatch in distance download")
    }
}
