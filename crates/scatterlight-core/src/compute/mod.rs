mod backend;
pub mod cpu;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub(crate) use backend::{count_peak_mask, BufferInner};
pub use backend::{create_backend, ComputeBackend, DevicePreference, GridBuffer};
