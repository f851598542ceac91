use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScatterlightError {
    #[error("Empty signal grid: {x}x{y}x{samples}")]
    EmptyGrid { x: usize, y: usize, samples: usize },

    #[error("Extended profile length {len} is not even")]
    InvalidExtendedLength { len: usize },

    #[error("Non-finite sample at pixel ({x}, {y}), index {index}")]
    NonFiniteSample { x: usize, y: usize, index: usize },

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("GPU error: {0}")]
    GpuError(String),
}

pub type Result<T> = std::result::Result<T, ScatterlightError>;
