use imgbench_middleware::TransportError;
use imgbench_params::ParamError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("parameter source unavailable after {attempts} attempts")]
    ConfigUnavailable { attempts: u32 },
    #[error("interrupted while waiting for the parameter source")]
    Interrupted,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("parameter error: {0}")]
    Param(#[from] ParamError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failures rebuilding an image from a received transport message
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
    #[error("invalid header {name}: {value}")]
    InvalidHeader { name: &'static str, value: String },
    #[error("payload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}
