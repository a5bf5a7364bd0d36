use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("parameter '{name}' has the wrong type: {reason}")]
    InvalidType { name: String, reason: String },
    #[error("invalid parameter override '{0}': expected name=value")]
    InvalidOverride(String),
    #[error("parameter source unavailable: {0}")]
    Unavailable(String),
}
