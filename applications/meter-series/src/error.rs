use crate::units::PhysicalUnit;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Format error: {0}")]
    Format(String),

    #[error("Range error: {0}")]
    Range(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unit mismatch: {left} vs {right}")]
    UnitMismatch {
        left: PhysicalUnit,
        right: PhysicalUnit,
    },

    #[error("Data consistency error: {0}")]
    Consistency(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
