use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("calculation error: {0}")]
    CalculationError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
