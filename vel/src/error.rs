//! Error types.

/// Failures raised by the pipeline stages. Only `Parse` is recovered from (the offending ratio
/// record is dropped); every other variant aborts the run.
#[derive(thiserror::Error, Debug)]
pub enum VelError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("Could not parse cost ratio {text:?}: {reason}")]
    Parse { text: String, reason: String },
    #[error("No price index available for year {year}")]
    Lookup { year: i32 },
    #[error("Insufficient data: {0}")]
    InsufficientData(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
}

pub type VelResult<T> = Result<T, VelError>;

impl From<reqwest::Error> for VelError {
    fn from(value: reqwest::Error) -> Self {
        VelError::Fetch(value.to_string())
    }
}
