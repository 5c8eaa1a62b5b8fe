use polars::error::PolarsError;
use vel::error::VelError;

#[derive(thiserror::Error, Debug)]
pub enum VelCliError {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error(transparent)]
    VelError(#[from] VelError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type VelCliResult<T> = Result<T, VelCliError>;
