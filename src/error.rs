use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::model::ModelError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the service before it starts accepting requests.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("required artifact does not exist: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("scaler expects {scaler} features but the catalog has {catalog}")]
    DimensionMismatch { scaler: usize, catalog: usize },

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },
}

impl Error {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
