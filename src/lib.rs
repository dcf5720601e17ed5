use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use catalog::FeatureCatalog;
use config::ServerConfig;
use feature::FeatureVector;
use file_utils::ArtifactPaths;
use prediction::PredictionService;
use server::PredictionServer;
use validator::UserInput;

pub mod assessment;
pub mod catalog;
pub mod client;
pub mod config;
mod dataset;
pub mod error;
pub mod feature;
pub mod file_utils;
pub mod model;
pub mod prediction;
pub mod server;
pub mod validator;

pub use error::{Error, Result};

/// Loads every artifact and binds the HTTP listener. Nothing is served until
/// `PredictionServer::run` is called.
pub fn start_server(config: &ServerConfig) -> Result<PredictionServer> {
    let start_time = Instant::now();
    info!(
        model = %config.artifacts.model.display(),
        dataset = %config.artifacts.dataset.display(),
        "loading artifacts"
    );
    let service = PredictionService::load(&config.artifacts)?;
    info!(
        elapsed_ms = start_time.elapsed().as_millis() as u64,
        features = service.catalog().len(),
        "artifacts loaded"
    );

    PredictionServer::bind(&config.bind_addr(), Arc::new(service), config.workers)
}

/// Reconstructs the model input for `input` without loading the model.
pub fn preview_features(
    artifacts: &ArtifactPaths,
    input: &UserInput,
) -> Result<(FeatureCatalog, FeatureVector)> {
    let catalog = FeatureCatalog::load(&artifacts.model_info, &artifacts.dataset)?;
    let vector = feature::build_features(input, &catalog);
    Ok((catalog, vector))
}
