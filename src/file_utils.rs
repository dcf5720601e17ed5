use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{Error, Result};

pub const MODEL_FILE: &str = "battery_health_model.bin";
pub const SCALER_FILE: &str = "feature_scaler.bin";
pub const MODEL_INFO_FILE: &str = "model_info.json";
pub const DATASET_FILE: &str = "data/merged_battery_data.csv";

/// Default location of the model artifacts when none is configured.
pub fn data_directory() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "battery-rul", "battery-rul")
        .ok_or_else(|| Error::config("no home directory to derive a data directory from"))?;
    Ok(project_dirs.data_local_dir().to_path_buf())
}

/// Files the server reads at startup, all relative to one artifact directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub scaler: PathBuf,
    pub model_info: PathBuf,
    pub dataset: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILE),
            scaler: dir.join(SCALER_FILE),
            model_info: dir.join(MODEL_INFO_FILE),
            dataset: dir.join(DATASET_FILE),
        }
    }
}
