use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::dataset::ReferenceDataset;

/// Features the reconstructor reads or writes, keyed by their dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureId {
    ExpTemperature,
    ExpVoltage,
    MaxDischargeVoltage,
    MinChargeVoltage,
    ExpCurrent,
    CycleIndex,
    CycleSquared,
    VoltageDrop,
    EnergyDensity,
    TempDeviation,
    TimeAtHighVoltage,
    ExpTime,
    TimeConstantCurrent,
}

impl FeatureId {
    pub const COUNT: usize = 13;

    pub const ALL: [FeatureId; Self::COUNT] = [
        FeatureId::ExpTemperature,
        FeatureId::ExpVoltage,
        FeatureId::MaxDischargeVoltage,
        FeatureId::MinChargeVoltage,
        FeatureId::ExpCurrent,
        FeatureId::CycleIndex,
        FeatureId::CycleSquared,
        FeatureId::VoltageDrop,
        FeatureId::EnergyDensity,
        FeatureId::TempDeviation,
        FeatureId::TimeAtHighVoltage,
        FeatureId::ExpTime,
        FeatureId::TimeConstantCurrent,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            FeatureId::ExpTemperature => "Exp_Temperature",
            FeatureId::ExpVoltage => "Exp_Voltage",
            FeatureId::MaxDischargeVoltage => "Max. Voltage Dischar. (V)",
            FeatureId::MinChargeVoltage => "Min. Voltage Charg. (V)",
            FeatureId::ExpCurrent => "Exp_Current",
            FeatureId::CycleIndex => "Cycle_Index",
            FeatureId::CycleSquared => "cycle_squared",
            FeatureId::VoltageDrop => "voltage_drop",
            FeatureId::EnergyDensity => "energy_density",
            FeatureId::TempDeviation => "temp_deviation",
            FeatureId::TimeAtHighVoltage => "Time at 4.15V (s)",
            FeatureId::ExpTime => "Exp_Time",
            FeatureId::TimeConstantCurrent => "Time constant current (s)",
        }
    }

    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.column_name() == name)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid model metadata in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("reference dataset not found at {path}")]
    MissingDataset { path: PathBuf },

    #[error("invalid reference dataset: {0}")]
    Dataset(String),

    #[error("feature catalog is empty")]
    Empty,

    #[error("feature catalog contains an empty name at position {position}")]
    EmptyName { position: usize },

    #[error("feature catalog lists {name:?} more than once")]
    DuplicateName { name: String },

    #[error("feature {found:?} looks like a misspelling of {expected:?}")]
    Misspelled {
        found: String,
        expected: &'static str,
    },
}

/// Metadata written next to the trained model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub feature_names: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Ordered model inputs with their fallback values. Read-only once built.
#[derive(Debug, Clone)]
pub struct FeatureCatalog {
    names: Vec<String>,
    fallbacks: Vec<f64>,
    positions: [Option<usize>; FeatureId::COUNT],
}

impl FeatureCatalog {
    /// Builds a catalog from ordered names and per-name fallbacks. Names
    /// without a fallback default to `0.0`.
    pub fn new(names: Vec<String>, fallbacks: &HashMap<String, f64>) -> Result<Self, CatalogError> {
        if names.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        let mut positions = [None; FeatureId::COUNT];
        for (position, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(CatalogError::EmptyName { position });
            }
            if !seen.insert(name.as_str()) {
                return Err(CatalogError::DuplicateName { name: name.clone() });
            }
            match FeatureId::from_column_name(name) {
                Some(id) => positions[id.slot()] = Some(position),
                None => check_spelling(name)?,
            }
        }

        let fallbacks = names
            .iter()
            .map(|name| fallbacks.get(name).copied().unwrap_or(0.0))
            .collect();

        Ok(Self {
            names,
            fallbacks,
            positions,
        })
    }

    /// Loads feature names from `model_info` when it exists, otherwise infers
    /// them from the reference dataset, which also provides the medians.
    pub fn load(model_info: &Path, dataset: &Path) -> Result<Self, CatalogError> {
        if !dataset.exists() {
            return Err(CatalogError::MissingDataset {
                path: dataset.to_path_buf(),
            });
        }
        let file = File::open(dataset).map_err(|source| CatalogError::Io {
            path: dataset.to_path_buf(),
            source,
        })?;
        let reference = ReferenceDataset::from_reader(BufReader::new(file))?;

        let names = if model_info.exists() {
            let info = read_model_info(model_info)?;
            info!(
                path = %model_info.display(),
                features = info.feature_names.len(),
                "loaded model metadata"
            );
            info.feature_names
        } else {
            warn!(
                path = %model_info.display(),
                "model metadata not found, inferring features from dataset"
            );
            reference.feature_names()
        };

        let medians = reference.medians();
        let missing = names.iter().filter(|n| !medians.contains_key(*n)).count();
        if missing > 0 {
            warn!(missing, "features without a dataset median fall back to 0.0");
        }

        Self::new(names, &medians)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn fallbacks(&self) -> &[f64] {
        &self.fallbacks
    }

    pub fn position(&self, id: FeatureId) -> Option<usize> {
        self.positions[id.slot()]
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.position(id).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

fn read_model_info(path: &Path) -> Result<ModelInfo, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| CatalogError::Metadata {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn check_spelling(name: &str) -> Result<(), CatalogError> {
    let normalized = normalize(name);
    match FeatureId::ALL
        .into_iter()
        .find(|id| normalize(id.column_name()) == normalized)
    {
        Some(id) => Err(CatalogError::Misspelled {
            found: name.to_string(),
            expected: id.column_name(),
        }),
        None => Ok(()),
    }
}
