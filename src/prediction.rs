use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::FeatureCatalog;
use crate::error::{Error, Result};
use crate::feature::{self, FeatureVector};
use crate::file_utils::ArtifactPaths;
use crate::model::{ModelError, RegressionModel, Regressor, StandardScaler};
use crate::validator::UserInput;

/// RUL of a new cell in the reference dataset; maps RUL onto a 0-100 health.
pub const MAX_RUL: f64 = 1200.0;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Model not loaded. Please ensure model files are available.")]
    ModelUnavailable,

    #[error("Error preparing features: {0}")]
    FeatureBuildFailure(String),

    #[error("Error scaling features: {0}")]
    ScalingFailure(#[source] ModelError),

    #[error("Error making prediction: {0}")]
    PredictionFailure(#[source] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_rul: f64,
    pub battery_health_percentage: f64,
}

impl Prediction {
    /// Floors the raw model output at zero and derives the health percentage.
    pub fn from_raw(raw_rul: f64) -> Self {
        let predicted_rul = raw_rul.max(0.0);
        let battery_health_percentage = (predicted_rul / MAX_RUL * 100.0).clamp(0.0, 100.0);
        Self {
            predicted_rul,
            battery_health_percentage,
        }
    }

    /// Both values rounded to two decimals, as reported over the wire.
    pub fn rounded(&self) -> Self {
        Self {
            predicted_rul: round2(self.predicted_rul),
            battery_health_percentage: round2(self.battery_health_percentage),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Everything a request needs, loaded once at startup and shared read-only.
pub struct PredictionService {
    catalog: FeatureCatalog,
    scaler: Option<StandardScaler>,
    model: Option<Box<dyn Regressor>>,
}

impl PredictionService {
    pub fn new(
        catalog: FeatureCatalog,
        scaler: Option<StandardScaler>,
        model: Option<Box<dyn Regressor>>,
    ) -> Result<Self> {
        if let Some(scaler) = &scaler {
            if scaler.dimensions() != catalog.len() {
                return Err(Error::DimensionMismatch {
                    scaler: scaler.dimensions(),
                    catalog: catalog.len(),
                });
            }
        }
        Ok(Self {
            catalog,
            scaler,
            model,
        })
    }

    /// Loads catalog, scaler and model. Any missing artifact is fatal.
    pub fn load(paths: &ArtifactPaths) -> Result<Self> {
        for path in [&paths.model, &paths.scaler] {
            if !path.exists() {
                return Err(Error::MissingArtifact { path: path.clone() });
            }
        }

        let model = RegressionModel::load(&paths.model)?;
        info!(path = %paths.model.display(), "model loaded");
        let scaler = StandardScaler::load(&paths.scaler)?;
        info!(path = %paths.scaler.display(), "scaler loaded");
        let catalog = FeatureCatalog::load(&paths.model_info, &paths.dataset)?;
        info!(features = catalog.len(), "feature catalog loaded");

        Self::new(catalog, Some(scaler), Some(Box::new(model)))
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn scaler_loaded(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn build_features(&self, input: &UserInput) -> FeatureVector {
        feature::build_features(input, &self.catalog)
    }

    /// Runs features, scaling and the model, reporting which stage failed.
    pub fn predict(&self, input: &UserInput) -> std::result::Result<Prediction, PipelineError> {
        let (Some(model), Some(scaler)) = (&self.model, &self.scaler) else {
            return Err(PipelineError::ModelUnavailable);
        };

        let features = self.build_features(input);
        if let Some(index) = features.first_non_finite() {
            return Err(PipelineError::FeatureBuildFailure(format!(
                "feature {:?} is not a finite number",
                self.catalog.names()[index]
            )));
        }

        let scaled = scaler
            .transform(features.values())
            .map_err(PipelineError::ScalingFailure)?;
        let raw = model
            .predict(&scaled)
            .map_err(PipelineError::PredictionFailure)?;
        debug!(raw, "model output");

        Ok(Prediction::from_raw(raw))
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("features", &self.catalog.len())
            .field("model_loaded", &self.model_loaded())
            .field("scaler_loaded", &self.scaler_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn catalog(medians: &[(&str, f64)]) -> FeatureCatalog {
        let names = medians.iter().map(|(n, _)| n.to_string()).collect();
        let medians: HashMap<String, f64> =
            medians.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        FeatureCatalog::new(names, &medians).unwrap()
    }

    fn sample() -> UserInput {
        UserInput::new(32.5, 3.9, 1.2, 540.0, 76.0).unwrap()
    }

    fn service(intercept: f64, coefficients: Vec<f64>) -> PredictionService {
        let catalog = catalog(&[("Cycle_Index", 100.0), ("Exp_Voltage", 3.7)]);
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let model = RegressionModel::Linear {
            intercept,
            coefficients,
        };
        PredictionService::new(catalog, Some(scaler), Some(Box::new(model))).unwrap()
    }

    #[test]
    fn predicts_and_post_processes() {
        let prediction = service(1200.0, vec![-1.0, 0.0]).predict(&sample()).unwrap();
        assert_eq!(prediction.predicted_rul, 660.0);
        assert_eq!(prediction.battery_health_percentage, 55.0);
    }

    #[test]
    fn negative_rul_is_floored_and_health_clamped() {
        let prediction = service(0.0, vec![-1.0, 0.0]).predict(&sample()).unwrap();
        assert_eq!(prediction.predicted_rul, 0.0);
        assert_eq!(prediction.battery_health_percentage, 0.0);

        let prediction = Prediction::from_raw(5000.0);
        assert_eq!(prediction.battery_health_percentage, 100.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let rounded = Prediction::from_raw(850.456).rounded();
        assert_eq!(rounded.predicted_rul, 850.46);
        assert_eq!(rounded.battery_health_percentage, 70.87);
    }

    #[test]
    fn exact_halves_round_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(3.0), 3.0);
    }

    #[test]
    fn missing_model_is_reported() {
        let service =
            PredictionService::new(catalog(&[("Exp_Voltage", 3.7)]), None, None).unwrap();
        assert!(!service.model_loaded());
        assert!(!service.scaler_loaded());
        assert!(matches!(
            service.predict(&sample()),
            Err(PipelineError::ModelUnavailable)
        ));
    }

    #[test]
    fn non_finite_fallback_fails_feature_stage() {
        let catalog = catalog(&[("Exp_Voltage", 3.7), ("Charge Time (s)", f64::NAN)]);
        let scaler = StandardScaler::new(vec![0.0; 2], vec![1.0; 2]).unwrap();
        let model = RegressionModel::Linear {
            intercept: 0.0,
            coefficients: vec![1.0, 1.0],
        };
        let service = PredictionService::new(catalog, Some(scaler), Some(Box::new(model))).unwrap();
        let error = service.predict(&sample()).unwrap_err();
        assert!(matches!(error, PipelineError::FeatureBuildFailure(_)));
        assert!(error.to_string().contains("Charge Time (s)"));
    }

    #[test]
    fn overflowing_scale_fails_scaling_stage() {
        let catalog = catalog(&[("Exp_Voltage", 3.7)]);
        let scaler = StandardScaler::new(vec![0.0], vec![1e-310]).unwrap();
        let model = RegressionModel::Linear {
            intercept: 0.0,
            coefficients: vec![1.0],
        };
        let service = PredictionService::new(catalog, Some(scaler), Some(Box::new(model))).unwrap();
        let error = service.predict(&sample()).unwrap_err();
        assert!(matches!(error, PipelineError::ScalingFailure(_)));
        assert!(error.to_string().starts_with("Error scaling features"));
    }

    #[test]
    fn model_dimension_errors_fail_prediction_stage() {
        let error = service(0.0, vec![1.0]).predict(&sample()).unwrap_err();
        assert!(matches!(error, PipelineError::PredictionFailure(_)));
        assert!(error.to_string().starts_with("Error making prediction"));
    }

    #[test]
    fn scaler_must_match_catalog() {
        let scaler = StandardScaler::new(vec![0.0; 3], vec![1.0; 3]).unwrap();
        let result = PredictionService::new(catalog(&[("Exp_Voltage", 3.7)]), Some(scaler), None);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                scaler: 3,
                catalog: 1
            })
        ));
    }
}
