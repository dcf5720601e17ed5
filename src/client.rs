use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::validator::UserInput;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cannot connect to the API. Please ensure the server is running on {url}")]
    Connection { url: String },

    #[error("Request timed out. Please try again.")]
    Timeout,

    #[error("API Error: {message}")]
    Api { status: u16, message: String },

    #[error("API is up but the model is not loaded")]
    NotReady,

    #[error("Unexpected response from the API: {0}")]
    Decode(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub scaler_loaded: bool,
}

impl HealthReport {
    pub fn ready(&self) -> bool {
        self.model_loaded && self.scaler_loaded
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionReport {
    pub predicted_rul: f64,
    pub battery_health_percentage: f64,
    pub status: String,
    pub input_data: Value,
}

/// Blocking client for the prediction API. No retries.
#[derive(Debug)]
pub struct PredictionClient {
    client: Client,
    config: ClientConfig,
}

impl PredictionClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Other(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn health(&self) -> Result<HealthReport, ClientError> {
        let url = format!("{}/health", self.config.api_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.health_timeout)
            .send()
            .map_err(|e| self.transport_error(e))?;
        decode(response)
    }

    pub fn predict(&self, input: &UserInput) -> Result<PredictionReport, ClientError> {
        let url = format!("{}/predict", self.config.api_url);
        debug!(%url, ?input, "requesting prediction");
        let response = self
            .client
            .post(&url)
            .timeout(self.config.predict_timeout)
            .json(input)
            .send()
            .map_err(|e| self.transport_error(e))?;
        decode(response)
    }

    /// Checks `/health` first and only asks for a prediction once the model
    /// and scaler are loaded.
    pub fn predict_when_ready(&self, input: &UserInput) -> Result<PredictionReport, ClientError> {
        if !self.health()?.ready() {
            return Err(ClientError::NotReady);
        }
        self.predict(input)
    }

    fn transport_error(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout
        } else if error.is_connect() {
            ClientError::Connection {
                url: self.config.api_url.clone(),
            }
        } else {
            ClientError::Other(error.to_string())
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let body: Value = response.json().map_err(|e| ClientError::Decode(e.to_string()))?;
    if !status.is_success() {
        let message = body["error"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}
