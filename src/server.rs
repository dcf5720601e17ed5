use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Map, Value};
use threadpool::ThreadPool;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::prediction::{PipelineError, PredictionService};
use crate::validator::{self, REQUIRED_FIELDS};

pub const API_VERSION: &str = "1.0.0";

/// Requests with larger bodies are refused before parsing.
const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into(), "status": "error" }),
        }
    }

    fn into_http(self) -> Response<Cursor<Vec<u8>>> {
        let bytes = serde_json::to_vec(&self.body).unwrap_or_default();
        let mut response = Response::from_data(bytes).with_status_code(self.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
        response
    }
}

/// Dispatches one request. Independent of the transport so it can be driven
/// directly from tests.
pub fn route(
    service: &PredictionService,
    method: &Method,
    url: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> ApiResponse {
    let path = url.split('?').next().unwrap_or(url);
    match (path, method) {
        ("/", Method::Get) => ApiResponse::ok(index()),
        ("/health", Method::Get) => ApiResponse::ok(health(service)),
        ("/predict", Method::Post) => predict(service, content_type, body),
        ("/" | "/health" | "/predict", _) => ApiResponse::error(405, "Method not allowed"),
        _ => ApiResponse::error(404, "Not found"),
    }
}

fn index() -> Value {
    json!({
        "message": "EV Battery Health Prediction API",
        "version": API_VERSION,
        "endpoints": {
            "GET /": "API information",
            "GET /health": "Health check",
            "POST /predict": "Predict battery health (RUL)"
        },
        "example_request": {
            "endpoint": "/predict",
            "method": "POST",
            "content_type": "application/json",
            "body": {
                "battery_temperature": 32.5,
                "voltage": 3.9,
                "current": 1.2,
                "charging_cycles": 540,
                "state_of_charge": 76
            }
        }
    })
}

fn health(service: &PredictionService) -> Value {
    json!({
        "status": "healthy",
        "model_loaded": service.model_loaded(),
        "scaler_loaded": service.scaler_loaded(),
    })
}

fn is_json(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn predict(service: &PredictionService, content_type: Option<&str>, body: &[u8]) -> ApiResponse {
    if !service.model_loaded() || !service.scaler_loaded() {
        return ApiResponse::error(500, PipelineError::ModelUnavailable.to_string());
    }
    if !is_json(content_type) {
        return ApiResponse::error(400, "Content-Type must be application/json");
    }

    let data: Value = match serde_json::from_slice(body) {
        Ok(Value::Null) => return ApiResponse::error(400, "No JSON data provided"),
        Ok(data) => data,
        Err(e) => return ApiResponse::error(400, format!("Invalid JSON body: {e}")),
    };

    let input = match validator::validate(&data) {
        Ok(input) => input,
        Err(e) => return ApiResponse::error(400, e.to_string()),
    };

    match service.predict(&input) {
        Ok(prediction) => {
            let prediction = prediction.rounded();
            let echoed: Map<String, Value> = REQUIRED_FIELDS
                .iter()
                .map(|spec| (spec.name.to_string(), data[spec.name].clone()))
                .collect();
            ApiResponse::ok(json!({
                "predicted_rul": prediction.predicted_rul,
                "battery_health_percentage": prediction.battery_health_percentage,
                "status": "success",
                "input_data": echoed,
            }))
        }
        Err(e) => {
            warn!(error = %e, "prediction failed");
            ApiResponse::error(500, e.to_string())
        }
    }
}

fn handle(mut request: Request, service: &PredictionService) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_string();
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());

    let mut body = Vec::new();
    let read = request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body);
    let response = match read {
        Err(e) => ApiResponse::error(400, format!("Failed to read request body: {e}")),
        Ok(_) if body.len() as u64 > MAX_BODY_BYTES => {
            ApiResponse::error(413, "Request body too large")
        }
        Ok(_) => route(service, &method, &url, content_type.as_deref(), &body),
    };

    info!(
        method = %method,
        path = %url,
        status = response.status,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "request handled"
    );
    if let Err(e) = request.respond(response.into_http()) {
        warn!(error = %e, "failed to send response");
    }
}

/// Stops a running server's accept loop from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

pub struct PredictionServer {
    server: Arc<Server>,
    service: Arc<PredictionService>,
    pool: ThreadPool,
}

impl PredictionServer {
    pub fn bind(addr: &str, service: Arc<PredictionService>, workers: usize) -> Result<Self> {
        let server = Server::http(addr).map_err(|e| Error::Bind {
            addr: addr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            server: Arc::new(server),
            service,
            pool: ThreadPool::new(workers.max(1)),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Accepts requests until shut down, then waits for in-flight ones.
    pub fn run(self) {
        info!(
            addr = ?self.local_addr(),
            workers = self.pool.max_count(),
            "serving predictions"
        );
        for request in self.server.incoming_requests() {
            let service = Arc::clone(&self.service);
            self.pool.execute(move || handle(request, &service));
        }
        self.pool.join();
        info!("server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FeatureCatalog;
    use crate::model::{RegressionModel, StandardScaler};
    use std::collections::HashMap;

    const JSON: Option<&str> = Some("application/json");

    fn service(with_model: bool) -> PredictionService {
        let names = vec!["Cycle_Index".to_string(), "Exp_Temperature".to_string()];
        let catalog = FeatureCatalog::new(names, &HashMap::new()).unwrap();
        if !with_model {
            return PredictionService::new(catalog, None, None).unwrap();
        }
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        let model = RegressionModel::Linear {
            intercept: 1000.0,
            coefficients: vec![-1.0, -2.0],
        };
        PredictionService::new(catalog, Some(scaler), Some(Box::new(model))).unwrap()
    }

    fn sample() -> Vec<u8> {
        br#"{"battery_temperature": 32.5, "voltage": 3.9, "current": 1.2,
             "charging_cycles": 540, "state_of_charge": 76}"#
            .to_vec()
    }

    #[test]
    fn predict_returns_rounded_values_and_echo() {
        let response = route(&service(true), &Method::Post, "/predict", JSON, &sample());
        assert_eq!(response.status, 200);
        assert_eq!(response.body["status"], "success");
        assert_eq!(response.body["predicted_rul"], 395.0);
        assert_eq!(response.body["battery_health_percentage"], 32.92);
        assert_eq!(response.body["input_data"]["charging_cycles"], 540);
        assert_eq!(response.body["input_data"]["voltage"], 3.9);
    }

    #[test]
    fn predict_rejects_out_of_range_values() {
        let body = br#"{"battery_temperature": 150, "voltage": 3.9, "current": 1.2,
                        "charging_cycles": 540, "state_of_charge": 150}"#;
        let response = route(&service(true), &Method::Post, "/predict", JSON, body);
        assert_eq!(response.status, 400);
        assert_eq!(response.body["status"], "error");
        let message = response.body["error"].as_str().unwrap();
        assert!(message.contains("battery_temperature"));
        assert!(message.contains("state_of_charge"));
    }

    #[test]
    fn predict_lists_missing_fields() {
        let body = br#"{"battery_temperature": 32.5, "voltage": 3.9}"#;
        let response = route(&service(true), &Method::Post, "/predict", JSON, body);
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body["error"],
            "Missing required fields: current, charging_cycles, state_of_charge"
        );
    }

    #[test]
    fn predict_requires_json_content_type() {
        let response = route(
            &service(true),
            &Method::Post,
            "/predict",
            Some("text/plain"),
            &sample(),
        );
        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], "Content-Type must be application/json");

        let response = route(
            &service(true),
            &Method::Post,
            "/predict",
            Some("application/json; charset=utf-8"),
            &sample(),
        );
        assert_eq!(response.status, 200);
    }

    #[test]
    fn predict_rejects_malformed_and_null_bodies() {
        let response = route(&service(true), &Method::Post, "/predict", JSON, b"{not json");
        assert_eq!(response.status, 400);

        let response = route(&service(true), &Method::Post, "/predict", JSON, b"null");
        assert_eq!(response.body["error"], "No JSON data provided");
    }

    #[test]
    fn predict_without_model_is_server_error() {
        let response = route(&service(false), &Method::Post, "/predict", JSON, &sample());
        assert_eq!(response.status, 500);
        assert_eq!(response.body["status"], "error");
    }

    #[test]
    fn health_reports_loaded_artifacts() {
        let response = route(&service(false), &Method::Get, "/health", None, b"");
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            json!({ "status": "healthy", "model_loaded": false, "scaler_loaded": false })
        );
    }

    #[test]
    fn index_describes_endpoints() {
        let response = route(&service(true), &Method::Get, "/?verbose=1", None, b"");
        assert_eq!(response.status, 200);
        assert_eq!(response.body["version"], API_VERSION);
        assert!(response.body["endpoints"]["POST /predict"].is_string());
    }

    #[test]
    fn unknown_routes_and_methods() {
        let response = route(&service(true), &Method::Get, "/metrics", None, b"");
        assert_eq!(response.status, 404);
        let response = route(&service(true), &Method::Get, "/predict", None, b"");
        assert_eq!(response.status, 405);
    }
}
