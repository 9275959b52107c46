//! HTTP run-lifecycle client
//!
//! Thin wrapper over the server's REST surface: start and stop runs, fetch
//! the IO state and fetch the contract without starting anything. The
//! machine API key is sent on every request as both `x-api-key` (preferred by
//! the server) and `Authorization: Bearer` (accepted as a fallback).
//!
//! Endpoint paths live here in one place so the API surface is easy to audit
//! when the server changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use neurobridge_core::contract::{Contract, ContractSnapshot};
use neurobridge_core::types::RunConstants;

/// POST: start a new run for a project.
pub const START_RUN: &str = "/robot/{project_id}/start";
/// POST: stop the project's current run. Safe to call when none is active.
pub const STOP_RUN: &str = "/robot/{project_id}/stop";
/// GET: current IO state (needed inputs, cycle) for resynchronization.
pub const IO_STATE: &str = "/robot/{project_id}/io/state";
/// GET: the IO/constants contract without starting a run.
pub const CONTRACT: &str = "/robot/{project_id}/contract";

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport or HTTP-status failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server response parsed but lacked a required field.
    #[error("response missing required field '{field}'")]
    MissingField {
        /// The absent field.
        field: &'static str,
    },

    /// A required argument was empty.
    #[error("{what} must be provided")]
    MissingArgument {
        /// The empty argument.
        what: &'static str,
    },
}

/// Result type for lifecycle operations.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Response Shapes
// ============================================================================

/// One entry of the IO manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoItem {
    /// Stable identifier.
    pub id: String,
    /// Kind tag ("Image", "Audio", "Feedback", ...).
    #[serde(default)]
    pub kind: String,
}

/// Learning layer listing inside the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerManifest {
    /// Layer ids reward policies may address.
    #[serde(default)]
    pub layers: Vec<String>,
}

/// The server's IO manifest for a project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IoManifest {
    /// Sensor input declarations.
    #[serde(default)]
    pub inputs: Vec<IoItem>,
    /// Output population declarations.
    #[serde(default)]
    pub outputs: Vec<IoItem>,
    /// Feedback channel declarations.
    #[serde(default)]
    pub feedback: Vec<IoItem>,
    /// Learning layers.
    #[serde(default)]
    pub stdp3: LayerManifest,
}

/// Realtime connection details returned by `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInfo {
    /// WebSocket URL. When absent the caller derives it from the base URL.
    #[serde(default)]
    pub url: Option<String>,
}

/// Contract document: constants plus the IO manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDocument {
    /// Per-run dimensions.
    #[serde(default)]
    pub constants: RunConstants,
    /// IO manifest.
    #[serde(default)]
    pub io: IoManifest,
}

impl ContractDocument {
    /// Reduce to the policy-facing snapshot (ids + constants).
    #[must_use]
    pub fn snapshot(&self) -> ContractSnapshot {
        ContractSnapshot {
            constants: self.constants,
            contract: Contract::new(
                self.io.stdp3.layers.iter().cloned(),
                self.io.feedback.iter().map(|item| item.id.clone()),
            ),
        }
    }
}

/// Response of a successful `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    /// Unique id of the started run.
    #[serde(default)]
    pub run_id: String,
    /// Realtime connection details.
    #[serde(default)]
    pub realtime: RealtimeInfo,
    /// The run's contract document.
    #[serde(flatten)]
    pub contract: ContractDocument,
}

// ============================================================================
// Client
// ============================================================================

/// Blocking HTTP client for the run lifecycle endpoints.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client. Accepts either a host root or a URL already ending in
    /// `/api`; the stored base always ends in `/api`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if `base_url` is empty or the HTTP client cannot
    /// be constructed.
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: std::time::Duration) -> ApiResult<Self> {
        if base_url.is_empty() {
            return Err(ApiError::MissingArgument { what: "base_url" });
        }

        let mut base = base_url.trim_end_matches('/').to_string();
        if !base.ends_with("/api") {
            base.push_str("/api");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(key) {
                headers.insert("x-api-key", value);
            }
            if let Ok(bearer) =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
            {
                headers.insert(reqwest::header::AUTHORIZATION, bearer);
            }
        }

        let http = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base_url: base })
    }

    fn url(&self, template: &str, project_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            template.replace("{project_id}", project_id)
        )
    }

    /// Start a new run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status, or a
    /// response missing `runId`.
    pub fn start(&self, project_id: &str) -> ApiResult<StartResponse> {
        if project_id.is_empty() {
            return Err(ApiError::MissingArgument { what: "project_id" });
        }

        tracing::info!(project = %project_id, "starting run");
        let response: StartResponse = self
            .http
            .post(self.url(START_RUN, project_id))
            .json(&serde_json::json!({}))
            .send()?
            .error_for_status()?
            .json()?;

        if response.run_id.is_empty() {
            return Err(ApiError::MissingField { field: "runId" });
        }
        Ok(response)
    }

    /// Stop the project's current run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    pub fn stop(&self, project_id: &str, run_id: Option<&str>) -> ApiResult<serde_json::Value> {
        if project_id.is_empty() {
            return Err(ApiError::MissingArgument { what: "project_id" });
        }

        let mut payload = serde_json::Map::new();
        if let Some(id) = run_id {
            payload.insert("runId".to_string(), serde_json::Value::from(id));
        }

        tracing::info!(project = %project_id, run = ?run_id, "stopping run");
        Ok(self
            .http
            .post(self.url(STOP_RUN, project_id))
            .json(&payload)
            .send()?
            .error_for_status()?
            .json()?)
    }

    /// Fetch the current IO state for resynchronization.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    pub fn io_state(&self, project_id: &str) -> ApiResult<serde_json::Value> {
        if project_id.is_empty() {
            return Err(ApiError::MissingArgument { what: "project_id" });
        }
        Ok(self
            .http
            .get(self.url(IO_STATE, project_id))
            .send()?
            .error_for_status()?
            .json()?)
    }

    /// Fetch the contract document without starting a run.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    pub fn contract(&self, project_id: &str) -> ApiResult<ContractDocument> {
        if project_id.is_empty() {
            return Err(ApiError::MissingArgument { what: "project_id" });
        }
        Ok(self
            .http
            .get(self.url(CONTRACT, project_id))
            .send()?
            .error_for_status()?
            .json()?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let timeout = std::time::Duration::from_secs(5);
        let client = ApiClient::new("https://brains.example.com", None, timeout).unwrap();
        assert_eq!(client.base_url, "https://brains.example.com/api");

        let client = ApiClient::new("http://localhost:3000/api/", None, timeout).unwrap();
        assert_eq!(client.base_url, "http://localhost:3000/api");
    }

    #[test]
    fn test_url_template() {
        let timeout = std::time::Duration::from_secs(5);
        let client = ApiClient::new("http://localhost:3000", None, timeout).unwrap();
        assert_eq!(
            client.url(START_RUN, "proj7"),
            "http://localhost:3000/api/robot/proj7/start"
        );
    }

    #[test]
    fn test_start_response_snapshot() {
        let json = r#"{
            "runId": "r42",
            "realtime": {"url": "ws://localhost:3000/rt"},
            "constants": {"outputWindow": 32, "feedbackWindow": 64},
            "io": {
                "outputs": [{"id": "V1", "kind": "Output"}],
                "feedback": [{"id": "fb0", "kind": "Feedback"}],
                "stdp3": {"layers": ["l1", "l2"]}
            }
        }"#;
        let response: StartResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.contract.snapshot();

        assert_eq!(response.run_id, "r42");
        assert_eq!(snapshot.constants.output_window, 32);
        assert!(snapshot.contract.layer_ids.contains("l1"));
        assert!(snapshot.contract.feedback_ids.contains("fb0"));
    }

    #[test]
    fn test_empty_project_rejected() {
        let timeout = std::time::Duration::from_secs(5);
        let client = ApiClient::new("http://localhost:3000", None, timeout).unwrap();
        assert!(matches!(
            client.start(""),
            Err(ApiError::MissingArgument { what: "project_id" })
        ));
    }
}
