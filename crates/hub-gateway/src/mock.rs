//! Local responders used when no backend is configured.
//!
//! Mock mode keeps no server-side state. List routes answer with empty
//! collections (the client keeps its own history), routes that need real
//! processing answer `BACKEND_REQUIRED`, and job status is derived from the
//! job id alone.

use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::GatewayError;

/// Job ids carrying this prefix were created by the client while in mock
/// mode and are reported as completed.
pub const MOCK_JOB_PREFIX: &str = "mock-";

/// Result of a mock responder, rendered directly as the HTTP response.
pub type MockResponse = Result<Json<Value>, GatewayError>;

/// Operations that cannot be answered without a backend.
pub mod operation {
    pub const PREDICT: &str = "Classification prediction";
    pub const TRAIN: &str = "Classifier training";
    pub const SUBMIT_CLUSTERING: &str = "Clustering job submission";
    pub const EXPORT: &str = "Result export";
    pub const CREATE_TAXONOMY: &str = "Taxonomy creation";
    pub const DELETE_TAXONOMY: &str = "Taxonomy deletion";
    pub const CREATE_CATEGORY: &str = "Category creation";
    pub const UPDATE_CATEGORY: &str = "Category update";
    pub const DELETE_CATEGORY: &str = "Category deletion";
    pub const UNKNOWN_ROUTE: &str = "This route";
}

/// A job as reported by the mock job-status route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockJob {
    pub job_id: String,
    pub status: &'static str,
    pub progress: u8,
    pub current_step: &'static str,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of a job-status lookup in mock mode.
///
/// There is no queued or running state: a recognized job is always
/// complete, and every call is evaluated on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockJobStatus {
    Completed(MockJob),
    NotFound { job_id: String },
}

impl MockJobStatus {
    pub fn into_mock_response(self) -> MockResponse {
        match self {
            MockJobStatus::Completed(job) => Ok(Json(json!(job))),
            MockJobStatus::NotFound { job_id } => Err(GatewayError::JobNotFound { job_id }),
        }
    }
}

pub fn is_mock_job_id(job_id: &str) -> bool {
    job_id.starts_with(MOCK_JOB_PREFIX)
}

/// Job status as of now.
pub fn job_status(job_id: &str) -> MockJobStatus {
    job_status_at(job_id, Utc::now())
}

/// Job status with an explicit clock; `now` fills both timestamps.
pub fn job_status_at(job_id: &str, now: DateTime<Utc>) -> MockJobStatus {
    if !is_mock_job_id(job_id) {
        return MockJobStatus::NotFound {
            job_id: job_id.to_string(),
        };
    }

    let timestamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
    MockJobStatus::Completed(MockJob {
        job_id: job_id.to_string(),
        status: "completed",
        progress: 100,
        current_step: "completed",
        created_at: timestamp.clone(),
        updated_at: timestamp,
    })
}

/// `GET /api/cluster/jobs`
pub fn list_jobs() -> MockResponse {
    Ok(Json(json!({ "jobs": [] })))
}

/// `DELETE /api/cluster/job/{jobId}`: the client drops its own record.
pub fn delete_job(job_id: &str) -> MockResponse {
    Ok(Json(json!({ "jobId": job_id, "deleted": true })))
}

/// `GET /api/cluster/encoders`
pub fn list_encoders() -> MockResponse {
    Ok(Json(json!({ "models": [] })))
}

/// `GET /api/taxonomy`
pub fn list_taxonomies() -> MockResponse {
    Ok(Json(json!({ "taxonomies": [] })))
}

/// `GET /api/taxonomy/{taxId}`: the taxonomy list is always empty here.
pub fn get_taxonomy(taxonomy_id: &str) -> MockResponse {
    Err(GatewayError::TaxonomyNotFound {
        taxonomy_id: taxonomy_id.to_string(),
    })
}

/// `GET /api/models`
pub fn list_models() -> MockResponse {
    Ok(Json(json!({ "models": [] })))
}

pub fn backend_required(operation: &'static str) -> MockResponse {
    Err(GatewayError::BackendRequired { operation })
}
