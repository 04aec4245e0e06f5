pub mod config;
pub mod gate;
pub mod jobs;
pub mod pipeline;
pub mod source;
pub mod status;
pub mod utils;
pub mod validator;

use serde::{Deserialize, Serialize};

pub use config::{PipelineConfig, ValidatorConfig};
pub use jobs::{JobError, JobTracker};
pub use status::{JobStatus, StatusStore, Summary, TrackingId};

/// Error label recorded for a record the validator rejected.
pub const INVALID_EMAIL: &str = "Invalid Email Format";
/// Error label recorded when the validator itself failed.
pub const SERVICE_TIMEOUT: &str = "Validation service timed out";

/// One input row flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub email: String,
}

impl Record {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A retained per-record failure, as reported in a [`Summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub name: String,
    pub email: String,
    pub error: String,
}

/// Result of validating a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Record),
    ServiceError(Record),
}

impl ValidationOutcome {
    /// Detail entry for this outcome. `Valid` outcomes are not retained.
    pub fn into_detail(self) -> Option<FailureDetail> {
        let (record, error) = match self {
            ValidationOutcome::Valid => return None,
            ValidationOutcome::Invalid(r) => (r, INVALID_EMAIL),
            ValidationOutcome::ServiceError(r) => (r, SERVICE_TIMEOUT),
        };
        Some(FailureDetail {
            name: record.name,
            email: record.email,
            error: error.to_string(),
        })
    }
}
