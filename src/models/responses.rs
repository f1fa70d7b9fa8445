use serde::{Deserialize, Serialize};
use crate::models::domain::{Assessment, EligibilityVerdict, HealthFlag};

/// Response for the predict-eligibility endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictEligibilityResponse {
    pub score: u8,
    pub reasons: Vec<String>,
}

impl From<Assessment> for PredictEligibilityResponse {
    fn from(assessment: Assessment) -> Self {
        Self {
            score: assessment.score,
            reasons: assessment.reasons,
        }
    }
}

/// Response for the normalize-health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeHealthResponse {
    pub flags: Vec<HealthFlag>,
}

/// Response for the check-eligibility-from-health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEligibilityResponse {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl From<EligibilityVerdict> for CheckEligibilityResponse {
    fn from(verdict: EligibilityVerdict) -> Self {
        Self {
            eligible: verdict.eligible,
            reason: verdict.reason,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "modelLoaded")]
    pub model_loaded: bool,
    #[serde(rename = "llmEnabled")]
    pub llm_enabled: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
