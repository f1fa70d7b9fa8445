// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{Assessment, DonorFeatures, EligibilityVerdict, HealthFlag, FEATURE_COUNT, FEATURE_NAMES, SERIOUS_CONDITION};
pub use requests::{HealthTextRequest, PredictEligibilityRequest};
pub use responses::{CheckEligibilityResponse, ErrorResponse, HealthResponse, NormalizeHealthResponse, PredictEligibilityResponse};
