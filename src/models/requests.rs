use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Request to score a donor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PredictEligibilityRequest {
    #[validate(range(min = 0))]
    #[serde(alias = "days_since_last_donation", rename = "daysSinceLastDonation")]
    pub days_since_last_donation: i64,
    #[validate(range(min = 0.0))]
    #[serde(alias = "distance_km", rename = "distanceKm")]
    pub distance_km: f64,
    #[serde(alias = "is_available_now", rename = "isAvailableNow")]
    pub is_available_now: bool,
    #[serde(default)]
    #[serde(alias = "health_flags", rename = "healthFlags")]
    pub health_flags: Vec<String>,
    /// When set and the LLM is configured, the score comes from the LLM with full context
    #[serde(default)]
    #[serde(alias = "health_summary", rename = "healthSummary")]
    pub health_summary: Option<String>,
}

impl PredictEligibilityRequest {
    pub fn days_since_last_donation(&self) -> u32 {
        self.days_since_last_donation.clamp(0, u32::MAX as i64) as u32
    }

    pub fn health_summary(&self) -> Option<&str> {
        self.health_summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Free-text health summary; `text` must be present but may be null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTextRequest {
    #[serde(deserialize_with = "nullable")]
    pub text: Option<String>,
}

impl HealthTextRequest {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

fn nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}
