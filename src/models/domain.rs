use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Feature names in the order the model consumes them
pub const FEATURE_NAMES: [&str; 4] = [
    "days_since_last_donation",
    "distance_km",
    "is_available_now",
    "health_flag_count",
];

/// Number of features in a donor vector
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Flag name that caps the score regardless of what the model predicts
pub const SERIOUS_CONDITION: &str = "serious_condition";

/// Flat donor feature vector fed to the scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DonorFeatures {
    pub days_since_last_donation: u32,
    pub distance_km: f64,
    pub is_available_now: bool,
    pub health_flag_count: u32,
}

impl DonorFeatures {
    /// Build features from request values; every supplied flag counts, known or not
    pub fn new<S: AsRef<str>>(
        days_since_last_donation: u32,
        distance_km: f64,
        is_available_now: bool,
        health_flags: &[S],
    ) -> Self {
        Self {
            days_since_last_donation,
            distance_km,
            is_available_now,
            health_flag_count: health_flags.len() as u32,
        }
    }

    /// Model input in `FEATURE_NAMES` order
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.days_since_last_donation as f64,
            self.distance_km,
            if self.is_available_now { 1.0 } else { 0.0 },
            self.health_flag_count as f64,
        ]
    }
}

/// Eligibility-related health flag extracted from free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFlag {
    RecentIllness,
    Diabetes,
    Anemia,
    Bp,
    Medication,
    SeriousCondition,
}

impl HealthFlag {
    pub const ALL: [HealthFlag; 6] = [
        HealthFlag::RecentIllness,
        HealthFlag::Diabetes,
        HealthFlag::Anemia,
        HealthFlag::Bp,
        HealthFlag::Medication,
        HealthFlag::SeriousCondition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthFlag::RecentIllness => "recent_illness",
            HealthFlag::Diabetes => "diabetes",
            HealthFlag::Anemia => "anemia",
            HealthFlag::Bp => "bp",
            HealthFlag::Medication => "medication",
            HealthFlag::SeriousCondition => SERIOUS_CONDITION,
        }
    }
}

impl fmt::Display for HealthFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthFlag::ALL
            .iter()
            .copied()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| format!("unknown health flag: {}", s))
    }
}

/// Score with its explanations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: u8,
    pub reasons: Vec<String>,
}

/// Yes/no donation decision from a health summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: Option<String>,
}

impl EligibilityVerdict {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn ineligible(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: Some(reason.into()),
        }
    }
}
