use crate::core::rules::{MIN_DONATION_GAP_DAYS, MODERATE_DONATION_GAP_DAYS, NEAR_DISTANCE_KM, REACHABLE_DISTANCE_KM};
use crate::models::DonorFeatures;

/// Score at or above which a donor is called out as highly suitable
pub const HIGH_SUITABILITY_SCORE: u8 = 80;

pub const SERIOUS_CONDITION_REASON: &str =
    "Serious health condition (e.g. cancer) – not eligible for donation";

/// Build rule-based XAI reasons for a score
///
/// A serious condition replaces every other reason.
pub fn rule_based_reasons(score: u8, features: &DonorFeatures, serious_condition: bool) -> Vec<String> {
    if serious_condition {
        return vec![SERIOUS_CONDITION_REASON.to_string()];
    }

    let mut reasons = Vec::with_capacity(4);

    let days = features.days_since_last_donation;
    if days >= MIN_DONATION_GAP_DAYS {
        reasons.push("Eligible by donation gap (90+ days)".to_string());
    } else if days >= MODERATE_DONATION_GAP_DAYS {
        reasons.push("Donation gap moderate (60–90 days)".to_string());
    } else {
        reasons.push("Recently donated – check eligibility".to_string());
    }

    if features.distance_km <= NEAR_DISTANCE_KM {
        reasons.push("Proximity match – within 5 km".to_string());
    } else if features.distance_km <= REACHABLE_DISTANCE_KM {
        reasons.push("Within 15 km".to_string());
    }

    if features.is_available_now {
        reasons.push("Marked available now".to_string());
    }

    if score >= HIGH_SUITABILITY_SCORE {
        reasons.push("High suitability score".to_string());
    }

    reasons
}
