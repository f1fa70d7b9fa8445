use crate::models::DonorFeatures;

/// Minimum gap (days) between whole-blood donations
pub const MIN_DONATION_GAP_DAYS: u32 = 90;

/// Gap (days) that counts as partially recovered
pub const MODERATE_DONATION_GAP_DAYS: u32 = 60;

/// Distance (km) that counts as a proximity match
pub const NEAR_DISTANCE_KM: f64 = 5.0;

/// Distance (km) still considered reachable
pub const REACHABLE_DISTANCE_KM: f64 = 15.0;

/// Calculate the reference eligibility score (0-100)
///
/// Used to label training data and as the fallback scorer.
///
/// Scoring formula, starting from 50:
/// ```text
/// days >= 90        +25   (else days >= 60: +10)
/// available now     +15
/// distance <= 5 km  +10   (else <= 15 km: +5)
/// no health flags   +5    (else -10 per flag)
/// ```
pub fn rule_based_score(
    days_since_last_donation: u32,
    distance_km: f64,
    is_available_now: bool,
    health_flag_count: u32,
) -> u8 {
    let mut score: f64 = 50.0;

    if days_since_last_donation >= MIN_DONATION_GAP_DAYS {
        score += 25.0;
    } else if days_since_last_donation >= MODERATE_DONATION_GAP_DAYS {
        score += 10.0;
    }

    if is_available_now {
        score += 15.0;
    }

    if distance_km <= NEAR_DISTANCE_KM {
        score += 10.0;
    } else if distance_km <= REACHABLE_DISTANCE_KM {
        score += 5.0;
    }

    if health_flag_count == 0 {
        score += 5.0;
    } else {
        score -= health_flag_count as f64 * 10.0;
    }

    clamp_score(score)
}

/// Score a feature vector with the reference rules
#[inline]
pub fn score_features(features: &DonorFeatures) -> u8 {
    rule_based_score(
        features.days_since_last_donation,
        features.distance_km,
        features.is_available_now,
        features.health_flag_count,
    )
}

/// Round half-to-even and clamp a raw score into 0-100
#[inline]
pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round_ties_even().clamp(0.0, 100.0) as u8
}
