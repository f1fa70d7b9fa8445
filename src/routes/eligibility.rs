use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::core::{EligibilityScorer, ScoringInput};
use crate::models::{
    CheckEligibilityResponse, ErrorResponse, HealthResponse, HealthTextRequest, NormalizeHealthResponse,
    PredictEligibilityRequest, PredictEligibilityResponse,
};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub scorer: Arc<EligibilityScorer>,
}

/// Configure all eligibility-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/predict-eligibility", web::post().to(predict_eligibility))
        .route("/normalize-health", web::post().to(normalize_health))
        .route("/check-eligibility-from-health", web::post().to(check_eligibility_from_health));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.scorer.models().is_loaded(),
        llm_enabled: state.scorer.advisor().is_some(),
        timestamp: chrono::Utc::now(),
    })
}

/// Predict eligibility endpoint
///
/// POST /predict-eligibility
///
/// Request body:
/// ```json
/// {
///   "daysSinceLastDonation": 120,
///   "distanceKm": 2.0,
///   "isAvailableNow": true,
///   "healthFlags": ["diabetes"],
///   "healthSummary": "optional free text"
/// }
/// ```
async fn predict_eligibility(
    state: web::Data<AppState>,
    req: web::Json<PredictEligibilityRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for predict-eligibility request: {:?}", errors);
        return HttpResponse::UnprocessableEntity().json(ErrorResponse {
            error: "Validation failed".to_string(),
            message: errors.to_string(),
            status_code: 422,
        });
    }

    let request_id = uuid::Uuid::new_v4();
    let req = req.into_inner();
    let input = ScoringInput::new(
        req.days_since_last_donation(),
        req.distance_km,
        req.is_available_now,
        req.health_flags.clone(),
    )
    .with_summary(req.health_summary().map(str::to_string));

    tracing::info!(
        %request_id,
        days = input.features.days_since_last_donation,
        distance_km = input.features.distance_km,
        available = input.features.is_available_now,
        flags = input.features.health_flag_count,
        "Scoring donor"
    );

    match state.scorer.assess(&input).await {
        Ok(assessment) => {
            tracing::info!(%request_id, score = assessment.score, "Scored donor");
            HttpResponse::Ok().json(PredictEligibilityResponse::from(assessment))
        }
        Err(e) => {
            tracing::error!(%request_id, "Failed to score donor: {}", e);
            let status_code = e.status_code();
            let error = if status_code == 503 { "Model unavailable" } else { "Scoring failed" };
            let body = ErrorResponse {
                error: error.to_string(),
                message: e.to_string(),
                status_code,
            };
            if status_code == 503 {
                HttpResponse::ServiceUnavailable().json(body)
            } else {
                HttpResponse::InternalServerError().json(body)
            }
        }
    }
}

/// Normalize health text endpoint
///
/// POST /normalize-health
///
/// Request body:
/// ```json
/// { "text": "I am diabetic and had fever last week" }
/// ```
async fn normalize_health(
    state: web::Data<AppState>,
    req: web::Json<HealthTextRequest>,
) -> impl Responder {
    let flags = state.scorer.normalize_health(req.text()).await;
    tracing::debug!("Normalized health text to {} flags", flags.len());
    HttpResponse::Ok().json(NormalizeHealthResponse { flags })
}

/// Check eligibility from health text endpoint
///
/// POST /check-eligibility-from-health
///
/// Always answers 200; failures resolve to eligible.
async fn check_eligibility_from_health(
    state: web::Data<AppState>,
    req: web::Json<HealthTextRequest>,
) -> impl Responder {
    let verdict = state.scorer.check_eligibility(req.text()).await;
    if !verdict.eligible {
        tracing::info!("Health summary marked ineligible");
    }
    HttpResponse::Ok().json(CheckEligibilityResponse::from(verdict))
}
