// Route exports
pub mod eligibility;

use actix_web::{error, http::StatusCode, web, HttpResponse};

pub use eligibility::AppState;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(eligibility::configure);
}

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors; bodies that do not match the schema are 422
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    let (error, status_code) = match &err {
        error::JsonPayloadError::ContentType => ("unsupported_media_type", 415),
        error::JsonPayloadError::Overflow { .. } | error::JsonPayloadError::OverflowKnownLength { .. } => {
            ("payload_too_large", 413)
        }
        _ => ("invalid_json", 422),
    };
    JsonError {
        error: error.to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code,
    }
    .into()
}

/// JSON extractor config with the service's error handler
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(handle_json_payload_error)
}
