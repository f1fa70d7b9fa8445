use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware};
use hemolink_ml::config::Settings;
use hemolink_ml::core::{EligibilityScorer, ModelStore};
use hemolink_ml::routes::{self, AppState};
use hemolink_ml::services::GeminiClient;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting HemoLink ML service...");

    // LLM advisor is optional; without a key every path falls back to model + rules
    let advisor = match settings.gemini.options() {
        Some(options) => match GeminiClient::new(options) {
            Ok(client) => {
                info!("Gemini advisor enabled (model: {})", client.model());
                Some(Arc::new(client))
            }
            Err(e) => {
                error!("Failed to initialize Gemini client ({}), continuing without LLM", e);
                None
            }
        },
        None => {
            info!("GEMINI_API_KEY not set, LLM features disabled");
            None
        }
    };

    let models = ModelStore::new(&settings.model.path);
    let scorer = EligibilityScorer::new(models, advisor, settings.model.fallback_to_rules);

    // Warm the model; a missing artifact is retried per request
    match scorer.models().get().await {
        Ok(_) => info!("Eligibility model ready"),
        Err(e) => warn!("Eligibility model not loaded yet: {}", e),
    }

    let app_state = AppState {
        scorer: Arc::new(scorer),
    };

    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(routes::json_config())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
