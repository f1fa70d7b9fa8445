// Integration tests for HemoLink ML

use actix_web::{test, web, App};
use hemolink_ml::core::{generate_synthetic_data, train, EligibilityModel, EligibilityScorer, ModelStore, TrainingOptions};
use hemolink_ml::routes::{self, AppState};
use hemolink_ml::services::{GeminiClient, GeminiOptions};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

fn trained_model() -> Arc<EligibilityModel> {
    static MODEL: OnceLock<Arc<EligibilityModel>> = OnceLock::new();
    MODEL
        .get_or_init(|| {
            let data = generate_synthetic_data(2000, 42);
            let options = TrainingOptions {
                n_trees: 20,
                ..TrainingOptions::default()
            };
            Arc::new(train(&data, options).expect("training succeeds"))
        })
        .clone()
}

fn state_with(models: ModelStore, advisor: Option<Arc<GeminiClient>>) -> AppState {
    AppState {
        scorer: Arc::new(EligibilityScorer::new(models, advisor, false)),
    }
}

fn model_state() -> AppState {
    state_with(ModelStore::with_model("in-memory", trained_model()), None)
}

fn gemini_client(base_url: String) -> Arc<GeminiClient> {
    Arc::new(
        GeminiClient::new(GeminiOptions {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            base_url,
            timeout_secs: 5,
            cache_size: 100,
            cache_ttl_secs: 60,
        })
        .expect("client builds"),
    )
}

fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    })
    .to_string()
}

const GENERATE_PATH: &str = "/models/gemini-test:generateContent";

macro_rules! service {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .app_data(routes::json_config())
                .configure(routes::configure_routes),
        )
        .await
    };
}

macro_rules! post_json {
    ($app:expr, $path:expr, $body:expr $(,)?) => {{
        let req = test::TestRequest::post().uri($path).set_json($body).to_request();
        let resp = test::call_service($app, req).await;
        let status = resp.status().as_u16();
        let bytes = test::read_body(resp).await;
        let body: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }};
}

fn predict_body(days: i64, distance: f64, available: bool, flags: &[&str]) -> Value {
    json!({
        "daysSinceLastDonation": days,
        "distanceKm": distance,
        "isAvailableNow": available,
        "healthFlags": flags,
    })
}

#[actix_web::test]
async fn test_health() {
    let app = service!(model_state());
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["status"], "ok");
    assert_eq!(resp["modelLoaded"], true);
    assert_eq!(resp["llmEnabled"], false);
}

#[actix_web::test]
async fn test_normalize_empty_and_null_text() {
    let app = service!(model_state());

    let (status, body) = post_json!(&app, "/normalize-health", json!({"text": ""}));
    assert_eq!(status, 200);
    assert_eq!(body["flags"], json!([]));

    let (status, body) = post_json!(&app, "/normalize-health", json!({"text": null}));
    assert_eq!(status, 200);
    assert_eq!(body["flags"], json!([]));
}

#[actix_web::test]
async fn test_normalize_keyword_flags() {
    let app = service!(model_state());

    let (_, body) = post_json!(&app, "/normalize-health", json!({"text": "I have cancer"}));
    assert!(body["flags"].as_array().unwrap().contains(&json!("serious_condition")));

    let (_, body) = post_json!(&app, "/normalize-health", json!({"text": "I am diabetic and had fever last week"}));
    let flags = body["flags"].as_array().unwrap();
    assert!(flags.contains(&json!("diabetes")));
    assert!(flags.contains(&json!("recent_illness")));

    let (_, body) = post_json!(&app, "/normalize-health", json!({"text": "on chemotherapy"}));
    assert!(body["flags"].as_array().unwrap().contains(&json!("serious_condition")));
}

#[actix_web::test]
async fn test_normalize_missing_text_is_422() {
    let app = service!(model_state());
    let (status, body) = post_json!(&app, "/normalize-health", json!({}));
    assert_eq!(status, 422);
    assert_eq!(body["status_code"], 422);
}

#[actix_web::test]
async fn test_ideal_donor_high_score() {
    let app = service!(model_state());
    let (status, body) = post_json!(&app, "/predict-eligibility", predict_body(120, 2.0, true, &[]));

    assert_eq!(status, 200);
    assert!(body["score"].as_u64().unwrap() >= 80, "score was {}", body["score"]);
    let reasons = body["reasons"].as_array().unwrap();
    assert!(!reasons.is_empty());
    assert_eq!(reasons[0], "Eligible by donation gap (90+ days)");
}

#[actix_web::test]
async fn test_worst_case_low_score() {
    let app = service!(model_state());
    let (status, body) = post_json!(
        &app,
        "/predict-eligibility",
        predict_body(1, 999.0, false, &["recent_illness", "diabetes", "serious_condition"]),
    );

    assert_eq!(status, 200);
    assert!(body["score"].as_u64().unwrap() <= 40);
    assert_eq!(
        body["reasons"],
        json!(["Serious health condition (e.g. cancer) – not eligible for donation"])
    );
}

#[actix_web::test]
async fn test_longer_gap_scores_higher() {
    let app = service!(model_state());
    let (_, long_gap) = post_json!(&app, "/predict-eligibility", predict_body(150, 10.0, true, &[]));
    let (_, short_gap) = post_json!(&app, "/predict-eligibility", predict_body(20, 10.0, true, &[]));

    assert!(long_gap["score"].as_u64().unwrap() > short_gap["score"].as_u64().unwrap());
}

#[actix_web::test]
async fn test_boundary_90_days_not_below_89() {
    let app = service!(model_state());
    let (_, at_boundary) = post_json!(&app, "/predict-eligibility", predict_body(90, 10.0, true, &[]));
    let (_, below) = post_json!(&app, "/predict-eligibility", predict_body(89, 10.0, true, &[]));

    assert!(
        at_boundary["score"].as_u64().unwrap() >= below["score"].as_u64().unwrap(),
        "90 days scored {}, 89 days scored {}",
        at_boundary["score"],
        below["score"]
    );
}

#[actix_web::test]
async fn test_score_in_range_with_many_flags() {
    let app = service!(model_state());
    let (status, body) = post_json!(
        &app,
        "/predict-eligibility",
        predict_body(0, 0.0, false, &["serious_condition", "diabetes", "anemia", "bp", "medication"]),
    );

    assert_eq!(status, 200);
    assert!(body["score"].as_u64().unwrap() <= 100);
}

#[actix_web::test]
async fn test_invalid_predict_bodies_are_422() {
    let app = service!(model_state());

    let (status, _) = post_json!(&app, "/predict-eligibility", json!({"daysSinceLastDonation": 90}));
    assert_eq!(status, 422);

    let (status, body) = post_json!(&app, "/predict-eligibility", predict_body(10, -3.0, true, &[]));
    assert_eq!(status, 422);
    assert_eq!(body["error"], "Validation failed");
}

#[actix_web::test]
async fn test_missing_model_is_503() {
    let app = service!(state_with(ModelStore::new("/nonexistent/eligibility_model.json"), None));
    let (status, body) = post_json!(&app, "/predict-eligibility", predict_body(120, 2.0, true, &[]));

    assert_eq!(status, 503);
    assert!(body["message"].as_str().unwrap().contains("Model not found"));
}

#[actix_web::test]
async fn test_model_trained_after_startup_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artifacts").join("eligibility_model.json");
    let app = service!(state_with(ModelStore::new(&path), None));

    let (status, _) = post_json!(&app, "/predict-eligibility", predict_body(120, 2.0, true, &[]));
    assert_eq!(status, 503);

    trained_model().save(&path).unwrap();

    let (status, body) = post_json!(&app, "/predict-eligibility", predict_body(120, 2.0, true, &[]));
    assert_eq!(status, 200);
    assert!(body["score"].as_u64().unwrap() >= 80);
}

#[actix_web::test]
async fn test_check_eligibility_without_llm() {
    let app = service!(model_state());

    for text in ["I wear hearing aids", "Had heatstroke once, fine now", "I have hepatitis B", "Feeling great"] {
        let (status, body) = post_json!(&app, "/check-eligibility-from-health", json!({ "text": text }));
        assert_eq!(status, 200);
        assert_eq!(body["eligible"], true, "{}", text);
        assert_eq!(body["reason"], Value::Null);
    }
}

#[actix_web::test]
async fn test_full_context_score_from_llm() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_header("x-goog-api-key", "test-key")
        .match_body(mockito::Matcher::Regex("FULL context".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply(
            "```json\n{\"score\": 8, \"reasons\": [\"HIV positive donors are deferred.\", \"Available now.\"]}\n```",
        ))
        .create_async()
        .await;

    let state = state_with(ModelStore::with_model("in-memory", trained_model()), Some(gemini_client(server.url())));
    let app = service!(state);

    let mut body = predict_body(120, 2.0, true, &[]);
    body["healthSummary"] = json!("HIV positive since 2019");
    let (status, body) = post_json!(&app, "/predict-eligibility", body);

    assert_eq!(status, 200);
    assert_eq!(body["score"], 8);
    assert_eq!(body["reasons"], json!(["HIV positive donors are deferred.", "Available now."]));
    mock.assert_async().await;
}

#[actix_web::test]
async fn test_llm_explanations_accompany_model_score() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_body(mockito::Matcher::Regex("explaining why".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply(r#"{"reasons": ["Long gap since last donation.", "Very close to the request."]}"#))
        .create_async()
        .await;

    let state = state_with(ModelStore::with_model("in-memory", trained_model()), Some(gemini_client(server.url())));
    let app = service!(state);
    let (status, body) = post_json!(&app, "/predict-eligibility", predict_body(120, 2.0, true, &[]));

    assert_eq!(status, 200);
    assert!(body["score"].as_u64().unwrap() >= 80);
    assert_eq!(body["reasons"], json!(["Long gap since last donation.", "Very close to the request."]));
    mock.assert_async().await;
}

#[actix_web::test]
async fn test_llm_failure_falls_back_to_rules() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", GENERATE_PATH)
        .with_status(500)
        .with_body("internal error")
        .expect_at_least(1)
        .create_async()
        .await;

    let state = state_with(ModelStore::with_model("in-memory", trained_model()), Some(gemini_client(server.url())));
    let app = service!(state);

    let mut body = predict_body(120, 2.0, true, &[]);
    body["healthSummary"] = json!("Healthy");
    let (status, body) = post_json!(&app, "/predict-eligibility", body);
    assert_eq!(status, 200);
    assert_eq!(body["reasons"][0], "Eligible by donation gap (90+ days)");

    let (status, body) = post_json!(&app, "/normalize-health", json!({"text": "I have cancer"}));
    assert_eq!(status, 200);
    assert_eq!(body["flags"], json!(["serious_condition"]));

    let (status, body) = post_json!(&app, "/check-eligibility-from-health", json!({"text": "I have cancer"}));
    assert_eq!(status, 200);
    assert_eq!(body["eligible"], true);
}

#[actix_web::test]
async fn test_llm_flags_and_verdict() {
    let mut server = mockito::Server::new_async().await;
    let flags_mock = server
        .mock("POST", GENERATE_PATH)
        .match_body(mockito::Matcher::Regex("medical text analyzer".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply(r#"{"flags": ["bp", "medication", "migraine"]}"#))
        .expect(1)
        .create_async()
        .await;
    let verdict_mock = server
        .mock("POST", GENERATE_PATH)
        .match_body(mockito::Matcher::Regex("ELIGIBLE to donate".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply(r#"{"eligible": false, "reason": "Recent major surgery."}"#))
        .create_async()
        .await;

    let state = state_with(ModelStore::with_model("in-memory", trained_model()), Some(gemini_client(server.url())));
    let app = service!(state);
    let text = "On amlodipine for hypertension, knee surgery last month";

    // Second call is served from the cache
    for _ in 0..2 {
        let (status, body) = post_json!(&app, "/normalize-health", json!({ "text": text }));
        assert_eq!(status, 200);
        assert_eq!(body["flags"], json!(["bp", "medication"]));
    }

    let (status, body) = post_json!(&app, "/check-eligibility-from-health", json!({ "text": text }));
    assert_eq!(status, 200);
    assert_eq!(body["eligible"], false);
    assert_eq!(body["reason"], "Recent major surgery.");

    flags_mock.assert_async().await;
    verdict_mock.assert_async().await;
}
