use crate::core::rules::clamp_score;
use crate::models::{Assessment, DonorFeatures, EligibilityVerdict, HealthFlag};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on reasons accepted from the model
pub const MAX_REASONS: usize = 6;

pub const DEFAULT_INELIGIBLE_REASON: &str =
    "Health summary indicates conditions that typically disqualify blood donation.";

/// Errors that can occur when calling the Gemini API
#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Connection settings for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub cache_size: u64,
    pub cache_ttl_secs: u64,
}

/// Gemini `generateContent` client used as the LLM advisor
///
/// Handles all communication with the hosted model including:
/// - Full-context eligibility scoring
/// - Yes/no eligibility checks from a health summary
/// - Health flag extraction
/// - Natural-language explanations for model scores
///
/// Flag extraction and eligibility checks are cached per summary text.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    flags_cache: moka::future::Cache<String, Vec<HealthFlag>>,
    verdict_cache: moka::future::Cache<String, EligibilityVerdict>,
}

#[derive(Debug, Clone, Copy)]
struct Generation {
    temperature: f32,
    max_output_tokens: u32,
}

const SCORING: Generation = Generation { temperature: 0.2, max_output_tokens: 512 };
const CLASSIFYING: Generation = Generation { temperature: 0.1, max_output_tokens: 256 };

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(options: GeminiOptions) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;

        let ttl = Duration::from_secs(options.cache_ttl_secs);
        let flags_cache = moka::future::CacheBuilder::new(options.cache_size)
            .time_to_live(ttl)
            .build();
        let verdict_cache = moka::future::CacheBuilder::new(options.cache_size)
            .time_to_live(ttl)
            .build();

        Ok(Self {
            client,
            api_key: options.api_key,
            model: options.model,
            base_url: options.base_url,
            flags_cache,
            verdict_cache,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Score a donor from the whole context in one call
    ///
    /// Returns `Ok(None)` when the reply carries no usable score.
    pub async fn score_from_full_context(
        &self,
        health_summary: &str,
        features: &DonorFeatures,
    ) -> Result<Option<Assessment>, GeminiError> {
        let summary = match health_summary.trim() {
            "" => "No health issues reported.",
            s => s,
        };
        let prompt = format!(
            r#"You are a blood donation eligibility advisor. Given the FULL context below, output a single eligibility score from 0 to 100 and 2 to 5 short reasons.

Context:
- Health summary: {summary}
- Days since last donation: {days}
- Distance to request (km): {distance:.1}
- Available to donate now: {available}

Use WHO and standard blood bank rules: HIV, AIDS, hepatitis, cancer, recent illness, chemotherapy, etc. make someone ineligible (score 0-20). Long gap since donation (e.g. 90+ days), being available, and short distance increase eligibility. Return ONLY a JSON object, no other text:
{{"score": <0-100>, "reasons": ["reason1", "reason2", ...]}}
"#,
            summary = summary,
            days = features.days_since_last_donation,
            distance = features.distance_km,
            available = python_bool(features.is_available_now),
        );

        let text = self.generate(&prompt, SCORING).await?;
        Ok(parse_full_context_reply(&text))
    }

    /// Decide whether a health summary rules out donation
    ///
    /// A blank summary is eligible without calling the model.
    pub async fn check_eligibility(&self, health_summary: &str) -> Result<Option<EligibilityVerdict>, GeminiError> {
        let summary = health_summary.trim();
        if summary.is_empty() {
            return Ok(Some(EligibilityVerdict::eligible()));
        }
        if let Some(cached) = self.verdict_cache.get(summary).await {
            tracing::trace!("Eligibility verdict cache hit");
            return Ok(Some(cached));
        }

        let prompt = format!(
            r#"You are a medical advisor for blood donation eligibility. Based on WHO and standard blood bank guidelines, is this person ELIGIBLE to donate blood?

Consider as NOT eligible: HIV, AIDS, hepatitis B or C, cancer, recent chemotherapy, chronic conditions that bar donation, recent major surgery, etc. If the summary mentions any condition that typically disqualifies blood donors, set eligible to false and give a short reason.

Respond with ONLY a JSON object, no other text. Use exactly: {{"eligible": false, "reason": "your reason"}} or {{"eligible": true}}

Health summary:
{summary}"#
        );

        let text = self.generate(&prompt, CLASSIFYING).await?;
        let verdict = parse_verdict_reply(&text);
        if let Some(v) = &verdict {
            self.verdict_cache.insert(summary.to_string(), v.clone()).await;
        }
        Ok(verdict)
    }

    /// Extract known health flags from free text
    pub async fn extract_health_flags(&self, health_summary: &str) -> Result<Option<Vec<HealthFlag>>, GeminiError> {
        let summary = health_summary.trim();
        if summary.is_empty() {
            return Ok(Some(Vec::new()));
        }
        if let Some(cached) = self.flags_cache.get(summary).await {
            tracing::trace!("Health flag cache hit");
            return Ok(Some(cached));
        }

        let prompt = format!(
            r#"You are a medical text analyzer for blood donor eligibility. From the donor's health summary below, extract ONLY the following flags if clearly mentioned (use exactly these names, nothing else):
- recent_illness (recent fever, cold, flu, infection, cough, unwell)
- diabetes (diabetes, blood sugar, glucose issues)
- anemia (anemia, low haemoglobin/hemoglobin, low iron, thalassemia)
- bp (blood pressure, hypertension, hypotension)
- medication (currently on medication, antibiotics, prescription drugs)
- serious_condition (cancer, chemotherapy, cancer treatment, HIV, hepatitis B/C, heart disease, stroke, major surgery, or any condition that typically disqualifies blood donation)

If a flag is not mentioned or unclear, do not include it. For "I have cancer" or similar, always include serious_condition. Respond with ONLY a JSON object of this form, no other text:
{{"flags": ["flag1", "flag2"]}}

Health summary:
{summary}"#
        );

        let text = self.generate(&prompt, CLASSIFYING).await?;
        let flags = parse_flags_reply(&text);
        if let Some(f) = &flags {
            self.flags_cache.insert(summary.to_string(), f.clone()).await;
        }
        Ok(flags)
    }

    /// Explain a model score in 3-5 short sentences
    pub async fn explain_score(&self, score: u8, features: &DonorFeatures) -> Result<Option<Vec<String>>, GeminiError> {
        let prompt = format!(
            r#"You are explaining why a blood donor has an eligibility score of {score}/100 to a requester. Based only on these facts, give 3 to 5 short, clear reasons (one line each). Be factual and neutral.

Facts:
- Days since last donation: {days}
- Distance to request (km): {distance:.1}
- Available now: {available}
- Number of health flags (conditions/medication): {flags}

Respond with ONLY a JSON object of this form, no other text:
{{"reasons": ["Reason one.", "Reason two.", "Reason three."]}}
"#,
            score = score,
            days = features.days_since_last_donation,
            distance = features.distance_km,
            available = python_bool(features.is_available_now),
            flags = features.health_flag_count,
        );

        let text = self.generate(&prompt, SCORING).await?;
        Ok(reply_object(&text).map(|data| clean_reasons(data.get("reasons"))))
    }

    /// One `generateContent` round trip, returning the concatenated text parts
    async fn generate(&self, prompt: &str, generation: Generation) -> Result<String, GeminiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let payload = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: generation.temperature,
                max_output_tokens: generation.max_output_tokens,
            },
        };

        tracing::debug!(
            model = %self.model,
            temperature = generation.temperature,
            prompt_len = prompt.len(),
            "Sending Gemini request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::ApiError(format!("{}: {}", status, truncate(&body, 200))));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| GeminiError::InvalidResponse(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(GeminiError::EmptyResponse);
        }

        tracing::trace!(reply = %text, "Gemini reply");
        Ok(text.to_string())
    }
}

/// Render booleans the way the prompts were written for ("True"/"False")
fn python_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extract the first balanced JSON object from model output
///
/// Tolerates markdown code fences and prose around the object. Braces inside
/// JSON strings are not tracked.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return serde_json::from_str::<Value>(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

fn clean_reasons(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|v| is_truthy(v))
                .map(|v| match v {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                })
                .filter(|s| !s.is_empty())
                .take(MAX_REASONS)
                .collect()
        })
        .unwrap_or_default()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Non-empty JSON object from a reply; `{}` counts as no answer
fn reply_object(text: &str) -> Option<Value> {
    extract_json(text).filter(is_truthy)
}

fn parse_full_context_reply(text: &str) -> Option<Assessment> {
    let data = reply_object(text)?;
    let raw = match data.get("score")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let score = clamp_score(raw);

    let mut reasons = clean_reasons(data.get("reasons"));
    if reasons.is_empty() {
        reasons.push(format!("Eligibility score: {}/100 (from full context).", score));
    }
    Some(Assessment { score, reasons })
}

fn parse_verdict_reply(text: &str) -> Option<EligibilityVerdict> {
    let data = reply_object(text)?;
    let eligible = data.get("eligible").map_or(true, is_truthy);
    if eligible {
        return Some(EligibilityVerdict::eligible());
    }

    // A missing reason gets the default; a blank one stays absent
    let reason = match data.get("reason").filter(|v| is_truthy(v)) {
        None => Some(DEFAULT_INELIGIBLE_REASON.to_string()),
        Some(Value::String(s)) => Some(s.trim().to_string()).filter(|r| !r.is_empty()),
        Some(other) => Some(other.to_string()),
    };
    Some(EligibilityVerdict { eligible: false, reason })
}

fn parse_flags_reply(text: &str) -> Option<Vec<HealthFlag>> {
    let data = reply_object(text)?;
    let flags = data
        .get("flags")
        .and_then(Value::as_array)
        .map(|items| {
            let mut flags: Vec<HealthFlag> = Vec::new();
            for flag in items.iter().filter_map(Value::as_str).filter_map(|s| s.parse().ok()) {
                if !flags.contains(&flag) {
                    flags.push(flag);
                }
            }
            flags
        })
        .unwrap_or_default();
    Some(flags)
}

// ── Private wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_fence() {
        let text = "```json\n{\"flags\": [\"bp\"]}\n```\nHope this helps!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["flags"][0], "bp");
    }

    #[test]
    fn test_extract_json_nested_object() {
        let text = r#"Result: {"a": {"b": 1}, "c": 2} trailing } brace"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"]["b"], 1);
        assert_eq!(value["c"], 2);
    }

    #[test]
    fn test_extract_json_missing_or_broken() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("{\"unterminated\": 1").is_none());
        assert!(extract_json("{not json}").is_none());
    }

    #[test]
    fn test_full_context_reply_clamps_and_defaults() {
        let assessment = parse_full_context_reply(r#"{"score": 134.6, "reasons": []}"#).unwrap();
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.reasons, vec!["Eligibility score: 100/100 (from full context)."]);

        let assessment = parse_full_context_reply(r#"{"score": "12", "reasons": [" Has HIV. ", "", null]}"#).unwrap();
        assert_eq!(assessment.score, 12);
        assert_eq!(assessment.reasons, vec!["Has HIV."]);

        assert!(parse_full_context_reply(r#"{"reasons": ["x"]}"#).is_none());
    }

    #[test]
    fn test_reasons_are_capped() {
        let reasons = clean_reasons(Some(&serde_json::json!(["1", "2", "3", "4", "5", "6", "7", "8"])));
        assert_eq!(reasons.len(), MAX_REASONS);
    }

    #[test]
    fn test_verdict_reply() {
        assert_eq!(parse_verdict_reply(r#"{"eligible": true}"#), Some(EligibilityVerdict::eligible()));
        assert_eq!(parse_verdict_reply(r#"{"note": "fine"}"#), Some(EligibilityVerdict::eligible()));
        assert_eq!(parse_verdict_reply(r#"{}"#), None);
        assert_eq!(
            parse_verdict_reply(r#"{"eligible": false, "reason": "HIV positive"}"#),
            Some(EligibilityVerdict::ineligible("HIV positive"))
        );
        assert_eq!(
            parse_verdict_reply(r#"{"eligible": false}"#),
            Some(EligibilityVerdict::ineligible(DEFAULT_INELIGIBLE_REASON))
        );
        assert_eq!(
            parse_verdict_reply(r#"{"eligible": false, "reason": "   "}"#),
            Some(EligibilityVerdict { eligible: false, reason: None })
        );
        assert_eq!(parse_verdict_reply("I cannot answer that"), None);
    }

    #[test]
    fn test_flags_reply_filters_unknown() {
        let flags = parse_flags_reply(r#"{"flags": ["diabetes", "cancer", "bp", "diabetes", 3]}"#).unwrap();
        assert_eq!(flags, vec![HealthFlag::Diabetes, HealthFlag::Bp]);

        assert_eq!(parse_flags_reply(r#"{"other": 1}"#), Some(vec![]));
        assert_eq!(parse_flags_reply("nothing"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
