use crate::core::forest::{EligibilityModel, ModelError};
use crate::core::nlp;
use crate::core::reasons::rule_based_reasons;
use crate::core::rules::{clamp_score, score_features};
use crate::models::{Assessment, DonorFeatures, EligibilityVerdict, HealthFlag, SERIOUS_CONDITION};
use crate::services::GeminiClient;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Highest score a donor with a serious condition can receive
pub const SERIOUS_CONDITION_SCORE_CAP: u8 = 15;

/// Errors that can occur while scoring a donor
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{0}")]
    ModelUnavailable(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl ScoringError {
    pub fn status_code(&self) -> u16 {
        match self {
            ScoringError::ModelUnavailable(_) => 503,
            ScoringError::Model(_) => 500,
        }
    }
}

/// Lazily loaded model artifact
///
/// The file is read on first use; a missing file is retried on the next
/// request so a model trained after startup is picked up.
pub struct ModelStore {
    path: PathBuf,
    model: OnceCell<Arc<EligibilityModel>>,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            model: OnceCell::new(),
        }
    }

    /// Store pre-populated with an in-memory model
    pub fn with_model(path: impl Into<PathBuf>, model: impl Into<Arc<EligibilityModel>>) -> Self {
        Self {
            path: path.into(),
            model: OnceCell::new_with(Some(model.into())),
        }
    }

    pub async fn get(&self) -> Result<Arc<EligibilityModel>, ModelError> {
        self.model
            .get_or_try_init(|| async {
                let path = self.path.clone();
                let model = tokio::task::spawn_blocking(move || EligibilityModel::load(path))
                    .await
                    .map_err(|e| ModelError::Io(std::io::Error::other(e)))??;
                Ok::<_, ModelError>(Arc::new(model))
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

/// Input to a scoring request
#[derive(Debug, Clone)]
pub struct ScoringInput {
    pub features: DonorFeatures,
    pub health_flags: Vec<String>,
    pub health_summary: Option<String>,
}

impl ScoringInput {
    pub fn new(
        days_since_last_donation: u32,
        distance_km: f64,
        is_available_now: bool,
        health_flags: Vec<String>,
    ) -> Self {
        Self {
            features: DonorFeatures::new(days_since_last_donation, distance_km, is_available_now, &health_flags),
            health_flags,
            health_summary: None,
        }
    }

    pub fn with_summary(mut self, summary: Option<String>) -> Self {
        self.health_summary = summary;
        self
    }

    pub fn has_serious_condition(&self) -> bool {
        self.health_flags.iter().any(|f| f == SERIOUS_CONDITION)
    }
}

/// Scoring pipeline: LLM full context -> model -> rule-based reasons
///
/// # Stages
/// 1. Full-context LLM score when a health summary is supplied
/// 2. Model prediction (or rule-based score when configured as fallback)
/// 3. Serious-condition cap
/// 4. LLM explanations, falling back to rule-based reasons
pub struct EligibilityScorer {
    models: ModelStore,
    advisor: Option<Arc<GeminiClient>>,
    fallback_to_rules: bool,
}

impl EligibilityScorer {
    pub fn new(models: ModelStore, advisor: Option<Arc<GeminiClient>>, fallback_to_rules: bool) -> Self {
        Self {
            models,
            advisor,
            fallback_to_rules,
        }
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn advisor(&self) -> Option<&Arc<GeminiClient>> {
        self.advisor.as_ref()
    }

    /// Score a donor and explain the score
    pub async fn assess(&self, input: &ScoringInput) -> Result<Assessment, ScoringError> {
        if let Some(assessment) = self.assess_full_context(input).await {
            return Ok(assessment);
        }

        let mut score = self.predict(&input.features).await?;

        let serious = input.has_serious_condition();
        if serious {
            score = score.min(SERIOUS_CONDITION_SCORE_CAP);
        }

        let reasons = match self.explain(score, &input.features).await {
            Some(reasons) => reasons,
            None => rule_based_reasons(score, &input.features, serious),
        };

        Ok(Assessment { score, reasons })
    }

    async fn assess_full_context(&self, input: &ScoringInput) -> Option<Assessment> {
        let summary = input.health_summary.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let advisor = self.advisor.as_ref()?;

        match advisor.score_from_full_context(summary, &input.features).await {
            Ok(Some(assessment)) => {
                tracing::debug!("Scored from full context: {}", assessment.score);
                Some(assessment)
            }
            Ok(None) => {
                tracing::warn!("LLM full-context reply had no usable score, using model");
                None
            }
            Err(e) => {
                tracing::warn!("LLM full-context scoring failed, using model: {}", e);
                None
            }
        }
    }

    async fn predict(&self, features: &DonorFeatures) -> Result<u8, ScoringError> {
        match self.models.get().await {
            Ok(model) => Ok(clamp_score(model.predict(features)?)),
            Err(ModelError::NotFound(path)) if self.fallback_to_rules => {
                tracing::warn!("Model not found at {}, scoring with rules", path.display());
                Ok(score_features(features))
            }
            Err(e @ ModelError::NotFound(_)) => Err(ScoringError::ModelUnavailable(e.to_string())),
            Err(e) => Err(ScoringError::Model(e)),
        }
    }

    async fn explain(&self, score: u8, features: &DonorFeatures) -> Option<Vec<String>> {
        let advisor = self.advisor.as_ref()?;
        match advisor.explain_score(score, features).await {
            Ok(Some(reasons)) if !reasons.is_empty() => Some(reasons),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("LLM explanation failed, using rule-based reasons: {}", e);
                None
            }
        }
    }

    /// Map a health summary to flags, LLM first then keywords
    pub async fn normalize_health(&self, text: &str) -> Vec<HealthFlag> {
        if nlp::normalize_text(text).is_empty() {
            return Vec::new();
        }

        if let Some(advisor) = &self.advisor {
            match advisor.extract_health_flags(text).await {
                Ok(Some(flags)) => return flags,
                Ok(None) => tracing::warn!("LLM flag reply unusable, using keyword extraction"),
                Err(e) => tracing::warn!("LLM flag extraction failed, using keyword extraction: {}", e),
            }
        }

        nlp::extract_flags(text)
    }

    /// Decide donation eligibility from a health summary
    ///
    /// Only the LLM can rule a donor out; without one, and on LLM failure,
    /// the donor is eligible.
    pub async fn check_eligibility(&self, text: &str) -> EligibilityVerdict {
        let Some(advisor) = self.advisor.as_ref().filter(|_| !text.trim().is_empty()) else {
            return EligibilityVerdict::eligible();
        };

        match advisor.check_eligibility(text).await {
            Ok(Some(verdict)) => verdict,
            Ok(None) => EligibilityVerdict::eligible(),
            Err(e) => {
                tracing::warn!("LLM eligibility check failed, assuming eligible: {}", e);
                EligibilityVerdict::eligible()
            }
        }
    }
}
