//! Tree-ensemble regressor used as the primary eligibility scorer.
//!
//! The model is a smartcore random forest fitted on standardized features.
//! Artifacts are stored as JSON so they can be produced by the
//! `hemolink-model` tool and loaded by the service.

use crate::models::{DonorFeatures, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::error::Failed;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{StandardScaler, StandardScalerParameters};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single feature row
pub type FeatureRow = [f64; FEATURE_COUNT];

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Errors that can occur when fitting, loading or saving a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model not found at {0}. Run: hemolink-model synthetic")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid model artifact: {0}")]
    Invalid(String),

    #[error("Estimator error: {0}")]
    Estimator(#[from] Failed),
}

/// Forest hyperparameters
#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn estimator_params(&self) -> RandomForestRegressorParameters {
        // Every feature is a split candidate at each node
        RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_m(FEATURE_COUNT)
            .with_seed(self.seed)
    }
}

/// Training provenance stored alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub source: String,
    pub samples: usize,
    pub n_trees: usize,
    pub max_depth: u16,
    pub seed: u64,
    #[serde(default)]
    pub validation_mae: Option<f64>,
}

/// Fitted scaler + forest, the unit persisted as a model artifact
#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityModel {
    pub feature_names: Vec<String>,
    scaler: StandardScaler<f64>,
    forest: Forest,
    pub metadata: TrainingMetadata,
}

fn to_matrix(rows: &[FeatureRow]) -> DenseMatrix<f64> {
    let values: Vec<Vec<f64>> = rows.iter().map(|row| row.to_vec()).collect();
    DenseMatrix::from_2d_vec(&values)
}

impl EligibilityModel {
    /// Standardize the rows and fit the forest on them
    ///
    /// Rows must be non-empty and every feature column must vary.
    pub fn fit(
        rows: &[FeatureRow],
        targets: &[f64],
        params: ForestParams,
        metadata: TrainingMetadata,
    ) -> Result<Self, ModelError> {
        if rows.is_empty() || rows.len() != targets.len() {
            return Err(ModelError::Invalid(format!(
                "need matching non-empty rows and targets, got {} rows and {} targets",
                rows.len(),
                targets.len()
            )));
        }
        if let Some(name) = constant_feature(rows) {
            return Err(ModelError::Invalid(format!("feature {} has a single value", name)));
        }

        let x = to_matrix(rows);
        let scaler = StandardScaler::fit(&x, StandardScalerParameters::default())?;
        let scaled = scaler.transform(&x)?;
        let forest = Forest::fit(&scaled, &targets.to_vec(), params.estimator_params())?;

        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            scaler,
            forest,
            metadata,
        })
    }

    /// Load a model artifact from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let model: EligibilityModel =
            serde_json::from_str(&raw).map_err(|e| ModelError::Invalid(e.to_string()))?;
        model.validate()?;

        tracing::info!(
            "Loaded eligibility model from {} ({} trees, trained {} on {} samples)",
            path.display(),
            model.metadata.n_trees,
            model.metadata.trained_at,
            model.metadata.samples
        );

        Ok(model)
    }

    /// Write the artifact as JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(ModelError::Invalid(format!(
                "feature names {:?} do not match expected {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        let smoke = self
            .predict_rows(&[[0.0; FEATURE_COUNT]])
            .map_err(|e| ModelError::Invalid(e.to_string()))?;
        if !smoke.iter().all(|v| v.is_finite()) {
            return Err(ModelError::Invalid("model produces non-finite scores".into()));
        }
        Ok(())
    }

    /// Raw (unclamped) predictions for a batch of rows
    pub fn predict_rows(&self, rows: &[FeatureRow]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.scaler.transform(&to_matrix(rows))?;
        Ok(self.forest.predict(&scaled)?)
    }

    /// Raw (unclamped) score prediction
    pub fn predict(&self, features: &DonorFeatures) -> Result<f64, ModelError> {
        self.predict_rows(&[features.to_vector()])?
            .first()
            .copied()
            .ok_or_else(|| ModelError::Invalid("forest returned no prediction".into()))
    }
}

fn constant_feature(rows: &[FeatureRow]) -> Option<&'static str> {
    (0..FEATURE_COUNT)
        .find(|&col| rows.iter().all(|row| row[col] == rows[0][col]))
        .map(|col| FEATURE_NAMES[col])
}
