use crate::core::forest::{EligibilityModel, FeatureRow, ForestParams, ModelError, TrainingMetadata};
use crate::core::rules::rule_based_score;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use thiserror::Error;

/// Longest donation gap represented in training data
pub const MAX_TRAINING_DAYS: u32 = 400;

/// Errors that can occur while building a training set or fitting a model
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No valid rows in {0}")]
    EmptyDataset(String),

    #[error("Invalid training options: {0}")]
    InvalidOptions(String),

    #[error("Model fitting failed: {0}")]
    Model(#[from] ModelError),
}

/// Feature rows and rule-based labels
#[derive(Debug, Clone)]
pub struct Dataset {
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
    pub source: String,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn from_rows(rows: Vec<FeatureRow>, source: String) -> Self {
        let targets = rows.iter().map(label).collect();
        Self { rows, targets, source }
    }
}

fn label(row: &FeatureRow) -> f64 {
    rule_based_score(row[0] as u32, row[1], row[2] > 0.5, row[3] as u32) as f64
}

/// Generate synthetic donors labelled by the reference rules
///
/// days in [0, 400), distance in [0, 100) km, availability ~ Bernoulli(0.5),
/// health flag count in [0, 6).
pub fn generate_synthetic_data(n_samples: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (0..n_samples)
        .map(|_| {
            [
                rng.gen_range(0..MAX_TRAINING_DAYS) as f64,
                rng.gen_range(0.0..100.0),
                if rng.gen_bool(0.5) { 1.0 } else { 0.0 },
                rng.gen_range(0..6u32) as f64,
            ]
        })
        .collect();

    Dataset::from_rows(rows, format!("synthetic(n={}, seed={})", n_samples, seed))
}

/// Donor history row as exported by the blood bank
#[derive(Debug, Deserialize)]
struct DonorRecord {
    #[serde(default, deserialize_with = "present_cell")]
    months_since_first_donation: Option<String>,
    #[serde(default, deserialize_with = "present_cell")]
    number_of_donation: Option<String>,
    #[serde(default)]
    availability: Option<String>,
}

/// `None` only when the column is missing; empty cells stay `Some("")`
fn present_cell<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

impl DonorRecord {
    /// (days since last donation, available) or `None` when the row does not parse
    ///
    /// An absent column falls back to its default; an empty cell rejects the row.
    fn parse(&self) -> Option<(u32, bool)> {
        let months: i64 = match self.months_since_first_donation.as_deref() {
            None => 0,
            Some(v) => v.trim().parse().ok()?,
        };
        let donations: i64 = match self.number_of_donation.as_deref() {
            None => 1,
            Some(v) => v.trim().parse().ok()?,
        };

        // Average gap between donations approximates the time since the last one
        let days = (months * 30) / donations.max(1);
        let days = days.clamp(0, MAX_TRAINING_DAYS as i64) as u32;
        let available = self
            .availability
            .as_deref()
            .map(|a| a.trim().eq_ignore_ascii_case("yes"))
            .unwrap_or(false);

        Some((days, available))
    }
}

/// Load real donor history; distance and health flag count are synthesized
pub fn load_csv_data<P: AsRef<Path>>(path: P, seed: u64) -> Result<Dataset, TrainingError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in reader.deserialize::<DonorRecord>() {
        let parsed = record.ok().and_then(|r| r.parse());
        match parsed {
            Some((days, available)) => rows.push([
                days as f64,
                rng.gen_range(0.0..100.0),
                if available { 1.0 } else { 0.0 },
                rng.gen_range(0..6u32) as f64,
            ]),
            None => skipped += 1,
        }
    }

    if rows.is_empty() {
        return Err(TrainingError::EmptyDataset(path.display().to_string()));
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} unparsable rows in {}", skipped, path.display());
    }

    Ok(Dataset::from_rows(rows, format!("csv({})", path.display())))
}

/// Options for fitting a model
#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub n_trees: usize,
    pub max_depth: u16,
    pub seed: u64,
    /// Fraction of rows held out for validation (0 disables the split)
    pub validation_fraction: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            seed: 42,
            validation_fraction: 0.0,
        }
    }
}

/// Fit scaler and forest on a dataset
pub fn train(dataset: &Dataset, options: TrainingOptions) -> Result<EligibilityModel, TrainingError> {
    if dataset.is_empty() {
        return Err(TrainingError::EmptyDataset(dataset.source.clone()));
    }
    if !(0.0..1.0).contains(&options.validation_fraction) {
        return Err(TrainingError::InvalidOptions(format!(
            "validation fraction must be in [0, 1), got {}",
            options.validation_fraction
        )));
    }
    if options.n_trees == 0 {
        return Err(TrainingError::InvalidOptions("n_trees must be at least 1".into()));
    }

    let mut order: Vec<usize> = (0..dataset.len()).collect();
    let n_val = (dataset.len() as f64 * options.validation_fraction).ceil() as usize;
    let n_val = if n_val >= dataset.len() { 0 } else { n_val };
    if n_val > 0 {
        let mut rng = StdRng::seed_from_u64(options.seed);
        order.shuffle(&mut rng);
    }
    let (val_idx, train_idx) = order.split_at(n_val);

    let train_rows: Vec<FeatureRow> = train_idx.iter().map(|&i| dataset.rows[i]).collect();
    let train_targets: Vec<f64> = train_idx.iter().map(|&i| dataset.targets[i]).collect();

    let params = ForestParams {
        n_trees: options.n_trees,
        max_depth: options.max_depth,
        seed: options.seed,
        ..ForestParams::default()
    };
    let metadata = TrainingMetadata {
        trained_at: chrono::Utc::now(),
        source: dataset.source.clone(),
        samples: train_rows.len(),
        n_trees: options.n_trees,
        max_depth: options.max_depth,
        seed: options.seed,
        validation_mae: None,
    };
    let mut model = EligibilityModel::fit(&train_rows, &train_targets, params, metadata)?;

    if !val_idx.is_empty() {
        let val_rows: Vec<FeatureRow> = val_idx.iter().map(|&i| dataset.rows[i]).collect();
        let predictions = model.predict_rows(&val_rows)?;
        let total: f64 = predictions
            .iter()
            .zip(val_idx)
            .map(|(pred, &i)| (pred.clamp(0.0, 100.0) - dataset.targets[i]).abs())
            .sum();
        model.metadata.validation_mae = Some(total / val_idx.len() as f64);
    }

    tracing::info!(
        "Trained {} trees (depth {}) on {} samples from {}",
        options.n_trees,
        options.max_depth,
        train_rows.len(),
        dataset.source
    );

    Ok(model)
}
