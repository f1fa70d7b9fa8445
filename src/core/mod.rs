// Core algorithm exports
pub mod eligibility;
pub mod forest;
pub mod nlp;
pub mod reasons;
pub mod rules;
pub mod training;

pub use eligibility::{EligibilityScorer, ModelStore, ScoringError, ScoringInput, SERIOUS_CONDITION_SCORE_CAP};
pub use forest::{EligibilityModel, ForestParams, ModelError, TrainingMetadata};
pub use nlp::extract_flags;
pub use reasons::rule_based_reasons;
pub use rules::rule_based_score;
pub use training::{generate_synthetic_data, load_csv_data, train, Dataset, TrainingError, TrainingOptions};
