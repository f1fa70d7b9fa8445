//! HemoLink ML - Blood donor eligibility scoring service
//!
//! This library scores donors (0-100) with human-readable reasons. A trained
//! tree-ensemble model is the primary scorer; a keyword normalizer turns free
//! health text into flags, and an optional Gemini advisor adds full-context
//! scoring and richer explanations.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{EligibilityModel, EligibilityScorer, ModelStore, ScoringInput, rule_based_score};
pub use models::{Assessment, DonorFeatures, EligibilityVerdict, HealthFlag};
