//! Keyword health normalizer: maps free-text health summaries to flags.
//!
//! Matching works on three views of the text: Snowball-stemmed tokens (plus
//! the raw tokens), 2- and 3-word phrases, and plain substring search over the
//! normalized text. A flag fires when any of its terms appears in any view.

use crate::models::HealthFlag;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::sync::OnceLock;

/// Flag -> terms (words, synonyms and phrases) that indicate it
pub const HEALTH_TERMS: &[(HealthFlag, &[&str])] = &[
    (
        HealthFlag::RecentIllness,
        &[
            "ill", "illness", "sick", "sickness", "fever", "cold", "cough", "infection",
            "infect", "flu", "unwell", "recently", "virus", "feverish", "running nose",
            "sore throat", "weak",
        ],
    ),
    (
        HealthFlag::Diabetes,
        &[
            "diabetes", "diabetic", "sugar", "glucose", "blood sugar", "hyperglycemia",
            "hypoglycemia", "insulin", "prediabetic",
        ],
    ),
    (
        HealthFlag::Anemia,
        &[
            "anemia", "anaemia", "haemoglobin", "hemoglobin", "hb", "low iron", "iron",
            "deficient", "thalassemia",
        ],
    ),
    (
        HealthFlag::Bp,
        &[
            "blood pressure", "hypertension", "hypertensive", "hypotension", "bp",
            "high bp", "low bp", "pressure",
        ],
    ),
    (
        HealthFlag::Medication,
        &[
            "medication", "medicine", "medicines", "drug", "drugs", "antibiotic",
            "antibiotics", "treatment", "prescription", "taking", "on drugs", "tablet",
            "injection",
        ],
    ),
    (
        HealthFlag::SeriousCondition,
        &[
            "cancer", "chemotherapy", "hiv", "aids", "hepatitis", "heart disease", "stroke",
            "major surgery", "leukemia", "lymphoma", "tumor", "malignant", "oncology",
        ],
    ),
];

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// Collapse whitespace, trim and lowercase
pub fn normalize_text(text: &str) -> String {
    whitespace().replace_all(text, " ").trim().to_lowercase()
}

fn stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Reduce an English word to its Snowball stem
pub fn stem(word: &str) -> String {
    stemmer().stem(word).into_owned()
}

/// Stems and raw tokens of the text, punctuation stripped
pub fn tokenize_and_stem(text: &str) -> HashSet<String> {
    let text = normalize_text(text);
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect();

    let mut tokens = HashSet::new();
    for token in cleaned.split_whitespace() {
        if token.chars().count() < 2 || !token.chars().all(char::is_alphanumeric) {
            continue;
        }
        let stemmed = stem(token);
        if stemmed != token {
            tokens.insert(token.to_string());
        }
        tokens.insert(stemmed);
    }
    tokens
}

/// Extract health flags by keyword matching, in `HEALTH_TERMS` order
pub fn extract_flags(health_summary: &str) -> Vec<HealthFlag> {
    let text = normalize_text(health_summary);
    if text.is_empty() {
        return Vec::new();
    }

    let mut terms = tokenize_and_stem(health_summary);
    let words: Vec<&str> = text.split(' ').collect();
    for n in [2, 3] {
        for window in words.windows(n) {
            terms.insert(window.join(" "));
        }
    }

    let flags: Vec<HealthFlag> = HEALTH_TERMS
        .iter()
        .filter(|(_, flag_terms)| {
            flag_terms
                .iter()
                .any(|term| terms.contains(*term) || text.contains(term))
        })
        .map(|(flag, _)| *flag)
        .collect();

    tracing::debug!("Keyword extraction matched {} flags", flags.len());
    flags
}
