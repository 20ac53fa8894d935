//! Name-similarity ranking of CRM candidates.
//!
//! The similarity capability is optional: when disabled, or when no name hint
//! is available, every candidate scores 0 and retrieval order is preserved.
//! Scores are rounded to three decimals so repeated runs over the same inputs
//! produce identical decision records.

use crate::domain::candidate::{Candidate, RankedCandidate};

pub trait SimilarityScorer: Send + Sync {
    /// Similarity in [0, 1] between the extracted name hint and a candidate
    /// name field.
    fn score(&self, hint: &str, candidate_name: &str) -> f64;
}

/// Normalized token-overlap ratio over lowercased alphanumeric tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenOverlap;

impl SimilarityScorer for TokenOverlap {
    fn score(&self, hint: &str, candidate_name: &str) -> f64 {
        let hint_tokens = tokenize(hint);
        let name_tokens = tokenize(candidate_name);
        if hint_tokens.is_empty() || name_tokens.is_empty() {
            return 0.0;
        }

        let shared = hint_tokens.iter().filter(|token| name_tokens.contains(*token)).count();
        let union = hint_tokens.len() + name_tokens.len() - shared;
        shared as f64 / union as f64
    }
}

fn tokenize(value: &str) -> std::collections::BTreeSet<String> {
    value
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub struct CandidateRanker {
    scorer: Option<Box<dyn SimilarityScorer>>,
}

impl CandidateRanker {
    pub fn new(scorer: Box<dyn SimilarityScorer>) -> Self {
        Self { scorer: Some(scorer) }
    }

    /// No-op ranking for deployments without a similarity capability.
    pub fn disabled() -> Self {
        Self { scorer: None }
    }

    /// Scores every candidate against the hint and sorts by descending score.
    /// The sort is stable, so ties keep retrieval order.
    pub fn rank(&self, candidates: Vec<Candidate>, name_hint: Option<&str>) -> Vec<RankedCandidate> {
        let hint = name_hint.map(str::trim).filter(|hint| !hint.is_empty());

        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .map(|candidate| {
                let score = match (&self.scorer, hint) {
                    (Some(scorer), Some(hint)) => {
                        round3(scorer.score(hint, candidate.best_name()))
                    }
                    _ => 0.0,
                };
                RankedCandidate { candidate, score }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }
}

impl Default for CandidateRanker {
    fn default() -> Self {
        Self::new(Box::new(TokenOverlap))
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
