//! Duplicate detection and backlog scoring.
//!
//! `DuplicateClassifier` runs embed -> upsert -> neighbor search -> judgment
//! and ends in one of three statuses. `score_backlog_item` is the pure
//! priority function. Judgment calls share one bounded-retry combinator and
//! a response-normalization step for model output.

pub mod classifier;
pub mod dedupe_types;
pub mod embedder;
pub mod judgment;
pub mod response_normalization;
pub mod scoring;
pub mod similarity_normalization;

pub use classifier::{CandidateLookup, DedupeConfig, DuplicateClassifier, DuplicateOutcome};
pub use dedupe_types::{
    DedupeStatus, DuplicateCandidate, DuplicateVerdict, JudgedSimilarItem, LabelSuggestion,
    ReviewComplexity, ReviewFinding, ReviewSummary, Severity, SeverityCounts, TriageItem,
    VisionAlignment, VisionFit,
};
pub use embedder::ItemEmbedder;
pub use judgment::{
    attempt_judgment, DuplicateJudge, JudgmentAttempt, JudgmentClient, JudgmentSchema, TriageJudge,
};
pub use response_normalization::{normalize_json_response, ResponseNormalizationError};
pub use scoring::{score_backlog_item, BacklogScore, BacklogScoreInput};
pub use similarity_normalization::normalize_judge_similarity;
