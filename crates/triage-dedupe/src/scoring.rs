//! Backlog priority score.
//!
//! Additive model: every point added or removed comes with a reason, and each
//! input is clamped before it is weighted.

use serde::{Deserialize, Serialize};
use triage_vector::ItemType;

use crate::dedupe_types::{DedupeStatus, ReviewComplexity, SeverityCounts, VisionAlignment, VisionFit};

const BASE_SCORE: f64 = 10.0;
const DUPLICATE_POINTS: f64 = 55.0;
const RELATED_POINTS: f64 = 25.0;
const SIMILARITY_WEIGHT: f64 = 30.0;
const VERY_HIGH_SIMILARITY: f64 = 0.9;
const STRONG_SIMILARITY: f64 = 0.75;
const CRITICAL_CAP: i64 = 10;
const MAJOR_CAP: i64 = 20;
const MINOR_CAP: i64 = 30;
const CRITICAL_WEIGHT: f64 = 3.0;
const MAJOR_WEIGHT: f64 = 1.5;
const MINOR_WEIGHT: f64 = 0.5;
const HIGH_COMPLEXITY_POINTS: f64 = 5.0;
const MEDIUM_COMPLEXITY_POINTS: f64 = 2.0;
const OFF_TRACK_POINTS: f64 = 10.0;
const ALIGNED_POINTS: f64 = -5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Signals available for one backlog item. Absent signals contribute nothing.
pub struct BacklogScoreInput {
    pub item_type: ItemType,
    pub dedupe_status: Option<DedupeStatus>,
    pub duplicate_similarity: Option<f64>,
    pub severity_counts: Option<SeverityCounts>,
    pub review_complexity: Option<ReviewComplexity>,
    pub vision_alignment: Option<VisionAlignment>,
}

impl BacklogScoreInput {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            dedupe_status: None,
            duplicate_similarity: None,
            severity_counts: None,
            review_complexity: None,
            vision_alignment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogScore {
    /// In `0..=100`.
    pub score: u8,
    pub reasons: Vec<String>,
}

/// Scores one item. Pure and deterministic.
pub fn score_backlog_item(input: &BacklogScoreInput) -> BacklogScore {
    let mut reasons = Vec::new();
    let similarity = input
        .duplicate_similarity
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let mut score = BASE_SCORE;

    match input.dedupe_status {
        Some(DedupeStatus::Duplicate) => {
            score += DUPLICATE_POINTS;
            reasons.push("High duplicate likelihood".to_string());
        }
        Some(DedupeStatus::Related) => {
            score += RELATED_POINTS;
            reasons.push("Moderate duplicate signal".to_string());
        }
        Some(DedupeStatus::Distinct) => {
            reasons.push("No duplicate overlap detected".to_string());
        }
        None => {}
    }

    score += similarity * SIMILARITY_WEIGHT;
    if similarity > VERY_HIGH_SIMILARITY {
        reasons.push("Very high semantic similarity".to_string());
    } else if similarity > STRONG_SIMILARITY {
        reasons.push("Strong semantic similarity".to_string());
    }

    if input.item_type == ItemType::PullRequest {
        let counts = input.severity_counts.unwrap_or_default();
        let critical = counts.critical.clamp(0, CRITICAL_CAP);
        let major = counts.major.clamp(0, MAJOR_CAP);
        let minor = counts.minor.clamp(0, MINOR_CAP);
        score += critical as f64 * CRITICAL_WEIGHT
            + major as f64 * MAJOR_WEIGHT
            + minor as f64 * MINOR_WEIGHT;
        if critical > 0 {
            reasons.push(format!("{critical} critical finding(s)"));
        }
        if major > 0 {
            reasons.push(format!("{major} major finding(s)"));
        }
        match input.review_complexity {
            Some(ReviewComplexity::High) => {
                score += HIGH_COMPLEXITY_POINTS;
                reasons.push("High review complexity".to_string());
            }
            Some(ReviewComplexity::Medium) => {
                score += MEDIUM_COMPLEXITY_POINTS;
                reasons.push("Medium review complexity".to_string());
            }
            Some(ReviewComplexity::Low) | None => {}
        }
    }

    match input.vision_alignment.as_ref().map(|vision| vision.fit) {
        Some(VisionFit::OffTrack) => {
            score += OFF_TRACK_POINTS;
            reasons.push("Vision alignment mismatch".to_string());
        }
        Some(VisionFit::Aligned) => {
            score += ALIGNED_POINTS;
            reasons.push("Aligns with vision goals".to_string());
        }
        Some(VisionFit::Neutral) => {
            reasons.push("Vision alignment is neutral".to_string());
        }
        None => {}
    }

    BacklogScore {
        score: score.round().clamp(0.0, 100.0) as u8,
        reasons,
    }
}
