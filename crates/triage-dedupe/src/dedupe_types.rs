use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_vector::{ContentIdentity, ItemMetadata, ItemType};

const EMBEDDING_INPUT_MAX_CHARS: usize = 24_000;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Issue or pull request as seen by the classifier.
pub struct TriageItem {
    pub identity: ContentIdentity,
    pub title: String,
    pub body: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    /// False for closed issues and closed or merged pull requests.
    pub is_open: bool,
}

impl TriageItem {
    pub fn number(&self) -> u64 {
        self.identity.number()
    }

    pub fn item_type(&self) -> ItemType {
        self.identity.item_type()
    }

    pub fn cache_key(&self) -> String {
        self.identity.cache_key()
    }

    /// Title and body joined, capped to keep provider requests bounded.
    pub fn embedding_text(&self) -> String {
        let text = format!("{}\n\n{}", self.title.trim(), self.body.trim());
        text.trim()
            .chars()
            .take(EMBEDDING_INPUT_MAX_CHARS)
            .collect::<String>()
    }

    pub fn metadata(&self) -> ItemMetadata {
        ItemMetadata {
            number: self.number(),
            item_type: self.item_type(),
            title: self.title.clone(),
            url: self.url.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeStatus {
    Duplicate,
    Related,
    Distinct,
}

impl DedupeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Related => "related",
            Self::Distinct => "distinct",
        }
    }
}

impl fmt::Display for DedupeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Candidate handed to the duplicate judgment, with its full body.
pub struct DuplicateCandidate {
    pub number: u64,
    pub item_type: ItemType,
    pub title: String,
    pub body: String,
    pub url: String,
    /// Cosine similarity from the neighbor search.
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Candidate the judge reports as a duplicate.
///
/// `similarity` is as returned by the model and may be on a 0-100 scale.
pub struct JudgedSimilarItem {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    #[serde(default)]
    pub similar_items: Vec<JudgedSimilarItem>,
    #[serde(default)]
    pub reasoning: String,
}

impl DuplicateVerdict {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            is_duplicate: false,
            similar_items: Vec::new(),
            reasoning: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisionFit {
    #[serde(rename = "aligned")]
    Aligned,
    #[serde(rename = "off-track")]
    OffTrack,
    #[serde(rename = "neutral")]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionAlignment {
    pub fit: VisionFit,
    pub score: f64,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendation: String,
}

impl VisionAlignment {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            fit: VisionFit::Neutral,
            score: 0.5,
            concerns: Vec::new(),
            recommendation: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewComplexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFinding {
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<ReviewFinding>,
    pub complexity: ReviewComplexity,
}

impl ReviewSummary {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            summary: reason.into(),
            findings: Vec::new(),
            complexity: ReviewComplexity::Low,
        }
    }

    pub fn severity_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for finding in &self.findings {
            let slot = match finding.severity {
                Severity::Critical => &mut counts.critical,
                Severity::Major => &mut counts.major,
                Severity::Minor => &mut counts.minor,
                Severity::Info => &mut counts.info,
            };
            *slot = slot.saturating_add(1);
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Review findings per severity. Signed so malformed upstream counts can be clamped.
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: i64,
    #[serde(default)]
    pub major: i64,
    #[serde(default)]
    pub minor: i64,
    #[serde(default)]
    pub info: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSuggestion {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl LabelSuggestion {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            labels: Vec::new(),
            reasoning: reason.into(),
        }
    }
}
