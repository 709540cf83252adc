use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Kind of backlog item a vector belongs to.
pub enum ItemType {
    #[serde(rename = "issue")]
    Issue,
    #[serde(rename = "pr")]
    PullRequest,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::PullRequest => "pr",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "issue" | "issues" => Ok(Self::Issue),
            "pr" | "pull" | "pull_request" | "pull-request" => Ok(Self::PullRequest),
            other => Err(format!("unknown item type '{other}', expected issue or pr")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Stable identity of an item's content, used as the embedding cache key.
///
/// Issues are keyed by number, so an edited issue overwrites its vector.
/// Pull requests are keyed by head commit: every push yields a fresh key.
pub enum ContentIdentity {
    Issue { number: u64 },
    PullRequest { number: u64, head_sha: String },
}

impl ContentIdentity {
    pub fn cache_key(&self) -> String {
        match self {
            Self::Issue { number } => format!("issue-{number}"),
            Self::PullRequest { head_sha, .. } => format!("pr-{}", head_sha.trim()),
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            Self::Issue { number } | Self::PullRequest { number, .. } => *number,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Issue { .. } => ItemType::Issue,
            Self::PullRequest { .. } => ItemType::PullRequest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Item attributes persisted next to a vector so search hits are self-describing.
pub struct ItemMetadata {
    pub number: u64,
    pub item_type: ItemType,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    pub key: String,
    pub vector: Vec<f32>,
    pub item: ItemMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One neighbor returned by a similarity query.
pub struct SimilarItem {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub similarity: f64,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}
