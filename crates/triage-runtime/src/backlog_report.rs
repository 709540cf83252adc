use std::cmp::Ordering;
use std::fmt::Write as _;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_dedupe::DedupeStatus;
use triage_vector::ItemType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Dedupe status as reported; `Unclassified` marks a failed classification.
pub enum EntryStatus {
    Duplicate,
    Related,
    Distinct,
    Unclassified,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Related => "related",
            Self::Distinct => "distinct",
            Self::Unclassified => "unclassified",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Duplicate => 0,
            Self::Related => 1,
            Self::Distinct => 2,
            Self::Unclassified => 3,
        }
    }
}

impl From<Option<DedupeStatus>> for EntryStatus {
    fn from(status: Option<DedupeStatus>) -> Self {
        match status {
            Some(DedupeStatus::Duplicate) => Self::Duplicate,
            Some(DedupeStatus::Related) => Self::Related,
            Some(DedupeStatus::Distinct) => Self::Distinct,
            None => Self::Unclassified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogEntry {
    pub item_type: ItemType,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub dedupe_status: EntryStatus,
    pub score: u8,
    pub reasons: Vec<String>,
    /// Duplicate or related targets, best first.
    pub matched_numbers: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// One failed pipeline stage for one item.
pub struct ItemFailure {
    pub item_type: ItemType,
    pub number: u64,
    /// `classification`, `review`, `labels`, `vision`, `comment` or `fetch`.
    pub stage: String,
    /// Rendered error chain.
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogReport {
    pub repository: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<BacklogEntry>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => bail!("unsupported report format '{other}' (expected markdown or json)"),
        }
    }
}

/// Score descending, then duplicate, related, distinct, unclassified, then
/// pull requests before issues, then number ascending.
pub fn compare_entries(left: &BacklogEntry, right: &BacklogEntry) -> Ordering {
    right
        .score
        .cmp(&left.score)
        .then_with(|| left.dedupe_status.rank().cmp(&right.dedupe_status.rank()))
        .then_with(|| type_rank(left.item_type).cmp(&type_rank(right.item_type)))
        .then_with(|| left.number.cmp(&right.number))
}

fn type_rank(item_type: ItemType) -> u8 {
    match item_type {
        ItemType::PullRequest => 0,
        ItemType::Issue => 1,
    }
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\r', '\n'], " ")
}

impl BacklogReport {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            generated_at: Utc::now(),
            entries: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn rank(&mut self) {
        self.entries.sort_by(compare_entries);
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Markdown => Ok(self.render_markdown()),
            ReportFormat::Json => self.render_json(),
        }
    }

    pub fn render_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to encode backlog report")
    }

    pub fn render_markdown(&self) -> String {
        let mut out = format!(
            "# Backlog triage: {}\n\nGenerated {}. {} item(s), {} failure(s).\n\n",
            self.repository,
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            self.entries.len(),
            self.failures.len()
        );
        out.push_str("| Rank | Item | Status | Score | Matches | Reasons |\n");
        out.push_str("|---:|---|---|---:|---|---|\n");
        for (index, entry) in self.entries.iter().enumerate() {
            let matches = entry
                .matched_numbers
                .iter()
                .map(|number| format!("#{number}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                out,
                "| {} | [{} #{}]({}) {} | {} | {} | {} | {} |",
                index + 1,
                entry.item_type,
                entry.number,
                entry.url,
                escape_cell(&entry.title),
                entry.dedupe_status.as_str(),
                entry.score,
                matches,
                escape_cell(&entry.reasons.join("; "))
            );
        }
        if !self.failures.is_empty() {
            out.push_str("\n## Failures\n\n");
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "- {} #{} ({}): {}",
                    failure.item_type,
                    failure.number,
                    failure.stage,
                    escape_cell(&failure.error)
                );
            }
        }
        out
    }
}
