use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use triage_ai::{ChatRequest, LlmClient, Message, TriageAiError};

use crate::dedupe_types::{
    DuplicateCandidate, DuplicateVerdict, LabelSuggestion, ReviewSummary, TriageItem,
    VisionAlignment,
};
use crate::response_normalization::normalize_json_response;

const JUDGMENT_BODY_MAX_CHARS: usize = 4_000;
const REVIEW_DIFF_MAX_CHARS: usize = 60_000;
const VISION_DOCUMENT_MAX_CHARS: usize = 12_000;

const DUPLICATE_SYSTEM_PROMPT: &str = "You triage a software backlog. Decide whether the NEW item duplicates any CANDIDATE. \
Only list candidates that report the same underlying problem or change. \
Respond with a single JSON object: \
{\"isDuplicate\": boolean, \"similarItems\": [{\"number\": integer, \"title\": string, \"url\": string, \"similarity\": number between 0 and 1}], \"reasoning\": string}.";

const VISION_SYSTEM_PROMPT: &str = "You check whether a backlog item fits the project's vision document. \
Respond with a single JSON object: \
{\"fit\": \"aligned\" | \"off-track\" | \"neutral\", \"score\": number between 0 and 1, \"concerns\": [string], \"recommendation\": string}.";

const REVIEW_SYSTEM_PROMPT: &str = "You review a pull request diff. Report concrete findings only. \
Respond with a single JSON object: \
{\"summary\": string, \"findings\": [{\"severity\": \"critical\" | \"major\" | \"minor\" | \"info\", \"title\": string, \"file\": string}], \"complexity\": \"low\" | \"medium\" | \"high\"}.";

const LABEL_SYSTEM_PROMPT: &str = "You suggest labels for a backlog item. Choose only from the AVAILABLE labels. \
Respond with a single JSON object: {\"labels\": [string], \"reasoning\": string}.";

/// Structured model output accepted by `attempt_judgment`.
pub trait JudgmentSchema: DeserializeOwned {
    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl JudgmentSchema for DuplicateVerdict {
    fn validate(&self) -> Result<(), String> {
        match self
            .similar_items
            .iter()
            .find(|item| !item.similarity.is_finite() || item.similarity < 0.0)
        {
            Some(item) => Err(format!(
                "similarItems entry #{} has invalid similarity {}",
                item.number, item.similarity
            )),
            None => Ok(()),
        }
    }
}

impl JudgmentSchema for VisionAlignment {
    fn validate(&self) -> Result<(), String> {
        if !self.score.is_finite() || !(0.0..=1.0).contains(&self.score) {
            return Err(format!("vision score {} is outside [0, 1]", self.score));
        }
        Ok(())
    }
}

impl JudgmentSchema for ReviewSummary {}

impl JudgmentSchema for LabelSuggestion {}

#[derive(Debug, Clone, PartialEq)]
pub struct JudgmentAttempt<T> {
    pub value: T,
    /// Number of calls made, including the successful one.
    pub attempts: usize,
    pub used_fallback: bool,
}

/// Parses raw model text into a validated `T`.
pub fn parse_judgment<T: JudgmentSchema>(raw: &str) -> Result<T, String> {
    let json = normalize_json_response(raw).map_err(|error| error.to_string())?;
    let value = serde_json::from_str::<T>(json).map_err(|error| error.to_string())?;
    value.validate()?;
    Ok(value)
}

/// Bounded-retry combinator shared by every judgment call.
///
/// Calls `call` up to `max_retries + 1` times until its output parses and
/// validates as `T`; provider errors and malformed output both consume an
/// attempt. On exhaustion `fallback` supplies the value.
pub async fn attempt_judgment<T, F, Fut>(
    label: &str,
    mut call: F,
    fallback: impl FnOnce() -> T,
    max_retries: usize,
) -> JudgmentAttempt<T>
where
    T: JudgmentSchema,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, TriageAiError>>,
{
    let mut attempts = 0usize;
    for _ in 0..=max_retries {
        attempts += 1;
        match call().await {
            Ok(raw) => match parse_judgment::<T>(&raw) {
                Ok(value) => {
                    return JudgmentAttempt {
                        value,
                        attempts,
                        used_fallback: false,
                    }
                }
                Err(reason) => {
                    tracing::warn!(judgment = label, attempts, %reason, "malformed judgment output");
                }
            },
            Err(error) => {
                tracing::warn!(judgment = label, attempts, %error, "judgment call failed");
            }
        }
    }
    tracing::warn!(judgment = label, attempts, "judgment retries exhausted; using fallback");
    JudgmentAttempt {
        value: fallback(),
        attempts,
        used_fallback: true,
    }
}

#[async_trait]
/// Confirmation step of duplicate detection.
pub trait DuplicateJudge: Send + Sync {
    async fn judge_duplicates(
        &self,
        item: &TriageItem,
        candidates: &[DuplicateCandidate],
    ) -> Result<DuplicateVerdict>;
}

#[async_trait]
/// All model judgments the orchestrator runs per item.
pub trait TriageJudge: DuplicateJudge {
    async fn judge_vision_alignment(
        &self,
        item: &TriageItem,
        vision_document: &str,
        review_summary: Option<&str>,
    ) -> Result<VisionAlignment>;

    async fn review_pull_request(
        &self,
        item: &TriageItem,
        diff: &str,
        changed_files: &[String],
    ) -> Result<ReviewSummary>;

    async fn suggest_labels(
        &self,
        item: &TriageItem,
        available_labels: &[String],
    ) -> Result<LabelSuggestion>;
}

#[derive(Clone)]
/// `TriageJudge` backed by a chat model answering in JSON mode.
pub struct JudgmentClient {
    client: Arc<dyn LlmClient>,
    model: String,
    max_retries: usize,
    max_tokens: u32,
}

impl JudgmentClient {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, max_retries: usize) -> Self {
        Self {
            client,
            model: model.into(),
            max_retries,
            max_tokens: 1_200,
        }
    }

    fn request(&self, system_prompt: &str, user_prompt: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            json_mode: true,
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.0),
        }
    }

    async fn run<T: JudgmentSchema>(
        &self,
        label: &str,
        request: ChatRequest,
        fallback: impl FnOnce() -> T,
    ) -> T {
        let client = self.client.as_ref();
        let attempt = attempt_judgment(
            label,
            || {
                let request = request.clone();
                async move {
                    client
                        .complete(request)
                        .await
                        .map(|response| response.message.content)
                }
            },
            fallback,
            self.max_retries,
        )
        .await;
        tracing::debug!(
            judgment = label,
            attempts = attempt.attempts,
            used_fallback = attempt.used_fallback,
            "judgment finished"
        );
        attempt.value
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut cut = trimmed.chars().take(max_chars).collect::<String>();
    cut.push_str("\n[truncated]");
    cut
}

fn render_item_block(heading: &str, item: &TriageItem) -> String {
    format!(
        "{heading} ({} #{}): {}\n{}",
        item.item_type(),
        item.number(),
        item.title.trim(),
        excerpt(&item.body, JUDGMENT_BODY_MAX_CHARS)
    )
}

pub(crate) fn render_duplicate_prompt(item: &TriageItem, candidates: &[DuplicateCandidate]) -> String {
    let mut prompt = render_item_block("NEW", item);
    for candidate in candidates {
        prompt.push_str(&format!(
            "\n\nCANDIDATE ({} #{}, similarity {:.3}, {}): {}\n{}",
            candidate.item_type,
            candidate.number,
            candidate.similarity,
            candidate.url,
            candidate.title.trim(),
            excerpt(&candidate.body, JUDGMENT_BODY_MAX_CHARS)
        ));
    }
    prompt
}

#[async_trait]
impl DuplicateJudge for JudgmentClient {
    async fn judge_duplicates(
        &self,
        item: &TriageItem,
        candidates: &[DuplicateCandidate],
    ) -> Result<DuplicateVerdict> {
        if candidates.is_empty() {
            return Ok(DuplicateVerdict::fallback("no candidates to compare"));
        }
        let request = self.request(DUPLICATE_SYSTEM_PROMPT, render_duplicate_prompt(item, candidates));
        Ok(self
            .run("duplicate", request, || {
                DuplicateVerdict::fallback("duplicate judgment unavailable after retries")
            })
            .await)
    }
}

#[async_trait]
impl TriageJudge for JudgmentClient {
    async fn judge_vision_alignment(
        &self,
        item: &TriageItem,
        vision_document: &str,
        review_summary: Option<&str>,
    ) -> Result<VisionAlignment> {
        let mut prompt = format!(
            "VISION:\n{}\n\n{}",
            excerpt(vision_document, VISION_DOCUMENT_MAX_CHARS),
            render_item_block("ITEM", item)
        );
        if let Some(summary) = review_summary.map(str::trim).filter(|s| !s.is_empty()) {
            prompt.push_str(&format!("\n\nREVIEW SUMMARY:\n{summary}"));
        }
        let request = self.request(VISION_SYSTEM_PROMPT, prompt);
        Ok(self
            .run("vision", request, || {
                VisionAlignment::fallback("vision alignment unavailable after retries")
            })
            .await)
    }

    async fn review_pull_request(
        &self,
        item: &TriageItem,
        diff: &str,
        changed_files: &[String],
    ) -> Result<ReviewSummary> {
        let prompt = format!(
            "{}\n\nCHANGED FILES:\n{}\n\nDIFF:\n{}",
            render_item_block("PULL REQUEST", item),
            changed_files.join("\n"),
            excerpt(diff, REVIEW_DIFF_MAX_CHARS)
        );
        let request = self.request(REVIEW_SYSTEM_PROMPT, prompt);
        Ok(self
            .run("review", request, || {
                ReviewSummary::fallback("review unavailable after retries")
            })
            .await)
    }

    async fn suggest_labels(
        &self,
        item: &TriageItem,
        available_labels: &[String],
    ) -> Result<LabelSuggestion> {
        if available_labels.is_empty() {
            return Ok(LabelSuggestion::fallback("repository has no labels"));
        }
        let prompt = format!(
            "AVAILABLE:\n{}\n\n{}",
            available_labels.join("\n"),
            render_item_block("ITEM", item)
        );
        let request = self.request(LABEL_SYSTEM_PROMPT, prompt);
        Ok(self
            .run("labels", request, || {
                LabelSuggestion::fallback("label suggestion unavailable after retries")
            })
            .await)
    }
}
