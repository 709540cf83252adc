//! Per-item triage pipeline and backlog runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use triage_dedupe::{
    score_backlog_item, BacklogScore, BacklogScoreInput, CandidateLookup, DedupeStatus,
    DuplicateClassifier, DuplicateOutcome, LabelSuggestion, ReviewSummary, TriageItem,
    TriageJudge, VisionAlignment,
};
use triage_github::label_filter::filter_existing_labels;
use triage_github::triage_comment::{
    comments_contain_marker, render_source_comment, render_target_comment, triage_link_marker,
    triage_link_pair, TriageLinkKind, TriageLinkView,
};
use triage_github::{GithubLabel, TriageHost};
use triage_vector::{ItemType, SimilarItem, VectorError};

use crate::backlog_report::{BacklogEntry, BacklogReport, EntryStatus, ItemFailure};
use crate::host_lookup::HostCandidateLookup;
use crate::item_conversion::{issue_to_triage_item, pull_request_to_triage_item};
use crate::runtime_config::TriageRuntimeConfig;


/// True when the error chain holds a store error no later item can recover from.
pub fn is_fatal_store_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<VectorError>(),
            Some(VectorError::NotInitialized | VectorError::Closed)
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Everything the pipeline produced for one item.
pub struct ItemTriageReport {
    pub item_type: ItemType,
    pub number: u64,
    pub title: String,
    pub url: String,
    /// `None` when classification failed.
    pub dedupe: Option<DuplicateOutcome>,
    pub review: Option<ReviewSummary>,
    pub labels: Option<LabelSuggestion>,
    pub applied_labels: Vec<String>,
    pub vision: Option<VisionAlignment>,
    pub score: BacklogScore,
    pub comments_posted: usize,
    pub failures: Vec<ItemFailure>,
    pub elapsed_ms: u64,
}

impl ItemTriageReport {
    pub fn to_entry(&self) -> BacklogEntry {
        BacklogEntry {
            item_type: self.item_type,
            number: self.number,
            title: self.title.clone(),
            url: self.url.clone(),
            dedupe_status: EntryStatus::from(self.dedupe.as_ref().map(|outcome| outcome.status)),
            score: self.score.score,
            reasons: self.score.reasons.clone(),
            matched_numbers: self
                .dedupe
                .as_ref()
                .map(|outcome| outcome.targets.iter().map(|target| target.number).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
struct DedupeStage {
    outcome: Option<DuplicateOutcome>,
    failures: Vec<ItemFailure>,
    comments_posted: usize,
    applied_labels: Vec<String>,
}

#[derive(Debug, Default)]
struct LabelStage {
    suggestion: Option<LabelSuggestion>,
    applied_labels: Vec<String>,
    failures: Vec<ItemFailure>,
}

fn item_failure(item: &TriageItem, stage: &str, error: &anyhow::Error) -> ItemFailure {
    ItemFailure {
        item_type: item.item_type(),
        number: item.number(),
        stage: stage.to_string(),
        error: format!("{error:#}"),
    }
}

/// Orchestrates triage over injected hosting, model and storage collaborators.
pub struct TriageRuntime {
    host: Arc<dyn TriageHost>,
    classifier: DuplicateClassifier,
    judge: Arc<dyn TriageJudge>,
    config: TriageRuntimeConfig,
    /// `"{number}:{pair}"` for every link already announced on `number` this run.
    posted_links: Mutex<HashSet<String>>,
    duplicate_labeled: Mutex<HashSet<u64>>,
}

impl TriageRuntime {
    pub fn new(
        host: Arc<dyn TriageHost>,
        classifier: DuplicateClassifier,
        judge: Arc<dyn TriageJudge>,
        config: TriageRuntimeConfig,
    ) -> Self {
        Self {
            host,
            classifier,
            judge,
            config,
            posted_links: Mutex::new(HashSet::new()),
            duplicate_labeled: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &TriageRuntimeConfig {
        &self.config
    }

    fn ensure_store_ready(&self) -> Result<()> {
        let store = self.classifier.store();
        store
            .ensure_ready()
            .with_context(|| format!("{} vector store is not ready", store.backend_name()))
    }

    async fn repository_labels(&self) -> Vec<GithubLabel> {
        match self.host.list_repository_labels().await {
            Ok(labels) => labels,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "failed to list repository labels; labels will not be applied");
                Vec::new()
            }
        }
    }

    async fn list_items(&self, item_type: ItemType) -> Result<Vec<TriageItem>> {
        let limit = self.config.backlog_limit;
        match item_type {
            ItemType::Issue => Ok(self
                .host
                .list_open_issues(limit)
                .await
                .context("failed to list open issues")?
                .iter()
                .filter(|issue| !issue.is_pull_request())
                .map(issue_to_triage_item)
                .collect()),
            ItemType::PullRequest => Ok(self
                .host
                .list_open_pull_requests(limit)
                .await
                .context("failed to list open pull requests")?
                .iter()
                .map(pull_request_to_triage_item)
                .collect()),
        }
    }

    /// Triages a single issue or pull request against its open siblings.
    pub async fn triage_item(&self, item_type: ItemType, number: u64) -> Result<ItemTriageReport> {
        self.ensure_store_ready()?;
        let lookup = HostCandidateLookup::new(self.host.clone());
        let item = lookup
            .lookup_candidate(item_type, number)
            .await?
            .ok_or_else(|| anyhow!("{item_type} #{number} does not exist"))?;
        let siblings = self.list_items(item_type).await?;
        let repository_labels = self.repository_labels().await;
        self.process_item(&item, &siblings, &repository_labels).await
    }

    /// Triages every open issue and pull request and ranks the result.
    ///
    /// Item failures become report entries; only store readiness and the
    /// initial listings can fail the run.
    pub async fn run_backlog(&self) -> Result<BacklogReport> {
        self.ensure_store_ready()?;
        let issues = self.list_items(ItemType::Issue).await?;
        let pull_requests = self.list_items(ItemType::PullRequest).await?;
        let repository_labels = self.repository_labels().await;
        tracing::info!(
            repository = %self.config.repository,
            issues = issues.len(),
            pull_requests = pull_requests.len(),
            "backlog run started"
        );

        let mut report = BacklogReport::new(self.config.repository.clone());
        for (item, siblings) in issues
            .iter()
            .map(|item| (item, issues.as_slice()))
            .chain(pull_requests.iter().map(|item| (item, pull_requests.as_slice())))
        {
            let item_report = self
                .process_item(item, siblings, &repository_labels)
                .await
                .context("backlog run aborted")?;
            report.failures.extend(item_report.failures.iter().cloned());
            report.entries.push(item_report.to_entry());
        }
        report.rank();
        tracing::info!(
            entries = report.entries.len(),
            failures = report.failures.len(),
            "backlog run finished"
        );
        Ok(report)
    }

    /// Runs every feature for one item.
    ///
    /// Duplicate detection, PR review and label suggestion run concurrently;
    /// vision alignment waits for the review summary. Stage failures are
    /// recorded on the report. Only fatal store errors are returned.
    #[tracing::instrument(level = "info", skip_all, fields(item = %item.cache_key()))]
    pub async fn process_item(
        &self,
        item: &TriageItem,
        siblings: &[TriageItem],
        repository_labels: &[GithubLabel],
    ) -> Result<ItemTriageReport> {
        let started = Instant::now();
        let (dedupe, review, labels) = tokio::join!(
            self.detect_duplicates(item, siblings, repository_labels),
            self.review_pull_request(item),
            self.suggest_labels(item, repository_labels),
        );
        let dedupe = dedupe?;

        let mut failures = dedupe.failures;
        let review = match review {
            Ok(review) => review,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "pull request review failed");
                failures.push(item_failure(item, "review", &error));
                None
            }
        };
        failures.extend(labels.failures);

        let vision = match self.config.vision_document.as_deref() {
            Some(document) => match self
                .judge
                .judge_vision_alignment(item, document, review.as_ref().map(|review| review.summary.as_str()))
                .await
            {
                Ok(vision) => Some(vision),
                Err(error) => {
                    tracing::warn!(error = %format!("{error:#}"), "vision alignment failed");
                    failures.push(item_failure(item, "vision", &error));
                    None
                }
            },
            None => None,
        };

        let score = score_backlog_item(&BacklogScoreInput {
            item_type: item.item_type(),
            dedupe_status: dedupe.outcome.as_ref().map(|outcome| outcome.status),
            duplicate_similarity: Some(
                dedupe
                    .outcome
                    .as_ref()
                    .map(|outcome| outcome.similarity)
                    .unwrap_or(0.0),
            ),
            severity_counts: review.as_ref().map(ReviewSummary::severity_counts),
            review_complexity: review.as_ref().map(|review| review.complexity),
            vision_alignment: vision.clone(),
        });

        let mut applied_labels = labels.applied_labels;
        for label in dedupe.applied_labels {
            if !applied_labels.contains(&label) {
                applied_labels.push(label);
            }
        }

        let elapsed = started.elapsed();
        if elapsed > self.config.soft_deadline {
            tracing::warn!(
                number = item.number(),
                elapsed_ms = elapsed.as_millis() as u64,
                deadline_ms = self.config.soft_deadline.as_millis() as u64,
                "item exceeded soft deadline"
            );
        }

        Ok(ItemTriageReport {
            item_type: item.item_type(),
            number: item.number(),
            title: item.title.clone(),
            url: item.url.clone(),
            dedupe: dedupe.outcome,
            review,
            labels: labels.suggestion,
            applied_labels,
            vision,
            score,
            comments_posted: dedupe.comments_posted,
            failures,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    async fn detect_duplicates(
        &self,
        item: &TriageItem,
        siblings: &[TriageItem],
        repository_labels: &[GithubLabel],
    ) -> Result<DedupeStage> {
        let mut stage = DedupeStage::default();
        let lookup = HostCandidateLookup::new(self.host.clone());
        let outcome = match self.classifier.classify(item, siblings, &lookup).await {
            Ok(outcome) => outcome,
            Err(error) if is_fatal_store_error(&error) => return Err(error),
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "classification failed; item left unclassified");
                stage.failures.push(item_failure(item, "classification", &error));
                return Ok(stage);
            }
        };

        let kind = match outcome.status {
            DedupeStatus::Duplicate => Some(TriageLinkKind::Duplicate),
            DedupeStatus::Related => Some(TriageLinkKind::Related),
            DedupeStatus::Distinct => None,
        };
        if let Some(kind) = kind {
            if self.config.post_comments {
                for target in &outcome.targets {
                    match self.post_link_comments(item, target, kind, &outcome.reasoning).await {
                        Ok(posted) => stage.comments_posted += posted,
                        Err(error) => {
                            tracing::warn!(target_number = target.number, error = %format!("{error:#}"), "failed to post triage comment");
                            stage.failures.push(item_failure(item, "comment", &error));
                        }
                    }
                }
            }
            if kind == TriageLinkKind::Duplicate && self.config.apply_labels {
                self.apply_duplicate_label(item, &outcome.targets, repository_labels, &mut stage)
                    .await;
            }
        }
        stage.outcome = Some(outcome);
        Ok(stage)
    }

    async fn post_link_comments(
        &self,
        item: &TriageItem,
        target: &SimilarItem,
        kind: TriageLinkKind,
        reasoning: &str,
    ) -> Result<usize> {
        let view = TriageLinkView {
            kind,
            source_type: item.item_type().as_str(),
            source_number: item.number(),
            source_title: &item.title,
            source_url: &item.url,
            target_type: target.item_type.as_str(),
            target_number: target.number,
            target_title: &target.title,
            target_url: &target.url,
            similarity: target.similarity,
            reasoning,
        };
        let marker = triage_link_marker(&view);
        let pair = triage_link_pair(&view);
        let mut posted = 0;
        if self
            .post_once(item.number(), &render_source_comment(&view), &marker, &pair)
            .await?
        {
            posted += 1;
        }
        if self
            .post_once(target.number, &render_target_comment(&view), &marker, &pair)
            .await?
        {
            posted += 1;
        }
        Ok(posted)
    }

    /// Posts `body` unless `number` already announced this pair during the run,
    /// or carries `marker` from an earlier run.
    ///
    /// The pair key ignores direction and kind, so the reverse pass over the
    /// matched item posts nothing.
    async fn post_once(&self, number: u64, body: &str, marker: &str, pair: &str) -> Result<bool> {
        let key = format!("{number}:{pair}");
        let mut posted = self.posted_links.lock().await;
        if posted.contains(&key) {
            tracing::debug!(number, pair, "link already announced this run");
            return Ok(false);
        }
        let existing = self
            .host
            .list_issue_comments(number)
            .await
            .with_context(|| format!("failed to list comments on #{number}"))?;
        if comments_contain_marker(&existing, marker) {
            tracing::debug!(number, marker, "triage comment already present");
            posted.insert(key);
            return Ok(false);
        }
        let comment_id = self
            .host
            .create_issue_comment(number, body)
            .await
            .with_context(|| format!("failed to post comment on #{number}"))?;
        posted.insert(key);
        tracing::info!(number, comment_id, marker, "posted triage comment");
        Ok(true)
    }

    async fn apply_duplicate_label(
        &self,
        item: &TriageItem,
        targets: &[SimilarItem],
        repository_labels: &[GithubLabel],
        stage: &mut DedupeStage,
    ) {
        let Some(label) = self.config.duplicate_label.as_deref() else {
            return;
        };
        let labels = filter_existing_labels([label], repository_labels);
        if labels.is_empty() {
            tracing::debug!(label, "duplicate label does not exist in repository");
            return;
        }
        let numbers = std::iter::once(item.number()).chain(targets.iter().map(|target| target.number));
        let mut labeled = self.duplicate_labeled.lock().await;
        for number in numbers {
            if !labeled.contains(&number) {
                if let Err(error) = self.host.add_labels(number, &labels).await {
                    tracing::warn!(number, error = %format!("{error:#}"), "failed to apply duplicate label");
                    stage.failures.push(item_failure(item, "labels", &error));
                    continue;
                }
                labeled.insert(number);
            }
            if number == item.number() {
                stage.applied_labels.extend(labels.iter().cloned());
            }
        }
    }

    async fn review_pull_request(&self, item: &TriageItem) -> Result<Option<ReviewSummary>> {
        if item.item_type() != ItemType::PullRequest {
            return Ok(None);
        }
        let number = item.number();
        let (diff, files) = tokio::join!(
            self.host.get_pull_request_diff(number),
            self.host.list_pull_request_files(number),
        );
        let diff = diff.with_context(|| format!("failed to fetch diff for pull request #{number}"))?;
        let files = files
            .with_context(|| format!("failed to list files for pull request #{number}"))?
            .into_iter()
            .map(|file| file.filename)
            .collect::<Vec<_>>();
        let review = self.judge.review_pull_request(item, &diff, &files).await?;
        Ok(Some(review))
    }

    async fn suggest_labels(&self, item: &TriageItem, repository_labels: &[GithubLabel]) -> LabelStage {
        let mut stage = LabelStage::default();
        let available = repository_labels
            .iter()
            .map(|label| label.name.clone())
            .collect::<Vec<_>>();
        let suggestion = match self.judge.suggest_labels(item, &available).await {
            Ok(suggestion) => suggestion,
            Err(error) => {
                tracing::warn!(error = %format!("{error:#}"), "label suggestion failed");
                stage.failures.push(item_failure(item, "labels", &error));
                return stage;
            }
        };
        if self.config.apply_labels {
            let labels = filter_existing_labels(
                suggestion.labels.iter().map(String::as_str),
                repository_labels,
            );
            if !labels.is_empty() {
                match self.host.add_labels(item.number(), &labels).await {
                    Ok(()) => {
                        tracing::info!(number = item.number(), labels = ?labels, "applied labels");
                        stage.applied_labels = labels;
                    }
                    Err(error) => {
                        tracing::warn!(error = %format!("{error:#}"), "failed to apply labels");
                        stage.failures.push(item_failure(item, "labels", &error));
                    }
                }
            }
        }
        stage.suggestion = Some(suggestion);
        stage
    }
}
