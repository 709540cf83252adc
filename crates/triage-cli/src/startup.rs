use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use triage_ai::{OpenAiAuthScheme, OpenAiClient, OpenAiConfig};
use triage_dedupe::{DedupeConfig, DuplicateClassifier, ItemEmbedder, JudgmentClient};
use triage_github::{GithubApiClient, GithubApiClientConfig, RepoRef};
use triage_runtime::{BacklogReport, ReportFormat, TriageRuntime, TriageRuntimeConfig};
use triage_vector::{SqliteVectorStore, VectorStore, VolatileVectorStore};

use crate::cli_args::Cli;
use crate::cli_types::{CliTriageMode, CliVectorBackend};

const RETRY_BUDGET_MS: u64 = 60_000;

pub(crate) fn build_dedupe_config(cli: &Cli) -> Result<DedupeConfig> {
    if cli.related_threshold > cli.duplicate_threshold {
        bail!(
            "--related-threshold ({}) must not exceed --duplicate-threshold ({})",
            cli.related_threshold,
            cli.duplicate_threshold
        );
    }
    Ok(DedupeConfig {
        search_threshold: cli.search_threshold,
        related_threshold: cli.related_threshold,
        duplicate_threshold: cli.duplicate_threshold,
        candidate_limit: cli.candidate_limit,
        judge_candidate_limit: cli.judge_candidate_limit,
    })
}

pub(crate) fn build_runtime_config(cli: &Cli) -> Result<TriageRuntimeConfig> {
    let vision_document = match &cli.vision_document {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read vision document {}", path.display()))?;
            (!text.trim().is_empty()).then_some(text)
        }
        None => None,
    };
    Ok(TriageRuntimeConfig {
        repository: cli.repo.trim().to_string(),
        post_comments: cli.post_comments,
        apply_labels: cli.apply_labels,
        duplicate_label: cli
            .duplicate_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string),
        vision_document,
        soft_deadline: Duration::from_secs(cli.soft_deadline_seconds),
        backlog_limit: cli.backlog_limit,
    })
}

/// Opens and initializes the configured embedding cache.
pub(crate) fn build_vector_store(cli: &Cli) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match cli.vector_backend {
        CliVectorBackend::Memory => {
            let store = VolatileVectorStore::new();
            store.initialize().context("failed to initialize memory vector store")?;
            Arc::new(store)
        }
        CliVectorBackend::Sqlite => {
            let path = cli.sqlite_path.display();
            let store = SqliteVectorStore::open(&cli.sqlite_path)
                .with_context(|| format!("failed to open vector store {path}"))?;
            store
                .initialize()
                .with_context(|| format!("failed to initialize vector store {path}"))?;
            store
                .bind_repository(&cli.repo)
                .with_context(|| format!("vector store {path} cannot serve {}", cli.repo))?;
            Arc::new(store)
        }
    };
    Ok(store)
}

fn build_runtime(cli: &Cli, store: Arc<dyn VectorStore>) -> Result<TriageRuntime> {
    let repo = RepoRef::parse(&cli.repo)?;
    let github = GithubApiClient::new(GithubApiClientConfig {
        api_base: cli.github_api_base.clone(),
        token: cli.github_token.clone(),
        repo,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    let provider = Arc::new(
        OpenAiClient::new(OpenAiConfig {
            api_base: cli.model_api_base.clone(),
            api_key: cli.model_api_key.clone(),
            organization: None,
            request_timeout_ms: cli.request_timeout_ms,
            max_retries: cli.retry_max_attempts.saturating_sub(1),
            retry_budget_ms: RETRY_BUDGET_MS,
            retry_jitter: true,
            auth_scheme: OpenAiAuthScheme::Bearer,
        })
        .context("failed to create model provider client")?,
    );
    let judge = Arc::new(JudgmentClient::new(
        provider.clone(),
        cli.chat_model.clone(),
        cli.judgment_max_retries,
    ));
    let classifier = DuplicateClassifier::new(
        ItemEmbedder::new(
            provider,
            cli.embedding_model.clone(),
            Some(cli.embedding_dimensions),
        ),
        store,
        judge.clone(),
        build_dedupe_config(cli)?,
    );
    Ok(TriageRuntime::new(
        Arc::new(github),
        classifier,
        judge,
        build_runtime_config(cli)?,
    ))
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let store = build_vector_store(&cli)?;
    let runtime = build_runtime(&cli, store.clone())?;
    let format = ReportFormat::from(cli.report_format);

    let result = match cli.mode {
        CliTriageMode::Backlog => runtime
            .run_backlog()
            .await
            .and_then(|report| report.render(format)),
        CliTriageMode::Item => {
            let number = cli
                .item_number
                .context("--item-number is required for --mode item")?;
            match runtime.triage_item(cli.item_type.into(), number).await {
                Ok(item) => match format {
                    ReportFormat::Json => serde_json::to_string_pretty(&item)
                        .context("failed to encode item report"),
                    ReportFormat::Markdown => {
                        let mut report = BacklogReport::new(runtime.config().repository.clone());
                        report.failures = item.failures.clone();
                        report.entries.push(item.to_entry());
                        Ok(report.render_markdown())
                    }
                },
                Err(error) => Err(error),
            }
        }
    };

    if let Err(error) = store.close() {
        tracing::warn!(%error, "failed to close vector store");
    }
    println!("{}", result?);
    Ok(())
}
