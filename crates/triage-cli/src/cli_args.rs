use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::cli_types::{CliItemType, CliReportFormat, CliTriageMode, CliVectorBackend};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_unit_interval(value: &str) -> Result<f64, String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|error| format!("failed to parse float: {error}"))?;
    if !parsed.is_finite() || !(0.0..=1.0).contains(&parsed) {
        return Err("value must be a finite number in range 0..=1".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "backlog-triage",
    about = "Duplicate detection and priority scoring for GitHub issues and pull requests",
    version
)]
pub struct Cli {
    #[arg(
        long = "repo",
        env = "TRIAGE_REPO",
        help = "GitHub repository in owner/repo format"
    )]
    pub repo: String,

    #[arg(
        long = "github-api-base",
        env = "TRIAGE_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token used for API access"
    )]
    pub github_token: String,

    #[arg(
        long = "model-api-base",
        env = "TRIAGE_MODEL_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL of the OpenAI-compatible model API"
    )]
    pub model_api_base: String,

    #[arg(
        long = "model-api-key",
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for the model provider"
    )]
    pub model_api_key: String,

    #[arg(
        long = "chat-model",
        env = "TRIAGE_CHAT_MODEL",
        default_value = "gpt-4o-mini",
        help = "Chat model used for duplicate, review, label and vision judgments"
    )]
    pub chat_model: String,

    #[arg(
        long = "embedding-model",
        env = "TRIAGE_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small",
        help = "Embedding model used for neighbor search"
    )]
    pub embedding_model: String,

    #[arg(
        long = "embedding-dimensions",
        env = "TRIAGE_EMBEDDING_DIMENSIONS",
        default_value_t = 1536,
        value_parser = parse_positive_usize,
        help = "Expected embedding length; vectors of any other length are rejected"
    )]
    pub embedding_dimensions: usize,

    #[arg(
        long = "request-timeout-ms",
        env = "TRIAGE_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for GitHub and model requests"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "TRIAGE_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempts per HTTP request on retryable failures"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "TRIAGE_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "judgment-max-retries",
        env = "TRIAGE_JUDGMENT_MAX_RETRIES",
        default_value_t = 2,
        help = "Extra attempts for a judgment whose output is malformed before falling back"
    )]
    pub judgment_max_retries: usize,

    #[arg(
        long = "vector-backend",
        env = "TRIAGE_VECTOR_BACKEND",
        value_enum,
        default_value_t = CliVectorBackend::Memory,
        help = "Embedding cache: memory (per run, linear-scan search) or sqlite (persistent)"
    )]
    pub vector_backend: CliVectorBackend,

    #[arg(
        long = "sqlite-path",
        env = "TRIAGE_SQLITE_PATH",
        default_value = ".backlog-triage/vectors.sqlite",
        help = "SQLite file used by --vector-backend sqlite; bound to the first repository triaged with it, so use one file per repository"
    )]
    pub sqlite_path: PathBuf,

    #[arg(
        long = "search-threshold",
        env = "TRIAGE_SEARCH_THRESHOLD",
        default_value_t = 0.7,
        value_parser = parse_unit_interval,
        help = "Minimum cosine similarity for a neighbor to be considered"
    )]
    pub search_threshold: f64,

    #[arg(
        long = "related-threshold",
        env = "TRIAGE_RELATED_THRESHOLD",
        default_value_t = 0.75,
        value_parser = parse_unit_interval,
        help = "Minimum similarity for the related status"
    )]
    pub related_threshold: f64,

    #[arg(
        long = "duplicate-threshold",
        env = "TRIAGE_DUPLICATE_THRESHOLD",
        default_value_t = 0.85,
        value_parser = parse_unit_interval,
        help = "Minimum similarity for a judge-confirmed duplicate"
    )]
    pub duplicate_threshold: f64,

    #[arg(
        long = "candidate-limit",
        env = "TRIAGE_CANDIDATE_LIMIT",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Neighbors kept from the similarity search"
    )]
    pub candidate_limit: usize,

    #[arg(
        long = "judge-candidate-limit",
        env = "TRIAGE_JUDGE_CANDIDATE_LIMIT",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Open candidates sent to the duplicate judgment"
    )]
    pub judge_candidate_limit: usize,

    #[arg(
        long = "vision-document",
        env = "TRIAGE_VISION_DOCUMENT",
        help = "Path to a project vision document; enables vision alignment"
    )]
    pub vision_document: Option<PathBuf>,

    #[arg(
        long = "mode",
        env = "TRIAGE_MODE",
        value_enum,
        default_value_t = CliTriageMode::Backlog,
        help = "Triage one item or the whole open backlog"
    )]
    pub mode: CliTriageMode,

    #[arg(
        long = "item-number",
        env = "TRIAGE_ITEM_NUMBER",
        required_if_eq("mode", "item"),
        help = "Issue or pull request number for --mode item"
    )]
    pub item_number: Option<u64>,

    #[arg(
        long = "item-type",
        env = "TRIAGE_ITEM_TYPE",
        value_enum,
        default_value_t = CliItemType::Issue,
        help = "Kind of --item-number"
    )]
    pub item_type: CliItemType,

    #[arg(
        long = "backlog-limit",
        env = "TRIAGE_BACKLOG_LIMIT",
        value_parser = parse_positive_usize,
        help = "Cap on open issues and on open pull requests fetched in backlog mode"
    )]
    pub backlog_limit: Option<usize>,

    #[arg(
        long = "post-comments",
        env = "TRIAGE_POST_COMMENTS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Post duplicate and related comments on both linked items"
    )]
    pub post_comments: bool,

    #[arg(
        long = "apply-labels",
        env = "TRIAGE_APPLY_LABELS",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Apply suggested labels that already exist in the repository"
    )]
    pub apply_labels: bool,

    #[arg(
        long = "duplicate-label",
        env = "TRIAGE_DUPLICATE_LABEL",
        help = "Existing label added to both sides of a confirmed duplicate"
    )]
    pub duplicate_label: Option<String>,

    #[arg(
        long = "soft-deadline-seconds",
        env = "TRIAGE_SOFT_DEADLINE_SECONDS",
        default_value_t = 60,
        value_parser = parse_positive_u64,
        help = "Per-item time budget; overruns are logged"
    )]
    pub soft_deadline_seconds: u64,

    #[arg(
        long = "report-format",
        env = "TRIAGE_REPORT_FORMAT",
        value_enum,
        default_value_t = CliReportFormat::Markdown,
        help = "Output format of the triage report"
    )]
    pub report_format: CliReportFormat,
}
