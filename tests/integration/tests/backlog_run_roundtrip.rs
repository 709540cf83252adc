use std::sync::Arc;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use triage_ai::{
    ChatRequest, ChatResponse, ChatUsage, EmbeddingClient, EmbeddingRequest, EmbeddingResponse,
    LlmClient, Message, TriageAiError,
};
use triage_dedupe::{DedupeConfig, DuplicateClassifier, ItemEmbedder, JudgmentClient};
use triage_github::{GithubApiClient, GithubApiClientConfig, RepoRef};
use triage_runtime::{EntryStatus, TriageRuntime, TriageRuntimeConfig};
use triage_vector::{SqliteVectorStore, VectorStore};

/// Answers each judgment by its system prompt and the item under review.
/// The first duplicate judgment for issue #2 is truncated to force a retry.
struct RoutingModelClient {
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl RoutingModelClient {
    fn new() -> Self {
        Self {
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    async fn duplicate_requests_for(&self, marker: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| {
                request.messages[0].content.contains("CANDIDATE")
                    && request.messages[1].content.starts_with(marker)
            })
            .count()
    }
}

#[async_trait]
impl LlmClient for RoutingModelClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, TriageAiError> {
        let system = request.messages[0].content.clone();
        let user = request.messages[1].content.clone();
        let mut requests = self.requests.lock().await;
        let earlier_issue_two = requests
            .iter()
            .filter(|seen| seen.messages[1].content.starts_with("NEW (issue #2)"))
            .count();
        requests.push(request);

        let reply = if system.contains("CANDIDATE") {
            if user.starts_with("NEW (issue #1)") {
                "Here is my assessment:\n```json\n{\"isDuplicate\": true, \"similarItems\": [{\"number\": 2, \"title\": \"Saving a file crashes the app\", \"url\": \"\", \"similarity\": 92}], \"reasoning\": \"Both describe the save crash.\"}\n```".to_string()
            } else if earlier_issue_two == 0 {
                "{\"isDuplicate\": true, \"similarItems\": [{\"number\": 1".to_string()
            } else {
                "{\"isDuplicate\": true, \"similarItems\": [{\"number\": 1, \"similarity\": 0.97}], \"reasoning\": \"Same stack trace.\"}".to_string()
            }
        } else if system.contains("AVAILABLE") {
            if user.contains("ITEM (issue #3)") {
                "{\"labels\": [], \"reasoning\": \"docs only\"}".to_string()
            } else {
                "{\"labels\": [\"Bug\", \"made-up\"], \"reasoning\": \"crash\"}".to_string()
            }
        } else if system.contains("vision") {
            "{\"fit\": \"aligned\", \"score\": 0.9, \"concerns\": [], \"recommendation\": \"keep\"}"
                .to_string()
        } else {
            return Err(TriageAiError::InvalidResponse(format!(
                "unexpected prompt: {system}"
            )));
        };
        Ok(ChatResponse {
            message: Message::assistant_text(reply),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        })
    }
}

/// Save-related text shares one direction; everything else is orthogonal.
struct KeywordEmbeddings;

#[async_trait]
impl EmbeddingClient for KeywordEmbeddings {
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, TriageAiError> {
        let vectors = request
            .inputs
            .iter()
            .map(|text| {
                if text.to_ascii_lowercase().contains("sav") {
                    vec![1.0, 0.2, 0.0]
                } else {
                    vec![0.0, 0.0, 1.0]
                }
            })
            .collect();
        Ok(EmbeddingResponse {
            vectors,
            usage: ChatUsage::default(),
        })
    }
}

fn issue_json(number: u64, title: &str) -> Value {
    json!({
        "number": number,
        "title": title,
        "body": format!("Report body for {title}"),
        "state": "open",
        "html_url": format!("https://github.com/acme/widgets/issues/{number}"),
        "created_at": "2026-09-01T12:00:00Z",
        "user": { "login": "octo" },
        "labels": []
    })
}

#[tokio::test]
async fn integration_backlog_run_links_duplicates_labels_and_ranks() {
    let server = MockServer::start();
    let issues = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/issues")
            .query_param("state", "open");
        then.status(200).json_body(json!([
            issue_json(1, "Crash when saving a file"),
            issue_json(2, "Saving a file crashes the app"),
            issue_json(3, "Typo in README"),
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/pulls");
        then.status(200).json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/labels");
        then.status(200)
            .json_body(json!([{ "name": "bug" }, { "name": "duplicate" }]));
    });
    for number in 1..=3 {
        server.mock(move |when, then| {
            when.method(GET)
                .path(format!("/repos/acme/widgets/issues/{number}/comments"));
            then.status(200).json_body(json!([]));
        });
    }
    let comment_mocks = (1..=3)
        .map(|number| {
            server.mock(move |when, then| {
                when.method(POST)
                    .path(format!("/repos/acme/widgets/issues/{number}/comments"))
                    .body_includes("backlog-triage:duplicate:issue-1:2");
                then.status(201).json_body(json!({ "id": 100 + number }));
            })
        })
        .collect::<Vec<_>>();
    let bug_label_mocks = (1..=3)
        .map(|number| {
            server.mock(move |when, then| {
                when.method(POST)
                    .path(format!("/repos/acme/widgets/issues/{number}/labels"))
                    .json_body(json!({ "labels": ["bug"] }));
                then.status(200).json_body(json!([{ "name": "bug" }]));
            })
        })
        .collect::<Vec<_>>();
    let duplicate_label_mocks = (1..=2)
        .map(|number| {
            server.mock(move |when, then| {
                when.method(POST)
                    .path(format!("/repos/acme/widgets/issues/{number}/labels"))
                    .json_body(json!({ "labels": ["duplicate"] }));
                then.status(200).json_body(json!([{ "name": "duplicate" }]));
            })
        })
        .collect::<Vec<_>>();

    let github = GithubApiClient::new(GithubApiClientConfig {
        api_base: server.base_url(),
        token: "test-token".to_string(),
        repo: RepoRef::parse("acme/widgets").expect("repo"),
        request_timeout_ms: 5_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("github client");

    let workspace = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(
        SqliteVectorStore::open(&workspace.path().join("vectors.sqlite")).expect("open store"),
    );
    store.initialize().expect("initialize store");

    let model = Arc::new(RoutingModelClient::new());
    let judge = Arc::new(JudgmentClient::new(model.clone(), "test-chat", 2));
    let classifier = DuplicateClassifier::new(
        ItemEmbedder::new(Arc::new(KeywordEmbeddings), "test-embedding", Some(3)),
        store.clone(),
        judge.clone(),
        DedupeConfig::default(),
    );
    let runtime = TriageRuntime::new(
        Arc::new(github),
        classifier,
        judge,
        TriageRuntimeConfig {
            repository: "acme/widgets".to_string(),
            post_comments: true,
            apply_labels: true,
            duplicate_label: Some("Duplicate".to_string()),
            vision_document: Some("Make saving reliable.".to_string()),
            ..TriageRuntimeConfig::default()
        },
    );

    let report = runtime.run_backlog().await.expect("backlog run");

    issues.assert();
    assert!(report.failures.is_empty(), "failures: {:?}", report.failures);
    let ranked = report
        .entries
        .iter()
        .map(|entry| (entry.number, entry.dedupe_status, entry.score))
        .collect::<Vec<_>>();
    assert_eq!(
        ranked,
        vec![
            (2, EntryStatus::Duplicate, 89),
            (1, EntryStatus::Duplicate, 88),
            (3, EntryStatus::Distinct, 5),
        ]
    );
    assert_eq!(report.entries[1].matched_numbers, vec![2]);
    assert_eq!(
        report.entries[2].reasons,
        vec!["No duplicate overlap detected", "Aligns with vision goals"]
    );

    // The pair is announced once on each side; the reverse pass from #2 posts nothing.
    comment_mocks[0].assert_hits(1);
    comment_mocks[1].assert_hits(1);
    comment_mocks[2].assert_hits(0);
    bug_label_mocks[0].assert_hits(1);
    bug_label_mocks[1].assert_hits(1);
    bug_label_mocks[2].assert_hits(0);
    duplicate_label_mocks[0].assert_hits(1);
    duplicate_label_mocks[1].assert_hits(1);

    // Issue #2 found #1 through the persistent index; its first answer was
    // truncated and retried.
    assert_eq!(model.duplicate_requests_for("NEW (issue #2)").await, 2);
    assert_eq!(model.duplicate_requests_for("NEW (issue #1)").await, 1);
    assert!(store.get_embedding("issue-3").expect("read").is_some());

    let markdown = report.render_markdown();
    assert!(markdown.contains("| 1 | [issue #2]("));
    assert!(markdown.contains("| duplicate | 89 | #1 |"));
}
