use httpmock::prelude::*;
use serde_json::json;
use triage_github::{GithubApiClient, GithubApiClientConfig, RepoRef, TriageHost};

fn test_client(base_url: &str) -> GithubApiClient {
    GithubApiClient::new(GithubApiClientConfig {
        api_base: base_url.to_string(),
        token: "test-token".to_string(),
        repo: RepoRef::parse("acme/widgets").expect("repo"),
        request_timeout_ms: 5_000,
        retry_max_attempts: 2,
        retry_base_delay_ms: 1,
    })
    .expect("github client")
}

fn issue_json(number: u64, pull_request: bool) -> serde_json::Value {
    let mut value = json!({
        "number": number,
        "title": format!("item {number}"),
        "body": "body",
        "state": "open",
        "html_url": format!("https://github.com/acme/widgets/issues/{number}"),
        "created_at": "2026-01-01T00:00:00Z",
        "user": { "login": "octo" },
        "labels": []
    });
    if pull_request {
        value["pull_request"] = json!({ "url": "https://api.github.com/pulls/1" });
    }
    value
}

#[tokio::test]
async fn integration_issue_listing_excludes_pull_requests() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/issues")
            .query_param("state", "open")
            .query_param("page", "1")
            .header("authorization", "Bearer test-token");
        then.status(200)
            .json_body(json!([issue_json(1, false), issue_json(2, true), issue_json(3, false)]));
    });

    let issues = test_client(&server.base_url())
        .list_open_issues(None)
        .await
        .expect("list issues");

    mock.assert();
    let numbers = issues.iter().map(|issue| issue.number).collect::<Vec<_>>();
    assert_eq!(numbers, vec![1, 3]);
}

#[tokio::test]
async fn integration_listing_paginates_until_short_page() {
    let server = MockServer::start();
    let first_page = (1..=100).map(|n| issue_json(n, false)).collect::<Vec<_>>();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/issues")
            .query_param("page", "1");
        then.status(200).json_body(json!(first_page));
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/issues")
            .query_param("page", "2");
        then.status(200).json_body(json!([issue_json(101, false)]));
    });

    let issues = test_client(&server.base_url())
        .list_open_issues(None)
        .await
        .expect("list issues");

    first.assert();
    second.assert();
    assert_eq!(issues.len(), 101);
}

#[tokio::test]
async fn integration_add_labels_with_empty_list_sends_nothing() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/repos/acme/widgets/issues/5/labels");
        then.status(200).json_body(json!([]));
    });

    let client = test_client(&server.base_url());
    TriageHost::add_labels(&client, 5, &[])
        .await
        .expect("empty add is a no-op");
    mock.assert_hits(0);

    TriageHost::add_labels(&client, 5, &["bug".to_string()])
        .await
        .expect("add label");
    mock.assert_hits(1);
}

#[tokio::test]
async fn integration_comment_creation_returns_comment_id() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/acme/widgets/issues/9/comments")
            .json_body(json!({ "body": "hello" }));
        then.status(201)
            .json_body(json!({ "id": 777, "html_url": "https://github.com/acme/widgets/issues/9#c" }));
    });

    let id = TriageHost::create_issue_comment(&test_client(&server.base_url()), 9, "hello")
        .await
        .expect("create comment");
    mock.assert();
    assert_eq!(id, 777);
}

#[tokio::test]
async fn integration_pull_request_diff_uses_diff_media_type() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/widgets/pulls/4")
            .header("accept", "application/vnd.github.v3.diff");
        then.status(200).body("diff --git a/x b/x\n");
    });

    let diff = test_client(&server.base_url())
        .get_pull_request_diff(4)
        .await
        .expect("diff");
    mock.assert();
    assert!(diff.starts_with("diff --git"));
}

#[tokio::test]
async fn regression_server_errors_retry_then_surface_status() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/repos/acme/widgets/labels");
        then.status(502).body("bad gateway");
    });

    let error = test_client(&server.base_url())
        .list_repository_labels()
        .await
        .expect_err("502 should fail");
    mock.assert_hits(2);
    assert!(error.to_string().contains("status 502"));
}
