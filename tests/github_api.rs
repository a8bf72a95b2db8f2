//! Integration tests for the GitHub forge using wiremock.
//!
//! Covers the REST mapping of the four review operations:
//! - create vs. re-target in `create_or_update`
//! - status from the pull request and its reviews, across pages
//! - merge results and rejections
//! - error classification (auth, rate limit, server errors)

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gflow::forge::github::GitHubForge;
use gflow::forge::{Forge, ForgeError, MergeMethod, ReviewStatus, ReviewTarget};

const TOKEN: &str = "ghp_test_token";

fn forge(server: &MockServer) -> GitHubForge {
    GitHubForge::new(TOKEN, "octo", "repo", Duration::from_secs(5))
        .expect("failed to build client")
        .with_api_base(server.uri())
}

fn pr(number: u64, head: &str, base: &str, state: &str, merged: bool) -> Value {
    json!({
        "number": number,
        "html_url": format!("https://github.com/octo/repo/pull/{number}"),
        "state": state,
        "draft": false,
        "head": { "ref": head },
        "base": { "ref": base },
        "merged": merged,
    })
}

fn review(login: &str, state: &str) -> Value {
    json!({ "user": { "login": login }, "state": state })
}

// =============================================================================
// create_or_update
// =============================================================================

#[tokio::test]
async fn creates_pull_request_when_none_is_open() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls"))
        .and(query_param("head", "octo:feature"))
        .and(query_param("state", "open"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/octo/repo/pulls"))
        .and(body_partial_json(json!({
            "head": "feature",
            "base": "main",
            "title": "Add feature",
            "draft": true,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(pr(12, "feature", "main", "open", false)))
        .expect(1)
        .mount(&server)
        .await;

    let review = forge(&server)
        .create_or_update(ReviewTarget::new("feature", "main", "Add feature").with_draft(true))
        .await
        .unwrap();

    assert_eq!(review.number, 12);
    assert_eq!(review.url, "https://github.com/octo/repo/pull/12");
    assert_eq!(review.base, "main");
}

#[tokio::test]
async fn retargets_open_pull_request_found_by_head() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([pr(7, "b", "main", "open", false)])),
        )
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/repos/octo/repo/pulls/7"))
        .and(body_partial_json(json!({ "base": "a" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(7, "b", "a", "open", false)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/repos/octo/repo/pulls"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let review = forge(&server)
        .create_or_update(ReviewTarget::new("b", "a", "B"))
        .await
        .unwrap();
    assert_eq!(review.number, 7);
    assert_eq!(review.base, "a");
}

#[tokio::test]
async fn known_number_skips_lookup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/repos/octo/repo/pulls/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(3, "c", "main", "open", false)))
        .expect(1)
        .mount(&server)
        .await;

    let review = forge(&server)
        .create_or_update(ReviewTarget::new("c", "main", "C").with_existing(Some(3)))
        .await
        .unwrap();
    assert_eq!(review.number, 3);
}

// =============================================================================
// status
// =============================================================================

#[tokio::test]
async fn merged_pull_request_is_merged() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(5, "a", "main", "closed", true)))
        .mount(&server)
        .await;

    assert_eq!(forge(&server).status(5).await.unwrap(), ReviewStatus::Merged);
}

#[tokio::test]
async fn closed_pull_request_is_closed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(5, "a", "main", "closed", false)))
        .mount(&server)
        .await;

    assert_eq!(forge(&server).status(5).await.unwrap(), ReviewStatus::Closed);
}

#[tokio::test]
async fn approval_comes_from_reviews() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(5, "a", "main", "open", false)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            review("alice", "CHANGES_REQUESTED"),
            review("bob", "COMMENTED"),
            review("alice", "APPROVED"),
        ])))
        .mount(&server)
        .await;

    assert_eq!(forge(&server).status(5).await.unwrap(), ReviewStatus::Approved);
}

#[tokio::test]
async fn outstanding_change_request_is_open() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(5, "a", "main", "open", false)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            review("alice", "APPROVED"),
            review("bob", "CHANGES_REQUESTED"),
        ])))
        .mount(&server)
        .await;

    assert_eq!(forge(&server).status(5).await.unwrap(), ReviewStatus::Open);
}

#[tokio::test]
async fn reviews_are_read_across_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(5, "a", "main", "open", false)))
        .mount(&server)
        .await;

    // The approval that settles it only appears on the second page.
    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5/reviews"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([review("alice", "APPROVED")])),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    let next = format!(
        r#"<{}/repos/octo/repo/pulls/5/reviews?per_page=100&page=2>; rel="next""#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/5/reviews"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!([review("alice", "CHANGES_REQUESTED")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(forge(&server).status(5).await.unwrap(), ReviewStatus::Approved);
}

// =============================================================================
// merge / close
// =============================================================================

#[tokio::test]
async fn merge_sends_method() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/repos/octo/repo/pulls/9/merge"))
        .and(body_partial_json(json!({ "merge_method": "rebase" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "merged": true, "message": "ok" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    forge(&server).merge(9, MergeMethod::Rebase).await.unwrap();
}

#[tokio::test]
async fn unmergeable_is_rejected_not_transient() {
    for status in [405u16, 409] {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/repos/octo/repo/pulls/9/merge"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(json!({ "message": "Pull Request is not mergeable" })),
            )
            .mount(&server)
            .await;

        let err = forge(&server)
            .merge(9, MergeMethod::Squash)
            .await
            .unwrap_err();
        assert!(
            matches!(err, ForgeError::MergeRejected(ref m) if m.contains("not mergeable")),
            "status {status}: {err:?}"
        );
        assert!(!err.is_transient());
    }
}

#[tokio::test]
async fn close_patches_state() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/repos/octo/repo/pulls/4"))
        .and(body_partial_json(json!({ "state": "closed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(pr(4, "x", "main", "closed", false)))
        .expect(1)
        .mount(&server)
        .await;

    forge(&server).close(4).await.unwrap();
}

// =============================================================================
// error classification
// =============================================================================

#[tokio::test]
async fn error_statuses_are_classified() {
    let cases: [(u16, &str, fn(&ForgeError) -> bool, bool); 4] = [
        (401, "Bad credentials", |e| matches!(e, ForgeError::AuthFailed(_)), false),
        (403, "API rate limit exceeded", |e| matches!(e, ForgeError::RateLimited), true),
        (404, "Not Found", |e| matches!(e, ForgeError::NotFound(_)), false),
        (502, "Bad Gateway", |e| matches!(e, ForgeError::ApiError { status: 502, .. }), true),
    ];

    for (status, message, expected, transient) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/repo/pulls/1"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "message": message })))
            .mount(&server)
            .await;

        let err = forge(&server).status(1).await.unwrap_err();
        assert!(expected(&err), "status {status}: {err:?}");
        assert_eq!(err.is_transient(), transient, "status {status}");
    }
}

#[tokio::test]
async fn slow_host_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/repo/pulls/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(pr(1, "a", "main", "open", false))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let forge = GitHubForge::new(TOKEN, "octo", "repo", Duration::from_millis(200))
        .unwrap()
        .with_api_base(server.uri());
    let err = forge.status(1).await.unwrap_err();
    assert!(matches!(err, ForgeError::Timeout(_)), "{err:?}");
    assert!(err.is_transient());
}
