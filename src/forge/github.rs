//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Design
//!
//! Review requests are pull requests. Status is derived from two calls: the
//! pull request itself (merged/closed/draft) and its reviews (the latest
//! review per reviewer decides approval; any outstanding change request
//! keeps it open). Reviews are read page by page, following the `Link`
//! header, so long review histories are not cut off.
//!
//! Every request carries the client-wide timeout. A timed-out request maps
//! to [`ForgeError::Timeout`], which callers treat as transient.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. Backoff is the
//! caller's responsibility (see [`super::retry`]).
//!
//! # Example
//!
//! ```ignore
//! use gflow::forge::github::GitHubForge;
//! use gflow::forge::{Forge, ReviewTarget};
//! use std::time::Duration;
//!
//! let forge = GitHubForge::new("ghp_xxx", "octocat", "hello-world", Duration::from_secs(30))?;
//! let review = forge.create_or_update(ReviewTarget::new("part-1", "main", "Part 1")).await?;
//! println!("#{} {}", review.number, review.url);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::{Forge, ForgeError, MergeMethod, ReviewRequest, ReviewStatus, ReviewTarget};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "gflow-cli";

/// Upper bound on pages read from one list endpoint.
const MAX_PAGES: usize = 50;

/// GitHub forge implementation.
pub struct GitHubForge {
    client: Client,
    token: String,
    /// Repository owner (user or organization)
    owner: String,
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GitHubForge {
    /// Create a forge for `owner/repo` whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// `NetworkError` if the HTTP client cannot be built (TLS backend failure).
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ForgeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the forge at a different API base (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    fn map_transport(err: reqwest::Error) -> ForgeError {
        if err.is_timeout() {
            ForgeError::Timeout(err.to_string())
        } else {
            ForgeError::NetworkError(err.to_string())
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ForgeError> {
        request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(Self::map_transport)
    }

    /// Send and decode a JSON response, mapping error statuses.
    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ForgeError> {
        let response = self.send(request).await?;
        let status = response.status();
        Self::decode(response, status).await
    }

    /// Send a GET and collect every page of a JSON list.
    async fn get_all<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
    ) -> Result<Vec<T>, ForgeError> {
        let mut items = Vec::new();
        let mut request = self.client.get(url).query(&[("per_page", "100")]);

        for page in 1..=MAX_PAGES {
            let response = self.send(request).await?;
            let status = response.status();
            let next = next_page(response.headers());
            let batch: Vec<T> = Self::decode(response, status).await?;
            items.extend(batch);

            match next {
                Some(url) => {
                    debug!(page, "following next page");
                    request = self.client.get(url);
                }
                None => return Ok(items),
            }
        }
        debug!(pages = MAX_PAGES, "page limit reached");
        Ok(items)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: Response,
        status: StatusCode,
    ) -> Result<T, ForgeError> {
        if status.is_success() {
            response.json().await.map_err(|e| {
                if e.is_timeout() {
                    ForgeError::Timeout(e.to_string())
                } else {
                    ForgeError::ApiError {
                        status: status.as_u16(),
                        message: format!("failed to parse response: {e}"),
                    }
                }
            })
        } else {
            Err(Self::error_from_response(response, status).await)
        }
    }

    async fn error_from_response(response: Response, status: StatusCode) -> ForgeError {
        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("invalid or expired token".into()),
            StatusCode::FORBIDDEN if message.to_lowercase().contains("rate limit") => {
                ForgeError::RateLimited
            }
            StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("permission denied: {message}")),
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {message}"),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        }
    }

    async fn find_open_by_head(&self, head: &str) -> Result<Option<GitHubPullRequest>, ForgeError> {
        let url = self.repo_url("pulls");
        let head_param = format!("{}:{}", self.owner, head);
        let prs: Vec<GitHubPullRequest> = self
            .send_json(
                self.client
                    .get(&url)
                    .query(&[("head", head_param.as_str()), ("state", "open")]),
            )
            .await?;
        Ok(prs.into_iter().next())
    }

    async fn retarget(&self, number: u64, base: &str) -> Result<GitHubPullRequest, ForgeError> {
        let url = self.repo_url(&format!("pulls/{number}"));
        let body = UpdatePrBody {
            base: Some(base),
            state: None,
        };
        self.send_json(self.client.patch(&url).json(&body)).await
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn create_or_update(&self, target: ReviewTarget) -> Result<ReviewRequest, ForgeError> {
        let existing = match target.existing {
            Some(number) => Some(number),
            None => self.find_open_by_head(&target.head).await?.map(|pr| pr.number),
        };

        let pr = match existing {
            Some(number) => {
                debug!(number, base = %target.base, "updating pull request");
                self.retarget(number, &target.base).await?
            }
            None => {
                debug!(head = %target.head, base = %target.base, "creating pull request");
                let body = CreatePrBody {
                    head: &target.head,
                    base: &target.base,
                    title: &target.title,
                    body: target.body.as_deref(),
                    draft: target.draft,
                };
                self.send_json(self.client.post(self.repo_url("pulls")).json(&body))
                    .await?
            }
        };

        Ok(pr.into())
    }

    async fn status(&self, number: u64) -> Result<ReviewStatus, ForgeError> {
        let pr: GitHubPullRequest = self
            .send_json(self.client.get(self.repo_url(&format!("pulls/{number}"))))
            .await?;

        if pr.merged.unwrap_or(false) {
            return Ok(ReviewStatus::Merged);
        }
        if pr.state == "closed" {
            return Ok(ReviewStatus::Closed);
        }
        if pr.draft {
            return Ok(ReviewStatus::Open);
        }

        let reviews: Vec<GitHubReview> = self
            .get_all(&self.repo_url(&format!("pulls/{number}/reviews")))
            .await?;

        Ok(review_decision(&reviews))
    }

    async fn merge(&self, number: u64, method: MergeMethod) -> Result<(), ForgeError> {
        let url = self.repo_url(&format!("pulls/{number}/merge"));
        let body = MergePrBody {
            merge_method: method.as_str(),
        };

        let response = self.send(self.client.put(&url).json(&body)).await?;
        let status = response.status();

        if status.is_success() {
            let result: GitHubMergeResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ForgeError::ApiError {
                        status: status.as_u16(),
                        message: format!("failed to parse response: {e}"),
                    })?;
            return if result.merged {
                Ok(())
            } else {
                Err(ForgeError::MergeRejected(result.message))
            };
        }

        // 405: not mergeable (checks, conflicts); 409: head moved
        match Self::error_from_response(response, status).await {
            ForgeError::ApiError { status, message } if status == 405 || status == 409 => {
                Err(ForgeError::MergeRejected(message))
            }
            other => Err(other),
        }
    }

    async fn close(&self, number: u64) -> Result<(), ForgeError> {
        let url = self.repo_url(&format!("pulls/{number}"));
        let body = UpdatePrBody {
            base: None,
            state: Some("closed"),
        };
        let _: GitHubPullRequest = self.send_json(self.client.patch(&url).json(&body)).await?;
        Ok(())
    }
}

/// Approval from the latest non-comment review of each reviewer.
/// URL of the `rel="next"` entry in a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (url, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                url.trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

fn review_decision(reviews: &[GitHubReview]) -> ReviewStatus {
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for review in reviews {
        let Some(user) = review.user.as_ref() else {
            continue;
        };
        match review.state.as_str() {
            "APPROVED" | "CHANGES_REQUESTED" | "DISMISSED" => {
                latest.insert(user.login.as_str(), review.state.as_str());
            }
            _ => {}
        }
    }

    if latest.values().any(|s| *s == "CHANGES_REQUESTED") {
        ReviewStatus::Open
    } else if latest.values().any(|s| *s == "APPROVED") {
        ReviewStatus::Approved
    } else {
        ReviewStatus::Open
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
}

#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

#[derive(Serialize)]
struct MergePrBody<'a> {
    merge_method: &'a str,
}

#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubMergeResponse {
    merged: bool,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    draft: bool,
    head: GitHubRef,
    base: GitHubRef,
    merged: Option<bool>,
}

#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GitHubReview {
    user: Option<GitHubUser>,
    state: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    login: String,
}

impl From<GitHubPullRequest> for ReviewRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        ReviewRequest {
            number: pr.number,
            url: pr.html_url,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
        }
    }
}

// --------------------------------------------------------------------------
// URL Parsing
// --------------------------------------------------------------------------

/// Parse a GitHub remote URL to extract owner and repo.
///
/// Supports both SSH and HTTPS formats:
/// - `git@github.com:owner/repo.git`
/// - `ssh://git@github.com/owner/repo.git`
/// - `https://github.com/owner/repo.git`
///
/// # Example
///
/// ```
/// use gflow::forge::github::parse_github_url;
///
/// let (owner, repo) = parse_github_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// assert!(parse_github_url("https://gitlab.com/a/b").is_none());
/// ```
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("git@github.com:")
        .or_else(|| url.strip_prefix("ssh://git@github.com/"))
        .or_else(|| url.strip_prefix("https://github.com/"))
        .or_else(|| url.strip_prefix("http://github.com/"))?;

    let rest = rest.trim_end_matches('/');
    let rest = rest.strip_suffix(".git").unwrap_or(rest);
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}
