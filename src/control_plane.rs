//! Client for the control-plane API that issues git credentials and opens
//! pull requests on a session's behalf.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::git::{DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME};
use crate::{AppError, Result};

/// Username paired with a token when the control plane issues none.
pub const DEFAULT_TOKEN_USERNAME: &str = "oauth2";

/// Git credentials and identities issued for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GitCredentials {
    /// Access token used for clone and push.
    pub token: String,
    /// Username paired with the token.
    #[serde(default)]
    pub username: Option<String>,
    /// Commit author name.
    #[serde(default)]
    pub author_name: Option<String>,
    /// Commit author email.
    #[serde(default)]
    pub author_email: Option<String>,
    /// Co-author credited in commit trailers.
    #[serde(default)]
    pub co_author_name: Option<String>,
    /// Co-author email.
    #[serde(default)]
    pub co_author_email: Option<String>,
}

impl GitCredentials {
    /// Commit identity, falling back to the built-in one for missing parts.
    #[must_use]
    pub fn author(&self) -> (&str, &str) {
        (
            non_empty_or(self.author_name.as_deref(), DEFAULT_AUTHOR_NAME),
            non_empty_or(self.author_email.as_deref(), DEFAULT_AUTHOR_EMAIL),
        )
    }

    /// Username for HTTPS token authentication.
    #[must_use]
    pub fn token_username(&self) -> &str {
        non_empty_or(self.username.as_deref(), DEFAULT_TOKEN_USERNAME)
    }

    /// `Co-authored-by` trailer when a full co-author identity is present.
    #[must_use]
    pub fn co_author_trailer(&self) -> Option<String> {
        match (&self.co_author_name, &self.co_author_email) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => {
                Some(format!("Co-authored-by: {name} <{email}>"))
            }
            _ => None,
        }
    }
}

fn non_empty_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value.filter(|v| !v.is_empty()).unwrap_or(fallback)
}

/// Pull-request creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestRequest {
    /// PR title.
    pub title: String,
    /// PR description.
    pub body: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
}

/// Pull-request creation result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestResponse {
    /// Web URL of the pull request.
    #[serde(default)]
    pub url: Option<String>,
    /// `"created"` or `"existed"`.
    #[serde(default)]
    pub status: Option<String>,
}

impl PullRequestResponse {
    /// Whether the PR already existed before this request.
    #[must_use]
    pub fn already_existed(&self) -> bool {
        self.status.as_deref() == Some("existed")
    }
}

/// Control-plane operations the worker and handlers depend on.
pub trait ControlPlane: Send + Sync {
    /// Fetch the git credentials of a session; `None` when none are issued.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ControlPlane` on transport or server errors.
    fn git_credentials<'a>(
        &'a self,
        session_id: &'a str,
        worker_token: &'a str,
    ) -> BoxFuture<'a, Result<Option<GitCredentials>>>;

    /// Open a pull request for a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ControlPlane` on transport or server errors.
    fn open_pull_request<'a>(
        &'a self,
        session_id: &'a str,
        worker_token: &'a str,
        request: &'a PullRequestRequest,
    ) -> BoxFuture<'a, Result<PullRequestResponse>>;
}

/// HTTP implementation of [`ControlPlane`].
pub struct HttpControlPlane {
    http: Client,
    base_url: String,
}

impl HttpControlPlane {
    /// Create a client for the API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ControlPlane` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn session_url(&self, session_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/v1/internal/sessions/{session_id}/{suffix}",
            self.base_url
        )
    }
}

impl ControlPlane for HttpControlPlane {
    fn git_credentials<'a>(
        &'a self,
        session_id: &'a str,
        worker_token: &'a str,
    ) -> BoxFuture<'a, Result<Option<GitCredentials>>> {
        Box::pin(async move {
            let response = self
                .http
                .get(self.session_url(session_id, "git-credentials"))
                .bearer_auth(worker_token)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
                debug!(session_id, %status, "no git credentials issued");
                return Ok(None);
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(AppError::ControlPlane(format!(
                    "credential request failed with {status}: {text}"
                )));
            }
            Ok(Some(response.json().await?))
        })
    }

    fn open_pull_request<'a>(
        &'a self,
        session_id: &'a str,
        worker_token: &'a str,
        request: &'a PullRequestRequest,
    ) -> BoxFuture<'a, Result<PullRequestResponse>> {
        Box::pin(async move {
            let response = self
                .http
                .post(self.session_url(session_id, "pr"))
                .bearer_auth(worker_token)
                .json(request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(AppError::ControlPlane(format!(
                    "pull request creation failed with {status}: {text}"
                )));
            }
            Ok(response.json().await?)
        })
    }
}
