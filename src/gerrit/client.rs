//! HTTP client for Gerrit's REST API.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::config::GerritConfig;
use crate::effects::{GerritEffect, GerritInterpreter, GerritResponse};
use crate::retry::{RetryConfig, RetryPolicy, retry_with_backoff};
use crate::types::{ChangeId, ChangeStatus, Sha};

use super::error::GerritError;

/// Gerrit prefixes every JSON response with this line to defeat XSSI.
const XSSI_PREFIX: &str = ")]}'";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Removes Gerrit's anti-XSSI prefix, if present.
pub fn strip_xssi_prefix(body: &str) -> &str {
    body.strip_prefix(XSSI_PREFIX).unwrap_or(body).trim_start()
}

/// A Gerrit REST client using HTTP basic auth.
#[derive(Clone)]
pub struct GerritClient {
    http: Client,
    api_url: String,
    username: String,
    password: String,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct ReviewInput<'a> {
    message: &'a str,
    labels: HashMap<&'a str, i32>,
}

impl GerritClient {
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, GerritError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(GerritClient {
            http,
            api_url: api_url(base_url),
            username: username.into(),
            password: password.into(),
            retry: RetryConfig::DEFAULT,
        })
    }

    /// Replaces the backoff used for transient failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn from_config(config: &GerritConfig) -> Result<Self, GerritError> {
        Self::new(&config.url, &config.username, &config.password)
    }

    /// The authenticated API root, e.g. `https://review.example.org/a`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn change_url(&self, change_id: &ChangeId) -> String {
        format!(
            "{}/changes/{}/",
            self.api_url,
            urlencoding::encode(change_id.as_str())
        )
    }

    fn review_url(&self, change_id: &ChangeId, revision: &Sha) -> String {
        format!(
            "{}/changes/{}/revisions/{}/review",
            self.api_url,
            urlencoding::encode(change_id.as_str()),
            revision
        )
    }

    /// Fetches the change with its current revision.
    pub async fn get_change(&self, change_id: &ChangeId) -> Result<ChangeStatus, GerritError> {
        let response = self
            .http
            .get(self.change_url(change_id))
            .query(&[("o", "CURRENT_REVISION")])
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let body = read_body(response).await?;
        Ok(serde_json::from_str(strip_xssi_prefix(&body))?)
    }

    /// Posts a review message with one label vote.
    pub async fn post_review(
        &self,
        change_id: &ChangeId,
        revision: &Sha,
        message: &str,
        label: &str,
        vote: i32,
    ) -> Result<(), GerritError> {
        let input = ReviewInput {
            message,
            labels: HashMap::from([(label, vote)]),
        };
        let response = self
            .http
            .post(self.review_url(change_id, revision))
            .basic_auth(&self.username, Some(&self.password))
            .json(&input)
            .send()
            .await?;

        read_body(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GerritClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GerritClient")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Reads the body, turning non-2xx responses into [`GerritError::Status`].
async fn read_body(response: reqwest::Response) -> Result<String, GerritError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(GerritError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

fn api_url(base_url: &str) -> String {
    format!("{}/a", base_url.trim_end_matches('/'))
}

impl GerritInterpreter for GerritClient {
    type Error = GerritError;

    async fn interpret(&self, effect: GerritEffect) -> Result<GerritResponse, Self::Error> {
        let policy = RetryPolicy::for_idempotence(effect.is_idempotent());
        retry_with_backoff(self.retry, policy, effect.name(), || self.execute(&effect)).await
    }
}

impl GerritClient {
    /// Performs one effect once.
    async fn execute(&self, effect: &GerritEffect) -> Result<GerritResponse, GerritError> {
        match effect {
            GerritEffect::GetChange { change_id } => {
                let status = self.get_change(change_id).await?;
                Ok(GerritResponse::Change(status))
            }
            GerritEffect::PostReview {
                change_id,
                revision,
                message,
                label,
                vote,
            } => {
                self.post_review(change_id, revision, message, label, *vote)
                    .await?;
                Ok(GerritResponse::ReviewPosted)
            }
        }
    }
}
