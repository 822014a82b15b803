//! Reddit OAuth client.
//!
//! Implements [`DataSource`] over Reddit's OAuth API:
//!
//! - `POST <token_url>`: app-only (`client_credentials`) or script
//!   (`password`) grant, Basic auth with the client id and secret.
//! - `GET <base_url>/r/<scope>/new.json`: newest submissions, newest first.
//! - `GET <base_url>/comments/<id>.json`: the submission plus its comment tree.
//!
//! Every request carries the configured `User-Agent`, asks for JSON, and
//! runs under a fixed timeout. A non-2xx status or a non-JSON content type
//! is an error; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use harvest_core::record::Record;

use crate::config::{ApiConfig, Credentials};
use crate::error::{SourceError, SourceResult};
use crate::source::DataSource;
use crate::thread;

/// Bytes of an error response body kept in the error message.
const ERROR_BODY_LIMIT: usize = 512;

/// Authenticated client holding a bearer token for the whole run.
pub struct RedditClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
}

impl RedditClient {
    /// Build the HTTP client and exchange credentials for a bearer token.
    ///
    /// Any failure here is fatal to the run: without a token nothing else
    /// can be fetched.
    pub async fn connect(api: &ApiConfig, creds: &Credentials) -> SourceResult<Self> {
        let base_url = Url::parse(&api.base_url)
            .map_err(|e| SourceError::Parse(format!("api.base_url: {}", e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .user_agent(creds.user_agent.clone())
            .build()?;

        let token = fetch_token(&client, &api.token_url, creds).await?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> SourceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::Parse(format!("api.base_url cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> SourceResult<Value> {
        debug!(url = %url, "GET");
        let resp = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = check_response(url.as_str(), resp).await?;
        Ok(resp.json::<Value>().await?)
    }
}

async fn fetch_token(
    client: &reqwest::Client,
    token_url: &str,
    creds: &Credentials,
) -> SourceResult<String> {
    let form: Vec<(&str, &str)> = match &creds.password_login {
        Some((username, password)) => vec![
            ("grant_type", "password"),
            ("username", username.as_str()),
            ("password", password.as_str()),
            ("scope", "read"),
        ],
        None => vec![("grant_type", "client_credentials"), ("scope", "read")],
    };
    debug!(grant = form[0].1, token_url, "requesting access token");

    let resp = client
        .post(token_url)
        .header(ACCEPT, "application/json")
        .basic_auth(&creds.client_id, Some(&creds.client_secret))
        .form(&form)
        .send()
        .await?;
    let resp = check_response(token_url, resp).await?;
    let token: TokenResponse = resp.json().await?;
    if token.access_token.is_empty() {
        return Err(SourceError::Auth("empty access_token".to_string()));
    }
    Ok(token.access_token)
}

/// Reject non-2xx and non-JSON responses, keeping a short body excerpt.
async fn check_response(url: &str, resp: Response) -> SourceResult<Response> {
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    if status.is_success() && content_type.contains("application/json") {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Api {
        url: url.to_string(),
        status: status.as_u16(),
        content_type,
        body: truncate_utf8(&body, ERROR_BODY_LIMIT).to_string(),
    })
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Pull `data.children[].data` out of a listing response.
fn listing_records(listing: &Value) -> SourceResult<Vec<Record>> {
    let children = listing
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Parse("listing without data.children".to_string()))?;
    Ok(children
        .iter()
        .filter_map(|child| child.get("data").cloned())
        .filter_map(Record::from_value)
        .collect())
}

#[async_trait]
impl DataSource for RedditClient {
    async fn list_new(
        &self,
        scope: &str,
        limit: u32,
        after: Option<&str>,
    ) -> SourceResult<Vec<Record>> {
        let mut url = self.endpoint(&["r", scope, "new.json"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("limit", &limit.to_string())
                .append_pair("raw_json", "1");
            if let Some(after) = after {
                query.append_pair("after", after);
            }
        }
        let listing = self.get_json(url).await?;
        listing_records(&listing)
    }

    async fn fetch_comments(&self, submission_id: &str) -> SourceResult<Vec<Record>> {
        let mut url = self.endpoint(&["comments", &format!("{}.json", submission_id)])?;
        url.query_pairs_mut()
            .append_pair("depth", "1000")
            .append_pair("limit", "500")
            .append_pair("raw_json", "1")
            .append_pair("sort", "confidence");
        let response = self.get_json(url).await?;
        thread::assemble(&response)
            .ok_or_else(|| SourceError::Parse("unexpected comments payload".to_string()))
    }
}
