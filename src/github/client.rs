// GitHub API HTTP client.
// Handles authentication, rate limit tracking, and REST/GraphQL request processing.

use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::{
    Client, Method, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT},
};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{Result, ToolCacheError};

use super::types::{GraphQlResponse, RateLimit};

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Rate limit counters updated from every response.
#[derive(Debug, Default)]
struct RateLimitState {
    limit: AtomicU64,
    remaining: AtomicU64,
    reset: AtomicU64,
}

/// GitHub API client with authentication and rate limit tracking.
///
/// Safe to share between concurrent invocations.
#[derive(Debug)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    rate_limit: RateLimitState,
}

impl GitHubClient {
    /// Create a new GitHub client with the given token.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, GITHUB_API_BASE)
    }

    /// Create a client against another API root (GitHub Enterprise, test servers).
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ToolCacheError::Other(e.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("github-tool-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ToolCacheError::Api)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit: RateLimitState::default(),
        })
    }

    /// Create a client from the GITHUB_TOKEN environment variable.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| ToolCacheError::MissingToken)?;
        Self::new(&token)
    }

    /// Get the current rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        RateLimit {
            limit: self.rate_limit.limit.load(Ordering::Relaxed),
            remaining: self.rate_limit.remaining.load(Ordering::Relaxed),
            reset: self.rate_limit.reset.load(Ordering::Relaxed),
        }
    }

    /// GET a JSON document with query parameters.
    pub async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self.send(Method::GET, endpoint, query, None).await?;
        Ok(response.json().await?)
    }

    /// POST a JSON body and decode the JSON reply.
    pub async fn post_json(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let response = self.send(Method::POST, endpoint, &[], Some(body)).await?;
        Ok(response.json().await?)
    }

    /// PUT a JSON body and decode the JSON reply.
    pub async fn put_json(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let response = self.send(Method::PUT, endpoint, &[], Some(body)).await?;
        Ok(response.json().await?)
    }

    /// Run a GraphQL query and return its `data` object.
    pub async fn graphql(&self, query: &str, variables: Map<String, Value>) -> Result<Value> {
        let body = json!({ "query": query, "variables": variables });
        let response = self.send(Method::POST, "/graphql", &[], Some(&body)).await?;
        let reply: GraphQlResponse = response.json().await?;

        if let Some(error) = reply.errors.first() {
            return Err(ToolCacheError::Other(format!(
                "GraphQL query failed: {}",
                error.message
            )));
        }
        Ok(reply.data.unwrap_or(Value::Null))
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(method = %method, url = %url, "GitHub request");

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(ToolCacheError::Api)?;

        self.update_rate_limit(&response);
        self.check_response(response).await
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        if let Some(limit) = header("x-ratelimit-limit") {
            self.rate_limit.limit.store(limit, Ordering::Relaxed);
        }
        if let Some(remaining) = header("x-ratelimit-remaining") {
            self.rate_limit.remaining.store(remaining, Ordering::Relaxed);
        }
        if let Some(reset) = header("x-ratelimit-reset") {
            self.rate_limit.reset.store(reset, Ordering::Relaxed);
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, response: Response) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(ToolCacheError::Unauthorized),
            StatusCode::NOT_FOUND => {
                let url = response.url().to_string();
                Err(ToolCacheError::NotFound(url))
            }
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
                if self.rate_limit.remaining.load(Ordering::Relaxed) == 0 =>
            {
                let reset = self.rate_limit.reset.load(Ordering::Relaxed);
                let reset_at = chrono::DateTime::from_timestamp(reset as i64, 0)
                    .map(|dt| dt.format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                Err(ToolCacheError::RateLimited { reset_at })
            }
            status => Err(ToolCacheError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}
