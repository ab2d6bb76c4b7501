// GitHub operation handler.
// Maps tool names to REST and GraphQL calls and shapes the replies into operation results.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{Result, ToolCacheError};
use crate::operation::{OperationHandler, OperationResult, Params, ParamsExt};
use crate::pagination::{self, OffsetPageInfo, PageInfo, PaginationParams};

use super::client::GitHubClient;
use super::types::{ListResponse, SearchResponse};

/// Operations served by `GitHubHandler`.
pub const OPERATIONS: [&str; 14] = [
    "get_repository",
    "list_branches",
    "list_commits",
    "get_issue",
    "list_issues",
    "list_issues_graphql",
    "create_issue",
    "get_pull_request",
    "list_pull_requests",
    "merge_pull_request",
    "search_repositories",
    "search_issues",
    "list_workflow_runs",
    "list_notifications",
];

const LIST_ISSUES_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $after: String, $states: [IssueState!]) {
  repository(owner: $owner, name: $name) {
    issues(first: $first, after: $after, states: $states, orderBy: {field: UPDATED_AT, direction: DESC}) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        state
        url
        createdAt
        updatedAt
        author { login }
        labels(first: 10) { nodes { name } }
      }
    }
  }
}"#;

/// Pass-through handler for the GitHub REST and GraphQL APIs.
pub struct GitHubHandler {
    client: GitHubClient,
}

impl GitHubHandler {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    async fn dispatch(&self, operation: &str, params: &Params) -> Result<Value> {
        match operation {
            "get_repository" => {
                let repo = repo_path(params)?;
                self.client.get_json(&repo, &[]).await
            }
            "list_branches" => {
                let repo = repo_path(params)?;
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                if let Some(protected) = params.get("protected").and_then(Value::as_bool) {
                    query.push(("protected", protected.to_string()));
                }
                let items = self.client.get_json(&format!("{}/branches", repo), &query).await?;
                Ok(paged(items, &page, None))
            }
            "list_commits" => {
                let repo = repo_path(params)?;
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                push_str_params(&mut query, params, &["sha", "path", "author", "since", "until"]);
                let items = self.client.get_json(&format!("{}/commits", repo), &query).await?;
                Ok(paged(items, &page, None))
            }
            "get_issue" => {
                let repo = repo_path(params)?;
                let number = required_int(params, &["issue_number", "number"])?;
                self.client
                    .get_json(&format!("{}/issues/{}", repo, number), &[])
                    .await
            }
            "list_issues" => {
                let repo = repo_path(params)?;
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                push_str_params(&mut query, params, &["state", "sort", "direction", "since"]);
                if let Some(labels) = params.get_string_list("labels") {
                    query.push(("labels", labels.join(",")));
                }
                let items = self.client.get_json(&format!("{}/issues", repo), &query).await?;
                Ok(paged(items, &page, None))
            }
            "list_issues_graphql" => self.list_issues_graphql(params).await,
            "create_issue" => {
                let repo = repo_path(params)?;
                let title = required_str(params, "title")?;
                let mut body = json!({ "title": title });
                for key in ["body", "labels", "assignees", "milestone"] {
                    if let Some(value) = params.get(key) {
                        body[key] = value.clone();
                    }
                }
                self.client
                    .post_json(&format!("{}/issues", repo), &body)
                    .await
            }
            "get_pull_request" => {
                let repo = repo_path(params)?;
                let number = required_int(params, &["pull_number", "number"])?;
                self.client
                    .get_json(&format!("{}/pulls/{}", repo, number), &[])
                    .await
            }
            "list_pull_requests" => {
                let repo = repo_path(params)?;
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                push_str_params(&mut query, params, &["state", "head", "base", "sort", "direction"]);
                let items = self.client.get_json(&format!("{}/pulls", repo), &query).await?;
                Ok(paged(items, &page, None))
            }
            "merge_pull_request" => {
                let repo = repo_path(params)?;
                let number = required_int(params, &["pull_number", "number"])?;
                let mut body = Map::new();
                for key in ["commit_title", "commit_message", "merge_method", "sha"] {
                    if let Some(value) = params.get_str(key) {
                        body.insert(key.to_string(), Value::String(value.to_string()));
                    }
                }
                self.client
                    .put_json(&format!("{}/pulls/{}/merge", repo, number), &Value::Object(body))
                    .await
            }
            "search_repositories" => self.search("/search/repositories", params).await,
            "search_issues" => self.search("/search/issues", params).await,
            "list_workflow_runs" => {
                let repo = repo_path(params)?;
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                push_str_params(&mut query, params, &["branch", "status", "event", "actor"]);
                let reply = self
                    .client
                    .get_json(&format!("{}/actions/runs", repo), &query)
                    .await?;
                let list: ListResponse = serde_json::from_value(reply)?;
                Ok(paged(Value::Array(list.items), &page, Some(list.total_count)))
            }
            "list_notifications" => {
                let page = pagination::extract_pagination(params);
                let mut query = page.to_query();
                for key in ["all", "participating"] {
                    if let Some(flag) = params.get(key).and_then(Value::as_bool) {
                        query.push((key, flag.to_string()));
                    }
                }
                push_str_params(&mut query, params, &["since", "before"]);
                let items = self.client.get_json("/notifications", &query).await?;
                Ok(paged(items, &page, None))
            }
            other => Err(ToolCacheError::UnknownOperation(other.to_string())),
        }
    }

    async fn search(&self, endpoint: &str, params: &Params) -> Result<Value> {
        let q = params
            .get_str("q")
            .or_else(|| params.get_str("query"))
            .ok_or_else(|| {
                ToolCacheError::InvalidParams(
                    "query parameter is required (use 'q' or 'query')".to_string(),
                )
            })?;

        let page = pagination::extract_pagination(params);
        let mut query = vec![("q", q.to_string())];
        push_str_params(&mut query, params, &["sort", "order"]);
        query.extend(page.to_query());

        let reply = self.client.get_json(endpoint, &query).await?;
        let search: SearchResponse = serde_json::from_value(reply)?;
        let info = OffsetPageInfo::new(&page, search.items.len(), Some(search.total_count));

        Ok(json!({
            "items": search.items,
            "total_count": search.total_count,
            "incomplete_results": search.incomplete_results,
            "has_more": info.has_more,
            "page": info.page,
            "per_page": info.per_page,
        }))
    }

    async fn list_issues_graphql(&self, params: &Params) -> Result<Value> {
        let variables = issues_query_variables(params)?;
        let data = self.client.graphql(LIST_ISSUES_QUERY, variables).await?;

        let issues = &data["repository"]["issues"];
        if issues.is_null() {
            return Err(ToolCacheError::NotFound(format!(
                "repository {}/{}",
                params.get_str("owner").unwrap_or_default(),
                params.get_str("repo").unwrap_or_default()
            )));
        }

        let page_info: PageInfo = serde_json::from_value(issues["pageInfo"].clone())?;
        let next = pagination::extract_cursor_pagination(params).next(&page_info);

        Ok(json!({
            "issues": issues["nodes"],
            "totalCount": issues["totalCount"],
            "pageInfo": page_info,
            "nextCursor": next.and_then(|n| n.after),
        }))
    }
}

#[async_trait]
impl OperationHandler for GitHubHandler {
    async fn execute(&self, operation: &str, params: &Params) -> Result<OperationResult> {
        match self.dispatch(operation, params).await {
            Ok(payload) => Ok(OperationResult::success(payload)),
            Err(e) if e.is_business_error() => {
                debug!(operation, error = %e, "operation failed");
                Ok(OperationResult::error(format!("Failed to {}: {}", operation, e)))
            }
            Err(e) => Err(e),
        }
    }
}

/// GraphQL variables for the issue listing query.
pub fn issues_query_variables(params: &Params) -> Result<Map<String, Value>> {
    let owner = required_str(params, "owner")?;
    let name = required_str(params, "repo")?;

    let states = match params.get_str("state").unwrap_or("open") {
        "closed" => json!(["CLOSED"]),
        "all" => json!(["OPEN", "CLOSED"]),
        _ => json!(["OPEN"]),
    };

    let mut variables = pagination::extract_cursor_pagination(params).to_transport_params();
    variables.insert("owner".to_string(), json!(owner));
    variables.insert("name".to_string(), json!(name));
    variables.insert("states".to_string(), states);
    Ok(variables)
}

/// `/repos/{owner}/{repo}` from the params.
fn repo_path(params: &Params) -> Result<String> {
    let owner = required_str(params, "owner")?;
    let repo = required_str(params, "repo")?;
    Ok(format!("/repos/{}/{}", owner, repo))
}

fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    params
        .get_str(key)
        .ok_or_else(|| ToolCacheError::InvalidParams(format!("{} parameter is required", key)))
}

fn required_int(params: &Params, keys: &[&str]) -> Result<i64> {
    keys.iter()
        .find_map(|key| params.get_int(key))
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            ToolCacheError::InvalidParams(format!("{} parameter is required", keys[0]))
        })
}

fn push_str_params<'a>(query: &mut Vec<(&'a str, String)>, params: &Params, keys: &[&'a str]) {
    for &key in keys {
        if let Some(value) = params.get_str(key) {
            query.push((key, value.to_string()));
        }
    }
}

/// Wrap a list reply with its offset page metadata.
fn paged(items: Value, page: &PaginationParams, total_count: Option<u64>) -> Value {
    let returned = items.as_array().map(Vec::len).unwrap_or_default();
    json!({
        "items": items,
        "pagination": OffsetPageInfo::new(page, returned, total_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    /// Drain one request, headers and body, so the reply is not reset.
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    /// Serve canned HTTP replies, one per connection, in order.
    async fn serve(replies: Vec<(u16, &'static str, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, headers, body) in replies {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{}\r\n{}",
                    status,
                    body.len(),
                    headers,
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{}", addr)
    }

    fn handler(base_url: &str) -> GitHubHandler {
        GitHubHandler::new(GitHubClient::with_base_url("test-token", base_url).unwrap())
    }

    #[tokio::test]
    async fn test_get_repository_success() {
        let base = serve(vec![(
            200,
            "x-ratelimit-limit: 5000\r\nx-ratelimit-remaining: 4999\r\n",
            r#"{"full_name": "octocat/Hello-World"}"#.to_string(),
        )])
        .await;
        let handler = handler(&base);

        let result = handler
            .execute("get_repository", &params(json!({"owner": "octocat", "repo": "Hello-World"})))
            .await
            .unwrap();

        assert!(!result.is_error());
        assert_eq!(result.payload().unwrap()["full_name"], json!("octocat/Hello-World"));
        assert_eq!(handler.client().rate_limit().remaining, 4999);
    }

    #[tokio::test]
    async fn test_not_found_becomes_error_result() {
        let base = serve(vec![(404, "", r#"{"message": "Not Found"}"#.to_string())]).await;
        let handler = handler(&base);

        let result = handler
            .execute("get_repository", &params(json!({"owner": "octocat", "repo": "missing"})))
            .await
            .unwrap();

        assert!(result.is_error());
        assert!(result.error_message().unwrap().contains("Resource not found"));
    }

    #[tokio::test]
    async fn test_list_issues_wraps_pagination() {
        let base = serve(vec![(200, "", r#"[{"number": 1}, {"number": 2}]"#.to_string())]).await;
        let handler = handler(&base);

        let result = handler
            .execute(
                "list_issues",
                &params(json!({"owner": "o", "repo": "r", "per_page": 2})),
            )
            .await
            .unwrap();

        let payload = result.payload().unwrap();
        assert_eq!(payload["items"].as_array().unwrap().len(), 2);
        assert_eq!(payload["pagination"]["per_page"], json!(2));
        assert_eq!(payload["pagination"]["has_more"], json!(true));
    }

    #[tokio::test]
    async fn test_graphql_issues_next_cursor() {
        let body = json!({
            "data": {"repository": {"issues": {
                "totalCount": 3,
                "pageInfo": {"hasNextPage": true, "endCursor": "Y3Vyc29yOjI="},
                "nodes": [{"number": 3}, {"number": 2}]
            }}}
        })
        .to_string();
        let base = serve(vec![(200, "", body)]).await;
        let handler = handler(&base);

        let result = handler
            .execute(
                "list_issues_graphql",
                &params(json!({"owner": "o", "repo": "r", "per_page": 2})),
            )
            .await
            .unwrap();

        let payload = result.payload().unwrap();
        assert_eq!(payload["nextCursor"], json!("Y3Vyc29yOjI="));
        assert_eq!(payload["totalCount"], json!(3));
    }

    #[tokio::test]
    async fn test_missing_params_become_error_result() {
        let handler = handler("http://127.0.0.1:9");

        let result = handler
            .execute("get_issue", &params(json!({"owner": "o", "repo": "r"})))
            .await
            .unwrap();
        assert!(result.is_error());
        assert!(result.error_message().unwrap().contains("issue_number"));

        let result = handler
            .execute("search_issues", &Params::new())
            .await
            .unwrap();
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_err() {
        let handler = handler("http://127.0.0.1:9");
        let err = handler.execute("fork_universe", &Params::new()).await;
        assert!(matches!(err, Err(ToolCacheError::UnknownOperation(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_is_err() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let handler = handler(&format!("http://{}", addr));
        let err = handler
            .execute("get_repository", &params(json!({"owner": "o", "repo": "r"})))
            .await;
        assert!(matches!(err, Err(ToolCacheError::Api(_))));
    }

    #[test]
    fn test_issue_variables_encode_missing_cursor_as_null() {
        let vars = issues_query_variables(&params(json!({"owner": "o", "repo": "r"}))).unwrap();
        assert_eq!(vars["after"], Value::Null);
        assert_eq!(vars["first"], json!(30));
        assert_eq!(vars["states"], json!(["OPEN"]));

        let vars = issues_query_variables(&params(
            json!({"owner": "o", "repo": "r", "after": "abc", "state": "all"}),
        ))
        .unwrap();
        assert_eq!(vars["after"], json!("abc"));
        assert_eq!(vars["states"], json!(["OPEN", "CLOSED"]));
    }

    #[test]
    fn test_operations_are_unique() {
        let mut names = OPERATIONS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OPERATIONS.len());
    }
}
