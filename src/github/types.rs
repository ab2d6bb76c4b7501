// GitHub API response types.
// Envelopes the handler unwraps before re-shaping results for callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rate limit information from response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}

/// Search endpoint envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

/// Paginated list envelope used by the Actions endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    pub total_count: u64,
    #[serde(alias = "workflows", alias = "workflow_runs", alias = "jobs", alias = "runners")]
    pub items: Vec<Value>,
}

/// GraphQL reply envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_response_aliases() {
        let runs: ListResponse =
            serde_json::from_value(json!({"total_count": 2, "workflow_runs": [{"id": 1}, {"id": 2}]}))
                .unwrap();
        assert_eq!(runs.total_count, 2);
        assert_eq!(runs.items.len(), 2);
    }

    #[test]
    fn test_graphql_errors_default_empty() {
        let reply: GraphQlResponse = serde_json::from_value(json!({"data": {"x": 1}})).unwrap();
        assert!(reply.errors.is_empty());

        let failed: GraphQlResponse =
            serde_json::from_value(json!({"data": null, "errors": [{"message": "bad cursor"}]}))
                .unwrap();
        assert_eq!(failed.errors[0].message, "bad cursor");
    }
}
