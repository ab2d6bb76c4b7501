// Cache key derivation.
// Builds deterministic, namespaced keys per resource family from an operation and its params.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::operation::{Params, ParamsExt, ResourceFamily};
use crate::pagination::{self, PaginationParams};

/// Namespace shared by every key this crate writes.
pub const NAMESPACE: &str = "github";

/// Length of the digest used in place of free-text search queries.
pub const QUERY_DIGEST_LEN: usize = 20;

/// Length of the digest of parameters a family strategy does not consume.
const RESIDUAL_DIGEST_LEN: usize = 16;

/// Parameters that never take part in a key: credentials and per-request noise.
const VOLATILE_PARAMS: [&str; 4] = ["token", "__passthrough_auth", "request_id", "timestamp"];

/// Parameters covered by the pagination suffix.
const PAGINATION_PARAMS: [&str; 4] = ["page", "per_page", "perPage", "after"];

/// Typed view of the parameters that identify a cached resource.
#[derive(Debug, Clone)]
struct KeyInputs<'a> {
    operation: &'a str,
    family: ResourceFamily,
    params: &'a Params,
    owner: Option<&'a str>,
    repo: Option<&'a str>,
    pagination: PaginationParams,
    paginated: bool,
}

impl<'a> KeyInputs<'a> {
    fn new(operation: &'a str, params: &'a Params) -> Self {
        Self {
            operation,
            family: ResourceFamily::from_operation(operation),
            params,
            owner: params.get_str("owner"),
            repo: params.get_str("repo"),
            pagination: pagination::extract_pagination(params),
            paginated: pagination::has_pagination(params),
        }
    }

    fn owner_repo(&self) -> Option<(&'a str, &'a str)> {
        Some((self.owner?, self.repo?))
    }

    fn number(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|k| self.params.get_int(k))
    }

    /// `:p{page}:pp{per_page}` plus a cursor digest when one was given.
    fn page_suffix(&self) -> String {
        let mut suffix = format!(":p{}:pp{}", self.pagination.page, self.pagination.per_page);
        if !self.pagination.after.is_empty() {
            suffix.push_str(":a");
            suffix.push_str(&digest(self.pagination.after.as_bytes(), RESIDUAL_DIGEST_LEN));
        }
        suffix
    }

    fn optional_page_suffix(&self) -> String {
        if self.paginated || !self.pagination.after.is_empty() {
            self.page_suffix()
        } else {
            String::new()
        }
    }

    /// Digest suffix over every parameter the strategy did not consume.
    fn residual_suffix(&self, consumed: &[&str]) -> String {
        let residual: Map<String, Value> = self
            .params
            .iter()
            .filter(|(k, _)| {
                !consumed.contains(&k.as_str())
                    && !PAGINATION_PARAMS.contains(&k.as_str())
                    && !VOLATILE_PARAMS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if residual.is_empty() {
            String::new()
        } else {
            format!(
                ":h{}",
                digest(canonical_json(&Value::Object(residual)).as_bytes(), RESIDUAL_DIGEST_LEN)
            )
        }
    }
}

/// Derive the cache key for one invocation.
///
/// Pure: identical operation names and parameter bags always give identical
/// keys, and any parameter that can change the upstream result is reflected
/// in the key either directly or through a digest.
pub fn derive_key(operation: &str, params: &Params) -> String {
    let inputs = KeyInputs::new(operation, params);

    let key = match inputs.family {
        ResourceFamily::Repository => repository_key(&inputs),
        ResourceFamily::Issue => issue_key(&inputs),
        ResourceFamily::PullRequest => pull_request_key(&inputs),
        ResourceFamily::Search => search_key(&inputs),
        ResourceFamily::Other => None,
    };

    key.unwrap_or_else(|| fallback_key(operation, params))
}

/// `github:repo:{owner}:{repo}:{action}[:p{page}:pp{per_page}]`
fn repository_key(inputs: &KeyInputs) -> Option<String> {
    let (owner, repo) = inputs.owner_repo()?;
    Some(format!(
        "{}:repo:{}:{}:{}{}{}",
        NAMESPACE,
        owner,
        repo,
        inputs.family.action(inputs.operation),
        inputs.optional_page_suffix(),
        inputs.residual_suffix(&["owner", "repo"]),
    ))
}

fn issue_key(inputs: &KeyInputs) -> Option<String> {
    let (owner, repo) = inputs.owner_repo()?;
    let action = inputs.family.action(inputs.operation);

    if let Some(number) = inputs.number(&["issue_number", "number"]) {
        return Some(format!(
            "{}:issue:{}:{}:{}:{}{}{}",
            NAMESPACE,
            owner,
            repo,
            number,
            action,
            inputs.optional_page_suffix(),
            inputs.residual_suffix(&["owner", "repo", "issue_number", "number"]),
        ));
    }

    let mut labels = inputs.params.get_string_list("labels").unwrap_or_default();
    labels.sort();
    labels.dedup();

    Some(format!(
        "{}:issues:{}:{}:{}:s{}:l{}{}{}",
        NAMESPACE,
        owner,
        repo,
        action,
        inputs.params.get_str("state").unwrap_or("open"),
        labels.join(","),
        inputs.page_suffix(),
        inputs.residual_suffix(&["owner", "repo", "state", "labels"]),
    ))
}

fn pull_request_key(inputs: &KeyInputs) -> Option<String> {
    let (owner, repo) = inputs.owner_repo()?;
    let action = inputs.family.action(inputs.operation);

    if let Some(number) = inputs.number(&["pull_number", "number"]) {
        return Some(format!(
            "{}:pr:{}:{}:{}:{}{}{}",
            NAMESPACE,
            owner,
            repo,
            number,
            action,
            inputs.optional_page_suffix(),
            inputs.residual_suffix(&["owner", "repo", "pull_number", "number"]),
        ));
    }

    Some(format!(
        "{}:prs:{}:{}:{}:s{}{}{}",
        NAMESPACE,
        owner,
        repo,
        action,
        inputs.params.get_str("state").unwrap_or("open"),
        inputs.page_suffix(),
        inputs.residual_suffix(&["owner", "repo", "state"]),
    ))
}

/// `github:search:{kind}:{query digest}:{sort}:{order}:p{page}:pp{per_page}`
fn search_key(inputs: &KeyInputs) -> Option<String> {
    let query = inputs
        .params
        .get_str("q")
        .or_else(|| inputs.params.get_str("query"))?;
    let kind = inputs
        .operation
        .strip_prefix("search_")
        .unwrap_or(inputs.operation);

    Some(format!(
        "{}:search:{}:{}:{}:{}{}{}",
        NAMESPACE,
        kind,
        digest(query.as_bytes(), QUERY_DIGEST_LEN),
        inputs.params.get_str("sort").unwrap_or_default(),
        inputs.params.get_str("order").unwrap_or_default(),
        inputs.page_suffix(),
        inputs.residual_suffix(&["q", "query", "sort", "order"]),
    ))
}

/// `github:{operation}:{digest of all non-volatile params}`
fn fallback_key(operation: &str, params: &Params) -> String {
    let stable: Map<String, Value> = params
        .iter()
        .filter(|(k, _)| !VOLATILE_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let encoded = canonical_json(&Value::Object(stable));
    format!("{}:{}:{}", NAMESPACE, operation, digest(encoded.as_bytes(), 64))
}

/// Hex SHA-256 of `bytes`, truncated to `len` characters.
pub fn digest(bytes: &[u8], len: usize) -> String {
    let mut encoded = hex::encode(Sha256::digest(bytes));
    encoded.truncate(len);
    encoded
}

/// JSON encoding with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_repository_key() {
        let p = params(json!({"owner": "octocat", "repo": "Hello-World"}));
        assert_eq!(
            derive_key("get_repository", &p),
            "github:repo:octocat:Hello-World:get"
        );
    }

    #[test]
    fn test_repository_key_with_pagination() {
        let plain = params(json!({"owner": "octocat", "repo": "Hello-World"}));
        let paged = params(json!({"owner": "octocat", "repo": "Hello-World", "page": 2, "per_page": 50}));

        let key = derive_key("get_repository", &paged);
        assert_eq!(key, "github:repo:octocat:Hello-World:get:p2:pp50");
        assert_ne!(key, derive_key("get_repository", &plain));
        assert_eq!(key, derive_key("get_repository", &paged));
    }

    #[test]
    fn test_repository_key_reflects_extra_params() {
        let readme = params(json!({"owner": "o", "repo": "r", "path": "README.md"}));
        let license = params(json!({"owner": "o", "repo": "r", "path": "LICENSE"}));

        let a = derive_key("get_repository_content", &readme);
        let b = derive_key("get_repository_content", &license);
        assert!(a.starts_with("github:repo:o:r:get_content:h"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_issue_key_with_number() {
        let p = params(json!({"owner": "o", "repo": "r", "issue_number": 42}));
        assert_eq!(derive_key("get_issue", &p), "github:issue:o:r:42:get");

        let as_string = params(json!({"owner": "o", "repo": "r", "issue_number": "42"}));
        assert_eq!(derive_key("get_issue", &as_string), "github:issue:o:r:42:get");
    }

    #[test]
    fn test_issue_list_key_includes_filters() {
        let open = params(json!({"owner": "o", "repo": "r", "state": "open", "labels": ["ui", "bug"]}));
        let closed = params(json!({"owner": "o", "repo": "r", "state": "closed", "labels": ["bug", "ui"]}));

        assert_eq!(
            derive_key("list_issues", &open),
            "github:issues:o:r:list:sopen:lbug,ui:p1:pp30"
        );
        assert_ne!(derive_key("list_issues", &open), derive_key("list_issues", &closed));

        let page_two = params(json!({"owner": "o", "repo": "r", "state": "open", "labels": "bug,ui", "page": 2}));
        assert_eq!(
            derive_key("list_issues", &page_two),
            "github:issues:o:r:list:sopen:lbug,ui:p2:pp30"
        );
    }

    #[test]
    fn test_pull_request_keys() {
        let one = params(json!({"owner": "o", "repo": "r", "pull_number": 7}));
        assert_eq!(derive_key("get_pull_request", &one), "github:pr:o:r:7:get");
        assert_eq!(
            derive_key("get_pull_request_files", &one),
            "github:pr:o:r:7:get_files"
        );

        let list = params(json!({"owner": "o", "repo": "r", "state": "closed", "per_page": 10}));
        assert_eq!(
            derive_key("list_pull_requests", &list),
            "github:prs:o:r:list:sclosed:p1:pp10"
        );
    }

    #[test]
    fn test_search_key_bounds_query() {
        let long_query = "is:open ".repeat(200);
        let p = params(json!({"q": long_query, "sort": "stars", "order": "desc"}));
        let key = derive_key("search_repositories", &p);

        let digest_part = key.split(':').nth(3).unwrap();
        assert_eq!(digest_part.len(), QUERY_DIGEST_LEN);
        assert!(key.starts_with("github:search:repositories:"));
        assert!(key.ends_with(":stars:desc:p1:pp30"));
        assert!(key.len() < 100);
    }

    #[test]
    fn test_search_key_differs_by_sort_order_page() {
        let base = params(json!({"q": "tokio"}));
        let sorted = params(json!({"q": "tokio", "sort": "stars"}));
        let ordered = params(json!({"q": "tokio", "sort": "stars", "order": "asc"}));
        let paged = params(json!({"q": "tokio", "page": 3}));
        let other = params(json!({"query": "serde"}));

        let keys: Vec<String> = [&base, &sorted, &ordered, &paged, &other]
            .iter()
            .map(|p| derive_key("search_repositories", p))
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_fallback_key() {
        let p = params(json!({"owner": "o", "repo": "r"}));
        let key = derive_key("list_branches", &p);
        assert!(key.starts_with("github:list_branches:"));
        assert_eq!(key.len(), "github:list_branches:".len() + 64);

        let other = params(json!({"owner": "o", "repo": "other"}));
        assert_ne!(key, derive_key("list_branches", &other));
    }

    #[test]
    fn test_family_without_identifiers_falls_back() {
        let p = params(json!({"visibility": "public"}));
        assert!(derive_key("list_repositories", &p).starts_with("github:list_repositories:"));

        let no_query = params(json!({"sort": "stars"}));
        assert!(derive_key("search_code", &no_query).starts_with("github:search_code:"));
    }

    #[test]
    fn test_volatile_params_ignored() {
        let a = params(json!({"owner": "o", "repo": "r", "token": "ghp_a", "request_id": "1"}));
        let b = params(json!({"owner": "o", "repo": "r", "token": "ghp_b", "request_id": "2"}));
        assert_eq!(derive_key("get_repository", &a), derive_key("get_repository", &b));
        assert_eq!(derive_key("list_branches", &a), derive_key("list_branches", &b));
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": {"y": 1, "x": [ {"d": 1, "c": 2} ]}, "a": null});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":null,"b":{"x":[{"c":2,"d":1}],"y":1}}"#
        );
    }
}
