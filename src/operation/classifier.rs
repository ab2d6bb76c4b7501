// Operation classification.
// Decides cacheability and resource family from an operation name, once per call.

/// Name prefixes that denote pure retrieval.
const READ_ONLY_PREFIXES: [&str; 4] = ["get_", "list_", "search_", "find_"];

/// Whether an operation only reads remote state and may be served from cache.
///
/// Anything not starting with a retrieval prefix is treated as mutating.
pub fn is_read_only(operation: &str) -> bool {
    READ_ONLY_PREFIXES
        .iter()
        .any(|prefix| operation.starts_with(prefix))
}

/// Resource family an operation belongs to, used to pick a cache key strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceFamily {
    Repository,
    Issue,
    PullRequest,
    Search,
    Other,
}

/// Name segments that identify a family. Later families in this table win
/// when a name mentions several (`list_repository_issues` is issue-scoped).
const FAMILY_SEGMENTS: [(ResourceFamily, &[&str]); 3] = [
    (
        ResourceFamily::Repository,
        &["repository", "repositories", "repo"],
    ),
    (ResourceFamily::PullRequest, &["pull", "pulls", "pr"]),
    (ResourceFamily::Issue, &["issue", "issues"]),
];

/// Noun phrases stripped from the name when it directly follows the verb.
const FAMILY_NOUNS: [(ResourceFamily, &[&str]); 3] = [
    (ResourceFamily::Repository, &["repository"]),
    (
        ResourceFamily::PullRequest,
        &["pull_requests", "pull_request", "pulls", "pr"],
    ),
    (ResourceFamily::Issue, &["issues", "issue"]),
];

impl ResourceFamily {
    /// Derive the family from an operation name.
    pub fn from_operation(operation: &str) -> Self {
        if operation.starts_with("search_") {
            return ResourceFamily::Search;
        }

        let segments: Vec<&str> = operation.split('_').collect();
        FAMILY_SEGMENTS
            .iter()
            .rev()
            .find(|(_, names)| segments.iter().any(|s| names.contains(s)))
            .map(|(family, _)| *family)
            .unwrap_or(ResourceFamily::Other)
    }

    /// Short name of the operation within this family.
    ///
    /// The family noun is dropped when it directly follows the verb, so
    /// `get_repository` becomes `get` and `get_issue_comments` becomes
    /// `get_comments`. Other names are returned unchanged.
    pub fn action<'a>(&self, operation: &'a str) -> std::borrow::Cow<'a, str> {
        let Some((verb, rest)) = operation.split_once('_') else {
            return operation.into();
        };

        let nouns = FAMILY_NOUNS
            .iter()
            .find(|(family, _)| family == self)
            .map(|(_, nouns)| *nouns)
            .unwrap_or(&[]);

        for noun in nouns {
            if rest == *noun {
                return verb.into();
            }
            if let Some(tail) = rest
                .strip_prefix(noun)
                .and_then(|tail| tail.strip_prefix('_'))
            {
                return format!("{}_{}", verb, tail).into();
            }
        }

        operation.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_prefixes() {
        for name in ["get_repository", "list_issues", "search_code", "find_user"] {
            assert!(is_read_only(name), "{} should be read-only", name);
        }
    }

    #[test]
    fn test_mutating_operations() {
        for name in [
            "create_issue",
            "update_repository",
            "delete_branch",
            "merge_pull_request",
            "run_workflow",
            "getter",
            "listing",
            "",
        ] {
            assert!(!is_read_only(name), "{} should not be read-only", name);
        }
    }

    #[test]
    fn test_family_from_operation() {
        assert_eq!(
            ResourceFamily::from_operation("get_repository"),
            ResourceFamily::Repository
        );
        assert_eq!(
            ResourceFamily::from_operation("list_repository_issues"),
            ResourceFamily::Issue
        );
        assert_eq!(
            ResourceFamily::from_operation("get_pull_request_files"),
            ResourceFamily::PullRequest
        );
        assert_eq!(
            ResourceFamily::from_operation("search_issues"),
            ResourceFamily::Search
        );
        assert_eq!(
            ResourceFamily::from_operation("list_branches"),
            ResourceFamily::Other
        );
        assert_eq!(
            ResourceFamily::from_operation("get_reporter"),
            ResourceFamily::Other
        );
    }

    #[test]
    fn test_action_strips_family_noun() {
        let repo = ResourceFamily::Repository;
        assert_eq!(repo.action("get_repository"), "get");
        assert_eq!(repo.action("get_repository_content"), "get_content");
        assert_eq!(repo.action("list_repo_topics"), "list_repo_topics");

        let issue = ResourceFamily::Issue;
        assert_eq!(issue.action("get_issue"), "get");
        assert_eq!(issue.action("list_issues"), "list");
        assert_eq!(issue.action("get_issue_comments"), "get_comments");

        let pr = ResourceFamily::PullRequest;
        assert_eq!(pr.action("get_pull_request"), "get");
        assert_eq!(pr.action("list_pull_requests"), "list");
        assert_eq!(pr.action("get_pull_request_files"), "get_files");

        assert_eq!(ResourceFamily::Other.action("list_branches"), "list_branches");
        assert_eq!(ResourceFamily::Other.action("ping"), "ping");
    }
}
