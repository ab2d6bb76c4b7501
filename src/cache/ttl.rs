// Cache lifetime policy.
// Maps resource categories to how long their cached results stay fresh.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ToolCacheError;

/// Lifetime for categories the policy does not know: short, never zero.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Resource category used to select a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Repositories,
    Issues,
    Pulls,
    Commits,
    Branches,
    Organizations,
    Users,
    Teams,
    Notifications,
    WorkflowRuns,
    #[serde(rename = "", other)]
    Unknown,
}

/// Name segments that map to a category.
const CATEGORY_SEGMENTS: [(&str, ResourceCategory); 23] = [
    ("repository", ResourceCategory::Repositories),
    ("repositories", ResourceCategory::Repositories),
    ("repo", ResourceCategory::Repositories),
    ("repos", ResourceCategory::Repositories),
    ("issue", ResourceCategory::Issues),
    ("issues", ResourceCategory::Issues),
    ("pull", ResourceCategory::Pulls),
    ("pulls", ResourceCategory::Pulls),
    ("pr", ResourceCategory::Pulls),
    ("commit", ResourceCategory::Commits),
    ("commits", ResourceCategory::Commits),
    ("branch", ResourceCategory::Branches),
    ("branches", ResourceCategory::Branches),
    ("org", ResourceCategory::Organizations),
    ("orgs", ResourceCategory::Organizations),
    ("organization", ResourceCategory::Organizations),
    ("organizations", ResourceCategory::Organizations),
    ("user", ResourceCategory::Users),
    ("users", ResourceCategory::Users),
    ("team", ResourceCategory::Teams),
    ("teams", ResourceCategory::Teams),
    ("notifications", ResourceCategory::Notifications),
    ("runs", ResourceCategory::WorkflowRuns),
];

impl ResourceCategory {
    /// Category of the resource an operation returns.
    ///
    /// The last recognised segment wins, so `list_repository_branches` is
    /// `Branches` and `get_issue_comments` is `Issues`.
    pub fn for_operation(operation: &str) -> Self {
        operation
            .split('_')
            .filter_map(|segment| {
                CATEGORY_SEGMENTS
                    .iter()
                    .find(|(name, _)| *name == segment)
                    .map(|(_, category)| *category)
            })
            .last()
            .unwrap_or(ResourceCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Repositories => "repositories",
            ResourceCategory::Issues => "issues",
            ResourceCategory::Pulls => "pulls",
            ResourceCategory::Commits => "commits",
            ResourceCategory::Branches => "branches",
            ResourceCategory::Organizations => "organizations",
            ResourceCategory::Users => "users",
            ResourceCategory::Teams => "teams",
            ResourceCategory::Notifications => "notifications",
            ResourceCategory::WorkflowRuns => "workflow_runs",
            ResourceCategory::Unknown => "",
        }
    }
}

impl FromStr for ResourceCategory {
    type Err = ToolCacheError;

    /// Unrecognised tags parse as `Unknown`, never as an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "repositories" => ResourceCategory::Repositories,
            "issues" => ResourceCategory::Issues,
            "pulls" => ResourceCategory::Pulls,
            "commits" => ResourceCategory::Commits,
            "branches" => ResourceCategory::Branches,
            "organizations" => ResourceCategory::Organizations,
            "users" => ResourceCategory::Users,
            "teams" => ResourceCategory::Teams,
            "notifications" => ResourceCategory::Notifications,
            "workflow_runs" => ResourceCategory::WorkflowRuns,
            _ => ResourceCategory::Unknown,
        })
    }
}

/// Recommended lifetime for a category, tuned to how fast it changes upstream.
pub fn recommended_ttl(category: ResourceCategory) -> Duration {
    const MINUTE: u64 = 60;
    match category {
        ResourceCategory::Repositories => Duration::from_secs(30 * MINUTE),
        ResourceCategory::Organizations => Duration::from_secs(60 * MINUTE),
        ResourceCategory::Users => Duration::from_secs(60 * MINUTE),
        ResourceCategory::Teams => Duration::from_secs(30 * MINUTE),
        ResourceCategory::Commits => Duration::from_secs(30 * MINUTE),
        ResourceCategory::Branches => Duration::from_secs(10 * MINUTE),
        ResourceCategory::Issues => Duration::from_secs(5 * MINUTE),
        ResourceCategory::Pulls => Duration::from_secs(5 * MINUTE),
        ResourceCategory::WorkflowRuns => Duration::from_secs(2 * MINUTE),
        ResourceCategory::Notifications => Duration::from_secs(MINUTE),
        ResourceCategory::Unknown => DEFAULT_TTL,
    }
}

/// TTL table with optional per-category overrides.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    overrides: HashMap<ResourceCategory, Duration>,
    default_ttl: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl TtlPolicy {
    /// Replace the lifetime used for unrecognised categories.
    /// A zero duration is ignored so unknown resources are never uncacheable by accident.
    pub fn with_default(mut self, ttl: Duration) -> Self {
        if !ttl.is_zero() {
            self.default_ttl = ttl;
        }
        self
    }

    /// Override the lifetime of one category.
    pub fn with_override(mut self, category: ResourceCategory, ttl: Duration) -> Self {
        self.overrides.insert(category, ttl);
        self
    }

    pub fn ttl_for(&self, category: ResourceCategory) -> Duration {
        if let Some(ttl) = self.overrides.get(&category) {
            return *ttl;
        }
        match category {
            ResourceCategory::Unknown => self.default_ttl,
            known => recommended_ttl(known),
        }
    }

    pub fn ttl_for_operation(&self, operation: &str) -> Duration {
        self.ttl_for(ResourceCategory::for_operation(operation))
    }
}
