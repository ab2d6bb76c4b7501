// GitHub API module.
// Client, response types, and the operation handler backed by them.

pub mod client;
pub mod handler;
pub mod types;

pub use client::{GITHUB_API_BASE, GitHubClient};
pub use handler::{GitHubHandler, OPERATIONS, issues_query_variables};
pub use types::RateLimit;
