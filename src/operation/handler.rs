// Operation handler contract.
// Every tool, and every decorator around a tool, implements this one trait.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{OperationResult, Params};

/// Executes one named operation.
///
/// Business failures (the upstream API rejected the request) come back as
/// `Ok(OperationResult::error(..))`. An `Err` means the call itself could not
/// be made and is propagated to the caller untouched.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn execute(&self, operation: &str, params: &Params) -> Result<OperationResult>;
}
