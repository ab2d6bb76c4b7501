// Operation module.
// Handler contract, result and parameter types, classification, and the tool registry.

pub mod classifier;
pub mod handler;
pub mod registry;
pub mod types;

pub use classifier::{ResourceFamily, is_read_only};
pub use handler::OperationHandler;
pub use registry::{ToolRegistry, ToolRegistryBuilder, normalize_params, resolve_operation_name};
pub use types::{OperationResult, Params, ParamsExt};
