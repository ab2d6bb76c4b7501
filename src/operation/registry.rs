// Tool registry.
// Maps tool names to handlers, wrapping read-only tools with the caching layer at build time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cache::CachingLayer;
use crate::error::{Result, ToolCacheError};

use super::classifier::is_read_only;
use super::handler::OperationHandler;
use super::types::{OperationResult, Params};

/// Canonical tool name: `-` and `/` separators become `_`.
pub fn resolve_operation_name(operation: &str) -> String {
    operation.replace(['-', '/'], "_")
}

/// Flatten a nested `parameters` object into the top level.
///
/// Top-level keys win over nested ones.
pub fn normalize_params(params: &Params) -> Params {
    let mut normalized = params.clone();

    if let Some(Value::Object(nested)) = params.get("parameters") {
        normalized.remove("parameters");
        for (key, value) in nested {
            normalized
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    normalized
}

/// Named tools, built once at startup and shared by reference.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn OperationHandler>>,
    cache: Option<Arc<CachingLayer>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// The caching layer shared by the cached tools, if any.
    pub fn cache(&self) -> Option<&Arc<CachingLayer>> {
        self.cache.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(&resolve_operation_name(name))
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl OperationHandler for ToolRegistry {
    async fn execute(&self, operation: &str, params: &Params) -> Result<OperationResult> {
        let name = resolve_operation_name(operation);
        let tool = self
            .tools
            .get(&name)
            .ok_or_else(|| ToolCacheError::UnknownOperation(name.clone()))?;

        let params = normalize_params(params);
        debug!(operation = %name, params = params.len(), "executing tool");
        tool.execute(&name, &params).await
    }
}

/// Builder collecting tools before the registry is frozen.
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, Arc<dyn OperationHandler>>,
    cache: Option<Arc<CachingLayer>>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, name: &str, handler: Arc<dyn OperationHandler>) -> Self {
        self.tools.insert(resolve_operation_name(name), handler);
        self
    }

    /// Register one handler under several tool names.
    pub fn register_all<'a>(
        mut self,
        names: impl IntoIterator<Item = &'a str>,
        handler: Arc<dyn OperationHandler>,
    ) -> Self {
        for name in names {
            self.tools
                .insert(resolve_operation_name(name), Arc::clone(&handler));
        }
        self
    }

    /// Serve read-only tools through `layer`.
    pub fn with_cache(mut self, layer: Arc<CachingLayer>) -> Self {
        self.cache = Some(layer);
        self
    }

    pub fn build(self) -> ToolRegistry {
        let cache = self.cache;
        let tools = self
            .tools
            .into_iter()
            .map(|(name, handler)| {
                let handler = match &cache {
                    Some(layer) if is_read_only(&name) => {
                        Arc::new(layer.wrap(handler)) as Arc<dyn OperationHandler>
                    }
                    _ => handler,
                };
                (name, handler)
            })
            .collect();

        ToolRegistry { tools, cache }
    }
}
