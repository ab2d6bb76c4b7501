// Pagination normalization.
// Converts the uniform parameter surface into offset (REST) or cursor (GraphQL) form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::operation::{Params, ParamsExt};

/// Page size used when the caller gives none (or zero).
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Hard upper limit of the upstream API; larger requests are clamped.
pub const MAX_PER_PAGE: u32 = 100;

/// Offset-style pagination for REST endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationParams {
    pub page: u64,
    pub per_page: u32,
    /// Cursor carried for callers that mix both conventions; empty when absent.
    pub after: String,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            after: String::new(),
        }
    }
}

impl PaginationParams {
    /// Query pairs for a REST request.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ]
    }

    /// Parameters for the following page.
    pub fn next_page(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Cursor-style pagination for GraphQL connections.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorPaginationParams {
    pub per_page: u32,
    /// Opaque continuation token; `None` means the start of the sequence.
    pub after: Option<String>,
}

impl CursorPaginationParams {
    /// GraphQL connection variables (`first`, `after`).
    ///
    /// A missing cursor is encoded as an explicit `null`; an empty string is
    /// not a valid cursor upstream and is never produced.
    pub fn to_transport_params(&self) -> Map<String, Value> {
        let mut variables = Map::new();
        variables.insert("first".to_string(), json!(self.per_page));
        variables.insert(
            "after".to_string(),
            match &self.after {
                Some(cursor) => Value::String(cursor.clone()),
                None => Value::Null,
            },
        );
        variables
    }

    /// Parameters for the following page, if the connection has one.
    pub fn next(&self, page_info: &PageInfo) -> Option<Self> {
        if !page_info.has_next_page {
            return None;
        }
        let cursor = page_info.end_cursor.as_deref().filter(|c| !c.is_empty())?;
        Some(Self {
            per_page: self.per_page,
            after: Some(cursor.to_string()),
        })
    }
}

/// GraphQL connection page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// REST page metadata returned alongside list results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetPageInfo {
    pub page: u64,
    pub per_page: u32,
    pub total_count: Option<u64>,
    pub has_more: bool,
}

impl OffsetPageInfo {
    /// Build page metadata from the request and the number of items returned.
    ///
    /// Without a total count, a full page is taken to mean more may follow.
    pub fn new(params: &PaginationParams, returned: usize, total_count: Option<u64>) -> Self {
        let has_more = match total_count {
            Some(total) => params.page.saturating_mul(u64::from(params.per_page)) < total,
            None => returned as u64 >= u64::from(params.per_page),
        };
        Self {
            page: params.page,
            per_page: params.per_page,
            total_count,
            has_more,
        }
    }
}

/// Read offset pagination from a parameter bag.
pub fn extract_pagination(params: &Params) -> PaginationParams {
    let page = params
        .get_int("page")
        .and_then(|p| u64::try_from(p).ok())
        .filter(|p| *p > 0)
        .unwrap_or(1);

    PaginationParams {
        page,
        per_page: extract_per_page(params),
        after: params.get_str("after").unwrap_or_default().to_string(),
    }
}

/// Read cursor pagination from a parameter bag.
pub fn extract_cursor_pagination(params: &Params) -> CursorPaginationParams {
    CursorPaginationParams {
        per_page: extract_per_page(params),
        after: params.get_str("after").map(str::to_string),
    }
}

/// Whether the caller supplied any offset pagination parameter.
pub fn has_pagination(params: &Params) -> bool {
    ["page", "per_page", "perPage"]
        .iter()
        .any(|key| params.contains_key(*key))
}

/// Page size, preferring `per_page` over `perPage`, defaulted and clamped.
fn extract_per_page(params: &Params) -> u32 {
    let requested = params
        .get_int("per_page")
        .or_else(|| params.get_int("perPage"))
        .filter(|n| *n > 0);

    match requested {
        Some(n) if n > i64::from(MAX_PER_PAGE) => MAX_PER_PAGE,
        Some(n) => n as u32,
        None => DEFAULT_PER_PAGE,
    }
}
