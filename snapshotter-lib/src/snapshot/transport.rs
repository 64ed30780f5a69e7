use super::{EntityId, SnapshotError};
use serde_json::Value;
use std::collections::BTreeMap;

/// One GET request against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiRequest {
    /// Path relative to the API base, with placeholders already expanded.
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
        }
    }

    /// Expand an endpoint template for `entity`.
    #[must_use]
    pub fn for_entity(template: &str, params: &BTreeMap<String, String>, entity: &EntityId) -> Self {
        Self {
            endpoint: entity.expand(template),
            params: params.clone(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.params.insert(key.into(), value.into());
        self
    }
}

/// A successful, already-decoded response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub body: Value,

    /// Last page number reported by the response's pagination metadata, if any.
    pub last_page: Option<u64>,
}

/// Source of API responses.
///
/// Implementations own retries, rate limiting and failure classification, so callers
/// only see a decoded body or a classified [`SnapshotError`].
pub trait Transport: Send + Sync {
    fn get(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse, SnapshotError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn get(&self, request: &ApiRequest) -> impl Future<Output = Result<ApiResponse, SnapshotError>> + Send {
        (**self).get(request)
    }
}
