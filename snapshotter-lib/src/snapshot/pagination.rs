use super::{ApiRequest, SnapshotError, Transport};
use core::fmt::{Display, Formatter};
use serde::{Serialize, Serializer};
use serde_json::Value;

const LOG_TARGET: &str = "pagination";

/// Total item count of a paginated list, or `Unknown` when the probe request failed.
///
/// `Unknown` is exposed as `-1` so it can never be confused with an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCount {
    Known(u64),
    Unknown,
}

impl ProbeCount {
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Known(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Self::Unknown => -1,
        }
    }
}

impl Display for ProbeCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

impl Serialize for ProbeCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl From<ProbeCount> for Value {
    fn from(count: ProbeCount) -> Self {
        Self::from(count.as_i64())
    }
}

/// Counts the items of a paginated list endpoint with a single one-item page request.
///
/// With `per_page=1` the last page number equals the item count. When the response has
/// no usable pagination metadata the list fits on one page, so the body's items are counted.
#[derive(Debug)]
pub struct PaginationProbe<'a, T> {
    transport: &'a T,
}

impl<'a, T: Transport> PaginationProbe<'a, T> {
    #[must_use]
    pub const fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Count the items behind `request`, collapsing every failure to [`ProbeCount::Unknown`].
    pub async fn probe(&self, request: &ApiRequest) -> ProbeCount {
        match self.try_probe(request).await {
            Ok(count) => ProbeCount::Known(count),
            Err(e) => {
                log::debug!(target: LOG_TARGET, "Could not count items of '{}': {e}", request.endpoint);
                ProbeCount::Unknown
            }
        }
    }

    /// Count the items behind `request`, keeping the reason for a failure.
    pub async fn try_probe(&self, request: &ApiRequest) -> Result<u64, SnapshotError> {
        let request = request.clone().with_param("per_page", "1");
        let response = self.transport.get(&request).await?;

        if let Some(last_page) = response.last_page {
            return Ok(last_page);
        }

        match &response.body {
            Value::Array(items) => Ok(items.len() as u64),
            other => Err(SnapshotError::malformed(format!(
                "expected a JSON array from '{}' without pagination metadata, got {}",
                request.endpoint,
                json_type_name(other)
            ))),
        }
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
