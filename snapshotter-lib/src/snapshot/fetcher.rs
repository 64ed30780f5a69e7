use super::field_spec::{Extraction, FieldSpec};
use super::rate_limiter::timeout_excluding_waits;
use super::{ApiRequest, EntityId, EntitySnapshot, FieldSet, PaginationProbe, SnapshotError, Transport};
use chrono::Utc;
use core::time::Duration;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

const LOG_TARGET: &str = "   fetcher";

/// Response bodies already fetched for the current entity, keyed by request.
type BodyCache = HashMap<ApiRequest, Result<Value, SnapshotError>>;

/// Captures one entity's declared fields.
///
/// The basic-info endpoint is fetched first and decides whether the entity exists at all.
/// After that every field is extracted on its own: a failing field is recorded as `null`
/// with its error kind and does not affect the others.
///
/// The field timeout bounds the time spent on the network. Time held back by a rate
/// limiter does not count against it.
#[derive(Debug)]
pub struct ResourceFetcher<T> {
    transport: T,
    field_timeout: Duration,
}

impl<T: Transport> ResourceFetcher<T> {
    #[must_use]
    pub const fn new(transport: T, field_timeout: Duration) -> Self {
        Self { transport, field_timeout }
    }

    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch every field of `field_set` for `entity`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::EntityUnavailable`](super::ErrorKind::EntityUnavailable) when
    /// the basic-info request fails for any reason. Individual field failures are recorded
    /// in the returned snapshot instead.
    pub async fn fetch(&self, entity: &EntityId, field_set: &FieldSet) -> Result<EntitySnapshot, SnapshotError> {
        let stamp = Utc::now();

        let basic_request = ApiRequest::for_entity(&field_set.basic_endpoint, &BTreeMap::new(), entity);
        let basic = match timeout_excluding_waits(self.field_timeout, self.transport.get(&basic_request)).await {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(SnapshotError::unavailable(format!("basic info for '{entity}' failed with {e}"))),
            None => {
                return Err(SnapshotError::unavailable(format!(
                    "basic info for '{entity}' timed out after {}s",
                    self.field_timeout.as_secs()
                )));
            }
        };

        let mut bodies = BodyCache::new();
        let _ = bodies.insert(basic_request, Ok(basic.body));

        let mut snapshot = EntitySnapshot::new(stamp);
        for field in &field_set.fields {
            let request = ApiRequest::for_entity(&field.endpoint, &field.params, entity);

            let outcome = timeout_excluding_waits(self.field_timeout, self.extract(field, &request, &mut bodies))
                .await
                .unwrap_or_else(|| {
                    Err(SnapshotError::transient(format!(
                        "timed out after {}s",
                        self.field_timeout.as_secs()
                    )))
                });

            match outcome {
                Ok(value) => snapshot.record(&field.name, value),
                Err(e) => {
                    log::debug!(target: LOG_TARGET, "Could not capture field '{}' of '{entity}': {e}", field.name);
                    snapshot.record_failure(&field.name, e.kind());
                }
            }
        }

        Ok(snapshot)
    }

    async fn extract(&self, field: &FieldSpec, request: &ApiRequest, bodies: &mut BodyCache) -> Result<Value, SnapshotError> {
        match field.extraction {
            Extraction::PaginationCount => PaginationProbe::new(&self.transport).try_probe(request).await.map(Value::from),

            Extraction::BodyField => {
                let body = match bodies.entry(request.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => entry.insert(self.transport.get(request).await.map(|response| response.body)),
                };
                let body = body.as_ref().map_err(Clone::clone)?;

                field.extract(body).cloned().ok_or_else(|| {
                    SnapshotError::malformed(format!(
                        "path '{}' not found in response of '{}'",
                        field.path.as_deref().unwrap_or_default(),
                        request.endpoint
                    ))
                })
            }
        }
    }
}
