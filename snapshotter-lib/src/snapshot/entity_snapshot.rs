use super::{EntityId, ErrorKind, FieldSet};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key under which a failed basic-info lookup is reported in [`EntitySnapshot::errors`].
pub const BASIC_ERROR_KEY: &str = "basic";

/// Captured field values for one entity.
///
/// Serializes as `{"stamp": ..., <fields in declared order>, "errors": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// When capture of this entity started.
    pub stamp: DateTime<Utc>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,

    #[serde(default)]
    pub errors: BTreeMap<String, ErrorKind>,
}

impl EntitySnapshot {
    #[must_use]
    pub fn new(stamp: DateTime<Utc>) -> Self {
        Self {
            stamp,
            fields: Map::new(),
            errors: BTreeMap::new(),
        }
    }

    /// Snapshot of an entity whose basic-info lookup failed.
    ///
    /// Every declared field is `null` and errored as [`ErrorKind::EntityUnavailable`].
    #[must_use]
    pub fn unavailable(stamp: DateTime<Utc>, field_set: &FieldSet) -> Self {
        let mut snapshot = Self::new(stamp);
        let _ = snapshot.errors.insert(BASIC_ERROR_KEY.to_string(), ErrorKind::EntityUnavailable);
        for name in field_set.names() {
            snapshot.record_failure(name, ErrorKind::EntityUnavailable);
        }
        snapshot
    }

    pub fn record(&mut self, name: &str, value: Value) {
        let _ = self.fields.insert(name.to_string(), value);
    }

    pub fn record_failure(&mut self, name: &str, kind: ErrorKind) {
        let _ = self.fields.insert(name.to_string(), Value::Null);
        let _ = self.errors.insert(name.to_string(), kind);
    }

    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn error(&self, name: &str) -> Option<ErrorKind> {
        self.errors.get(name).copied()
    }

    /// Whether the whole entity could not be captured.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.errors.contains_key(BASIC_ERROR_KEY)
    }
}

/// Snapshots of all entities of a run, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    entries: Vec<(EntityId, EntitySnapshot)>,
}

impl RunResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity's snapshot, replacing an existing entry for the same id in place.
    pub fn insert(&mut self, id: EntityId, snapshot: EntitySnapshot) {
        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = snapshot;
        } else {
            self.entries.push((id, snapshot));
        }
    }

    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&EntitySnapshot> {
        self.entries.iter().find(|(existing, _)| existing == id).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntitySnapshot)> {
        self.entries.iter().map(|(id, s)| (id, s))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entities whose basic-info lookup failed.
    #[must_use]
    pub fn unavailable_count(&self) -> usize {
        self.entries.iter().filter(|(_, s)| s.is_unavailable()).count()
    }
}

impl IntoIterator for RunResult {
    type Item = (EntityId, EntitySnapshot);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for RunResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, snapshot) in &self.entries {
            map.serialize_entry(id.as_str(), snapshot)?;
        }
        map.end()
    }
}
