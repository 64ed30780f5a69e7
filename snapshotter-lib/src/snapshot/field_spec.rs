use super::BASIC_ERROR_KEY;
use crate::Result;
use camino::Utf8Path;
use ohno::{EnrichableExt, IntoAppError, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;

/// The built-in field set, embedded from `default_fields.toml`
pub const DEFAULT_FIELDS_TOML: &str = include_str!("../../default_fields.toml");

/// Keys of the persisted snapshot that fields may not shadow. A field named like the
/// basic-info error key would make its own failure look like an unavailable entity.
const RESERVED_NAMES: [&str; 3] = ["stamp", "errors", BASIC_ERROR_KEY];

/// How a field's value is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extraction {
    /// Read a value at a dotted path in the endpoint's JSON body.
    BodyField,

    /// Count the items of a paginated list endpoint.
    PaginationCount,
}

/// Declarative description of one output field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,

    /// Endpoint template relative to the API base, with `{entity}` placeholders.
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,

    pub extraction: Extraction,

    /// Dotted path into the body, e.g. `license.name`. Only for body fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl FieldSpec {
    /// Look up this field's path in a JSON body.
    ///
    /// Returns `None` when some segment of the path is absent. A JSON `null` stored at
    /// the path is returned as `Some(Value::Null)`.
    #[must_use]
    pub fn extract<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        lookup_path(body, self.path.as_deref().unwrap_or_default())
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("field names must not be empty");
        }

        if RESERVED_NAMES.contains(&self.name.as_str()) {
            bail!("field name '{}' is reserved", self.name);
        }

        validate_endpoint(&self.endpoint).map_err(|e| e.enrich_with(|| format!("field '{}'", self.name)))?;

        match (self.extraction, self.path.as_deref()) {
            (Extraction::BodyField, None | Some("")) => bail!("body field '{}' needs a non-empty path", self.name),
            (Extraction::PaginationCount, Some(_)) => bail!("pagination-count field '{}' must not have a path", self.name),
            _ => Ok(()),
        }
    }
}

/// The basic-info endpoint plus the ordered fields to capture for every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSet {
    /// Endpoint template whose success decides whether the entity is available at all.
    pub basic_endpoint: String,

    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FieldSet {
    /// Load a field set from a TOML file, or the built-in preset when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::from_toml(DEFAULT_FIELDS_TOML).map_err(|e| e.enrich("parsing built-in field set"));
        };

        let text = fs::read_to_string(path).into_app_err_with(|| format!("reading field set '{path}'"))?;
        Self::from_toml(&text).map_err(|e| e.enrich_with(|| format!("loading field set '{path}'")))
    }

    /// Parse and validate a field set from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let set: Self = toml::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// Write the built-in field set to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_FIELDS_TOML).into_app_err_with(|| format!("writing default field set to {output_path}"))
    }

    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.basic_endpoint).map_err(|e| e.enrich("basic_endpoint"))?;

        let mut seen = HashSet::new();
        for field in &self.fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                bail!("field '{}' is declared more than once", field.name);
            }
        }

        Ok(())
    }

    /// Field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::from_toml(DEFAULT_FIELDS_TOML).expect("default_fields.toml should be a valid field set")
    }
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.starts_with('/') {
        bail!("endpoint '{endpoint}' must start with '/'");
    }

    Ok(())
}

/// Walk a dotted path through objects (by key) and arrays (by index).
pub(crate) fn lookup_path<'a>(mut value: &'a Value, path: &str) -> Option<&'a Value> {
    for segment in path.split('.') {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(value)
}
