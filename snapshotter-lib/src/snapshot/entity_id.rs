use crate::Result;
use core::fmt::{Display, Formatter};
use core::str::FromStr;
use ohno::{EnrichableExt, IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Opaque key identifying one remote resource, such as `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(Arc<str>);

impl EntityId {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("entity id must not be empty");
        }

        if s.chars().any(char::is_whitespace) {
            bail!("entity id '{s}' must not contain whitespace");
        }

        Ok(Self(Arc::from(s)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Substitute this id for every `{entity}` placeholder in an endpoint template.
    #[must_use]
    pub fn expand(&self, template: &str) -> String {
        template.replace("{entity}", &self.0)
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = ohno::AppError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0.to_string()
    }
}

/// Load the list of entities to snapshot.
///
/// Files ending in `.json` hold a JSON array of strings. Anything else is read as one id
/// per line, ignoring blank lines and `#` comments.
pub fn load_entities(path: &Path) -> Result<Vec<EntityId>> {
    let text = fs::read_to_string(path).into_app_err_with(|| format!("reading entity list '{}'", path.display()))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        let raw: Vec<String> =
            serde_json::from_str(&text).into_app_err_with(|| format!("parsing entity list '{}'", path.display()))?;
        return raw
            .iter()
            .map(|s| EntityId::parse(s))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.enrich_with(|| format!("invalid entity in '{}'", path.display())));
    }

    parse_entity_lines(&text).map_err(|e| e.enrich_with(|| format!("invalid entity in '{}'", path.display())))
}

fn parse_entity_lines(text: &str) -> Result<Vec<EntityId>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(EntityId::parse)
        .collect()
}
