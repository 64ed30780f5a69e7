//! Helpers for turning entity ids into safe file names.

use super::EntityId;

/// Sanitize a string for use as a single path component.
///
/// Replaces `..` and characters that are unsafe in file names on common platforms.
#[must_use]
pub fn sanitize_path_component(s: &str) -> String {
    let s = s.replace("..", "__");
    s.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

/// File name used for an entity's standalone snapshot.
///
/// Each `/`-separated segment of the id is sanitized on its own and the segments are
/// joined with `-`, so `owner/repo` becomes `owner-repo.json`. A `-` inside a segment is
/// doubled, keeping `a-b/c` and `a/b-c` in separate files.
#[must_use]
pub fn entity_file_name(id: &EntityId) -> String {
    let stem = id
        .as_str()
        .split('/')
        .map(|segment| sanitize_path_component(segment).replace('-', "--"))
        .collect::<Vec<_>>()
        .join("-");

    format!("{stem}.json")
}
