//! Adapters that read the last page number out of a paginated response.

use super::field_spec::lookup_path;
use core::fmt::Debug;
use reqwest::header::{HeaderMap, LINK};
use serde_json::Value;
use url::Url;

/// Reads last-page metadata from one API family's responses.
///
/// Absent or malformed metadata is `None`, never an error.
pub trait PageMetadata: Debug + Send + Sync {
    fn last_page(&self, headers: &HeaderMap, body: &Value) -> Option<u64>;
}

/// RFC 8288 `Link` header with a `rel="last"` target carrying a `page` query parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkHeader;

impl PageMetadata for LinkHeader {
    fn last_page(&self, headers: &HeaderMap, _body: &Value) -> Option<u64> {
        headers
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_last_page)
    }
}

/// A numeric field in the JSON body, such as `total_pages`.
#[derive(Debug, Clone)]
pub struct BodyField {
    path: String,
}

impl BodyField {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl PageMetadata for BodyField {
    fn last_page(&self, _headers: &HeaderMap, body: &Value) -> Option<u64> {
        lookup_path(body, &self.path)?.as_u64()
    }
}

/// Extract the `page` parameter of the `rel="last"` link of a `Link` header value.
fn parse_last_page(header: &str) -> Option<u64> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim().strip_prefix('<')?.strip_suffix('>')?;

        let is_last = parts.any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel") && value.trim().trim_matches('"').split_whitespace().any(|rel| rel == "last")
        });

        if !is_last {
            return None;
        }

        page_param(target)
    })
}

fn page_param(target: &str) -> Option<u64> {
    let url = Url::parse(target)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(target)))
        .ok()?;

    url.query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}
