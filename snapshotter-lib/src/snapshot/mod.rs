//! Capturing point-in-time snapshots of remote API resources.
//!
//! A run takes a list of [`EntityId`]s and a [`FieldSet`] describing what to capture for
//! each of them. The [`SnapshotScheduler`] fans the entities out with bounded concurrency
//! and a start stagger, the [`ResourceFetcher`] turns one entity into an
//! [`EntitySnapshot`], and the [`SnapshotStore`] persists the results atomically.
//!
//! # Implementation Model
//!
//! - Every request goes through a [`Transport`]. The HTTP implementation gates requests
//!   with the per-host [`RateLimiter`], retries transient failures with exponential
//!   backoff, pauses the host when the upstream reports a rate limit, and classifies
//!   whatever still fails into an [`ErrorKind`].
//! - Item counts of list endpoints come from the [`PaginationProbe`], which requests a
//!   single one-item page and reads the last page number from the response's
//!   [`PageMetadata`].
//! - Failures are contained at two levels. A failing field becomes `null` with an entry
//!   in the snapshot's `errors`. A failing basic-info lookup makes the whole entity
//!   unavailable, but the run goes on.

mod entity_id;
mod entity_snapshot;
mod error_kind;
mod fetcher;
pub(crate) mod field_spec;
mod http_transport;
mod page_metadata;
mod pagination;
mod path_utils;
mod progress;
mod rate_limiter;
mod run_tracker;
mod scheduler;
mod store;
mod store_lock;
mod transport;

pub use entity_id::{EntityId, load_entities};
pub use entity_snapshot::{BASIC_ERROR_KEY, EntitySnapshot, RunResult};
pub use error_kind::{ErrorKind, SnapshotError};
pub use fetcher::ResourceFetcher;
pub use field_spec::{DEFAULT_FIELDS_TOML, Extraction, FieldSet, FieldSpec};
pub use http_transport::{HttpTransport, RetryPolicy};
pub use page_metadata::{BodyField, LinkHeader, PageMetadata};
pub use pagination::{PaginationProbe, ProbeCount};
pub use path_utils::{entity_file_name, sanitize_path_component};
pub use progress::{NoProgress, Progress};
pub use rate_limiter::{HostLimits, RateLimiter, RatePermit, credit_limiter_wait, timeout_excluding_waits};
pub use scheduler::{SnapshotScheduler, dedup_entities};
pub use store::{SnapshotStore, write_atomic, write_json_atomic};
pub use store_lock::{LOCK_FILE_NAME, OutputLockGuard, acquire_output_lock, lock_holder};
pub use transport::{ApiRequest, ApiResponse, Transport};
