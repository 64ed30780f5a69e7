#![doc(hidden)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for snapshotter
//!
//! This library holds all functionality of the snapshotter tool, which captures
//! point-in-time JSON snapshots of many entities from a paginated, rate-limited REST API.
//!
//! # Module Organization
//!
//! - [`snapshot`]: Rate limiting, transport, pagination probing, fetching, scheduling, and persistence
//! - [`commands`]: Command-line interface and orchestration

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

#[cfg(any(debug_assertions, test))]
pub mod commands;
#[cfg(not(any(debug_assertions, test)))]
mod commands;

pub mod snapshot;

pub use crate::commands::{Host, run};
