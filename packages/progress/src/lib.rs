#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Progress reporting for the long-running pipeline stages.
//!
//! Loading every DNO file, matching the national postcode table and
//! writing a few thousand chunk files each take long enough to want an
//! indicator. Library crates report through [`ProgressCallback`] and do
//! not know how (or whether) it is rendered; the binary decides.

use std::sync::Arc;

/// Sink for progress updates from a single pipeline stage.
///
/// Stages that know their size up front (DNO files) call
/// [`set_total`](Self::set_total) once before the first
/// [`inc`](Self::inc). Stages that only learn it later (postcode
/// matching, which first has to read the CSV) call it as soon as the
/// count is known, and a renderer may show an indeterminate indicator
/// until then.
///
/// Shared as `Arc<dyn ProgressCallback>`, hence `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Total units of work for the stage.
    fn set_total(&self, total: u64);

    /// Absolute position.
    fn set_position(&self, pos: u64);

    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Completes the stage, leaving `msg` visible.
    fn finish(&self, msg: String);

    /// Completes the stage and removes the indicator.
    fn finish_and_clear(&self);
}

/// Discards every update. Used by tests and by library callers that run
/// without a terminal.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
