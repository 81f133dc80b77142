//! Progress-callback trait for per-entry timetable sync events.
//!
//! Pass an [`Arc<dyn SyncProgressCallback>`] to
//! [`crate::session::PlannerSession::sync_timetable`] to receive events as
//! each entry is booked. The CLI forwards them to an `indicatif` bar; a
//! library caller can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use timetable2cal::SyncProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct Counter(AtomicUsize);
//!
//! impl SyncProgressCallback for Counter {
//!     fn on_entry_booked(&self, index: usize, total: usize, course: &str) {
//!         let done = self.0.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{course}: {}/{total} ({done} booked)", index + 1);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Called by the session while a timetable sync runs.
///
/// All methods default to no-ops so callers only override what they need.
/// Entries are processed one at a time, in timetable order.
pub trait SyncProgressCallback: Send + Sync {
    /// Called once before the first entry.
    fn on_sync_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before an entry is sent to the calendar.
    ///
    /// # Arguments
    /// * `index`  — 0-based entry index
    /// * `total`  — number of entries
    /// * `course` — course name of the entry
    fn on_entry_start(&self, index: usize, total: usize, course: &str) {
        let _ = (index, total, course);
    }

    fn on_entry_booked(&self, index: usize, total: usize, course: &str) {
        let _ = (index, total, course);
    }

    /// Called when an entry could not be booked. The sync continues.
    fn on_entry_failed(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every entry has been attempted.
    fn on_sync_complete(&self, total: usize, booked: usize) {
        let _ = (total, booked);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SyncProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn SyncProgressCallback>;
