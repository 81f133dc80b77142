//! # timetable2cal
//!
//! Turn a university timetable PDF into recurring Google Calendar events,
//! and book club events only when they do not clash with classes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate size and magic bytes, hash for the cache
//!  ├─ 2. Extract   send the document inline to a multimodal model
//!  ├─ 3. Sanitize  recover JSON from the reply → Timetable
//!  └─ 4. Sync      one weekly event per entry on the Static calendar
//!
//! Organizer form
//!  │
//!  ├─ 1. Check     free/busy on Static + Club for the whole local day
//!  ├─ 2. Book      create the event on the Club calendar, or
//!  └─ 2'. Suggest  propose free slots when blocked
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use timetable2cal::{PlannerConfig, PlannerSession};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Model key from GEMINI_API_KEY; calendar token from token.json
//!     let session = PlannerSession::google(PlannerConfig::default())?;
//!     let timetable = session.extract_timetable_file("timetable.pdf").await?;
//!     let report = session
//!         .sync_timetable(
//!             &timetable,
//!             NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
//!             NaiveDate::from_ymd_opt(2026, 4, 30).unwrap(),
//!             None,
//!         )
//!         .await?;
//!     eprintln!("booked {} / failed {}", report.booked(), report.failed());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tt2cal` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheStats, SessionCache};
pub use calendar::CalendarService;
pub use config::{PlannerConfig, PlannerConfigBuilder};
pub use error::{EntryError, Tt2CalError};
pub use model::{
    AssistDraft, Availability, BookedEvent, BookingOutcome, CalendarKind, EventRequest,
    OrganizerForm, SlotSuggestion, SyncReport, Timetable, TimetableEntry, UndoReport,
};
pub use pipeline::llm::DocumentModel;
pub use pipeline::sanitize::{parse_as, parse_timetable, recover_json};
pub use progress::{NoopProgressCallback, SyncProgressCallback};
pub use session::PlannerSession;
