//! Error types for the timetable2cal library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Tt2CalError`] — the requested action could not complete (document
//!   unreadable, model unreachable, no JSON in the reply, calendar call
//!   failed). Returned as `Err(Tt2CalError)` from every session operation.
//!   None of these are fatal to the process: the shell reports the message and
//!   stays usable for the next attempt.
//!
//! * [`EntryError`] — a single timetable entry failed to book during a sync
//!   while the others went through. Stored inside
//!   [`crate::model::EntryResult`] so callers see partial success. Earlier
//!   bookings are never rolled back.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the timetable2cal library.
#[derive(Debug, Error)]
pub enum Tt2CalError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The bytes are not a PDF document.
    #[error("Document is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { magic: Vec<u8> },

    /// The document exceeds the configured upload limit.
    #[error("PDF is too large ({size} bytes, limit {limit} bytes).\nPlease compress it.")]
    DocumentTooLarge { size: usize, limit: usize },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The model could not be reached or refused the document.
    #[error("Extraction failed after {attempts} attempt(s): {message}")]
    Extraction { attempts: u32, message: String },

    /// No structured data could be recovered from the model's reply.
    #[error("Could not parse the model response: {reason}")]
    Parse { reason: String },

    // ── Calendar errors ───────────────────────────────────────────────────
    /// The free/busy query failed.
    #[error("Availability check failed for calendar '{calendar_id}': {message}")]
    Availability { calendar_id: String, message: String },

    /// Event creation (or deletion) failed.
    #[error("Booking failed on calendar '{calendar_id}': {message}")]
    Booking { calendar_id: String, message: String },

    /// Calendar lookup or creation failed.
    #[error("Failed to get or create calendar '{name}': {message}")]
    CalendarSetup { name: String, message: String },

    /// An event request is malformed (end before start, empty title, …).
    #[error("Invalid event request: {0}")]
    InvalidRequest(String),

    /// A cancellation was refused by policy.
    #[error("Cancellation denied: {reason}")]
    CancellationDenied { reason: String },

    // ── Auth errors ───────────────────────────────────────────────────────
    /// OAuth credentials are missing, expired or rejected.
    #[error("Authentication error: {detail}\nRun `tt2cal auth` to authorize calendar access.")]
    Auth { detail: String },

    /// The token file could not be read or written.
    #[error("Token store error at '{path}': {detail}")]
    TokenStore { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Tt2CalError {
    /// Shorthand for a [`Tt2CalError::Parse`].
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

/// A non-fatal error for a single timetable entry during a sync.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum EntryError {
    /// The entry could not be turned into a calendar event.
    #[error("Entry {index} ({course}): invalid entry: {detail}")]
    Invalid {
        index: usize,
        course: String,
        detail: String,
    },

    /// The calendar service rejected the event.
    #[error("Entry {index} ({course}): booking failed: {detail}")]
    BookingFailed {
        index: usize,
        course: String,
        detail: String,
    },
}
