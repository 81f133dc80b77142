//! Calendar service access.
//!
//! [`CalendarService`] is the seam between the planner and the remote
//! calendar. [`google::GoogleCalendar`] talks to Google Calendar v3 over
//! REST; tests plug in an in-memory fake.
//!
//! ```text
//! session ──▶ availability ──▶ CalendarService::free_busy
//!        └──▶ booker ────────▶ CalendarService::insert_event
//! ```

pub mod auth;
pub mod availability;
pub mod booker;
pub mod google;

use crate::error::Tt2CalError;
use crate::model::{BookedEvent, EventRequest, FreeBusyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::info;

/// Id Google gives the account's default calendar. Never written to.
pub const PRIMARY_CALENDAR_ID: &str = "primary";

/// One entry from the account's calendar list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSummary {
    pub id: String,
    pub summary: String,
}

/// An event as listed or fetched from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
}

/// Filters for [`CalendarService::list_events`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Free-text match over summary and description.
    pub text: Option<String>,
    /// Only events that start before this instant.
    pub time_max: Option<DateTime<Utc>>,
    /// Expand recurring events into instances.
    pub single_events: bool,
}

/// Operations the planner needs from a calendar backend.
///
/// Every method is one logical request; implementations follow pagination
/// internally and return the full result.
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, Tt2CalError>;

    /// Create a secondary calendar and return its id.
    async fn create_calendar(&self, name: &str, tz: Tz) -> Result<String, Tt2CalError>;

    /// Busy intervals on `calendar_id` within `[time_min, time_max)`.
    async fn free_busy(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResult, Tt2CalError>;

    async fn insert_event(
        &self,
        calendar_id: &str,
        request: &EventRequest,
    ) -> Result<BookedEvent, Tt2CalError>;

    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, Tt2CalError>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), Tt2CalError>;

    async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, Tt2CalError>;
}

/// Find a calendar by display name, creating it when the account has none.
///
/// The returned id is never [`PRIMARY_CALENDAR_ID`].
pub async fn find_or_create_calendar(
    service: &dyn CalendarService,
    name: &str,
    tz: Tz,
) -> Result<String, Tt2CalError> {
    let calendars = service.list_calendars().await?;
    if let Some(found) = calendars
        .into_iter()
        .find(|c| c.summary == name && c.id != PRIMARY_CALENDAR_ID)
    {
        info!("Found calendar '{}' ({})", name, found.id);
        return Ok(found.id);
    }

    let id = service.create_calendar(name, tz).await?;
    if id == PRIMARY_CALENDAR_ID {
        return Err(Tt2CalError::CalendarSetup {
            name: name.to_string(),
            message: "service returned the primary calendar".into(),
        });
    }
    info!("Created calendar '{}' ({})", name, id);
    Ok(id)
}
