//! The planner session: one user's context for extracting timetables and
//! booking events.
//!
//! A [`PlannerSession`] owns the configuration, the model and calendar
//! handles, the resolved calendar ids and both session caches. Every
//! operation runs to completion before returning; nothing runs in the
//! background.
//!
//! Checking availability and booking are two separate calls to the calendar
//! service. Two sessions acting on the same slot at the same moment can
//! both see it free and both book it.

use crate::cache::{CacheStats, SessionCache};
use crate::calendar::auth::{OAuthClient, TokenManager, TokenStore};
use crate::calendar::availability::{invalidate_day, local_instant, AvailabilityChecker, FreeBusyKey};
use crate::calendar::booker::EventBooker;
use crate::calendar::google::GoogleCalendar;
use crate::calendar::{find_or_create_calendar, CalendarService, EventQuery};
use crate::config::PlannerConfig;
use crate::error::{EntryError, Tt2CalError};
use crate::model::{
    AssistDraft, Availability, BookingOutcome, CalendarKind, EntryResult, EventRequest,
    FreeBusyResult, OrganizerForm, SlotSuggestion, SyncReport, Timetable, TimetableEntry,
    UndoReport, WeeklyRecurrence,
};
use crate::pipeline::input::{load_document, PdfDocument};
use crate::pipeline::llm::{self, DocumentModel, LlmDocumentModel};
use crate::pipeline::sanitize;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::prompts;
use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Ids of the two managed calendars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarIds {
    pub static_id: String,
    pub club_id: String,
}

pub struct PlannerSession {
    config: PlannerConfig,
    calendar: Arc<dyn CalendarService>,
    model: OnceCell<Arc<dyn DocumentModel>>,
    calendar_ids: OnceCell<CalendarIds>,
    extractions: SessionCache<String, Timetable>,
    free_busy: SessionCache<FreeBusyKey, FreeBusyResult>,
}

impl PlannerSession {
    /// Session over an arbitrary calendar backend. The model is resolved
    /// from `config` the first time it is needed unless set with
    /// [`PlannerSession::with_model`].
    pub fn new(config: PlannerConfig, calendar: Arc<dyn CalendarService>) -> Self {
        Self {
            config,
            calendar,
            model: OnceCell::new(),
            calendar_ids: OnceCell::new(),
            extractions: SessionCache::new(),
            free_busy: SessionCache::new(),
        }
    }

    pub fn with_model(self, model: Arc<dyn DocumentModel>) -> Self {
        Self {
            model: OnceCell::new_with(Some(model)),
            ..self
        }
    }

    /// Session against Google Calendar using the saved OAuth token.
    pub fn google(config: PlannerConfig) -> Result<Self, Tt2CalError> {
        let oauth = OAuthClient::from_env_or_file(
            &config.credentials_path,
            &config.token_endpoint,
            config.api_timeout_secs,
        )?;
        let tokens = TokenManager::new(oauth, TokenStore::new(&config.token_path));
        let calendar = GoogleCalendar::new(
            &config.calendar_api_base,
            Arc::new(tokens),
            config.api_timeout_secs,
        )?;
        Ok(Self::new(config, Arc::new(calendar)))
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    async fn model(&self) -> Result<&Arc<dyn DocumentModel>, Tt2CalError> {
        self.model
            .get_or_try_init(|| async {
                let model = LlmDocumentModel::from_config(&self.config)?;
                Ok::<_, Tt2CalError>(Arc::new(model) as Arc<dyn DocumentModel>)
            })
            .await
    }

    /// Find or create the Static and Club calendars, once per session.
    pub async fn calendar_ids(&self) -> Result<&CalendarIds, Tt2CalError> {
        self.calendar_ids
            .get_or_try_init(|| async {
                let tz = self.config.timezone;
                let static_id = find_or_create_calendar(
                    self.calendar.as_ref(),
                    &self.config.static_calendar_name,
                    tz,
                )
                .await?;
                let club_id = find_or_create_calendar(
                    self.calendar.as_ref(),
                    &self.config.club_calendar_name,
                    tz,
                )
                .await?;
                Ok::<_, Tt2CalError>(CalendarIds { static_id, club_id })
            })
            .await
    }

    fn checker(&self) -> AvailabilityChecker<'_> {
        AvailabilityChecker::new(self.calendar.as_ref(), &self.free_busy, self.config.timezone)
    }

    fn booker(&self) -> EventBooker<'_> {
        EventBooker::new(self.calendar.as_ref(), &self.free_busy, self.config.timezone)
    }

    // ── Extraction ───────────────────────────────────────────────────────

    /// Load and extract a timetable PDF from disk.
    pub async fn extract_timetable_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Timetable, Tt2CalError> {
        let doc = load_document(path.as_ref(), self.config.max_document_bytes).await?;
        self.extract_timetable(&doc).await
    }

    /// Extract a timetable, reusing the result for a document with the same
    /// digest seen earlier in this session.
    pub async fn extract_timetable(&self, doc: &PdfDocument) -> Result<Timetable, Tt2CalError> {
        if let Some(hit) = self.extractions.get(&doc.digest().to_string()) {
            debug!("Extraction cache hit for {}", doc.name());
            return Ok(hit);
        }

        let model = self.model().await?;
        let raw = llm::extract_document(model.as_ref(), doc, &self.config).await?;
        let timetable = sanitize::parse_timetable(&raw)?;
        info!(
            "Extracted {} entries ({} / {})",
            timetable.entries.len(),
            timetable.metadata.branch,
            timetable.metadata.semester_label
        );
        self.extractions
            .insert(doc.digest().to_string(), timetable.clone());
        Ok(timetable)
    }

    /// Turn a natural-language request into organizer form values.
    pub async fn assist(&self, request: &str, today: NaiveDate) -> Result<AssistDraft, Tt2CalError> {
        let model = self.model().await?;
        let raw = llm::complete_text(
            model.as_ref(),
            prompts::ASSIST_SYSTEM_PROMPT,
            &prompts::assist_request(today, request),
            &self.config,
        )
        .await?;
        sanitize::parse_as(&raw)
    }

    // ── Availability ─────────────────────────────────────────────────────

    fn targets<'a>(&self, kind: CalendarKind, ids: &'a CalendarIds) -> Vec<(CalendarKind, &'a str)> {
        match kind {
            CalendarKind::Club => vec![
                (CalendarKind::Static, ids.static_id.as_str()),
                (CalendarKind::Club, ids.club_id.as_str()),
            ],
            CalendarKind::Static => vec![],
        }
    }

    /// Check an interval for a request of `kind`.
    ///
    /// Club requests are checked against both calendars; Static requests
    /// are not checked.
    pub async fn check_availability(
        &self,
        kind: CalendarKind,
        start: DateTime<chrono_tz::Tz>,
        end: DateTime<chrono_tz::Tz>,
    ) -> Result<Availability, Tt2CalError> {
        if kind == CalendarKind::Static {
            return Ok(Availability::Free);
        }
        let ids = self.calendar_ids().await?;
        self.checker()
            .check(&self.targets(kind, ids), start, end)
            .await
    }

    /// Free slots near a blocked request.
    pub async fn suggest_alternatives(
        &self,
        request: &EventRequest,
        weekdays: Option<&[Weekday]>,
    ) -> Result<Vec<SlotSuggestion>, Tt2CalError> {
        let ids = self.calendar_ids().await?;
        self.checker()
            .suggest(
                &self.targets(request.calendar, ids),
                request.start,
                request.end - request.start,
                self.config.suggestion_count,
                self.config.suggestion_horizon_days,
                weekdays,
            )
            .await
    }

    // ── Booking ──────────────────────────────────────────────────────────

    /// Build the Club event for an organizer form.
    pub fn request_from_form(&self, form: &OrganizerForm) -> Result<EventRequest, Tt2CalError> {
        let start = local_instant(self.config.timezone, form.date, form.time)?;
        let end = start + Duration::minutes(i64::from(self.config.event_duration_minutes));
        let description = if form.targets.is_empty() {
            String::new()
        } else {
            format!("Target: {}", form.targets.join(", "))
        };
        EventRequest::new(form.title.trim(), description, start, end, CalendarKind::Club)
    }

    /// Check the organizer's slot and book it if free; otherwise return the
    /// conflicts and alternative slots.
    pub async fn book_event(&self, form: &OrganizerForm) -> Result<BookingOutcome, Tt2CalError> {
        let request = self.request_from_form(form)?;
        self.book_request(&request, None).await
    }

    /// Check then book a Club request. When blocked, suggestions are
    /// limited to `weekdays` if given.
    pub async fn book_request(
        &self,
        request: &EventRequest,
        weekdays: Option<&[Weekday]>,
    ) -> Result<BookingOutcome, Tt2CalError> {
        let availability = self
            .check_availability(request.calendar, request.start, request.end)
            .await?;

        if let Availability::Blocked { conflicts } = availability {
            info!(
                "'{}' blocked by {} conflict(s)",
                request.title,
                conflicts.len()
            );
            let suggestions = self.suggest_alternatives(request, weekdays).await?;
            return Ok(BookingOutcome::Blocked {
                conflicts,
                suggestions,
            });
        }

        let ids = self.calendar_ids().await?;
        let calendar_id = match request.calendar {
            CalendarKind::Static => &ids.static_id,
            CalendarKind::Club => &ids.club_id,
        };
        let booked = self.booker().book(calendar_id, request).await?;
        Ok(BookingOutcome::Booked(booked))
    }

    /// Cancel a Club event, allowed only within the cancellation window
    /// after it was created.
    pub async fn cancel_club_event(
        &self,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), Tt2CalError> {
        let ids = self.calendar_ids().await?;
        let event = self.calendar.get_event(&ids.club_id, event_id).await?;
        let created = event.created.ok_or_else(|| Tt2CalError::CancellationDenied {
            reason: format!("event '{event_id}' has no creation time"),
        })?;

        let window = Duration::hours(self.config.cancellation_window_hours);
        if now - created > window {
            return Err(Tt2CalError::CancellationDenied {
                reason: format!(
                    "the {}-hour free cancellation window has passed",
                    self.config.cancellation_window_hours
                ),
            });
        }

        self.calendar.delete_event(&ids.club_id, event_id).await?;
        if let Some(start) = event.start {
            invalidate_day(
                &self.free_busy,
                &ids.club_id,
                start.with_timezone(&self.config.timezone),
            )?;
        }
        info!("Cancelled club event '{}' ({})", event.summary, event_id);
        Ok(())
    }

    // ── Timetable sync ───────────────────────────────────────────────────

    fn entry_request(
        &self,
        timetable: &Timetable,
        entry: &TimetableEntry,
        semester_start: NaiveDate,
        semester_end: NaiveDate,
    ) -> Result<EventRequest, String> {
        let first = entry.day().first_on_or_after(semester_start);
        if first > semester_end {
            return Err(format!(
                "no {} between {} and {}",
                entry.day(),
                semester_start,
                semester_end
            ));
        }
        let tz = self.config.timezone;
        let start = local_instant(tz, first, entry.start()).map_err(|e| e.to_string())?;
        let end = local_instant(tz, first, entry.end()).map_err(|e| e.to_string())?;
        let description = format!(
            "Semester: {} | Branch: {}",
            timetable.metadata.semester_label,
            entry.branch()
        );
        EventRequest::new(
            format!("[Sync] {}", entry.course()),
            description,
            start,
            end,
            CalendarKind::Static,
        )
        .map(|r| {
            r.with_recurrence(WeeklyRecurrence {
                day: entry.day(),
                until: semester_end,
            })
        })
        .map_err(|e| e.to_string())
    }

    /// Book every entry as a weekly event on the Static calendar.
    ///
    /// Entries are booked one at a time in order. A failed entry is recorded
    /// in the report and the sync moves on; nothing already booked is
    /// rolled back.
    pub async fn sync_timetable(
        &self,
        timetable: &Timetable,
        semester_start: NaiveDate,
        semester_end: NaiveDate,
        progress: Option<ProgressCallback>,
    ) -> Result<SyncReport, Tt2CalError> {
        if semester_end < semester_start {
            return Err(Tt2CalError::InvalidRequest(format!(
                "semester ends ({semester_end}) before it starts ({semester_start})"
            )));
        }
        let progress = progress.unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let ids = self.calendar_ids().await?;
        let booker = self.booker();
        let total = timetable.entries.len();
        progress.on_sync_start(total);

        let mut report = SyncReport::default();
        for (index, entry) in timetable.entries.iter().enumerate() {
            let course = entry.course().to_string();
            progress.on_entry_start(index, total, &course);

            let request = match self.entry_request(timetable, entry, semester_start, semester_end)
            {
                Ok(r) => r,
                Err(detail) => {
                    let err = EntryError::Invalid {
                        index,
                        course: course.clone(),
                        detail,
                    };
                    warn!("{}", err);
                    progress.on_entry_failed(index, total, &err.to_string());
                    report.results.push(EntryResult {
                        index,
                        course,
                        event: None,
                        error: Some(err),
                    });
                    continue;
                }
            };

            match booker.book(&ids.static_id, &request).await {
                Ok(event) => {
                    progress.on_entry_booked(index, total, &course);
                    report.results.push(EntryResult {
                        index,
                        course,
                        event: Some(event),
                        error: None,
                    });
                }
                Err(e) => {
                    let err = EntryError::BookingFailed {
                        index,
                        course: course.clone(),
                        detail: e.to_string(),
                    };
                    warn!("{}", err);
                    progress.on_entry_failed(index, total, &err.to_string());
                    report.results.push(EntryResult {
                        index,
                        course,
                        event: None,
                        error: Some(err),
                    });
                }
            }
        }

        progress.on_sync_complete(total, report.booked());
        info!("Synced {}/{} timetable entries", report.booked(), total);
        Ok(report)
    }

    /// Delete events created by an earlier sync. Ids that fail to delete are
    /// logged and returned in [`UndoReport::failed`].
    pub async fn undo_sync(&self, event_ids: &[String]) -> Result<UndoReport, Tt2CalError> {
        let ids = self.calendar_ids().await?;
        let mut report = UndoReport::default();
        for id in event_ids {
            match self.calendar.delete_event(&ids.static_id, id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    warn!("Undo: could not delete {}: {}", id, e);
                    report.failed.push(id.clone());
                }
            }
        }
        self.forget_calendar(&ids.static_id);
        info!("Undo removed {}/{} events", report.deleted, event_ids.len());
        Ok(report)
    }

    /// Delete every Static event tagged `Semester: <tag>`.
    pub async fn purge_semester(&self, tag: &str) -> Result<usize, Tt2CalError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Tt2CalError::InvalidRequest("semester tag must not be empty".into()));
        }
        let ids = self.calendar_ids().await?;
        let needle = format!("Semester: {tag}");
        let query = EventQuery {
            text: Some(needle.clone()),
            time_max: None,
            single_events: false,
        };

        let events = self.calendar.list_events(&ids.static_id, &query).await?;
        let mut deleted = 0;
        // The service's text search is fuzzy; only exact description matches go.
        for event in events.iter().filter(|e| e.description.contains(&needle)) {
            self.calendar.delete_event(&ids.static_id, &event.id).await?;
            deleted += 1;
        }
        self.forget_calendar(&ids.static_id);
        info!("Purged {} event(s) for '{}'", deleted, needle);
        Ok(deleted)
    }

    /// Delete Club events that ended before `now`.
    pub async fn cleanup_past_club_events(&self, now: DateTime<Utc>) -> Result<usize, Tt2CalError> {
        let ids = self.calendar_ids().await?;
        let query = EventQuery {
            text: None,
            time_max: Some(now),
            single_events: true,
        };
        let events = self.calendar.list_events(&ids.club_id, &query).await?;
        let mut deleted = 0;
        for event in events.iter().filter(|e| e.end.is_some_and(|end| end <= now)) {
            self.calendar.delete_event(&ids.club_id, &event.id).await?;
            deleted += 1;
        }
        self.forget_calendar(&ids.club_id);
        info!("Cleaned up {} past club event(s)", deleted);
        Ok(deleted)
    }

    fn forget_calendar(&self, calendar_id: &str) {
        self.free_busy.invalidate_where(|(id, _, _)| id == calendar_id);
    }

    // ── Cache control ────────────────────────────────────────────────────

    pub fn extraction_cache_stats(&self) -> CacheStats {
        self.extractions.stats()
    }

    pub fn free_busy_cache_stats(&self) -> CacheStats {
        self.free_busy.stats()
    }

    pub fn clear_caches(&self) {
        self.extractions.clear();
        self.free_busy.clear();
    }
}
