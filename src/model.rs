//! Domain types shared by the extraction pipeline, the calendar layer and the
//! session.
//!
//! Timetable entries come out of the sanitizer and are never mutated
//! afterwards; event requests are built once, checked once and booked once.
//! Nothing here is persisted locally.

use crate::error::{EntryError, Tt2CalError};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Timetable ────────────────────────────────────────────────────────────

/// Day of the week as written in a timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    /// Two-letter code used by `RRULE:BYDAY`.
    pub fn rrule_code(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "MO",
            DayOfWeek::Tuesday => "TU",
            DayOfWeek::Wednesday => "WE",
            DayOfWeek::Thursday => "TH",
            DayOfWeek::Friday => "FR",
            DayOfWeek::Saturday => "SA",
            DayOfWeek::Sunday => "SU",
        }
    }

    pub fn to_weekday(self) -> Weekday {
        match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
        }
    }

    /// First date on or after `from` that falls on this day.
    pub fn first_on_or_after(self, from: NaiveDate) -> NaiveDate {
        let target = self.to_weekday().num_days_from_monday() as i64;
        let current = chrono::Datelike::weekday(&from).num_days_from_monday() as i64;
        let ahead = (target - current).rem_euclid(7);
        from + chrono::Duration::days(ahead)
    }
}

impl FromStr for DayOfWeek {
    type Err = Tt2CalError;

    /// Accepts full names and common abbreviations, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let day = match lower.as_str() {
            "monday" | "mon" | "mo" => DayOfWeek::Monday,
            "tuesday" | "tue" | "tues" | "tu" => DayOfWeek::Tuesday,
            "wednesday" | "wed" | "we" => DayOfWeek::Wednesday,
            "thursday" | "thu" | "thur" | "thurs" | "th" => DayOfWeek::Thursday,
            "friday" | "fri" | "fr" => DayOfWeek::Friday,
            "saturday" | "sat" | "sa" => DayOfWeek::Saturday,
            "sunday" | "sun" | "su" => DayOfWeek::Sunday,
            _ => return Err(Tt2CalError::parse(format!("unknown day of week '{s}'"))),
        };
        Ok(day)
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Parse a wall-clock time the way timetables and models write them:
/// `09:00`, `9:00`, `09:00:00`, `9:00 AM`, `2pm`.
pub fn parse_clock_time(s: &str) -> Result<NaiveTime, Tt2CalError> {
    let t = s.trim();
    for fmt in ["%H:%M", "%H:%M:%S", "%H.%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(t, fmt) {
            return Ok(time);
        }
    }
    // 12-hour forms; chrono needs minutes, so "2pm" becomes "2:00 PM"
    let upper = t.to_ascii_uppercase();
    if let Some(idx) = upper.find(|c: char| c.is_ascii_alphabetic()) {
        let (clock, meridiem) = upper.split_at(idx);
        let clock = clock.trim();
        let clock = if clock.contains(':') {
            clock.to_string()
        } else {
            format!("{clock}:00")
        };
        let candidate = format!("{clock} {}", meridiem.trim());
        if let Ok(time) = NaiveTime::parse_from_str(&candidate, "%I:%M %p") {
            return Ok(time);
        }
    }
    Err(Tt2CalError::parse(format!("unreadable time '{s}'")))
}

/// Header metadata printed on a timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimetableMetadata {
    pub branch: String,
    /// Semester number when one could be read from the label.
    pub semester: Option<u32>,
    /// The label exactly as extracted, e.g. `"4th Semester"`.
    pub semester_label: String,
}

/// One weekly class slot.
///
/// Built only by the sanitizer; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimetableEntry {
    branch: String,
    semester: Option<u32>,
    day: DayOfWeek,
    start: NaiveTime,
    end: NaiveTime,
    course: String,
    description: String,
}

impl TimetableEntry {
    pub(crate) fn new(
        metadata: &TimetableMetadata,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        course: String,
        description: String,
    ) -> Result<Self, Tt2CalError> {
        if end <= start {
            return Err(Tt2CalError::parse(format!(
                "'{course}' ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self {
            branch: metadata.branch.clone(),
            semester: metadata.semester,
            day,
            start,
            end,
            course,
            description,
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn semester(&self) -> Option<u32> {
        self.semester
    }

    pub fn day(&self) -> DayOfWeek {
        self.day
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn course(&self) -> &str {
        &self.course
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A full extracted timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timetable {
    pub metadata: TimetableMetadata,
    pub entries: Vec<TimetableEntry>,
}

// ── Calendar requests ────────────────────────────────────────────────────

/// Which of the two managed calendars an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarKind {
    /// University-mandated class timetable.
    Static,
    /// Organizer-created extracurricular events.
    Club,
}

impl fmt::Display for CalendarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarKind::Static => f.write_str("static"),
            CalendarKind::Club => f.write_str("club"),
        }
    }
}

/// Weekly repetition until (and including) a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyRecurrence {
    pub day: DayOfWeek,
    pub until: NaiveDate,
}

impl WeeklyRecurrence {
    /// Render as an RFC 5545 rule line.
    pub fn to_rrule(&self) -> String {
        format!(
            "RRULE:FREQ=WEEKLY;BYDAY={};UNTIL={}T235959Z",
            self.day.rrule_code(),
            self.until.format("%Y%m%d")
        )
    }
}

/// An event about to be checked and booked.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRequest {
    pub title: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub calendar: CalendarKind,
    pub recurrence: Option<WeeklyRecurrence>,
}

impl EventRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        calendar: CalendarKind,
    ) -> Result<Self, Tt2CalError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(Tt2CalError::InvalidRequest("title must not be empty".into()));
        }
        if end <= start {
            return Err(Tt2CalError::InvalidRequest(format!(
                "end {end} is not after start {start}"
            )));
        }
        Ok(Self {
            title,
            description: description.into(),
            start,
            end,
            calendar,
            recurrence: None,
        })
    }

    pub fn with_recurrence(mut self, recurrence: WeeklyRecurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }
}

// ── Free/busy ────────────────────────────────────────────────────────────

/// An occupied interval reported by the calendar service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    /// Half-open overlap test: touching intervals do not overlap.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }
}

/// Busy intervals of one calendar over a queried range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeBusyResult {
    pub calendar_id: String,
    /// Sorted by start.
    pub busy: Vec<BusyInterval>,
}

impl FreeBusyResult {
    pub fn new(calendar_id: impl Into<String>, mut busy: Vec<BusyInterval>) -> Self {
        busy.sort_by_key(|b| (b.start, b.end));
        Self {
            calendar_id: calendar_id.into(),
            busy,
        }
    }

    /// Every busy interval intersecting `[start, end)`.
    pub fn conflicts_with(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<BusyInterval> {
        self.busy
            .iter()
            .filter(|b| b.overlaps(start, end))
            .copied()
            .collect()
    }
}

/// A busy interval that blocks a request, tagged with its calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub calendar: CalendarKind,
    pub interval: BusyInterval,
}

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Availability {
    Free,
    Blocked { conflicts: Vec<Conflict> },
}

impl Availability {
    pub fn is_free(&self) -> bool {
        matches!(self, Availability::Free)
    }

    pub fn conflicts(&self) -> &[Conflict] {
        match self {
            Availability::Free => &[],
            Availability::Blocked { conflicts } => conflicts,
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────────

/// An event as stored by the calendar service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookedEvent {
    pub id: String,
    pub calendar: CalendarKind,
    pub calendar_id: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub html_link: Option<String>,
}

/// Outcome of one entry in a timetable sync.
#[derive(Debug, Clone, Serialize)]
pub struct EntryResult {
    /// 0-based position in the timetable.
    pub index: usize,
    pub course: String,
    pub event: Option<BookedEvent>,
    pub error: Option<EntryError>,
}

/// Per-entry outcomes of a timetable sync, in timetable order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub results: Vec<EntryResult>,
}

impl SyncReport {
    pub fn booked(&self) -> usize {
        self.results.iter().filter(|r| r.event.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }

    /// Ids of the created master events, for a later undo.
    pub fn event_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| r.event.as_ref().map(|e| e.id.clone()))
            .collect()
    }
}

/// Result of undoing a sync: how many events went, and which ids did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UndoReport {
    pub deleted: usize,
    /// Ids that could not be deleted, kept for a retry.
    pub failed: Vec<String>,
}

impl UndoReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The organizer's four-field form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizerForm {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub title: String,
    /// Target semesters, e.g. `["Sem 3", "Sem 4"]` or `["All"]`.
    pub targets: Vec<String>,
}

/// A free slot proposed when a request is blocked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSuggestion {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl fmt::Display for SlotSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format("%A, %d %b | %I:%M %p"))
    }
}

/// What happened to an organizer's booking attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BookingOutcome {
    Booked(BookedEvent),
    Blocked {
        conflicts: Vec<Conflict>,
        suggestions: Vec<SlotSuggestion>,
    },
}

/// Form values proposed by the model from a natural-language request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssistDraft {
    pub date: NaiveDate,
    #[serde(deserialize_with = "deserialize_clock")]
    pub time: NaiveTime,
    pub title: String,
}

fn deserialize_clock<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_clock_time(&raw).map_err(serde::de::Error::custom)
}
