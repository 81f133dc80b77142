//! Google Calendar v3 over REST.

use super::auth::AccessTokenSource;
use super::{CalendarEvent, CalendarService, CalendarSummary, EventQuery};
use crate::error::Tt2CalError;
use crate::model::{BookedEvent, BusyInterval, EventRequest, FreeBusyResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const PAGE_SIZE: &str = "250";
const REAUTH_HINT: &str = "Run `tt2cal auth` to authorize calendar access.";

/// [`CalendarService`] backed by the Google Calendar REST API.
pub struct GoogleCalendar {
    http: Client,
    base: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GoogleCalendar {
    pub fn new(
        base: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        timeout_secs: u64,
    ) -> Result<Self, Tt2CalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Tt2CalError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    /// Attach the bearer token, send, and turn non-2xx replies into `err`.
    /// A missing or rejected token is reported through `err` as well, with
    /// the re-authorization hint in the message.
    async fn send(
        &self,
        request: RequestBuilder,
        err: &(dyn Fn(String) -> Tt2CalError + Sync),
    ) -> Result<reqwest::Response, Tt2CalError> {
        let token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| err(e.to_string()))?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| err(format!("Google API request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        if status == StatusCode::UNAUTHORIZED {
            return Err(err(format!(
                "Google API rejected the access token ({status}): {error_text}\n{REAUTH_HINT}"
            )));
        }
        Err(err(format!("Google API error ({status}): {error_text}")))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        err: &(dyn Fn(String) -> Tt2CalError + Sync),
    ) -> Result<T, Tt2CalError> {
        let response = self.send(request, err).await?;
        response
            .json()
            .await
            .map_err(|e| err(format!("Failed to parse Google response: {e}")))
    }
}

#[async_trait]
impl CalendarService for GoogleCalendar {
    async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, Tt2CalError> {
        let url = format!("{}/users/me/calendarList", self.base);
        let err = |message: String| Tt2CalError::CalendarSetup {
            name: "calendarList".into(),
            message,
        };

        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("maxResults", PAGE_SIZE.to_string())];
            if let Some(ref t) = page_token {
                query.push(("pageToken", t.clone()));
            }
            let page: CalendarListPage = self
                .send_json(self.http.get(&url).query(&query), &err)
                .await?;
            calendars.extend(page.items.into_iter().map(|c| CalendarSummary {
                id: c.id,
                summary: c.summary.unwrap_or_default(),
            }));
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        debug!("Listed {} calendars", calendars.len());
        Ok(calendars)
    }

    async fn create_calendar(&self, name: &str, tz: Tz) -> Result<String, Tt2CalError> {
        let url = format!("{}/calendars", self.base);
        let err = |message: String| Tt2CalError::CalendarSetup {
            name: name.to_string(),
            message,
        };
        let body = json!({ "summary": name, "timeZone": tz.name() });
        let created: CreatedCalendar = self.send_json(self.http.post(&url).json(&body), &err).await?;
        Ok(created.id)
    }

    async fn free_busy(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResult, Tt2CalError> {
        let url = format!("{}/freeBusy", self.base);
        let err = |message: String| Tt2CalError::Availability {
            calendar_id: calendar_id.to_string(),
            message,
        };
        let body = json!({
            "timeMin": rfc3339(time_min),
            "timeMax": rfc3339(time_max),
            "timeZone": "UTC",
            "items": [{ "id": calendar_id }],
        });

        let mut response: FreeBusyResponse =
            self.send_json(self.http.post(&url).json(&body), &err).await?;
        let calendar = response.calendars.remove(calendar_id).ok_or_else(|| {
            err("calendar missing from freeBusy response".to_string())
        })?;
        if let Some(first) = calendar.errors.first() {
            return Err(err(format!("freeBusy reported '{}'", first.reason)));
        }

        let busy = calendar
            .busy
            .iter()
            .map(|b| {
                Ok(BusyInterval {
                    start: parse_instant(&b.start).map_err(&err)?,
                    end: parse_instant(&b.end).map_err(&err)?,
                })
            })
            .collect::<Result<Vec<_>, Tt2CalError>>()?;
        debug!("freeBusy {}: {} busy interval(s)", calendar_id, busy.len());
        Ok(FreeBusyResult::new(calendar_id, busy))
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        request: &EventRequest,
    ) -> Result<BookedEvent, Tt2CalError> {
        let err = |message: String| Tt2CalError::Booking {
            calendar_id: calendar_id.to_string(),
            message,
        };
        let tz = request.start.timezone();
        let body = EventBody {
            summary: &request.title,
            description: &request.description,
            start: LocalDateTime::new(&request.start),
            end: LocalDateTime::new(&request.end),
            recurrence: request
                .recurrence
                .as_ref()
                .map(|r| vec![r.to_rrule()])
                .unwrap_or_default(),
        };

        let created: EventResource = self
            .send_json(
                self.http.post(self.events_url(calendar_id)).json(&body),
                &err,
            )
            .await?;

        let start = match created.start.as_ref().and_then(|t| t.date_time.as_deref()) {
            Some(s) => parse_instant(s).map_err(&err)?.with_timezone(&tz),
            None => request.start,
        };
        let end = match created.end.as_ref().and_then(|t| t.date_time.as_deref()) {
            Some(s) => parse_instant(s).map_err(&err)?.with_timezone(&tz),
            None => request.end,
        };

        Ok(BookedEvent {
            id: created.id,
            calendar: request.calendar,
            calendar_id: calendar_id.to_string(),
            start,
            end,
            html_link: created.html_link,
        })
    }

    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, Tt2CalError> {
        let err = |message: String| Tt2CalError::Booking {
            calendar_id: calendar_id.to_string(),
            message,
        };
        let event: EventResource = self
            .send_json(self.http.get(self.event_url(calendar_id, event_id)), &err)
            .await?;
        event.into_calendar_event().map_err(err)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<(), Tt2CalError> {
        let err = |message: String| Tt2CalError::Booking {
            calendar_id: calendar_id.to_string(),
            message,
        };
        self.send(self.http.delete(self.event_url(calendar_id, event_id)), &err)
            .await?;
        debug!("Deleted event {} from {}", event_id, calendar_id);
        Ok(())
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        query: &EventQuery,
    ) -> Result<Vec<CalendarEvent>, Tt2CalError> {
        let err = |message: String| Tt2CalError::Booking {
            calendar_id: calendar_id.to_string(),
            message,
        };

        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("maxResults", PAGE_SIZE.to_string()),
                ("singleEvents", query.single_events.to_string()),
            ];
            if let Some(ref q) = query.text {
                params.push(("q", q.clone()));
            }
            if let Some(max) = query.time_max {
                params.push(("timeMax", rfc3339(max)));
            }
            if let Some(ref t) = page_token {
                params.push(("pageToken", t.clone()));
            }

            let page: EventsPage = self
                .send_json(
                    self.http.get(self.events_url(calendar_id)).query(&params),
                    &err,
                )
                .await?;
            for item in page.items {
                events.push(item.into_calendar_event().map_err(&err)?);
            }
            match page.next_page_token {
                Some(t) => page_token = Some(t),
                None => break,
            }
        }
        debug!("Listed {} event(s) on {}", events.len(), calendar_id);
        Ok(events)
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{s}': {e}"))
}

/// All-day events carry a bare date; treat it as UTC midnight.
fn parse_event_time(t: &EventTime) -> Result<Option<DateTime<Utc>>, String> {
    if let Some(ref dt) = t.date_time {
        return parse_instant(dt).map(Some);
    }
    if let Some(ref d) = t.date {
        let date = NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|e| format!("bad date '{d}': {e}"))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| format!("bad date '{d}'"))?;
        return Ok(Some(Utc.from_utc_datetime(&midnight)));
    }
    Ok(None)
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CalendarListPage {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedCalendar {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<FreeBusySpan>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct FreeBusySpan {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    reason: String,
}

/// Local wall time plus zone name, the way the calendar stores it.
#[derive(Debug, Serialize)]
struct LocalDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: &'static str,
}

impl LocalDateTime {
    fn new(t: &DateTime<Tz>) -> Self {
        Self {
            date_time: t.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: t.timezone().name(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    description: &'a str,
    start: LocalDateTime,
    end: LocalDateTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recurrence: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    items: Vec<EventResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventResource {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    created: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

impl EventResource {
    fn into_calendar_event(self) -> Result<CalendarEvent, String> {
        let start = match self.start {
            Some(ref t) => parse_event_time(t)?,
            None => None,
        };
        let end = match self.end {
            Some(ref t) => parse_event_time(t)?,
            None => None,
        };
        let created = match self.created {
            Some(ref c) => Some(parse_instant(c)?),
            None => None,
        };
        Ok(CalendarEvent {
            id: self.id,
            summary: self.summary.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            start,
            end,
            created,
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}
