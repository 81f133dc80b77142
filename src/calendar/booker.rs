//! Event creation.

use super::availability::{invalidate_span, FreeBusyKey};
use super::{CalendarService, PRIMARY_CALENDAR_ID};
use crate::cache::SessionCache;
use crate::error::Tt2CalError;
use crate::model::{BookedEvent, EventRequest, FreeBusyResult};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

/// Writes already-checked requests to their calendar.
///
/// A booking is attempted once, always in the configured zone. After it
/// lands, the cached free/busy days it covers are dropped so the next check
/// sees it; a recurring event drops the whole calendar.
pub struct EventBooker<'a> {
    service: &'a dyn CalendarService,
    cache: &'a SessionCache<FreeBusyKey, FreeBusyResult>,
    tz: Tz,
}

impl<'a> EventBooker<'a> {
    pub fn new(
        service: &'a dyn CalendarService,
        cache: &'a SessionCache<FreeBusyKey, FreeBusyResult>,
        tz: Tz,
    ) -> Self {
        Self { service, cache, tz }
    }

    pub async fn book(
        &self,
        calendar_id: &str,
        request: &EventRequest,
    ) -> Result<BookedEvent, Tt2CalError> {
        if calendar_id == PRIMARY_CALENDAR_ID {
            return Err(Tt2CalError::Booking {
                calendar_id: calendar_id.to_string(),
                message: "refusing to write to the primary calendar".into(),
            });
        }

        let request = EventRequest {
            start: request.start.with_timezone(&self.tz),
            end: request.end.with_timezone(&self.tz),
            ..request.clone()
        };
        let booked = self.service.insert_event(calendar_id, &request).await?;

        if request.recurrence.is_some() {
            let n = self.cache.invalidate_where(|(id, _, _)| id == calendar_id);
            debug!("Recurring event: dropped {} cached day(s) of {}", n, calendar_id);
        } else {
            invalidate_span(self.cache, calendar_id, self.tz, request.start, request.end)?;
        }

        if booked.start != request.start || booked.end != request.end {
            warn!(
                "Event {} stored as {} – {}, requested {} – {}",
                booked.id, booked.start, booked.end, request.start, request.end
            );
        }
        info!(
            "Booked '{}' on {} ({} – {})",
            request.title, request.calendar, booked.start, booked.end
        );
        Ok(booked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::availability::local_day_window;
    use crate::calendar::{CalendarEvent, CalendarSummary, EventQuery};
    use crate::model::{CalendarKind, DayOfWeek, WeeklyRecurrence};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use chrono_tz::Asia::Kolkata;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        inserts: AtomicUsize,
        zones: Mutex<Vec<Tz>>,
    }

    #[async_trait]
    impl CalendarService for Recorder {
        async fn list_calendars(&self) -> Result<Vec<CalendarSummary>, Tt2CalError> {
            Ok(vec![])
        }
        async fn create_calendar(&self, _name: &str, _tz: Tz) -> Result<String, Tt2CalError> {
            Ok("new".into())
        }
        async fn free_busy(
            &self,
            calendar_id: &str,
            _time_min: DateTime<Utc>,
            _time_max: DateTime<Utc>,
        ) -> Result<FreeBusyResult, Tt2CalError> {
            Ok(FreeBusyResult::new(calendar_id, vec![]))
        }
        async fn insert_event(
            &self,
            calendar_id: &str,
            request: &EventRequest,
        ) -> Result<BookedEvent, Tt2CalError> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            self.zones.lock().unwrap().push(request.start.timezone());
            Ok(BookedEvent {
                id: "evt1".into(),
                calendar: request.calendar,
                calendar_id: calendar_id.into(),
                start: request.start,
                end: request.end,
                html_link: None,
            })
        }
        async fn get_event(&self, _c: &str, _e: &str) -> Result<CalendarEvent, Tt2CalError> {
            Err(Tt2CalError::Internal("unused".into()))
        }
        async fn delete_event(&self, _c: &str, _e: &str) -> Result<(), Tt2CalError> {
            Ok(())
        }
        async fn list_events(
            &self,
            _c: &str,
            _q: &EventQuery,
        ) -> Result<Vec<CalendarEvent>, Tt2CalError> {
            Ok(vec![])
        }
    }

    fn request() -> EventRequest {
        let start = Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let end = Kolkata.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        EventRequest::new("Hackathon", "Target: All", start, end, CalendarKind::Club).unwrap()
    }

    fn cache_day(
        cache: &SessionCache<FreeBusyKey, FreeBusyResult>,
        id: &str,
        y: i32,
        m: u32,
        d: u32,
    ) {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let (start, end) = local_day_window(Kolkata, date).unwrap();
        cache.insert((id.to_string(), start, end), FreeBusyResult::new(id, vec![]));
    }

    #[test]
    fn primary_is_refused() {
        let service = Recorder::default();
        let cache = SessionCache::new();
        let booker = EventBooker::new(&service, &cache, Kolkata);
        let err = tokio_test::block_on(booker.book(PRIMARY_CALENDAR_ID, &request())).unwrap_err();
        assert!(matches!(err, Tt2CalError::Booking { .. }));
        assert_eq!(service.inserts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn booking_returns_requested_interval() {
        let service = Recorder::default();
        let cache = SessionCache::new();
        let booker = EventBooker::new(&service, &cache, Kolkata);
        let req = request();
        let booked = tokio_test::block_on(booker.book("club-cal", &req)).unwrap();
        assert_eq!(booked.start, req.start);
        assert_eq!(booked.end, req.end);
        assert_eq!(booked.calendar_id, "club-cal");
    }

    #[test]
    fn request_in_other_zone_is_stored_in_configured_zone() {
        let service = Recorder::default();
        let cache = SessionCache::new();
        let booker = EventBooker::new(&service, &cache, Kolkata);
        let start = chrono_tz::UTC.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap();
        let end = chrono_tz::UTC.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap();
        let req = EventRequest::new("Talk", "", start, end, CalendarKind::Club).unwrap();

        let booked = tokio_test::block_on(booker.book("club-cal", &req)).unwrap();

        assert_eq!(service.zones.lock().unwrap().as_slice(), &[Kolkata]);
        assert_eq!(booked.start.timezone(), Kolkata);
        assert_eq!(booked.start, Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn recurring_event_drops_every_cached_day_of_its_calendar() {
        let service = Recorder::default();
        let cache = SessionCache::new();
        cache_day(&cache, "static-cal", 2024, 1, 1);
        cache_day(&cache, "static-cal", 2024, 1, 8);
        cache_day(&cache, "static-cal", 2024, 3, 25);
        cache_day(&cache, "club-cal", 2024, 1, 8);
        let booker = EventBooker::new(&service, &cache, Kolkata);

        let start = Kolkata.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        let end = Kolkata.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap();
        let req = EventRequest::new("[Sync] DBMS", "", start, end, CalendarKind::Static)
            .unwrap()
            .with_recurrence(WeeklyRecurrence {
                day: DayOfWeek::Monday,
                until: NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
            });
        tokio_test::block_on(booker.book("static-cal", &req)).unwrap();

        assert_eq!(cache.len(), 1, "only the club day should remain");
    }

    #[test]
    fn multi_day_event_drops_its_middle_days() {
        let service = Recorder::default();
        let cache = SessionCache::new();
        for d in 1..=4 {
            cache_day(&cache, "club-cal", 2024, 3, d);
        }
        let booker = EventBooker::new(&service, &cache, Kolkata);

        let start = Kolkata.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();
        let end = Kolkata.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
        let req = EventRequest::new("Fest", "", start, end, CalendarKind::Club).unwrap();
        tokio_test::block_on(booker.book("club-cal", &req)).unwrap();

        assert_eq!(cache.len(), 1, "only 4 March should remain");
    }
}
