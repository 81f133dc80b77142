//! Free/busy checks and alternative-slot search.
//!
//! Queries are always made for whole local days in the configured zone and
//! memoized per `(calendar_id, day window)`, so checking several slots on
//! the same day costs one remote call.

use super::CalendarService;
use crate::cache::SessionCache;
use crate::error::Tt2CalError;
use crate::model::{Availability, CalendarKind, Conflict, FreeBusyResult, SlotSuggestion};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tracing::debug;

/// Cache key for one calendar over one local day.
pub type FreeBusyKey = (String, DateTime<Utc>, DateTime<Utc>);

/// Search windows for suggestions, in local wall-clock hours.
const SUGGESTION_WINDOWS: [(u32, u32); 2] = [(9, 15), (15, 16)];
const SUGGESTION_STEP_MINUTES: i64 = 30;

/// `[00:00, next 00:00)` of `date` in `tz`, as UTC instants.
pub fn local_day_window(
    tz: Tz,
    date: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), Tt2CalError> {
    let start = local_instant(tz, date, NaiveTime::MIN)?;
    let next = date
        .succ_opt()
        .ok_or_else(|| Tt2CalError::InvalidRequest(format!("no day after {date}")))?;
    let end = local_instant(tz, next, NaiveTime::MIN)?;
    Ok((start.with_timezone(&Utc), end.with_timezone(&Utc)))
}

/// Resolve a local wall time, taking the earlier instant when ambiguous.
pub fn local_instant(
    tz: Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Tz>, Tt2CalError> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(|| {
            Tt2CalError::InvalidRequest(format!("{date} {time} does not exist in {tz}"))
        })
}

/// Drop the cached day for `calendar_id` that contains `at`.
pub fn invalidate_day(
    cache: &SessionCache<FreeBusyKey, FreeBusyResult>,
    calendar_id: &str,
    at: DateTime<Tz>,
) -> Result<bool, Tt2CalError> {
    let (start, end) = local_day_window(at.timezone(), at.date_naive())?;
    Ok(cache.invalidate(&(calendar_id.to_string(), start, end)))
}

/// Drop every cached day of `calendar_id` that `[start, end)` touches,
/// with days taken in `tz`. Returns how many entries were removed.
pub fn invalidate_span(
    cache: &SessionCache<FreeBusyKey, FreeBusyResult>,
    calendar_id: &str,
    tz: Tz,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
) -> Result<usize, Tt2CalError> {
    let mut day = start.with_timezone(&tz).date_naive();
    let last_day = last_local_day(tz, start, end);
    let mut removed = 0;
    while day <= last_day {
        let (from, to) = local_day_window(tz, day)?;
        if cache.invalidate(&(calendar_id.to_string(), from, to)) {
            removed += 1;
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }
    Ok(removed)
}

/// Local day holding the last instant of `[start, end)`.
fn last_local_day(tz: Tz, start: DateTime<Tz>, end: DateTime<Tz>) -> NaiveDate {
    if end <= start {
        return start.with_timezone(&tz).date_naive();
    }
    (end - Duration::nanoseconds(1))
        .with_timezone(&tz)
        .date_naive()
}

/// Checks intervals against one or more calendars.
pub struct AvailabilityChecker<'a> {
    service: &'a dyn CalendarService,
    cache: &'a SessionCache<FreeBusyKey, FreeBusyResult>,
    tz: Tz,
}

impl<'a> AvailabilityChecker<'a> {
    pub fn new(
        service: &'a dyn CalendarService,
        cache: &'a SessionCache<FreeBusyKey, FreeBusyResult>,
        tz: Tz,
    ) -> Self {
        Self { service, cache, tz }
    }

    /// Busy intervals on `calendar_id` for the local day `date`.
    pub async fn day_busy(
        &self,
        calendar_id: &str,
        date: NaiveDate,
    ) -> Result<FreeBusyResult, Tt2CalError> {
        let (start, end) = local_day_window(self.tz, date)?;
        let key = (calendar_id.to_string(), start, end);
        if let Some(hit) = self.cache.get(&key) {
            debug!("freeBusy cache hit: {} {}", calendar_id, date);
            return Ok(hit);
        }
        let result = self.service.free_busy(calendar_id, start, end).await?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Check `[start, end)` against every target calendar.
    ///
    /// Each local day the interval touches is queried whole.
    pub async fn check(
        &self,
        targets: &[(CalendarKind, &str)],
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Availability, Tt2CalError> {
        if end <= start {
            return Err(Tt2CalError::InvalidRequest(format!(
                "end {end} is not after start {start}"
            )));
        }
        let start_utc = start.with_timezone(&Utc);
        let end_utc = end.with_timezone(&Utc);
        let first_day = start.with_timezone(&self.tz).date_naive();
        let last_day = last_local_day(self.tz, start, end);

        let mut conflicts = Vec::new();
        for &(kind, calendar_id) in targets {
            let mut day = first_day;
            while day <= last_day {
                let busy = self.day_busy(calendar_id, day).await?;
                conflicts.extend(
                    busy.conflicts_with(start_utc, end_utc)
                        .into_iter()
                        .map(|interval| Conflict {
                            calendar: kind,
                            interval,
                        }),
                );
                day = match day.succ_opt() {
                    Some(d) => d,
                    None => break,
                };
            }
        }

        if conflicts.is_empty() {
            Ok(Availability::Free)
        } else {
            debug!("{} conflict(s) for {} – {}", conflicts.len(), start, end);
            conflicts.sort_by_key(|c| (c.interval.start, c.interval.end));
            conflicts.dedup();
            Ok(Availability::Blocked { conflicts })
        }
    }

    /// Propose up to `count` free slots of `duration` starting from `from`.
    ///
    /// Days `from .. from + horizon_days` are scanned in order; within a day
    /// the 09:00–15:00 window is tried before 15:00–16:00, in 30-minute
    /// steps. Times before `from` are skipped. When `weekdays` is given,
    /// other days are skipped.
    pub async fn suggest(
        &self,
        targets: &[(CalendarKind, &str)],
        from: DateTime<Tz>,
        duration: Duration,
        count: usize,
        horizon_days: u32,
        weekdays: Option<&[Weekday]>,
    ) -> Result<Vec<SlotSuggestion>, Tt2CalError> {
        let mut found = Vec::new();
        if count == 0 {
            return Ok(found);
        }
        let from = from.with_timezone(&self.tz);
        let step = Duration::minutes(SUGGESTION_STEP_MINUTES);

        for offset in 0..horizon_days {
            let day = from.date_naive() + Duration::days(i64::from(offset));
            if let Some(allowed) = weekdays {
                if !allowed.contains(&day.weekday()) {
                    continue;
                }
            }

            for (open, close) in SUGGESTION_WINDOWS {
                let mut cursor = self.at(day, open)?;
                if cursor < from {
                    cursor = from;
                }
                let limit = self.at(day, close)?;

                while cursor + duration <= limit {
                    let end = cursor + duration;
                    if self.check(targets, cursor, end).await?.is_free() {
                        found.push(SlotSuggestion { start: cursor, end });
                        if found.len() >= count {
                            return Ok(found);
                        }
                    }
                    cursor += step;
                }
            }
        }
        Ok(found)
    }

    fn at(&self, day: NaiveDate, hour: u32) -> Result<DateTime<Tz>, Tt2CalError> {
        let time = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| Tt2CalError::Internal(format!("bad hour {hour}")))?;
        local_instant(self.tz, day, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Kolkata;

    #[test]
    fn kolkata_day_window() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (start, end) = local_day_window(Kolkata, date).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-02-29T18:30:00+00:00");
        assert_eq!(end - start, Duration::hours(24));
    }

    #[test]
    fn invalidate_day_matches_window_key() {
        let cache = SessionCache::new();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let (start, end) = local_day_window(Kolkata, date).unwrap();
        cache.insert(("cal".to_string(), start, end), FreeBusyResult::new("cal", vec![]));

        let at = Kolkata.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        assert!(invalidate_day(&cache, "cal", at).unwrap());
        assert!(cache.is_empty());
    }
}
