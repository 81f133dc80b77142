//! Google Calendar client tests against a local mock server.
//!
//! Run with `cargo test --test google_api`.

use chrono::{TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use serde_json::json;
use std::sync::Arc;
use timetable2cal::calendar::auth::{
    AccessTokenSource, OAuthClient, StaticToken, StoredToken, TokenManager, TokenStore,
};
use timetable2cal::calendar::google::GoogleCalendar;
use timetable2cal::calendar::EventQuery;
use timetable2cal::model::WeeklyRecurrence;
use timetable2cal::model::DayOfWeek;
use timetable2cal::{
    BookingOutcome, CalendarKind, CalendarService, EventRequest, OrganizerForm, PlannerConfig,
    PlannerSession, Tt2CalError,
};
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GoogleCalendar {
    GoogleCalendar::new(server.uri(), Arc::new(StaticToken("tok".into())), 5).unwrap()
}

#[tokio::test]
async fn free_busy_posts_window_and_parses_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "timeMin": "2024-02-29T18:30:00Z",
            "timeMax": "2024-03-01T18:30:00Z",
            "items": [{"id": "static-cal"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "calendar#freeBusy",
            "calendars": {
                "static-cal": {
                    "busy": [
                        {"start": "2024-03-01T05:00:00Z", "end": "2024-03-01T06:00:00Z"}
                    ]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let min = Utc.with_ymd_and_hms(2024, 2, 29, 18, 30, 0).unwrap();
    let max = Utc.with_ymd_and_hms(2024, 3, 1, 18, 30, 0).unwrap();
    let result = client(&server).free_busy("static-cal", min, max).await.unwrap();

    assert_eq!(result.busy.len(), 1);
    assert_eq!(
        result.busy[0].start,
        Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn free_busy_calendar_error_is_an_availability_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {
                "gone": {"errors": [{"domain": "global", "reason": "notFound"}], "busy": []}
            }
        })))
        .mount(&server)
        .await;

    let now = Utc::now();
    let err = client(&server)
        .free_busy("gone", now, now + chrono::Duration::hours(1))
        .await
        .unwrap_err();
    match err {
        Tt2CalError::Availability { calendar_id, message } => {
            assert_eq!(calendar_id, "gone");
            assert!(message.contains("notFound"), "got: {message}");
        }
        other => panic!("expected Availability, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_access_during_free_busy_is_an_availability_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let now = Utc::now();
    let err = client(&server)
        .free_busy("static-cal", now, now + chrono::Duration::hours(1))
        .await
        .unwrap_err();
    match err {
        Tt2CalError::Availability { calendar_id, message } => {
            assert_eq!(calendar_id, "static-cal");
            assert!(message.contains("401"), "got: {message}");
            assert!(message.contains("tt2cal auth"), "got: {message}");
        }
        other => panic!("expected Availability, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_calendar_list_is_a_setup_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&server)
        .await;

    let err = client(&server).list_calendars().await.unwrap_err();
    assert!(matches!(err, Tt2CalError::CalendarSetup { .. }), "got {err:?}");
    assert!(err.to_string().contains("tt2cal auth"));
}

#[tokio::test]
async fn missing_token_during_insert_is_a_booking_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/club-cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let oauth = OAuthClient::new(
        "id",
        "secret",
        "http://localhost:8085",
        format!("{}/token", server.uri()),
        5,
    )
    .unwrap();
    let tokens = TokenManager::new(oauth, TokenStore::new(dir.path().join("none.json")));
    let calendar = GoogleCalendar::new(server.uri(), Arc::new(tokens), 5).unwrap();

    let request = EventRequest::new(
        "Quiz",
        "",
        Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        Kolkata.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap(),
        CalendarKind::Club,
    )
    .unwrap();
    let err = calendar.insert_event("club-cal", &request).await.unwrap_err();
    match err {
        Tt2CalError::Booking { message, .. } => {
            assert!(message.contains("tt2cal auth"), "got: {message}");
        }
        other => panic!("expected Booking, got {other:?}"),
    }
}

#[tokio::test]
async fn calendar_list_follows_page_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "primary", "summary": "me@example.edu"}],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "club-cal", "summary": "Club Temporary Events"}]
        })))
        .mount(&server)
        .await;

    let calendars = client(&server).list_calendars().await.unwrap();
    let ids: Vec<_> = calendars.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["primary", "club-cal"]);
}

#[tokio::test]
async fn insert_sends_local_wall_time_and_recurrence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/static-cal/events"))
        .and(body_partial_json(json!({
            "summary": "[Sync] DBMS",
            "start": {"dateTime": "2024-01-01T09:00:00", "timeZone": "Asia/Kolkata"},
            "end": {"dateTime": "2024-01-01T10:00:00", "timeZone": "Asia/Kolkata"},
            "recurrence": ["RRULE:FREQ=WEEKLY;BYDAY=MO;UNTIL=20240430T235959Z"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt42",
            "htmlLink": "https://calendar.example/evt42",
            "start": {"dateTime": "2024-01-01T09:00:00+05:30"},
            "end": {"dateTime": "2024-01-01T10:00:00+05:30"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = EventRequest::new(
        "[Sync] DBMS",
        "Semester: 4th Semester | Branch: IT",
        Kolkata.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        Kolkata.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        CalendarKind::Static,
    )
    .unwrap()
    .with_recurrence(WeeklyRecurrence {
        day: DayOfWeek::Monday,
        until: chrono::NaiveDate::from_ymd_opt(2024, 4, 30).unwrap(),
    });

    let booked = client(&server).insert_event("static-cal", &request).await.unwrap();
    assert_eq!(booked.id, "evt42");
    assert_eq!(booked.start, request.start);
    assert_eq!(booked.html_link.as_deref(), Some("https://calendar.example/evt42"));
}

#[tokio::test]
async fn insert_failure_is_a_booking_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/club-cal/events"))
        .respond_with(ResponseTemplate::new(403).set_body_string("rateLimitExceeded"))
        .mount(&server)
        .await;

    let request = EventRequest::new(
        "Quiz",
        "",
        Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        Kolkata.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap(),
        CalendarKind::Club,
    )
    .unwrap();
    let err = client(&server).insert_event("club-cal", &request).await.unwrap_err();
    match err {
        Tt2CalError::Booking { message, .. } => {
            assert!(message.contains("403"), "got: {message}");
            assert!(message.contains("rateLimitExceeded"));
        }
        other => panic!("expected Booking, got {other:?}"),
    }
}

#[tokio::test]
async fn list_events_passes_search_and_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendars/static-cal/events"))
        .and(query_param("q", "Semester: Sem 3"))
        .and(query_param("singleEvents", "false"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "a",
                "summary": "[Sync] DBMS",
                "description": "Semester: Sem 3 | Branch: IT",
                "start": {"dateTime": "2024-01-01T09:00:00+05:30"},
                "end": {"dateTime": "2024-01-01T10:00:00+05:30"},
                "created": "2023-12-20T08:00:00.000Z"
            }],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/static-cal/events"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "b", "start": {"date": "2024-01-02"}, "end": {"date": "2024-01-03"}}]
        })))
        .mount(&server)
        .await;

    let query = EventQuery {
        text: Some("Semester: Sem 3".into()),
        time_max: None,
        single_events: false,
    };
    let events = client(&server).list_events("static-cal", &query).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].description, "Semester: Sem 3 | Branch: IT");
    assert!(events[0].created.is_some());
    assert_eq!(
        events[1].start,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn delete_encodes_the_calendar_id() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/calendars/abc%40group.calendar.google.com/events/evt1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .delete_event("abc@group.calendar.google.com", "evt1")
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_token_is_refreshed_and_saved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store
        .save(&StoredToken {
            access_token: "stale".into(),
            refresh_token: Some("r1".into()),
            expires_at: Utc::now() - chrono::Duration::minutes(5),
            scope: None,
            token_type: None,
        })
        .unwrap();

    let oauth = OAuthClient::new(
        "id",
        "secret",
        "http://localhost:8085",
        format!("{}/token", server.uri()),
        5,
    )
    .unwrap();
    let manager = TokenManager::new(oauth, store.clone());

    assert_eq!(manager.access_token().await.unwrap(), "fresh");
    // Second call uses the in-memory token; the mock expects one refresh.
    assert_eq!(manager.access_token().await.unwrap(), "fresh");

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.access_token, "fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn rejected_refresh_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;

    let oauth = OAuthClient::new(
        "id",
        "secret",
        "http://localhost:8085",
        format!("{}/token", server.uri()),
        5,
    )
    .unwrap();
    let err = oauth.refresh("revoked").await.unwrap_err();
    match err {
        Tt2CalError::Auth { detail } => assert!(detail.contains("invalid_grant"), "got: {detail}"),
        other => panic!("expected Auth, got {other:?}"),
    }
}

#[tokio::test]
async fn session_over_rest_blocks_a_clashing_club_event() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "static-cal", "summary": "Semester Static Calendar"},
                {"id": "club-cal", "summary": "Club Temporary Events"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(body_string_contains("static-cal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {"static-cal": {"busy": [
                {"start": "2024-03-01T05:00:00Z", "end": "2024-03-01T06:00:00Z"}
            ]}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(body_string_contains("club-cal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {"club-cal": {"busy": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendars/club-cal/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let calendar = Arc::new(client(&server));
    let session = PlannerSession::new(PlannerConfig::default(), calendar);
    let form = OrganizerForm {
        date: chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        title: "Hackathon".into(),
        targets: vec![],
    };

    let outcome = session.book_event(&form).await.unwrap();
    let BookingOutcome::Blocked { conflicts, suggestions } = outcome else {
        panic!("expected Blocked");
    };
    assert_eq!(conflicts[0].calendar, CalendarKind::Static);
    assert_eq!(
        suggestions[0].start,
        Kolkata.with_ymd_and_hms(2024, 3, 1, 11, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn session_over_rest_books_in_the_configured_zone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/calendarList"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "static-cal", "summary": "Semester Static Calendar"},
                {"id": "club-cal", "summary": "Club Temporary Events"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(body_string_contains("static-cal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {"static-cal": {"busy": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/freeBusy"))
        .and(body_string_contains("club-cal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "calendars": {"club-cal": {"busy": []}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendars/club-cal/events"))
        .and(body_partial_json(json!({
            "start": {"dateTime": "2024-03-01T10:00:00", "timeZone": "Asia/Kolkata"},
            "end": {"dateTime": "2024-03-01T11:00:00", "timeZone": "Asia/Kolkata"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "evt7"})))
        .expect(1)
        .mount(&server)
        .await;

    let calendar = Arc::new(client(&server));
    let session = PlannerSession::new(PlannerConfig::default(), calendar);
    // 04:30 UTC is 10:00 in Kolkata.
    let request = EventRequest::new(
        "Talk",
        "",
        chrono_tz::UTC.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap(),
        chrono_tz::UTC.with_ymd_and_hms(2024, 3, 1, 5, 30, 0).unwrap(),
        CalendarKind::Club,
    )
    .unwrap();

    let outcome = session.book_request(&request, None).await.unwrap();
    let BookingOutcome::Booked(event) = outcome else {
        panic!("expected Booked");
    };
    assert_eq!(event.id, "evt7");
    assert_eq!(event.start, Kolkata.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
}
