//! Prompts sent to the hosted model.
//!
//! Kept in one place so the wording can change without touching retry or
//! parsing code, and so tests can inspect them directly. Callers can override
//! the extraction prompt via
//! [`crate::config::PlannerConfig::extraction_prompt`].

use chrono::NaiveDate;

/// Default prompt for turning a timetable PDF into JSON.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract the weekly timetable and header metadata.
Return JSON in this format ONLY:

{
  "metadata": {
    "semester": "e.g., 4th Semester",
    "branch": "e.g., Information Technology"
  },
  "events": [
    {
      "summary": "...",
      "day": "Monday",
      "start_time": "HH:MM",
      "end_time": "HH:MM",
      "type": "static"
    }
  ]
}

Rules:
- One event per class slot per weekday; repeat a course for every day it meets.
- Use 24-hour HH:MM times.
- Do NOT wrap the JSON in markdown fences.
- Do NOT add commentary before or after the JSON."#;

/// System instruction for the organizer's natural-language form fill.
pub const ASSIST_SYSTEM_PROMPT: &str = r#"You are a university event planner assistant.
Convert the user's request into STRICT JSON with exactly these keys:

{
  "date": "YYYY-MM-DD",
  "time": "HH:MM",
  "title": "Event title"
}

All times are local to the campus. Output ONLY the JSON object."#;

/// Build the user turn for form fill, anchoring relative dates to `today`.
pub fn assist_request(today: NaiveDate, request: &str) -> String {
    format!(
        "Today is {} ({}).\nUser request: {}",
        today.format("%Y-%m-%d"),
        today.format("%A"),
        request.trim()
    )
}
