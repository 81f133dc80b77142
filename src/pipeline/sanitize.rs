//! Sanitisation: recover structured JSON from a model's free-text reply.
//!
//! ## Why is sanitisation necessary?
//!
//! Even when asked for "JSON ONLY", hosted models routinely:
//!
//! - wrap the payload in ` ```json … ``` ` fences
//! - prepend "Sure! Here is the timetable:" or append a closing remark
//! - emit a byte-order mark or zero-width characters
//! - mention bracketed notes (`[1]`, `{see below}`) in the narration
//!
//! The rules below are cheap and deterministic. They never invent data: if no
//! JSON value survives, the caller gets [`Tt2CalError::Parse`] rather than a
//! guessed structure.
//!
//! ## Rule Order
//!
//! 1. Normalise line endings and strip invisible Unicode
//! 2. Remove fence marker lines (and inline fences at either end)
//! 3. Scan for bracket-balanced `{…}` / `[…]` spans, skipping string literals
//! 4. Keep the largest span that `serde_json` accepts (first one on ties)

use crate::error::Tt2CalError;
use crate::model::{
    parse_clock_time, DayOfWeek, Timetable, TimetableEntry, TimetableMetadata,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const UNKNOWN_BRANCH: &str = "Unknown Branch";
const UNKNOWN_SEMESTER: &str = "Unknown Semester";

/// Recover the JSON value embedded in `raw`.
pub fn recover_json(raw: &str) -> Result<Value, Tt2CalError> {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = strip_fence_markers(&s);

    let mut best: Option<(usize, Value)> = None;
    for (start, end) in balanced_spans(&s) {
        let Ok(value) = serde_json::from_str::<Value>(&s[start..end]) else {
            continue;
        };
        let len = end - start;
        if best.as_ref().map_or(true, |(best_len, _)| len > *best_len) {
            best = Some((len, value));
        }
    }

    match best {
        Some((len, value)) => {
            debug!("Recovered {} bytes of JSON from {} byte reply", len, raw.len());
            Ok(value)
        }
        None => Err(Tt2CalError::parse(if raw.trim().is_empty() {
            "the model returned an empty response".to_string()
        } else {
            format!("no JSON object found in response: {}", preview(raw))
        })),
    }
}

/// Recover JSON from `raw` and deserialize it into `T`.
pub fn parse_as<T: DeserializeOwned>(raw: &str) -> Result<T, Tt2CalError> {
    let value = recover_json(raw)?;
    serde_json::from_value(value)
        .map_err(|e| Tt2CalError::parse(format!("unexpected JSON shape: {e}")))
}

// ── Rule 1: Normalise line endings / invisible characters ────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Strip fence markers ──────────────────────────────────────────────

static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*$").unwrap());
static RE_INLINE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```(?:json|JSON)?").unwrap());
static RE_INLINE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*$").unwrap());

fn strip_fence_markers(input: &str) -> String {
    let s = RE_FENCE_LINE.replace_all(input, "");
    let s = RE_INLINE_OPEN.replace(&s, "");
    RE_INLINE_CLOSE.replace(&s, "").to_string()
}

// ── Rule 3: Find bracket-balanced spans ──────────────────────────────────────

/// Every top-level `{…}`/`[…]` span whose brackets balance, as byte ranges.
///
/// After a balanced span is found, scanning resumes after its end, so nested
/// values are never reported separately. An opener whose span does not
/// balance is skipped and scanning resumes at the next byte.
fn balanced_spans(input: &str) -> Vec<(usize, usize)> {
    let bytes = input.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' || bytes[i] == b'[' {
            if let Some(end) = matching_close(bytes, i) {
                spans.push((i, end));
                i = end;
                continue;
            }
        }
        i += 1;
    }
    spans
}

/// Exclusive end of the span opened at `start`, or `None` if it never closes
/// or closes with the wrong bracket.
fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out: String = trimmed.chars().take(80).collect();
    if trimmed.chars().count() > 80 {
        out.push('\u{2026}');
    }
    format!("{out:?}")
}

// ── Timetable adapter ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(alias = "course", alias = "title", alias = "subject")]
    summary: String,
    day: String,
    #[serde(alias = "start")]
    start_time: String,
    #[serde(alias = "end")]
    end_time: String,
    #[serde(default)]
    description: Option<String>,
}

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static RE_ROMAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(VIII|VII|VI|IV|IX|III|II|I|V|X)\b").unwrap());
/// A number written next to "sem", after it (`Sem 5`, `Semester-6`) or
/// before it (`4th Semester`). Group 1 holds the number.
static RE_SEM_NUMBER: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        r"(?i)\bsem(?:ester)?\.?\s*[-:]?\s*(\d{1,2})\b",
        r"(?i)\b(\d{1,2})\s*(?:st|nd|rd|th)?\s*sem",
        r"(?i:\bsem(?:ester)?\.?)\s*[-:]?\s*(VIII|VII|VI|IV|IX|III|II|I|V|X)\b",
        r"\b(VIII|VII|VI|IV|IX|III|II|I|V|X)\s+(?i:sem)",
    ]
    .map(|re| Regex::new(re).unwrap())
});

/// Read a semester number out of a label such as `"4th Semester"`,
/// `"Sem 3"` or `"Semester IV"`. A number next to "sem" wins over other
/// numbers in the label (`"2nd Year 4th Semester"` is 4).
pub fn detect_semester(label: &str) -> Option<u32> {
    for re in RE_SEM_NUMBER.iter() {
        if let Some(m) = re.captures(label).and_then(|c| c.get(1)) {
            let text = m.as_str();
            return text.parse().ok().or_else(|| roman_value(text));
        }
    }
    if let Some(m) = RE_DIGITS.find(label) {
        return m.as_str().parse().ok();
    }
    roman_value(RE_ROMAN.find(label)?.as_str())
}

fn roman_value(numeral: &str) -> Option<u32> {
    let n = match numeral {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        "VII" => 7,
        "VIII" => 8,
        "IX" => 9,
        "X" => 10,
        _ => return None,
    };
    Some(n)
}

fn read_metadata(value: Option<&Value>) -> TimetableMetadata {
    let obj = value.and_then(Value::as_object);
    let branch = obj
        .and_then(|m| m.get("branch"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_BRANCH)
        .to_string();

    let (semester, semester_label) = match obj.and_then(|m| m.get("semester")) {
        Some(Value::Number(n)) => {
            let num = n.as_u64().and_then(|v| u32::try_from(v).ok());
            (num, n.to_string())
        }
        Some(Value::String(s)) if !s.trim().is_empty() => (detect_semester(s), s.trim().to_string()),
        _ => (None, UNKNOWN_SEMESTER.to_string()),
    };

    TimetableMetadata {
        branch,
        semester,
        semester_label,
    }
}

/// Recover a [`Timetable`] from the extraction reply.
///
/// Accepts either `{"metadata": {...}, "events": [...]}` or a bare array of
/// events. Missing metadata falls back to "Unknown Branch"/"Unknown Semester";
/// anything that cannot be read as an event is a parse error naming the
/// offending index.
pub fn parse_timetable(raw: &str) -> Result<Timetable, Tt2CalError> {
    let value = recover_json(raw)?;

    let (metadata, events) = match value {
        Value::Object(mut obj) => {
            let metadata = read_metadata(obj.get("metadata"));
            let events = match obj.remove("events") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items,
                Some(_) => return Err(Tt2CalError::parse("\"events\" must be a list")),
            };
            (metadata, events)
        }
        Value::Array(items) => (read_metadata(None), items),
        _ => return Err(Tt2CalError::parse("response is not a JSON object")),
    };

    let entries = events
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let raw: RawEvent = serde_json::from_value(item)
                .map_err(|e| Tt2CalError::parse(format!("event {index}: {e}")))?;
            let in_event = |e: Tt2CalError| Tt2CalError::parse(format!("event {index}: {e}"));
            let day: DayOfWeek = raw.day.parse().map_err(in_event)?;
            let start = parse_clock_time(&raw.start_time).map_err(in_event)?;
            let end = parse_clock_time(&raw.end_time).map_err(in_event)?;
            TimetableEntry::new(
                &metadata,
                day,
                start,
                end,
                raw.summary.trim().to_string(),
                raw.description.unwrap_or_default(),
            )
            .map_err(in_event)
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "Parsed {} timetable entries for {} / {}",
        entries.len(),
        metadata.branch,
        metadata.semester_label
    );

    Ok(Timetable { metadata, entries })
}

// ── Tests ────────────────────────────────────────────────────────────────────
