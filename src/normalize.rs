use std::collections::HashSet;

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Event, SourceDocument, SourceEvent, DEFAULT_IMAGE, DEFAULT_LOCATION};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed event document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event #{index} is missing `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("event #{index} has an unreadable `{field}`: {value}")]
    InvalidTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },
    #[error("event #{index} is not a valid record: {reason}")]
    Record { index: usize, reason: String },
}

/// Per-kind count of records dropped while normalizing one document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Skipped {
    pub missing_field: usize,
    pub invalid_timestamp: usize,
    pub invalid_record: usize,
}

impl Skipped {
    fn tally(&mut self, err: &NormalizeError) {
        match err {
            NormalizeError::MissingField { .. } => self.missing_field += 1,
            NormalizeError::InvalidTimestamp { .. } => self.invalid_timestamp += 1,
            NormalizeError::Record { .. } | NormalizeError::Json(_) => self.invalid_record += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_field + self.invalid_timestamp + self.invalid_record
    }
}

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parses an event source document into canonical events, dropping duplicates.
///
/// Only a document that is not JSON or has no `events` list is an error.
/// Individual records that cannot be normalized are logged and skipped.
pub fn parse_document(body: &str, tz: Tz) -> Result<Vec<Event>, NormalizeError> {
    parse_document_with_skips(body, tz).map(|(events, _)| events)
}

pub fn parse_document_with_skips(
    body: &str,
    tz: Tz,
) -> Result<(Vec<Event>, Skipped), NormalizeError> {
    let document: SourceDocument = serde_json::from_str(body)?;
    if let Some(updated) = document.last_updated.as_deref() {
        info!(
            "event document last updated {updated} (source: {})",
            document.source.as_deref().unwrap_or("unknown")
        );
    }
    if let Some(total) = document.total_count {
        if total != document.events.len() {
            debug!(
                "event document claims {total} events but lists {}",
                document.events.len()
            );
        }
    }

    let mut events = Vec::with_capacity(document.events.len());
    let mut skipped = Skipped::default();
    for (index, raw) in document.events.into_iter().enumerate() {
        let normalized = serde_json::from_value::<SourceEvent>(raw)
            .map_err(|err| NormalizeError::Record {
                index,
                reason: err.to_string(),
            })
            .and_then(|record| normalize_event(index, record, tz));
        match normalized {
            Ok(event) => events.push(event),
            Err(err) => {
                warn!("skipping event: {err}");
                skipped.tally(&err);
            }
        }
    }
    if skipped.total() > 0 {
        warn!(
            "skipped {} of {} events ({} missing a field, {} with unreadable timestamps, {} malformed)",
            skipped.total(),
            skipped.total() + events.len(),
            skipped.missing_field,
            skipped.invalid_timestamp,
            skipped.invalid_record
        );
    }
    Ok((dedupe(events, tz), skipped))
}

fn normalize_event(index: usize, record: SourceEvent, tz: Tz) -> Result<Event, NormalizeError> {
    let id = required(index, "id", record.id)?;
    let name = required(index, "name", record.name)?;
    let start_raw = required(index, "start_time", record.start_time)?;
    let end_raw = required(index, "end_time", record.end_time)?;

    let event = Event {
        id,
        name,
        description: record.description.unwrap_or_default(),
        start_time: parse_timestamp(index, "start_time", &start_raw, tz)?,
        end_time: parse_timestamp(index, "end_time", &end_raw, tz)?,
        location: record
            .location
            .filter(|loc| !loc.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        image: record
            .image_url
            .filter(|img| !img.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
        is_online: record.is_online.unwrap_or(false),
        attendee_count: record.attendee_count.unwrap_or(0),
        event_url: record.event_url.filter(|url| !url.trim().is_empty()),
    };

    if let Err(err) = event.validate() {
        warn!("{err}");
    }
    Ok(event)
}

fn required(
    index: usize,
    field: &'static str,
    value: Option<String>,
) -> Result<String, NormalizeError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(NormalizeError::MissingField { index, field })
}

/// Accepts RFC 3339 timestamps and offset-less ISO timestamps; the latter are
/// read as wall-clock time in `tz`.
pub fn parse_timestamp(
    index: usize,
    field: &'static str,
    raw: &str,
    tz: Tz,
) -> Result<DateTime<Utc>, NormalizeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => return Ok(dt.with_timezone(&Utc)),
                LocalResult::Ambiguous(dt, _) => return Ok(dt.with_timezone(&Utc)),
                LocalResult::None => break,
            }
        }
    }
    Err(NormalizeError::InvalidTimestamp {
        index,
        field,
        value: raw.to_string(),
    })
}

/// Keeps the first event per id and per (name, start date) pair.
pub fn dedupe(events: Vec<Event>, tz: Tz) -> Vec<Event> {
    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();
    let mut unique = Vec::with_capacity(events.len());

    for event in events {
        let key = format!(
            "{}_{}",
            event.name.trim().to_lowercase(),
            event.start_time.with_timezone(&tz).date_naive()
        );
        if !seen_ids.insert(event.id.clone()) {
            debug!("dropping duplicate event id {}", event.id);
            continue;
        }
        if !seen_keys.insert(key) {
            debug!("dropping duplicate event {} on the same day", event.name);
            continue;
        }
        unique.push(event);
    }

    unique
}
