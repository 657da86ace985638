use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_IMAGE: &str = "images/algorithm_logo.png";
pub const DEFAULT_LOCATION: &str = "Location TBD";

/// Canonical event shape, as held in memory and in the cache envelope.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: String,
    pub image: String,
    pub is_online: bool,
    pub attendee_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_url: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum EventError {
    #[error("event {id} ends ({end}) before it starts ({start})")]
    InvertedSchedule {
        id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Event {
    pub fn validate(&self) -> Result<(), EventError> {
        if self.start_time > self.end_time {
            return Err(EventError::InvertedSchedule {
                id: self.id.clone(),
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Record as written by the scraper into the event source document.
#[derive(Deserialize, Debug, Clone)]
pub struct SourceEvent {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "image_reference")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub attendee_count: Option<u32>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub event_url: Option<String>,
}

/// Scrapers copy schema.org `image` verbatim, which may be a string, a list of
/// URLs or an `ImageObject`. Anything without a usable URL reads as absent.
fn image_reference<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn url_of(value: &Value) -> Option<String> {
        match value {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(url_of),
            Value::Object(map) => map.get("url").and_then(url_of),
            _ => None,
        }
    }
    Ok(url_of(&Value::deserialize(deserializer)?))
}

/// Records stay raw until normalization so one bad record cannot sink the
/// whole document.
#[derive(Deserialize, Debug)]
pub struct SourceDocument {
    pub events: Vec<Value>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_count: Option<usize>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Timestamped snapshot of the last event list the pipeline obtained.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CacheEnvelope {
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
    pub events: Vec<Event>,
}

impl CacheEnvelope {
    pub fn capture(events: Vec<Event>, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now.timestamp_millis(),
            events,
        }
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Upcoming,
    Ongoing,
    Past,
}

impl Category {
    pub fn title(self) -> &'static str {
        match self {
            Category::Upcoming => "Upcoming Events",
            Category::Ongoing => "Happening Now",
            Category::Past => "Past Events",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            Category::Upcoming => "upcoming",
            Category::Ongoing => "ongoing",
            Category::Past => "past",
        }
    }
}
