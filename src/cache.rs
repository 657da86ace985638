use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{KeyValueStore, StoreError};
use crate::models::{CacheEnvelope, Event};

pub const CACHE_KEY: &str = "community-events:events-cache";

/// Envelopes older than this are pruned when the pipeline initializes.
pub const PRUNE_MAX_AGE_MINUTES: i64 = 5;
/// Envelopes older than this are never reused by a normal load.
pub const REUSE_MAX_AGE_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
    #[error("cache entry could not be encoded: {0}")]
    Encode(String),
}

pub struct EventCache {
    store: Arc<dyn KeyValueStore>,
    timezone: Tz,
}

impl EventCache {
    pub fn new(store: Arc<dyn KeyValueStore>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    /// Reads the envelope. Corrupt entries are deleted and reported as absent.
    pub fn read(&self) -> Result<Option<CacheEnvelope>, CacheError> {
        let raw = match self.store.get(CACHE_KEY)? {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match serde_json::from_str::<CacheEnvelope>(&raw) {
            Ok(envelope) if envelope.captured_at().is_some() => Ok(Some(envelope)),
            Ok(envelope) => {
                warn!(
                    "cache envelope has out-of-range timestamp {}, discarding",
                    envelope.timestamp
                );
                self.clear()?;
                Ok(None)
            }
            Err(err) => {
                warn!("cache envelope is corrupt, discarding: {err}");
                self.clear()?;
                Ok(None)
            }
        }
    }

    pub fn write(&self, events: &[Event], now: DateTime<Utc>) -> Result<(), CacheError> {
        let envelope = CacheEnvelope::capture(events.to_vec(), now);
        let encoded =
            serde_json::to_string(&envelope).map_err(|err| CacheError::Encode(err.to_string()))?;
        self.store.set(CACHE_KEY, &encoded)?;
        debug!("cached {} events", events.len());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        self.store.remove(CACHE_KEY)?;
        Ok(())
    }

    /// Deletes the envelope when it is older than five minutes or was captured
    /// on a previous calendar day. Returns whether anything was deleted.
    pub fn prune(&self, now: DateTime<Utc>) -> Result<bool, CacheError> {
        let envelope = match self.read()? {
            Some(envelope) => envelope,
            None => return Ok(false),
        };
        let captured = match envelope.captured_at() {
            Some(captured) => captured,
            None => return Ok(false),
        };

        let age = now.signed_duration_since(captured);
        let same_day = captured.with_timezone(&self.timezone).date_naive()
            == now.with_timezone(&self.timezone).date_naive();

        if age > Duration::minutes(PRUNE_MAX_AGE_MINUTES) || !same_day {
            info!(
                "pruning cached events (age {}s, same day: {same_day})",
                age.num_seconds()
            );
            self.clear()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns the cached events when the envelope is young enough to reuse.
    pub fn fresh_events(&self, now: DateTime<Utc>) -> Result<Option<Vec<Event>>, CacheError> {
        let envelope = match self.read()? {
            Some(envelope) => envelope,
            None => {
                debug!("no cached events");
                return Ok(None);
            }
        };
        let age = envelope
            .captured_at()
            .map(|captured| now.signed_duration_since(captured))
            .unwrap_or_else(|| Duration::minutes(REUSE_MAX_AGE_MINUTES + 1));

        if age > Duration::minutes(REUSE_MAX_AGE_MINUTES) {
            debug!("cached events too old to reuse ({}s)", age.num_seconds());
            return Ok(None);
        }
        info!(
            "reusing {} cached events ({}s old)",
            envelope.events.len(),
            age.num_seconds()
        );
        Ok(Some(envelope.events))
    }
}
