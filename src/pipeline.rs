use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, EventCache};
use crate::db::KeyValueStore;
use crate::fallback::fallback_events;
use crate::models::Event;
use crate::normalize::{parse_document, NormalizeError};
use crate::render::{render_html, render_text, DisplayState};
use crate::share::{
    share_with, ManualShare, ShareError, ShareOutcome, SharePayload, ShareStrategy,
};
use crate::source::{EventSource, SourceError};
use crate::utils::{Clock, SystemClock};

/// The fallback path keeps the loading state visible at least this long.
pub const FALLBACK_MIN_LOADING: Duration = Duration::from_millis(1500);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

struct View {
    display: DisplayState,
    events: Vec<Event>,
}

/// Owns the whole events lifecycle: cache validation, fetch, normalize, cache
/// store, categorize, render, refresh and share.
pub struct EventsPipeline {
    source: Box<dyn EventSource>,
    cache: EventCache,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    share_chain: Vec<Box<dyn ShareStrategy>>,
    fallback_min_loading: Duration,
    latest_request: AtomicU64,
    initialized: AtomicBool,
    view: Mutex<View>,
}

impl EventsPipeline {
    pub fn new(source: Box<dyn EventSource>, store: Arc<dyn KeyValueStore>, timezone: Tz) -> Self {
        Self {
            source,
            cache: EventCache::new(store, timezone),
            clock: Arc::new(SystemClock),
            timezone,
            share_chain: vec![Box::new(ManualShare)],
            fallback_min_loading: FALLBACK_MIN_LOADING,
            latest_request: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            view: Mutex::new(View {
                display: DisplayState::Loading,
                events: Vec::new(),
            }),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_share_chain(mut self, chain: Vec<Box<dyn ShareStrategy>>) -> Self {
        self.share_chain = chain;
        self
    }

    pub fn with_fallback_min_loading(mut self, duration: Duration) -> Self {
        self.fallback_min_loading = duration;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Prunes stale cache entries, enables refresh and runs the first load.
    pub async fn initialize(&self) -> DisplayState {
        self.prepare();
        self.load_events(false).await
    }

    /// Startup for hosts that want fresh data right away: the first load is a
    /// forced refresh instead of a cache-first load.
    pub async fn initialize_refreshed(&self) -> DisplayState {
        self.prepare();
        self.refresh().await
    }

    fn prepare(&self) {
        match self.cache.prune(self.clock.now()) {
            Ok(true) => debug!("stale cache pruned on startup"),
            Ok(false) => {}
            Err(err) => warn!("cache prune failed: {err}"),
        }
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Drops the cached envelope and reloads from the source.
    pub async fn refresh(&self) -> DisplayState {
        info!("refresh requested");
        if let Err(err) = self.cache.clear() {
            warn!("failed to clear cached events: {err}");
        }
        self.load_events(true).await
    }

    pub async fn load_events(&self, force_refresh: bool) -> DisplayState {
        let token = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        self.set_display(DisplayState::Loading);

        match self.obtain_events(token, force_refresh, started).await {
            Ok(events) => {
                if self.is_latest(token) {
                    let mut view = self.view_mut();
                    view.display = DisplayState::from_events(events.clone());
                    view.events = events;
                    info!("events view is {}", view.display.name());
                } else {
                    debug!("load #{token} superseded, discarding its result");
                }
            }
            Err(err) => {
                error!("loading events failed: {err}");
                if self.is_latest(token) {
                    self.set_display(DisplayState::Error(err.to_string()));
                }
            }
        }

        self.display()
    }

    async fn obtain_events(
        &self,
        token: u64,
        force_refresh: bool,
        started: Instant,
    ) -> Result<Vec<Event>, PipelineError> {
        if !force_refresh {
            if let Some(events) = self.cache.fresh_events(self.clock.now())? {
                return Ok(events);
            }
        }

        let events = match self.fetch(force_refresh).await {
            Ok(events) => {
                info!(
                    "fetched {} events from {}",
                    events.len(),
                    self.source.describe()
                );
                events
            }
            Err(err) => {
                warn!(
                    "event source {} unavailable, using fallback events: {err}",
                    self.source.describe()
                );
                let elapsed = started.elapsed();
                if elapsed < self.fallback_min_loading {
                    sleep(self.fallback_min_loading - elapsed).await;
                }
                fallback_events(self.clock.now(), self.timezone)
            }
        };

        if self.is_latest(token) {
            self.cache.write(&events, self.clock.now())?;
        }
        Ok(events)
    }

    async fn fetch(&self, bypass_cache: bool) -> Result<Vec<Event>, FetchError> {
        let body = self.source.fetch(bypass_cache).await?;
        Ok(parse_document(&body, self.timezone)?)
    }

    /// Shares through the configured chain, falling through tier by tier.
    pub async fn share_event(&self, event: &Event) -> Result<ShareOutcome, ShareError> {
        let payload = SharePayload::for_event(event, self.timezone);
        share_with(&self.share_chain, &payload).await
    }

    pub fn find_event(&self, id: &str) -> Option<Event> {
        self.view_mut().events.iter().find(|e| e.id == id).cloned()
    }

    pub fn events(&self) -> Vec<Event> {
        self.view_mut().events.clone()
    }

    pub fn display(&self) -> DisplayState {
        self.view_mut().display.clone()
    }

    pub fn refresh_available(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && self.view_mut().display.refresh_enabled()
    }

    pub fn render_html(&self) -> String {
        render_html(&self.display(), self.clock.now(), self.timezone)
    }

    pub fn render_text(&self) -> String {
        render_text(&self.display(), self.clock.now(), self.timezone)
    }

    fn is_latest(&self, token: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) == token
    }

    fn set_display(&self, display: DisplayState) {
        self.view_mut().display = display;
    }

    fn view_mut(&self) -> MutexGuard<'_, View> {
        match self.view.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
