use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use community_events_lib::cache::{EventCache, CACHE_KEY};
use community_events_lib::db::{KeyValueStore, MemoryStore, Store};
use community_events_lib::fallback::fallback_events;
use community_events_lib::models::Event;
use community_events_lib::pipeline::EventsPipeline;
use community_events_lib::render::DisplayState;
use community_events_lib::share::{ManualShare, NativeShare, ShareStrategy};
use community_events_lib::source::{EventSource, FileSource, SourceError};
use community_events_lib::utils::FixedClock;

const TZ: chrono_tz::Tz = chrono_tz::UTC;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap()
}

struct Fetch {
    delay: Duration,
    result: Result<String, SourceError>,
}

/// Replays queued responses and records how it was called.
#[derive(Default)]
struct Script {
    responses: Mutex<VecDeque<Fetch>>,
    calls: AtomicUsize,
    bypass_flags: Mutex<Vec<bool>>,
    cache_present_at_fetch: Mutex<Vec<bool>>,
    store: Mutex<Option<Arc<dyn KeyValueStore>>>,
}

impl Script {
    fn respond(&self, result: Result<String, SourceError>) {
        self.respond_after(Duration::ZERO, result);
    }

    fn respond_after(&self, delay: Duration, result: Result<String, SourceError>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Fetch { delay, result });
    }

    fn watch_store(&self, store: Arc<dyn KeyValueStore>) {
        *self.store.lock().unwrap() = Some(store);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct ScriptedSource(Arc<Script>);

#[async_trait]
impl EventSource for ScriptedSource {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    async fn fetch(&self, bypass_cache: bool) -> Result<String, SourceError> {
        let script = &self.0;
        script.calls.fetch_add(1, Ordering::SeqCst);
        script.bypass_flags.lock().unwrap().push(bypass_cache);
        let present = script
            .store
            .lock()
            .unwrap()
            .as_ref()
            .map(|store| store.get(CACHE_KEY).unwrap().is_some())
            .unwrap_or(false);
        script.cache_present_at_fetch.lock().unwrap().push(present);

        let next = script.responses.lock().unwrap().pop_front();
        match next {
            Some(fetch) => {
                if !fetch.delay.is_zero() {
                    tokio::time::sleep(fetch.delay).await;
                }
                fetch.result
            }
            None => Err(SourceError::Http("no scripted response".to_string())),
        }
    }
}

struct Harness {
    script: Arc<Script>,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    pipeline: EventsPipeline,
}

fn harness() -> Harness {
    let script = Arc::new(Script::default());
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(now()));
    let pipeline = EventsPipeline::new(
        Box::new(ScriptedSource(script.clone())),
        store.clone(),
        TZ,
    )
    .with_clock(clock.clone());
    Harness {
        script,
        store,
        clock,
        pipeline,
    }
}

fn document(names: &[(&str, i64)]) -> String {
    let events: Vec<_> = names
        .iter()
        .map(|(name, offset_hours)| {
            let start = now() + chrono::Duration::hours(*offset_hours);
            let end = start + chrono::Duration::hours(2);
            json!({
                "id": name.to_lowercase().replace(' ', "-"),
                "name": name,
                "description": format!("All about {name}"),
                "start_time": start.to_rfc3339(),
                "end_time": end.to_rfc3339(),
                "location": "Padma Kanya Campus",
                "image_url": "images/algorithm_logo.png",
                "attendee_count": 20,
                "is_online": false,
                "event_url": "https://www.facebook.com/0thealgorithm"
            })
        })
        .collect();
    json!({ "events": events }).to_string()
}

fn names(events: &[Event]) -> Vec<String> {
    events.iter().map(|e| e.name.clone()).collect()
}

fn seed_cache(store: &Arc<MemoryStore>, labels: &[&str], captured: DateTime<Utc>) {
    let cache = EventCache::new(store.clone(), TZ);
    let events: Vec<Event> = labels
        .iter()
        .map(|name| Event {
            id: name.to_string(),
            name: name.to_string(),
            description: String::new(),
            start_time: now(),
            end_time: now(),
            location: "Cached Hall".to_string(),
            image: "images/algorithm_logo.png".to_string(),
            is_online: false,
            attendee_count: 1,
            event_url: None,
        })
        .collect();
    cache.write(&events, captured).unwrap();
}

#[tokio::test(start_paused = true)]
async fn server_error_renders_the_fallback_dataset() {
    let h = harness();
    h.script.respond(Err(SourceError::Status {
        status: 500,
        body: "oops".to_string(),
    }));

    let state = h.pipeline.initialize().await;
    let expected = fallback_events(now(), TZ);
    assert_eq!(state, DisplayState::Loaded(expected.clone()));
    assert_eq!(h.pipeline.events(), expected);

    // The fallback is cached like any other result.
    let cached = EventCache::new(h.store.clone(), TZ).read().unwrap().unwrap();
    assert_eq!(cached.events, expected);
}

#[tokio::test(start_paused = true)]
async fn malformed_document_falls_back_instead_of_erroring() {
    let h = harness();
    h.script.respond(Ok("<html>not json</html>".to_string()));

    let state = h.pipeline.load_events(false).await;
    assert_eq!(state, DisplayState::Loaded(fallback_events(now(), TZ)));
}

#[tokio::test(start_paused = true)]
async fn bad_records_are_dropped_without_discarding_good_ones() {
    let h = harness();
    let start = now() + chrono::Duration::hours(4);
    let body = json!({
        "events": [
            {
                "id": "good",
                "name": "Good",
                "start_time": start.to_rfc3339(),
                "end_time": (start + chrono::Duration::hours(1)).to_rfc3339(),
                "image_url": ["https://x/a.jpg"]
            },
            {
                "id": "b",
                "name": "Unfinished",
                "start_time": start.to_rfc3339(),
                "end_time": ""
            }
        ]
    })
    .to_string();
    h.script.respond(Ok(body));

    let state = h.pipeline.initialize().await;
    assert_eq!(state.name(), "loaded");
    let events = h.pipeline.events();
    assert_eq!(names(&events), vec!["Good"]);
    assert_eq!(events[0].image, "https://x/a.jpg");
}

#[tokio::test]
async fn envelope_older_than_thirty_minutes_is_not_reused() {
    let h = harness();
    seed_cache(&h.store, &["Stale"], now() - chrono::Duration::minutes(31));
    h.script.respond(Ok(document(&[("Fresh", 24)])));

    let state = h.pipeline.load_events(false).await;
    assert_eq!(h.script.calls(), 1);
    match state {
        DisplayState::Loaded(events) => assert_eq!(names(&events), vec!["Fresh"]),
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn envelope_within_thirty_minutes_is_reused_by_a_plain_load() {
    let h = harness();
    seed_cache(&h.store, &["Cached"], now() - chrono::Duration::minutes(20));

    let state = h.pipeline.load_events(false).await;
    assert_eq!(h.script.calls(), 0);
    assert_eq!(state.name(), "loaded");
    assert_eq!(names(&h.pipeline.events()), vec!["Cached"]);
}

#[tokio::test]
async fn initialize_prunes_envelopes_older_than_five_minutes() {
    let h = harness();
    h.script.watch_store(h.store.clone());
    seed_cache(&h.store, &["Old"], now() - chrono::Duration::minutes(6));
    h.script.respond(Ok(document(&[("New", 5)])));

    h.pipeline.initialize().await;
    assert_eq!(h.script.calls(), 1);
    assert_eq!(*h.script.cache_present_at_fetch.lock().unwrap(), vec![false]);
    assert_eq!(names(&h.pipeline.events()), vec!["New"]);
}

#[tokio::test]
async fn initialize_prunes_envelopes_from_a_previous_day() {
    let h = harness();
    let just_after_midnight = Utc.with_ymd_and_hms(2026, 10, 16, 0, 1, 0).unwrap();
    h.clock.set(just_after_midnight);
    seed_cache(
        &h.store,
        &["Yesterday"],
        just_after_midnight - chrono::Duration::minutes(2),
    );
    h.script.respond(Ok(document(&[("Today", 5)])));

    h.pipeline.initialize().await;
    assert_eq!(h.script.calls(), 1);
    assert_eq!(names(&h.pipeline.events()), vec!["Today"]);
}

#[tokio::test]
async fn reload_within_the_window_reproduces_the_list_without_fetching() {
    let h = harness();
    h.script
        .respond(Ok(document(&[("Hackathon", 48), ("Study Circle", -30), ("Panel", -1)])));

    h.pipeline.initialize().await;
    let first = h.pipeline.events();
    assert_eq!(h.script.calls(), 1);

    h.clock.advance(chrono::Duration::minutes(10));
    let state = h.pipeline.load_events(false).await;
    assert_eq!(h.script.calls(), 1);
    assert_eq!(state, DisplayState::Loaded(first.clone()));
    assert_eq!(names(&first), vec!["Hackathon", "Study Circle", "Panel"]);
}

#[tokio::test]
async fn forced_refresh_clears_a_fresh_entry_and_fetches() {
    let h = harness();
    h.script.watch_store(h.store.clone());
    h.script.respond(Ok(document(&[("First", 5)])));
    h.script.respond(Ok(document(&[("Second", 5)])));

    h.pipeline.initialize().await;
    assert!(h.store.get(CACHE_KEY).unwrap().is_some());

    let state = h.pipeline.refresh().await;
    assert_eq!(h.script.calls(), 2);
    assert_eq!(*h.script.bypass_flags.lock().unwrap(), vec![false, true]);
    assert_eq!(
        *h.script.cache_present_at_fetch.lock().unwrap(),
        vec![false, false]
    );
    match state {
        DisplayState::Loaded(events) => assert_eq!(names(&events), vec!["Second"]),
        other => panic!("unexpected state {other:?}"),
    }
    assert!(h.pipeline.refresh_available());
}

#[tokio::test]
async fn refreshed_startup_fetches_once_and_bypasses_the_cache() {
    let h = harness();
    seed_cache(&h.store, &["Cached"], now() - chrono::Duration::minutes(1));
    h.script.respond(Ok(document(&[("Latest", 5)])));

    let state = h.pipeline.initialize_refreshed().await;
    assert_eq!(h.script.calls(), 1);
    assert_eq!(*h.script.bypass_flags.lock().unwrap(), vec![true]);
    match state {
        DisplayState::Loaded(events) => assert_eq!(names(&events), vec!["Latest"]),
        other => panic!("unexpected state {other:?}"),
    }
    assert!(h.pipeline.refresh_available());
}

#[tokio::test(start_paused = true)]
async fn refresh_is_disabled_while_a_load_is_in_flight() {
    let h = harness();
    h.script
        .respond_after(Duration::from_secs(2), Ok(document(&[("Later", 5)])));

    let observe = async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (
            h.pipeline.refresh_available(),
            h.pipeline.display(),
            h.pipeline.render_html(),
        )
    };
    let (state, (available_mid_fetch, display_mid_fetch, html_mid_fetch)) =
        tokio::join!(h.pipeline.initialize(), observe);

    assert!(!available_mid_fetch);
    assert_eq!(display_mid_fetch, DisplayState::Loading);
    assert!(html_mid_fetch.contains(" disabled>Refresh</button>"));
    assert_eq!(state.name(), "loaded");
    assert!(!h.pipeline.render_html().contains(" disabled>Refresh"));
    assert!(h.pipeline.refresh_available());
}

#[tokio::test]
async fn empty_document_yields_the_empty_state() {
    let h = harness();
    h.script.respond(Ok(r#"{"events": []}"#.to_string()));

    let state = h.pipeline.initialize().await;
    assert_eq!(state, DisplayState::Empty);
    let html = h.pipeline.render_html();
    assert!(html.contains("<div id=\"events-empty\" class=\"events-empty\">"));
    assert!(!html.contains("data-category"));
}

#[tokio::test]
async fn corrupt_cache_is_a_miss_not_a_failure() {
    let h = harness();
    h.store.set(CACHE_KEY, "{\"timestamp\": \"yesterday\"").unwrap();
    h.script.respond(Ok(document(&[("Recovered", 3)])));

    let state = h.pipeline.initialize().await;
    assert_eq!(h.script.calls(), 1);
    assert_eq!(state.name(), "loaded");
    let cached = EventCache::new(h.store.clone(), TZ).read().unwrap().unwrap();
    assert_eq!(names(&cached.events), vec!["Recovered"]);
}

#[tokio::test(start_paused = true)]
async fn slower_superseded_load_does_not_overwrite_the_latest() {
    let h = harness();
    h.script
        .respond_after(Duration::from_secs(5), Ok(document(&[("Slow", 5)])));
    h.script
        .respond_after(Duration::from_secs(1), Ok(document(&[("Quick", 5)])));

    let (_, _) = tokio::join!(h.pipeline.load_events(true), h.pipeline.load_events(true));

    assert_eq!(h.script.calls(), 2);
    assert_eq!(names(&h.pipeline.events()), vec!["Quick"]);
    let cached = EventCache::new(h.store.clone(), TZ).read().unwrap().unwrap();
    assert_eq!(names(&cached.events), vec!["Quick"]);
}

#[tokio::test]
async fn share_without_native_support_hands_back_event_text() {
    let h = harness();
    h.script.respond(Ok(document(&[("Git Workshop", 26)])));
    let chain: Vec<Box<dyn ShareStrategy>> =
        vec![Box::new(NativeShare::new(None)), Box::new(ManualShare)];
    let pipeline = h.pipeline.with_share_chain(chain);

    pipeline.initialize().await;
    let event = pipeline.find_event("git-workshop").expect("event loaded");
    let outcome = pipeline.share_event(&event).await.expect("shared");

    assert_eq!(outcome.strategy, "manual");
    let text = outcome.manual_text.expect("manual text");
    assert!(text.contains("Git Workshop"));
    assert!(text.contains("All about Git Workshop"));
    assert!(text.contains("Saturday, October 17, 2026 at 8:00 AM"));
    assert!(text.contains("Padma Kanya Campus"));
}

struct MustNotFetch;

#[async_trait]
impl EventSource for MustNotFetch {
    fn describe(&self) -> String {
        "must-not-fetch".to_string()
    }

    async fn fetch(&self, _bypass_cache: bool) -> Result<String, SourceError> {
        panic!("cache should have been reused");
    }
}

#[tokio::test]
async fn sqlite_cache_survives_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let doc_path = dir.path().join("events.json");
    std::fs::write(&doc_path, document(&[("Fellowship", 72), ("Web Basics", -72)]))
        .expect("write document");
    let db_path = dir.path().join("events.sqlite");
    let clock = Arc::new(FixedClock::new(now()));

    let first = {
        let store = Arc::new(Store::open(&db_path).expect("open store"));
        let pipeline = EventsPipeline::new(Box::new(FileSource::new(&doc_path)), store, TZ)
            .with_clock(clock.clone());
        pipeline.initialize().await;
        pipeline.events()
    };
    assert_eq!(names(&first), vec!["Fellowship", "Web Basics"]);

    clock.advance(chrono::Duration::minutes(2));
    let store = Arc::new(Store::open(&db_path).expect("reopen store"));
    let pipeline = EventsPipeline::new(Box::new(MustNotFetch), store, TZ).with_clock(clock);
    let state = pipeline.initialize().await;
    assert_eq!(state, DisplayState::Loaded(first));

    let text = pipeline.render_text();
    assert!(text.starts_with("2 events: 1 upcoming, 0 ongoing, 1 past"));
}
