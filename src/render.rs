use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::categorize::{categorize, Categorized};
use crate::models::{Category, Event};

/// What the events view is currently showing. Exactly one region is visible.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayState {
    Loading,
    Loaded(Vec<Event>),
    Error(String),
    Empty,
}

pub const REGION_LOADING: &str = "events-loading";
pub const REGION_LOADED: &str = "events-container";
pub const REGION_ERROR: &str = "events-error";
pub const REGION_EMPTY: &str = "events-empty";

const REGIONS: [&str; 4] = [REGION_LOADING, REGION_LOADED, REGION_ERROR, REGION_EMPTY];

impl DisplayState {
    /// Loaded when there is something to show, Empty otherwise.
    pub fn from_events(events: Vec<Event>) -> Self {
        if events.is_empty() {
            DisplayState::Empty
        } else {
            DisplayState::Loaded(events)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisplayState::Loading => "loading",
            DisplayState::Loaded(_) => "loaded",
            DisplayState::Error(_) => "error",
            DisplayState::Empty => "empty",
        }
    }

    pub fn region(&self) -> &'static str {
        match self {
            DisplayState::Loading => REGION_LOADING,
            DisplayState::Loaded(_) => REGION_LOADED,
            DisplayState::Error(_) => REGION_ERROR,
            DisplayState::Empty => REGION_EMPTY,
        }
    }

    pub fn refresh_enabled(&self) -> bool {
        !matches!(self, DisplayState::Loading)
    }
}

pub fn summary_line(board: &Categorized) -> String {
    format!(
        "{} events: {} upcoming, {} ongoing, {} past",
        board.total(),
        board.upcoming.len(),
        board.ongoing.len(),
        board.past.len()
    )
}

/// Long form used in share text, e.g. "Tuesday, August 12, 2025 at 9:00 AM".
pub fn format_date(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .format("%A, %B %-d, %Y at %-I:%M %p")
        .to_string()
}

/// Compact range for event cards.
pub fn format_range(event: &Event, tz: Tz) -> String {
    let start = event.start_time.with_timezone(&tz);
    let end = event.end_time.with_timezone(&tz);
    if start.date_naive() == end.date_naive() {
        format!(
            "{} · {} – {}",
            start.format("%a, %b %-d, %Y"),
            start.format("%-I:%M %p"),
            end.format("%-I:%M %p")
        )
    } else {
        format!(
            "{} – {}",
            start.format("%b %-d, %Y %-I:%M %p"),
            end.format("%b %-d, %Y %-I:%M %p")
        )
    }
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_html(state: &DisplayState, now: DateTime<Utc>, tz: Tz) -> String {
    let mut html = String::from("<section id=\"events\" class=\"events\">\n");
    html.push_str(&format!(
        "  <button id=\"refresh-events\" class=\"refresh-button\" type=\"button\"{}>Refresh</button>\n",
        if state.refresh_enabled() { "" } else { " disabled" }
    ));

    for region in REGIONS {
        let hidden = if region == state.region() { "" } else { " hidden" };
        html.push_str(&format!(
            "  <div id=\"{region}\" class=\"{region}\"{hidden}>\n"
        ));
        if region == state.region() {
            html.push_str(&region_body(state, now, tz));
        }
        html.push_str("  </div>\n");
    }

    html.push_str("</section>\n");
    html
}

fn region_body(state: &DisplayState, now: DateTime<Utc>, tz: Tz) -> String {
    match state {
        DisplayState::Loading => {
            "    <div class=\"spinner\"></div>\n    <p>Loading events…</p>\n".to_string()
        }
        DisplayState::Error(message) => format!(
            "    <p>Unable to load events right now. Please try refreshing.</p>\n    <p class=\"error-detail\">{}</p>\n",
            escape(message)
        ),
        DisplayState::Empty => {
            "    <p>No events to show yet. Check back soon!</p>\n".to_string()
        }
        DisplayState::Loaded(events) => {
            let board = categorize(events, now);
            let mut body = format!(
                "    <p class=\"events-summary\">{}</p>\n",
                escape(&summary_line(&board))
            );
            for (category, events) in board.sections() {
                body.push_str(&render_section(category, events, tz));
            }
            body
        }
    }
}

fn render_section(category: Category, events: &[Event], tz: Tz) -> String {
    let mut out = format!(
        "    <div class=\"events-section {slug}\" data-category=\"{slug}\">\n      <h3>{title} ({count})</h3>\n",
        slug = category.slug(),
        title = category.title(),
        count = events.len()
    );
    for event in events {
        out.push_str(&render_card(category, event, tz));
    }
    out.push_str("    </div>\n");
    out
}

fn render_card(category: Category, event: &Event, tz: Tz) -> String {
    let badge = if event.is_online { "Online" } else { "In person" };
    let mut out = format!(
        "      <article class=\"event-card {slug}\" data-event-id=\"{id}\">\n",
        slug = category.slug(),
        id = escape(&event.id)
    );
    out.push_str(&format!(
        "        <img class=\"event-image\" src=\"{}\" alt=\"{}\" loading=\"lazy\">\n",
        escape(&event.image),
        escape(&event.name)
    ));
    out.push_str(&format!(
        "        <h4 class=\"event-title\">{}</h4>\n",
        escape(&event.name)
    ));
    out.push_str(&format!(
        "        <p class=\"event-date\">{}</p>\n",
        escape(&format_range(event, tz))
    ));
    if !event.is_consistent() {
        out.push_str(
            "        <p class=\"event-warning\">Schedule inconsistent: ends before it starts</p>\n",
        );
    }
    out.push_str(&format!(
        "        <p class=\"event-location\">{}</p>\n        <span class=\"event-badge\">{badge}</span>\n        <span class=\"event-interested\">{} interested</span>\n",
        escape(&event.location),
        event.attendee_count
    ));
    if !event.description.is_empty() {
        out.push_str(&format!(
            "        <p class=\"event-description\">{}</p>\n",
            escape(&event.description)
        ));
    }
    out.push_str(&format!(
        "        <button class=\"share-button\" type=\"button\" data-share-id=\"{}\">Share</button>\n",
        escape(&event.id)
    ));
    if let Some(url) = &event.event_url {
        out.push_str(&format!(
            "        <a class=\"event-link\" href=\"{}\" target=\"_blank\" rel=\"noopener\">View original</a>\n",
            escape(url)
        ));
    }
    out.push_str("      </article>\n");
    out
}

/// Terminal rendition with the same sections and summary as the HTML view.
pub fn render_text(state: &DisplayState, now: DateTime<Utc>, tz: Tz) -> String {
    match state {
        DisplayState::Loading => "Loading events…\n".to_string(),
        DisplayState::Error(message) => {
            format!("Unable to load events right now ({message}). Try `--refresh`.\n")
        }
        DisplayState::Empty => "No events to show yet. Check back soon!\n".to_string(),
        DisplayState::Loaded(events) => {
            let board = categorize(events, now);
            let mut out = format!("{}\n", summary_line(&board));
            for (category, events) in board.sections() {
                out.push_str(&format!("\n== {} ({}) ==\n", category.title(), events.len()));
                for event in events {
                    out.push_str(&format!("\n* {}  [{}]\n", event.name, event.id));
                    out.push_str(&format!("  {}\n", format_range(event, tz)));
                    if !event.is_consistent() {
                        out.push_str("  (schedule inconsistent: ends before it starts)\n");
                    }
                    out.push_str(&format!(
                        "  {} · {} · {} interested\n",
                        event.location,
                        if event.is_online { "online" } else { "in person" },
                        event.attendee_count
                    ));
                    if let Some(url) = &event.event_url {
                        out.push_str(&format!("  {url}\n"));
                    }
                }
            }
            out
        }
    }
}
