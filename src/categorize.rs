use chrono::{DateTime, Utc};

use crate::models::{Category, Event};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Categorized {
    pub upcoming: Vec<Event>,
    pub ongoing: Vec<Event>,
    pub past: Vec<Event>,
}

impl Categorized {
    pub fn total(&self) -> usize {
        self.upcoming.len() + self.ongoing.len() + self.past.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Non-empty sections in display order.
    pub fn sections(&self) -> Vec<(Category, &[Event])> {
        [
            (Category::Upcoming, self.upcoming.as_slice()),
            (Category::Ongoing, self.ongoing.as_slice()),
            (Category::Past, self.past.as_slice()),
        ]
        .into_iter()
        .filter(|(_, events)| !events.is_empty())
        .collect()
    }
}

pub fn category_of(event: &Event, now: DateTime<Utc>) -> Category {
    if event.start_time > now {
        Category::Upcoming
    } else if event.end_time < now {
        Category::Past
    } else {
        Category::Ongoing
    }
}

pub fn categorize(events: &[Event], now: DateTime<Utc>) -> Categorized {
    let mut out = Categorized::default();
    for event in events {
        match category_of(event, now) {
            Category::Upcoming => out.upcoming.push(event.clone()),
            Category::Ongoing => out.ongoing.push(event.clone()),
            Category::Past => out.past.push(event.clone()),
        }
    }

    out.upcoming.sort_by_key(|e| e.start_time);
    out.ongoing.sort_by_key(|e| e.start_time);
    out.past.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    out
}
