use chrono::{DateTime, Datelike, Duration, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};

use crate::models::Event;

const PAGE_URL: &str = "https://www.facebook.com/0thealgorithm";

struct Seed {
    name: &'static str,
    description: &'static str,
    location: &'static str,
    image: &'static str,
    attendee_count: u32,
    is_online: bool,
}

/// Stable short id derived from the event name.
pub fn event_id(name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}

fn build(seed: &Seed, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    Event {
        id: event_id(seed.name),
        name: seed.name.to_string(),
        description: seed.description.to_string(),
        start_time: start,
        end_time: end,
        location: seed.location.to_string(),
        image: seed.image.to_string(),
        is_online: seed.is_online,
        attendee_count: seed.attendee_count,
        event_url: Some(PAGE_URL.to_string()),
    }
}

/// The next August 12th 09:00 (local) whose four-day run has not finished yet.
fn next_fellowship_window(now: DateTime<Utc>, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_year = now.with_timezone(&tz).year();
    for year in [local_year, local_year + 1] {
        let start = local_datetime(tz, year, 8, 12, 9);
        let end = local_datetime(tz, year, 8, 15, 17);
        if let (Some(start), Some(end)) = (start, end) {
            if end > now {
                return (start, end);
            }
        }
    }
    let start = now + Duration::days(30);
    (start, start + Duration::days(3) + Duration::hours(8))
}

fn local_datetime(tz: Tz, year: i32, month: u32, day: u32, hour: u32) -> Option<DateTime<Utc>> {
    match tz.with_ymd_and_hms(year, month, day, hour, 0, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Fixed event list shown when the event source cannot be reached or parsed.
/// Everything except the second Software Fellowship lies in the past, most
/// recent first.
pub fn fallback_events(now: DateTime<Utc>, tz: Tz) -> Vec<Event> {
    let (fellowship_start, fellowship_end) = next_fellowship_window(now, tz);
    let days = Duration::days;
    let hours = Duration::hours;

    let mut events = vec![
        build(
            &Seed {
                name: "Software Fellowship 2.0",
                description: "The highly anticipated second edition of our Software Fellowship program. An intensive 4-day program designed to mentor aspiring women developers through real-world projects, industry connections, and professional development.",
                location: "Worldlink Nepal Office",
                image: "images/events/software-fellowship-2.jpg",
                attendee_count: 45,
                is_online: false,
            },
            fellowship_start,
            fellowship_end,
        ),
        build(
            &Seed {
                name: "Software Fellowship 1.0",
                description: "Our inaugural Software Fellowship program that empowered 30+ women through intensive coding bootcamp, mentorship, and real project experience. Featured industry speakers and hands-on development training.",
                location: "Padma Kanya Campus",
                image: "images/events/software-fellowship-1.jpg",
                attendee_count: 32,
                is_online: false,
            },
            now - days(120),
            now - days(78),
        ),
        build(
            &Seed {
                name: "International Women's Day Tech Panel 2024",
                description: "Special panel discussion on International Women's Day featuring successful women tech leaders from Nepal. Discussed breaking barriers, career growth, and inspiring the next generation of women in technology.",
                location: "Padma Kanya Campus - Main Auditorium",
                image: "images/events/womens-day-panel.jpg",
                attendee_count: 95,
                is_online: false,
            },
            now - days(125),
            now - days(125) + hours(3),
        ),
        build(
            &Seed {
                name: "Data Science Workshop Series 2024",
                description: "Comprehensive 4-day workshop series covering Python programming, data analysis with Pandas, data visualization, and machine learning fundamentals. Hands-on projects with real datasets from Nepal.",
                location: "Padma Kanya Campus - Computer Lab",
                image: "images/events/data-science-series.jpg",
                attendee_count: 58,
                is_online: false,
            },
            now - days(85),
            now - days(81),
        ),
        build(
            &Seed {
                name: "GitHub & Open Source Contribution Workshop",
                description: "Hands-on workshop teaching version control with Git, collaborative development on GitHub, and making meaningful open source contributions. Students made their first pull requests during the session.",
                location: "Online via Google Meet",
                image: "images/events/github-workshop.jpg",
                attendee_count: 42,
                is_online: true,
            },
            now - days(65),
            now - days(65) + hours(4),
        ),
        build(
            &Seed {
                name: "Open Data Hackathon with Asia Foundation",
                description: "48-hour hackathon organized in partnership with The Asia Foundation as part of the Women in Data Steering Committee. Teams developed data-driven solutions for policy challenges in Nepal using open government data.",
                location: "Tech Hub Kathmandu",
                image: "images/events/open-data-hackathon.jpg",
                attendee_count: 38,
                is_online: false,
            },
            now - days(45),
            now - days(43),
        ),
        build(
            &Seed {
                name: "Weekly Algorithm Study Circle",
                description: "Regular weekly study sessions where senior students mentor juniors in competitive programming, algorithm problem solving, and technical interview preparation. A core community activity building coding confidence.",
                location: "Padma Kanya Campus - Room 205",
                image: "images/events/study-circle.jpg",
                attendee_count: 28,
                is_online: false,
            },
            now - days(35),
            now - days(35) + hours(2),
        ),
        build(
            &Seed {
                name: "Leadership & Confidence Building Workshop",
                description: "Interactive workshop designed to build leadership skills and confidence among women in tech. Covered public speaking, project management, team leadership, and overcoming imposter syndrome through practical exercises.",
                location: "Padma Kanya Campus - Conference Hall",
                image: "images/events/leadership-workshop.jpg",
                attendee_count: 41,
                is_online: false,
            },
            now - days(25),
            now - days(25) + hours(5),
        ),
        build(
            &Seed {
                name: "Web Development Fundamentals Workshop",
                description: "Introduction to web development covering HTML5, CSS3, JavaScript basics, and responsive design. Students built their first websites and learned modern web development practices from senior mentors.",
                location: "Padma Kanya Campus - Computer Lab",
                image: "images/events/web-fundamentals.jpg",
                attendee_count: 52,
                is_online: false,
            },
            now - days(15),
            now - days(15) + hours(6),
        ),
    ];

    events.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    events
}
