use std::process::Stdio;

use async_trait::async_trait;
use chrono_tz::Tz;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::models::Event;
use crate::render::format_date;

#[derive(Debug, Clone, PartialEq)]
pub struct SharePayload {
    pub title: String,
    pub text: String,
    pub url: Option<String>,
}

impl SharePayload {
    pub fn for_event(event: &Event, tz: Tz) -> Self {
        let mut text = format!(
            "{name}\n\n{description}\n\n📅 {date}\n📍 {location}",
            name = event.name,
            description = event.description,
            date = format_date(event.start_time, tz),
            location = event.location,
        );
        if let Some(url) = &event.event_url {
            text.push_str(&format!("\n\n{url}"));
        }
        Self {
            title: event.name.clone(),
            text,
            url: event.event_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShareAttempt {
    Shared,
    Unsupported,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShareOutcome {
    pub strategy: &'static str,
    /// Text handed back for the user to copy by hand, if the winning tier needs it.
    pub manual_text: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ShareError {
    #[error("no share method worked: {0}")]
    Exhausted(String),
}

#[async_trait]
pub trait ShareStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn share(&self, payload: &SharePayload) -> ShareAttempt;

    /// Text the host should display after this strategy succeeds.
    fn manual_text(&self, _payload: &SharePayload) -> Option<String> {
        None
    }
}

/// Runs strategies in order until one succeeds.
pub async fn share_with(
    strategies: &[Box<dyn ShareStrategy>],
    payload: &SharePayload,
) -> Result<ShareOutcome, ShareError> {
    let mut reasons = Vec::new();
    for strategy in strategies {
        match strategy.share(payload).await {
            ShareAttempt::Shared => {
                info!("shared {:?} via {}", payload.title, strategy.name());
                return Ok(ShareOutcome {
                    strategy: strategy.name(),
                    manual_text: strategy.manual_text(payload),
                });
            }
            ShareAttempt::Unsupported => {
                debug!("share via {} unsupported", strategy.name());
                reasons.push(format!("{}: unsupported", strategy.name()));
            }
            ShareAttempt::Failed(reason) => {
                debug!("share via {} failed: {reason}", strategy.name());
                reasons.push(format!("{}: {reason}", strategy.name()));
            }
        }
    }
    Err(ShareError::Exhausted(reasons.join("; ")))
}

/// Platform share hook: a configured command receiving the URL and text as arguments.
pub struct NativeShare {
    command: Option<String>,
}

impl NativeShare {
    pub fn new(command: Option<String>) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
        }
    }
}

#[async_trait]
impl ShareStrategy for NativeShare {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn share(&self, payload: &SharePayload) -> ShareAttempt {
        let Some((program, args)) = self.command.as_deref().and_then(split_command) else {
            return ShareAttempt::Unsupported;
        };
        let mut command = Command::new(program);
        command.args(args);
        if let Some(url) = &payload.url {
            command.arg(url);
        }
        command.arg(&payload.text);

        match command.status().await {
            Ok(status) if status.success() => ShareAttempt::Shared,
            Ok(status) => ShareAttempt::Failed(format!("{program} exited with {status}")),
            Err(err) => ShareAttempt::Failed(err.to_string()),
        }
    }
}

const CLIPBOARD_CANDIDATES: [&str; 4] = [
    "wl-copy",
    "xclip -selection clipboard",
    "pbcopy",
    "clip.exe",
];

/// Copies the share text through a clipboard program fed on stdin.
pub struct ClipboardShare {
    command: Option<String>,
}

impl ClipboardShare {
    /// Uses the configured command, or the first known clipboard tool on PATH.
    pub fn detect(configured: Option<String>) -> Self {
        let command = configured
            .filter(|c| !c.trim().is_empty())
            .or_else(|| {
                CLIPBOARD_CANDIDATES
                    .iter()
                    .find(|candidate| {
                        candidate
                            .split_whitespace()
                            .next()
                            .map(|bin| which::which(bin).is_ok())
                            .unwrap_or(false)
                    })
                    .map(|candidate| candidate.to_string())
            });
        Self { command }
    }
}

#[async_trait]
impl ShareStrategy for ClipboardShare {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    async fn share(&self, payload: &SharePayload) -> ShareAttempt {
        let Some((program, args)) = self.command.as_deref().and_then(split_command) else {
            return ShareAttempt::Unsupported;
        };
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return ShareAttempt::Failed(err.to_string()),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(err) = stdin.write_all(payload.text.as_bytes()).await {
                return ShareAttempt::Failed(err.to_string());
            }
        }

        match child.wait().await {
            Ok(status) if status.success() => ShareAttempt::Shared,
            Ok(status) => ShareAttempt::Failed(format!("{program} exited with {status}")),
            Err(err) => ShareAttempt::Failed(err.to_string()),
        }
    }
}

/// Last resort: hand the text back so the user can copy it.
pub struct ManualShare;

#[async_trait]
impl ShareStrategy for ManualShare {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn share(&self, _payload: &SharePayload) -> ShareAttempt {
        ShareAttempt::Shared
    }

    fn manual_text(&self, payload: &SharePayload) -> Option<String> {
        Some(payload.text.clone())
    }
}

fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}
