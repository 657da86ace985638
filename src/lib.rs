pub mod cache;
pub mod categorize;
pub mod config;
pub mod db;
pub mod fallback;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod share;
pub mod source;
pub mod utils;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use config::{AppConfig, ConfigStore};
use db::{KeyValueStore, Store};
use pipeline::EventsPipeline;
use share::{ClipboardShare, ManualShare, NativeShare, ShareStrategy};
use utils::FixedClock;

#[derive(Debug, Parser)]
#[command(name = "community-events", version, about = "Show the community's events")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load events (from cache when fresh) and print the events view
    Show {
        /// Drop the cached events and fetch again
        #[arg(long)]
        refresh: bool,
        /// Print the HTML view instead of text
        #[arg(long)]
        html: bool,
        /// Render as of this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Share one event through the native, clipboard and manual fallbacks
    Share { event_id: String },
    /// Inspect or change the persisted configuration
    Config {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        site_base_url: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        share_command: Option<String>,
        #[arg(long)]
        clipboard_command: Option<String>,
    },
}

/// Wires a pipeline from configuration; the host owns the returned context.
pub fn build_pipeline(config: &AppConfig, store: Arc<dyn KeyValueStore>) -> Result<EventsPipeline> {
    let timezone = config.display_timezone().map_err(|err| anyhow!(err))?;
    let source = source::from_config(config).context("invalid event source")?;
    let chain: Vec<Box<dyn ShareStrategy>> = vec![
        Box::new(NativeShare::new(config.share_command.clone())),
        Box::new(ClipboardShare::detect(config.clipboard_command.clone())),
        Box::new(ManualShare),
    ];
    Ok(EventsPipeline::new(source, store, timezone).with_share_chain(chain))
}

fn open_pipeline(config: &AppConfig) -> Result<EventsPipeline> {
    let store = Store::open_default().context("failed to open event store")?;
    build_pipeline(config, Arc::new(store))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config_store = ConfigStore::load();
    let command = cli.command.unwrap_or(Command::Show {
        refresh: false,
        html: false,
        at: None,
    });

    match command {
        Command::Show { refresh, html, at } => {
            let config = config_store.read().with_env_overrides();
            let mut pipeline = open_pipeline(&config)?;
            if let Some(at) = at {
                let instant = DateTime::parse_from_rfc3339(&at)
                    .with_context(|| format!("invalid --at instant: {at}"))?
                    .with_timezone(&Utc);
                pipeline = pipeline.with_clock(Arc::new(FixedClock::new(instant)));
            }

            if refresh {
                pipeline.initialize_refreshed().await;
            } else {
                pipeline.initialize().await;
            }

            let view = if html {
                pipeline.render_html()
            } else {
                pipeline.render_text()
            };
            print!("{view}");
        }
        Command::Share { event_id } => {
            let config = config_store.read().with_env_overrides();
            let pipeline = open_pipeline(&config)?;
            pipeline.initialize().await;

            let event = pipeline
                .find_event(&event_id)
                .ok_or_else(|| anyhow!("no event with id {event_id}"))?;
            let outcome = pipeline.share_event(&event).await?;
            info!("shared {} via {}", event.id, outcome.strategy);
            match outcome.manual_text {
                Some(text) => println!("Copy this to share:\n\n{text}"),
                None => println!("Shared \"{}\" via {}", event.name, outcome.strategy),
            }
        }
        Command::Config {
            source,
            site_base_url,
            timezone,
            share_command,
            clipboard_command,
        } => {
            if let Some(tz) = timezone.as_deref() {
                tz.parse::<chrono_tz::Tz>()
                    .map_err(|_| anyhow!("unknown timezone: {tz}"))?;
            }
            let updated = config_store
                .update(|config| {
                    if let Some(source) = source {
                        config.event_source = source;
                    }
                    if let Some(base) = site_base_url {
                        config.site_base_url = Some(base).filter(|b| !b.trim().is_empty());
                    }
                    if let Some(tz) = timezone {
                        config.timezone = tz;
                    }
                    if let Some(cmd) = share_command {
                        config.share_command = Some(cmd).filter(|c| !c.trim().is_empty());
                    }
                    if let Some(cmd) = clipboard_command {
                        config.clipboard_command = Some(cmd).filter(|c| !c.trim().is_empty());
                    }
                })
                .map_err(|err| anyhow!(err))?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
    }

    Ok(())
}
