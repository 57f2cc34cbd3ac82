//! Timelapse viewer entry point.
//!
//! Wires the configured discovery strategy to one player per printer and
//! logs what each player selects. Rendering is left to whatever front-end
//! consumes the event stream; this binary is the reference consumer.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod clock;
mod config;
mod discovery;
mod listing;
mod player;
mod probe;
mod sequence;

use crate::clock::ReferenceClock;
use crate::config::ViewerConfig;
use crate::discovery::{Discover, FrameLocator, ProbeScan};
use crate::listing::ShareListing;
use crate::player::{spawn_player, PlayerCommand, PlayerEvent, PlayerHandle, PlayerOptions};
use crate::probe::HttpProbe;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ViewerConfig::load()?;
    let client = reqwest::Client::new();

    let discover = build_discovery(&config, client).await?;

    let options = PlayerOptions {
        manual_scrub: config.playback.manual_scrub,
        live_loop: config.playback.live,
        auto_start: config.playback.auto_start,
        speed_ms: config.playback.speed_ms,
        live_speed_ms: config.playback.live_speed_ms,
        live_window: config.playback.live_window,
        refresh_secs: config.playback.refresh_secs,
    };

    let mut handles = Vec::new();
    for printer in &config.source.printers {
        let (handle, events) = spawn_player(printer.clone(), discover.clone(), options.clone());
        tokio::spawn(log_events(printer.clone(), events));
        handles.push(handle);
    }
    tracing::info!("Watching {} printer feed(s)", handles.len());

    tokio::spawn(read_commands(handles.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");

    for handle in &handles {
        handle.send(PlayerCommand::Stop).await;
        handle.send(PlayerCommand::Shutdown).await;
    }

    Ok(())
}

/// Build the discovery strategy the deployment selected.
async fn build_discovery(
    config: &ViewerConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn Discover>> {
    match config.source.strategy.as_str() {
        "probe" => {
            let clock = ReferenceClock::new(config.reference_timezone()?);
            let locator = FrameLocator::new(
                &config.source.base_url,
                &config.source.extension,
                config.source.padded_ordinals,
            );
            let probe = Arc::new(HttpProbe::new(client));
            Ok(Arc::new(ProbeScan::new(
                probe,
                locator,
                clock,
                config.scan.max_count,
                config.scan.max_gap,
            )))
        }
        "share" => {
            let listing_url = config
                .source
                .share_url
                .clone()
                .context("source.share_url is required for the share strategy")?;
            let listing = Arc::new(ShareListing::new(client, listing_url));

            // One-time overview of everything the share currently holds.
            match listing.fetch_groups().await {
                Ok(groups) => {
                    for (printer, frames) in &groups {
                        tracing::info!("Share has {} frame(s) for {}", frames.len(), printer);
                    }
                }
                Err(e) => tracing::warn!("Share overview unavailable: {:#}", e),
            }

            Ok(listing)
        }
        other => bail!("Unknown source.strategy {:?}", other),
    }
}

/// Map console input onto player commands. The terminal stands in for the
/// front-end's transport controls; a line applies to every feed.
async fn read_commands(handles: Vec<PlayerHandle>) {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line) {
            Some(command) => {
                for handle in &handles {
                    handle.send(command).await;
                }
            }
            None => tracing::warn!("Unrecognized command: {}", line),
        }
    }
}

fn parse_command(line: &str) -> Option<PlayerCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "start" => PlayerCommand::Start,
        "play" => PlayerCommand::Play,
        "pause" => PlayerCommand::Pause,
        "next" | "step" => PlayerCommand::StepForward,
        "prev" | "back" => PlayerCommand::StepBack,
        "seek" => PlayerCommand::Seek(parts.next()?.parse().ok()?),
        "first" => PlayerCommand::JumpToStart,
        "latest" => PlayerCommand::JumpToLatest,
        "speed" => PlayerCommand::SetSpeed(parts.next()?.parse().ok()?),
        "live" => PlayerCommand::GoLive,
        "stop" => PlayerCommand::Stop,
        _ => return None,
    };
    Some(command)
}

/// Reference view layer: report player activity through the log.
async fn log_events(printer: String, mut events: mpsc::UnboundedReceiver<PlayerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PlayerEvent::ModeChanged(mode) => {
                tracing::info!("[{}] mode: {:?}", printer, mode);
            }
            PlayerEvent::FrameSelected { index, frame } => {
                tracing::info!(
                    "[{}] frame {} (minute {}): {}",
                    printer,
                    index,
                    frame.ordinal,
                    frame.locator
                );
            }
            PlayerEvent::SequenceUpdated { len } => {
                tracing::debug!("[{}] sequence now holds {} frame(s)", printer, len);
            }
            PlayerEvent::NoFrames => {
                tracing::info!("[{}] no frames found; printer looks idle", printer);
            }
            PlayerEvent::Error(message) => {
                tracing::warn!("[{}] {}", printer, message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_map_to_commands() {
        assert_eq!(parse_command("play"), Some(PlayerCommand::Play));
        assert_eq!(parse_command("pause"), Some(PlayerCommand::Pause));
        assert_eq!(parse_command("seek 12"), Some(PlayerCommand::Seek(12)));
        assert_eq!(parse_command("speed 100"), Some(PlayerCommand::SetSpeed(100)));
        assert_eq!(parse_command("live"), Some(PlayerCommand::GoLive));
        assert_eq!(parse_command("seek"), None);
        assert_eq!(parse_command("seek fast"), None);
        assert_eq!(parse_command("rewind"), None);
    }
}
