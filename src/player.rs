//! Playback state machine for one printer feed.
//!
//! One tokio task owns all playback state for a feed. Commands arrive over
//! an mpsc channel, the currently selected frame leaves over an event
//! channel, and the two timers (frame advance, live refresh) are armed and
//! disarmed on state transitions so at most one of each exists per player.
//!
//! Discovery runs on spawned tasks tagged with the player's epoch; stopping
//! the player bumps the epoch, so a scan that finishes afterwards is
//! discarded without touching the sequence.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant, Interval};

use crate::discovery::{Discover, Frame};
use crate::sequence::FrameSequence;

/// Playback mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerMode {
    /// No timers running; any retained frames are shown dimmed.
    #[default]
    Stopped,
    /// Initial discovery in flight.
    Loading,
    /// Data present, no timers running.
    Paused,
    /// Auto-advancing through the full sequence, wrapping at the end.
    Playing,
    /// Cycling the most recent frames while refresh scans merge new ones.
    Live,
}

/// Capability switches for a player instance.
///
/// The same state machine serves the plain scrub player, the auto-looping
/// live wall and the start/stop hybrid; the flags pick the variant.
#[derive(Debug, Clone)]
pub struct PlayerOptions {
    /// Accept scrub/step/jump commands.
    pub manual_scrub: bool,
    /// Enter Live after loading instead of Paused.
    pub live_loop: bool,
    /// Issue Start as soon as the player task is up.
    pub auto_start: bool,
    /// Frame-advance period in Playing mode, in milliseconds.
    pub speed_ms: u64,
    /// Frame-advance period while cycling in Live mode, in milliseconds.
    pub live_speed_ms: u64,
    /// How many of the most recent frames the live loop cycles.
    pub live_window: usize,
    /// Seconds between background re-discoveries in Live mode.
    pub refresh_secs: u64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            manual_scrub: true,
            live_loop: false,
            auto_start: false,
            speed_ms: 250,
            live_speed_ms: 500,
            live_window: 10,
            refresh_secs: 60,
        }
    }
}

/// Commands accepted by a running player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Kick off the initial discovery scan.
    Start,
    Play,
    Pause,
    StepForward,
    StepBack,
    /// Select a frame by index (clamped to the sequence).
    Seek(usize),
    JumpToStart,
    JumpToLatest,
    /// Change the Playing advance period, in milliseconds.
    SetSpeed(u64),
    /// Switch to live looping over the newest frames.
    GoLive,
    /// Cancel timers and invalidate in-flight discovery; frames are kept.
    Stop,
    /// Tear the player task down.
    Shutdown,
}

/// Events published to the view layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ModeChanged(PlayerMode),
    /// The selected frame changed; this is the one to render.
    FrameSelected { index: usize, frame: Frame },
    /// The sequence was replaced or grew.
    SequenceUpdated { len: usize },
    /// Discovery finished with nothing to show; the feed is idle.
    NoFrames,
    Error(String),
}

struct DiscoveryOutcome {
    epoch: u64,
    initial: bool,
    result: Result<Vec<Frame>>,
}

/// Handle for sending commands to a spawned player.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
}

impl PlayerHandle {
    pub async fn send(&self, command: PlayerCommand) {
        let _ = self.commands.send(command).await;
    }
}

/// Spawn the player task for one printer feed.
///
/// Returns the command handle and the event stream the view layer renders
/// from.
pub fn spawn_player(
    printer: String,
    discover: Arc<dyn Discover>,
    options: PlayerOptions,
) -> (PlayerHandle, mpsc::UnboundedReceiver<PlayerEvent>) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let player = Player::new(printer, discover, options, event_tx);
    tokio::spawn(player.run(command_rx));

    (
        PlayerHandle {
            commands: command_tx,
        },
        event_rx,
    )
}

pub struct Player {
    printer: String,
    options: PlayerOptions,
    discover: Arc<dyn Discover>,
    sequence: FrameSequence,
    index: usize,
    mode: PlayerMode,
    speed_ms: u64,
    epoch: u64,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl Player {
    pub fn new(
        printer: String,
        discover: Arc<dyn Discover>,
        options: PlayerOptions,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        let speed_ms = options.speed_ms;
        Self {
            printer,
            options,
            discover,
            sequence: FrameSequence::new(),
            index: 0,
            mode: PlayerMode::Stopped,
            speed_ms,
            epoch: 0,
            events,
        }
    }

    /// Drive the state machine until Shutdown or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PlayerCommand>) {
        let (outcome_tx, mut outcomes) = mpsc::channel::<DiscoveryOutcome>(4);

        let mut advance: Option<Interval> = None;
        let mut armed_advance: Option<u64> = None;
        let mut refresh: Option<Interval> = None;
        let mut armed_refresh: Option<u64> = None;

        if self.options.auto_start {
            self.begin_loading(&outcome_tx);
        }

        loop {
            // Re-arm timers to match the current mode. Recreating an
            // interval drops the previous one, so ownership transfers are
            // also cancellations.
            let want_advance = self.advance_period_ms();
            if want_advance != armed_advance {
                advance = want_advance.map(timer);
                armed_advance = want_advance;
            }
            let want_refresh = self.refresh_period_ms();
            if want_refresh != armed_refresh {
                refresh = want_refresh.map(timer);
                armed_refresh = want_refresh;
            }

            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(PlayerCommand::Shutdown) => {
                        tracing::debug!("Player {} shutting down", self.printer);
                        break;
                    }
                    Some(command) => self.handle_command(command, &outcome_tx),
                },
                Some(outcome) = outcomes.recv() => self.apply_outcome(outcome),
                _ = tick(&mut advance) => self.advance_tick(),
                _ = tick(&mut refresh) => self.spawn_discovery(&outcome_tx, false),
            }
        }
    }

    /// Advance period for the current mode, or None when no timer runs.
    fn advance_period_ms(&self) -> Option<u64> {
        match self.mode {
            PlayerMode::Playing => Some(self.speed_ms.max(1)),
            PlayerMode::Live => Some(self.options.live_speed_ms.max(1)),
            _ => None,
        }
    }

    /// Refresh period; only Live keeps a background re-discovery timer.
    fn refresh_period_ms(&self) -> Option<u64> {
        match self.mode {
            PlayerMode::Live => Some(self.options.refresh_secs.max(1) * 1000),
            _ => None,
        }
    }

    fn handle_command(
        &mut self,
        command: PlayerCommand,
        outcome_tx: &mpsc::Sender<DiscoveryOutcome>,
    ) {
        match command {
            PlayerCommand::Start => {
                if matches!(self.mode, PlayerMode::Stopped | PlayerMode::Paused) {
                    self.begin_loading(outcome_tx);
                }
            }
            PlayerCommand::Play => {
                if self.mode == PlayerMode::Paused && !self.sequence.is_empty() {
                    self.set_mode(PlayerMode::Playing);
                }
            }
            PlayerCommand::Pause => {
                if matches!(self.mode, PlayerMode::Playing | PlayerMode::Live) {
                    self.set_mode(PlayerMode::Paused);
                }
            }
            PlayerCommand::StepForward => {
                if !self.sequence.is_empty() {
                    self.manual_seek((self.index + 1) % self.sequence.len());
                }
            }
            PlayerCommand::StepBack => {
                if !self.sequence.is_empty() {
                    let last = self.sequence.len() - 1;
                    self.manual_seek(if self.index == 0 { last } else { self.index - 1 });
                }
            }
            PlayerCommand::Seek(index) => {
                if !self.sequence.is_empty() {
                    self.manual_seek(index.min(self.sequence.len() - 1));
                }
            }
            PlayerCommand::JumpToStart => {
                if !self.sequence.is_empty() {
                    self.manual_seek(0);
                }
            }
            PlayerCommand::JumpToLatest => {
                if !self.sequence.is_empty() {
                    self.manual_seek(self.sequence.len() - 1);
                }
            }
            PlayerCommand::SetSpeed(ms) => {
                self.speed_ms = ms.max(1);
            }
            PlayerCommand::GoLive => {
                if self.options.live_loop && !self.sequence.is_empty() {
                    self.set_mode(PlayerMode::Live);
                    self.select(self.sequence.len() - 1);
                }
            }
            PlayerCommand::Stop => {
                if self.mode != PlayerMode::Stopped {
                    self.set_mode(PlayerMode::Stopped);
                }
            }
            // Handled by the run loop before we get here.
            PlayerCommand::Shutdown => {}
        }
    }

    fn begin_loading(&mut self, outcome_tx: &mpsc::Sender<DiscoveryOutcome>) {
        self.set_mode(PlayerMode::Loading);
        self.spawn_discovery(outcome_tx, true);
    }

    fn spawn_discovery(&self, outcome_tx: &mpsc::Sender<DiscoveryOutcome>, initial: bool) {
        let discover = self.discover.clone();
        let printer = self.printer.clone();
        let epoch = self.epoch;
        let tx = outcome_tx.clone();

        tokio::spawn(async move {
            let result = discover.discover(&printer).await;
            let _ = tx
                .send(DiscoveryOutcome {
                    epoch,
                    initial,
                    result,
                })
                .await;
        });
    }

    fn apply_outcome(&mut self, outcome: DiscoveryOutcome) {
        if outcome.epoch != self.epoch {
            tracing::debug!("Discarding stale discovery result for {}", self.printer);
            return;
        }

        match outcome.result {
            Err(e) => {
                tracing::warn!("Discovery failed for {}: {:#}", self.printer, e);
                self.emit(PlayerEvent::Error(format!(
                    "Discovery failed: {e:#}. Try again later."
                )));
                if outcome.initial {
                    self.set_mode(PlayerMode::Stopped);
                }
            }
            Ok(frames) if outcome.initial => {
                self.sequence.replace(frames);
                self.emit(PlayerEvent::SequenceUpdated {
                    len: self.sequence.len(),
                });

                if self.sequence.is_empty() {
                    self.emit(PlayerEvent::NoFrames);
                    self.set_mode(PlayerMode::Paused);
                    return;
                }

                self.index = self.sequence.len() - 1;
                self.emit_selected();
                if self.options.live_loop {
                    self.set_mode(PlayerMode::Live);
                } else {
                    self.set_mode(PlayerMode::Paused);
                }
            }
            Ok(frames) => {
                if self.sequence.merge(frames) {
                    self.emit(PlayerEvent::SequenceUpdated {
                        len: self.sequence.len(),
                    });
                    self.clamp_live_index();
                }
            }
        }
    }

    fn advance_tick(&mut self) {
        if self.sequence.is_empty() {
            return;
        }
        match self.mode {
            PlayerMode::Playing => {
                self.select((self.index + 1) % self.sequence.len());
            }
            PlayerMode::Live => {
                let start = self.live_window_start();
                let next = if self.index < start || self.index + 1 >= self.sequence.len() {
                    start
                } else {
                    self.index + 1
                };
                self.select(next);
            }
            _ => {}
        }
    }

    /// First index of the live window (the most recent K frames).
    fn live_window_start(&self) -> usize {
        self.sequence
            .len()
            .saturating_sub(self.options.live_window.max(1))
    }

    /// Pull the loop position back into the window after a merge resized it.
    fn clamp_live_index(&mut self) {
        if self.mode != PlayerMode::Live {
            return;
        }
        let start = self.live_window_start();
        if self.index < start || self.index >= self.sequence.len() {
            self.select(start);
        }
    }

    /// A user-driven index change; cancels auto-advance.
    fn manual_seek(&mut self, index: usize) {
        if !self.options.manual_scrub {
            return;
        }
        if matches!(self.mode, PlayerMode::Playing | PlayerMode::Live) {
            self.set_mode(PlayerMode::Paused);
        }
        self.select(index);
    }

    fn select(&mut self, index: usize) {
        self.index = index;
        self.emit_selected();
    }

    fn emit_selected(&self) {
        if let Some(frame) = self.sequence.get(self.index) {
            self.emit(PlayerEvent::FrameSelected {
                index: self.index,
                frame: frame.clone(),
            });
        }
    }

    fn set_mode(&mut self, mode: PlayerMode) {
        if self.mode == mode {
            return;
        }
        tracing::debug!("Player {}: {:?} -> {:?}", self.printer, self.mode, mode);
        self.mode = mode;
        if mode == PlayerMode::Stopped {
            // Invalidate any discovery still in flight.
            self.epoch += 1;
        }
        self.emit(PlayerEvent::ModeChanged(mode));
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

fn timer(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms);
    // First tick a full period out; the current frame was just selected.
    interval_at(Instant::now() + period, period)
}

/// Wait for the next tick, or forever when no timer is armed.
async fn tick(slot: &mut Option<Interval>) {
    match slot {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
