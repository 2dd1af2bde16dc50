//! Playback tracking state machine
//!
//! One tracker per video surface. It turns "now playing channel X" and
//! "app exiting" signals into duration-gated history records. Only a
//! channel switch, a stop or an exit emits; the ticker just keeps the
//! accumulated time current for observers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tvsync_core::Clock;

use crate::config::TrackerConfig;
use crate::history::{HistorySink, NewWatchRecord};

/// A playable channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub name: String,
    pub url: String,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

/// Observable snapshot of a tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingSession {
    pub state: TrackingState,
    pub current_channel: Option<Channel>,
    pub started_at: Option<DateTime<Utc>>,
    /// As of the last tick or transition
    pub accumulated_seconds: u64,
    pub last_switch_at: Option<DateTime<Utc>>,
}

/// Receiver of the exit signal once the tracker has flushed
#[async_trait]
pub trait ExitTrigger: Send + Sync + 'static {
    /// Run the exit sync; returns the number of items uploaded
    async fn trigger_exit_sync(&self) -> usize;
}

#[derive(Debug)]
enum Phase {
    Idle,
    Tracking {
        channel: Channel,
        started_at: DateTime<Utc>,
        accumulated: u64,
    },
}

#[derive(Debug)]
struct Session {
    phase: Phase,
    last_switch_at: Option<DateTime<Utc>>,
}

/// Whole seconds between two instants, zero if the clock went backwards
fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}

fn record_for(channel: Channel, seconds: u64) -> NewWatchRecord {
    NewWatchRecord {
        channel_name: channel.name,
        channel_url: channel.url,
        duration: seconds,
    }
}

/// Debouncing, duration-gated watch tracker
pub struct PlaybackTracker {
    sink: Arc<dyn HistorySink>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    exit: Option<Arc<dyn ExitTrigger>>,
    session: Arc<Mutex<Session>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackTracker {
    /// Create an idle tracker
    pub fn new(sink: Arc<dyn HistorySink>, clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            sink,
            clock,
            config,
            exit: None,
            session: Arc::new(Mutex::new(Session {
                phase: Phase::Idle,
                last_switch_at: None,
            })),
            ticker: Mutex::new(None),
        }
    }

    /// Set what `on_app_exit` triggers after flushing
    pub fn with_exit_trigger(mut self, trigger: Arc<dyn ExitTrigger>) -> Self {
        self.exit = Some(trigger);
        self
    }

    /// Snapshot of the current state
    pub fn session(&self) -> TrackingSession {
        let session = self.session.lock();
        match &session.phase {
            Phase::Idle => TrackingSession {
                state: TrackingState::Idle,
                current_channel: None,
                started_at: None,
                accumulated_seconds: 0,
                last_switch_at: session.last_switch_at,
            },
            Phase::Tracking {
                channel,
                started_at,
                accumulated,
            } => TrackingSession {
                state: TrackingState::Tracking,
                current_channel: Some(channel.clone()),
                started_at: Some(*started_at),
                accumulated_seconds: *accumulated,
                last_switch_at: session.last_switch_at,
            },
        }
    }

    /// Check if the tracker is following a channel
    pub fn is_tracking(&self) -> bool {
        matches!(self.session.lock().phase, Phase::Tracking { .. })
    }

    /// Check if the progress ticker is running
    pub fn is_ticking(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Report that `channel` is now playing
    ///
    /// Switching away from another channel emits a record for it when it
    /// was watched long enough and the previous switch-emitted record is
    /// not too recent. The same channel again is a no-op.
    pub async fn start_tracking(&self, channel: Channel) {
        let now = self.clock.now();

        let emit = {
            let mut session = self.session.lock();
            if let Phase::Tracking { channel: current, .. } = &session.phase {
                if *current == channel {
                    return;
                }
            }

            let previous = std::mem::replace(
                &mut session.phase,
                Phase::Tracking {
                    channel: channel.clone(),
                    started_at: now,
                    accumulated: 0,
                },
            );

            match previous {
                Phase::Idle => None,
                Phase::Tracking {
                    channel: old,
                    started_at,
                    ..
                } => {
                    let watched = elapsed_secs(started_at, now);
                    let long_enough =
                        Duration::from_secs(watched) >= self.config.min_record_duration;
                    let spaced = session.last_switch_at.is_none_or(|at| {
                        (now - at).to_std().unwrap_or_default() >= self.config.min_switch_interval
                    });

                    if long_enough && spaced {
                        session.last_switch_at = Some(now);
                        Some(record_for(old, watched))
                    } else {
                        debug!(
                            target: "tvsync",
                            channel = %old.name,
                            watched,
                            long_enough,
                            spaced,
                            "Switch did not produce a record"
                        );
                        None
                    }
                }
            }
        };

        debug!(target: "tvsync", channel = %channel.name, "Tracking channel");
        self.ensure_ticker();
        if let Some(record) = emit {
            self.emit(record).await;
        }
    }

    /// Stop following the current channel
    ///
    /// Emits a record if the channel was watched long enough.
    pub async fn stop_tracking(&self) {
        let now = self.clock.now();
        let emit = {
            let mut session = self.session.lock();
            match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::Idle => None,
                Phase::Tracking {
                    channel,
                    started_at,
                    ..
                } => {
                    let watched = elapsed_secs(started_at, now);
                    (Duration::from_secs(watched) >= self.config.min_record_duration)
                        .then(|| record_for(channel, watched))
                }
            }
        };

        self.stop_ticker();
        if let Some(record) = emit {
            self.emit(record).await;
        }
    }

    /// The application is exiting
    ///
    /// Emits the in-progress segment regardless of the gates, goes idle,
    /// then triggers the exit sync. Returns the number of items uploaded.
    pub async fn on_app_exit(&self) -> usize {
        self.finalize().await;
        match &self.exit {
            Some(trigger) => trigger.trigger_exit_sync().await,
            None => 0,
        }
    }

    /// Tear down the surface: flush like an exit, without syncing
    pub async fn shutdown(&self) {
        self.finalize().await;
        debug!(target: "tvsync", "Tracker shut down");
    }

    /// Force-emit any in-progress segment and go idle
    pub(crate) async fn finalize(&self) {
        let now = self.clock.now();
        let emit = {
            let mut session = self.session.lock();
            match std::mem::replace(&mut session.phase, Phase::Idle) {
                Phase::Idle => None,
                Phase::Tracking {
                    channel,
                    started_at,
                    ..
                } => {
                    let watched = elapsed_secs(started_at, now);
                    (watched > 0).then(|| record_for(channel, watched))
                }
            }
        };

        self.stop_ticker();
        if let Some(record) = emit {
            self.emit(record).await;
        }
    }

    async fn emit(&self, record: NewWatchRecord) {
        let channel = record.channel_name.clone();
        match self.sink.record(record).await {
            Ok(item) => info!(
                target: "tvsync",
                channel = %item.channel_name,
                duration = item.duration,
                "Watch record emitted"
            ),
            // Tracking must never take playback down
            Err(e) => warn!(
                target: "tvsync",
                channel = %channel,
                error = %e,
                "Failed to record watch segment"
            ),
        }
    }

    fn ensure_ticker(&self) {
        let period = self.config.tick_interval;
        if period.is_zero() {
            return;
        }

        let mut ticker = self.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let session = self.session.clone();
        let clock = self.clock.clone();
        let first_tick = Instant::now() + period;
        *ticker = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(first_tick, period);
            loop {
                interval.tick().await;
                let now = clock.now();
                let mut guard = session.lock();
                match &mut guard.phase {
                    Phase::Tracking {
                        channel,
                        started_at,
                        accumulated,
                    } => {
                        *accumulated = elapsed_secs(*started_at, now);
                        debug!(
                            target: "tvsync",
                            channel = %channel.name,
                            accumulated = *accumulated,
                            "Playback progress"
                        );
                    }
                    Phase::Idle => break,
                }
            }
        }));
    }

    fn stop_ticker(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for PlaybackTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}
