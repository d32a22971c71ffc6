//! # Session Loop
//!
//! Runs a [`PlaybackController`] on its own tokio task and exposes it through
//! a cloneable [`SessionHandle`].
//!
//! ## Architecture
//!
//! ```text
//!  SessionHandle ──commands──┐
//!  MediaEngine ───signals────┤
//!  MediaSession ──remote─────┼──> SessionRunner ──> PlaybackController ──> EventBridge
//!  JobScheduler ──completions┤         (one task, select! loop)
//!  ad poll / sync timers ────┘
//! ```
//!
//! Every input is processed to completion before the next one is taken, so
//! events reach the [`EventBridge`] in the order their causes were observed.
//! Background work never touches controller state directly; it only
//! produces messages for this loop.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handle = spawn_session(SessionDeps::new(config), |signals| {
//!     Box::new(MyEngine::new(signals)) as Box<dyn MediaEngine>
//! })?;
//! let mut events = handle.subscribe();
//! handle.set_data_source(SourceRequest::new("https://cdn.example.com/v.m3u8")).await?;
//! handle.play();
//! ```

use std::future;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::RemoteCommand;
use core_runtime::config::PlayerConfig;
use core_runtime::{EventBridge, EventConsumer, PlayerEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::LoadControlConfig;
use crate::controller::PlaybackController;
use crate::error::{CommandFailure, PlaybackError};
use crate::jobs::JobCompletionReceiver;
use crate::notification::NotificationConfig;
use crate::source::SourceRequest;
use crate::tracks::TrackOverride;
use crate::traits::{EngineSignalReceiver, EngineSignalSender, MediaEngine};

/// Result of a command sent through a [`SessionHandle`].
pub type CommandResult<T> = std::result::Result<T, CommandFailure>;

/// Everything a session needs besides its engine.
#[derive(Debug, Clone)]
pub struct SessionDeps {
    pub config: PlayerConfig,
    pub load_control: LoadControlConfig,
    /// Bridge to publish on; a fresh one is created when absent.
    pub events: Option<Arc<EventBridge>>,
}

impl SessionDeps {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            load_control: LoadControlConfig::default(),
            events: None,
        }
    }

    pub fn with_load_control(mut self, load_control: LoadControlConfig) -> Self {
        self.load_control = load_control;
        self
    }

    pub fn with_event_bridge(mut self, events: Arc<EventBridge>) -> Self {
        self.events = Some(events);
        self
    }
}

enum SessionCommand {
    SetDataSource(SourceRequest, oneshot::Sender<CommandResult<()>>),
    SetupNotification(NotificationConfig, oneshot::Sender<CommandResult<()>>),
    DisposeNotification,
    Play,
    Pause,
    SetLooping(bool),
    SetVolume(f64),
    SetSpeed(f64),
    SeekTo(i64),
    SetTrackParameters { width: u32, height: u32, bitrate: u32 },
    SetAudioTrack {
        name: String,
        group_index: usize,
        reply: oneshot::Sender<Option<TrackOverride>>,
    },
    SetMixWithOthers(bool),
    PictureInPicture(bool),
    RequestBufferingUpdate,
    Position(oneshot::Sender<i64>),
    AbsolutePosition(oneshot::Sender<i64>),
    Dispose(oneshot::Sender<()>),
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::SetDataSource(..) => "set_data_source",
            SessionCommand::SetupNotification(..) => "setup_notification",
            SessionCommand::DisposeNotification => "dispose_notification",
            SessionCommand::Play => "play",
            SessionCommand::Pause => "pause",
            SessionCommand::SetLooping(_) => "set_looping",
            SessionCommand::SetVolume(_) => "set_volume",
            SessionCommand::SetSpeed(_) => "set_speed",
            SessionCommand::SeekTo(_) => "seek_to",
            SessionCommand::SetTrackParameters { .. } => "set_track_parameters",
            SessionCommand::SetAudioTrack { .. } => "set_audio_track",
            SessionCommand::SetMixWithOthers(_) => "set_mix_with_others",
            SessionCommand::PictureInPicture(_) => "picture_in_picture",
            SessionCommand::RequestBufferingUpdate => "request_buffering_update",
            SessionCommand::Position(_) => "position",
            SessionCommand::AbsolutePosition(_) => "absolute_position",
            SessionCommand::Dispose(_) => "dispose",
        }
    }
}

/// Start a session on the current tokio runtime.
///
/// `make_engine` receives the sender the engine must report its signals on.
///
/// # Errors
///
/// Returns [`PlaybackError::Configuration`] when the player or load-control
/// configuration is invalid.
pub fn spawn_session<F>(deps: SessionDeps, make_engine: F) -> crate::Result<SessionHandle>
where
    F: FnOnce(EngineSignalSender) -> Box<dyn MediaEngine>,
{
    deps.config
        .validate()
        .map_err(|e| PlaybackError::Configuration(e.to_string()))?;
    deps.load_control
        .validate()
        .map_err(PlaybackError::Configuration)?;

    let id = Uuid::new_v4();
    let events = deps.events.unwrap_or_default();

    let (signal_tx, signals) = mpsc::unbounded_channel();
    let (remote_tx, remote) = mpsc::unbounded_channel();
    let (command_tx, commands) = mpsc::unbounded_channel();

    let engine = make_engine(signal_tx);
    let (controller, completions) = PlaybackController::new(
        &deps.config,
        &deps.load_control,
        engine,
        events.clone(),
        remote_tx,
    );

    let runner = SessionRunner {
        controller,
        commands,
        signals,
        remote,
        completions,
        ad_poll: periodic(deps.config.ad_poll_interval),
        notification_sync: None,
        notification_sync_period: deps.config.notification_sync_interval,
    };

    let span = info_span!("session", session_id = %id);
    tokio::spawn(runner.run().instrument(span));

    Ok(SessionHandle {
        id,
        commands: command_tx,
        events,
    })
}

/// Timer whose first tick lands one `period` from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Completes on the next tick, or never when the timer is off.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

struct SessionRunner {
    controller: PlaybackController,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    signals: EngineSignalReceiver,
    remote: mpsc::UnboundedReceiver<RemoteCommand>,
    completions: JobCompletionReceiver,
    ad_poll: Interval,
    notification_sync: Option<Interval>,
    notification_sync_period: Duration,
}

impl SessionRunner {
    async fn run(mut self) {
        debug!("Session loop started");
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        debug!("All session handles dropped");
                        self.controller.dispose();
                        break;
                    };
                    if let SessionCommand::Dispose(reply) = command {
                        self.controller.dispose();
                        let _ = reply.send(());
                        break;
                    }
                    self.handle_command(command);
                }
                Some(signal) = self.signals.recv() => self.controller.on_engine_signal(signal),
                Some(command) = self.remote.recv() => self.controller.on_remote_command(command),
                Some(completion) = self.completions.recv() => {
                    self.controller.on_job_completion(completion);
                }
                _ = self.ad_poll.tick() => self.controller.on_ad_poll_tick(),
                _ = next_tick(&mut self.notification_sync) => {
                    self.controller.on_notification_tick();
                }
            }

            self.reconcile_notification_sync();
        }
        debug!("Session loop stopped");
    }

    /// Start or stop the sync timer to match the notification state.
    fn reconcile_notification_sync(&mut self) {
        let wanted = self.controller.wants_notification_sync();
        match (wanted, self.notification_sync.is_some()) {
            (true, false) => {
                self.notification_sync = Some(periodic(self.notification_sync_period));
            }
            (false, true) => self.notification_sync = None,
            _ => {}
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        debug!(command = command.name(), "Handling command");
        let controller = &mut self.controller;

        match command {
            SessionCommand::SetDataSource(request, reply) => {
                let result = controller.set_data_source(request).map_err(|e| {
                    warn!(error = %e, "set_data_source failed");
                    CommandFailure::from(e)
                });
                let _ = reply.send(result);
            }
            SessionCommand::SetupNotification(config, reply) => {
                let result = controller.setup_notification(&config).map_err(|e| {
                    warn!(error = %e, "setup_notification failed");
                    CommandFailure::from(e)
                });
                let _ = reply.send(result);
            }
            SessionCommand::DisposeNotification => controller.dispose_notification(),
            SessionCommand::Play => controller.play(),
            SessionCommand::Pause => controller.pause(),
            SessionCommand::SetLooping(looping) => controller.set_looping(looping),
            SessionCommand::SetVolume(volume) => controller.set_volume(volume),
            SessionCommand::SetSpeed(speed) => controller.set_speed(speed),
            SessionCommand::SeekTo(position) => controller.seek_to(position),
            SessionCommand::SetTrackParameters {
                width,
                height,
                bitrate,
            } => controller.set_track_parameters(width, height, bitrate),
            SessionCommand::SetAudioTrack {
                name,
                group_index,
                reply,
            } => {
                let _ = reply.send(controller.set_audio_track(&name, group_index));
            }
            SessionCommand::SetMixWithOthers(mix) => controller.set_mix_with_others(mix),
            SessionCommand::PictureInPicture(in_pip) => {
                controller.on_picture_in_picture_changed(in_pip)
            }
            SessionCommand::RequestBufferingUpdate => controller.request_buffering_update(),
            SessionCommand::Position(reply) => {
                let _ = reply.send(controller.position());
            }
            SessionCommand::AbsolutePosition(reply) => {
                let _ = reply.send(controller.absolute_position());
            }
            SessionCommand::Dispose(reply) => {
                controller.dispose();
                let _ = reply.send(());
            }
        }
    }
}

/// Host-side handle to a running session.
///
/// Cloneable; the session is disposed when [`dispose`](Self::dispose) is
/// called or every handle is dropped. Commands sent after disposal are
/// ignored, queries return `0`/`None`, and fallible commands fail with a
/// setup error.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: Arc<EventBridge>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!(session_id = %self.id, "Command ignored, session disposed");
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).ok()?;
        response.await.ok()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn events(&self) -> &Arc<EventBridge> {
        &self.events
    }

    /// Attach `consumer`, flushing events buffered so far.
    pub fn attach_events<C>(&self, consumer: C) -> usize
    where
        C: EventConsumer<PlayerEvent> + 'static,
    {
        self.events.attach(consumer)
    }

    /// Attach a fresh channel and return its receiving end.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlayerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events.attach(tx);
        rx
    }

    pub fn detach_events(&self) -> bool {
        self.events.detach()
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub async fn set_data_source(&self, request: SourceRequest) -> CommandResult<()> {
        self.request(|reply| SessionCommand::SetDataSource(request, reply))
            .await
            .unwrap_or_else(|| Err(PlaybackError::Disposed.into()))
    }

    pub async fn setup_notification(&self, config: NotificationConfig) -> CommandResult<()> {
        self.request(|reply| SessionCommand::SetupNotification(config, reply))
            .await
            .unwrap_or_else(|| Err(PlaybackError::Disposed.into()))
    }

    pub fn dispose_notification(&self) {
        self.send(SessionCommand::DisposeNotification);
    }

    pub fn play(&self) {
        self.send(SessionCommand::Play);
    }

    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn set_looping(&self, looping: bool) {
        self.send(SessionCommand::SetLooping(looping));
    }

    /// Clamped to `[0.0, 1.0]`.
    pub fn set_volume(&self, volume: f64) {
        self.send(SessionCommand::SetVolume(volume));
    }

    pub fn set_speed(&self, speed: f64) {
        self.send(SessionCommand::SetSpeed(speed));
    }

    pub fn seek_to(&self, position_ms: i64) {
        self.send(SessionCommand::SeekTo(position_ms));
    }

    /// Zero for a dimension means "no cap"; all zero clears every cap.
    pub fn set_track_parameters(&self, width: u32, height: u32, bitrate: u32) {
        self.send(SessionCommand::SetTrackParameters {
            width,
            height,
            bitrate,
        });
    }

    pub async fn set_audio_track(
        &self,
        name: impl Into<String>,
        group_index: usize,
    ) -> Option<TrackOverride> {
        let name = name.into();
        self.request(|reply| SessionCommand::SetAudioTrack {
            name,
            group_index,
            reply,
        })
        .await
        .flatten()
    }

    pub fn set_mix_with_others(&self, mix_with_others: bool) {
        self.send(SessionCommand::SetMixWithOthers(mix_with_others));
    }

    pub fn on_picture_in_picture_changed(&self, in_pip: bool) {
        self.send(SessionCommand::PictureInPicture(in_pip));
    }

    pub fn request_buffering_update(&self) {
        self.send(SessionCommand::RequestBufferingUpdate);
    }

    pub async fn position(&self) -> i64 {
        self.request(SessionCommand::Position).await.unwrap_or(0)
    }

    pub async fn absolute_position(&self) -> i64 {
        self.request(SessionCommand::AbsolutePosition)
            .await
            .unwrap_or(0)
    }

    /// Dispose the session and wait until everything is released.
    pub async fn dispose(&self) {
        if self.request(SessionCommand::Dispose).await.is_none() {
            debug!(session_id = %self.id, "Session already disposed");
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
