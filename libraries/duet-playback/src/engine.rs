//! Playback engine
//!
//! Single-task actor that owns both slots, the preload pipeline and the
//! transport state. Commands from [`EngineHandle`], slot events, preload
//! completions and timer tokens all arrive through one inbox, so every
//! mutation happens on the task that runs the engine.
//!
//! Track boundaries are gapless when the inactive slot already holds the
//! next song: on `Ended` the designation flips, the newly active slot is
//! started and only then is the collaborator asked to advance.

use crate::arbiter::{Binding, SlotArbiter};
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{AdvanceReason, MediaSessionSink, NowPlaying, PlaybackEvent};
use crate::preload::{AudioFetcher, PreloadCompletion, PreloadPipeline};
use crate::resource::ResourceStore;
use crate::slot::{AudioSlot, SlotEmitter, SlotErrorInfo, SlotEvent, SlotEventKind, SlotSource};
use crate::types::{PlayerInputs, SlotId, Song, SongId};
use crate::volume::Volume;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Commands accepted by the engine
#[derive(Debug, Clone)]
pub enum TransportCommand {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Prev,
    /// Seek to a percentage (0-100) of the known duration
    Seek(f64),
    /// Volume level (0.0-1.0)
    SetVolume(f32),
    Mute,
    Unmute,
    ToggleMute,
    UpdateInputs(Box<PlayerInputs>),
    Shutdown,
}

/// Everything that can land in the engine inbox
#[derive(Debug)]
pub(crate) enum EngineMessage {
    Command(TransportCommand),
    Slot(SlotEvent),
    Preload(Box<PreloadCompletion>),
    RetryPlay { token: u64 },
    ErrorSkip { token: u64 },
}

/// Clonable command sender for a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineHandle {
    /// Queue a command
    ///
    /// Fails with [`PlaybackError::EngineClosed`] once the engine is dropped.
    pub fn send(&self, command: TransportCommand) -> Result<()> {
        self.tx
            .send(EngineMessage::Command(command))
            .map_err(|_| PlaybackError::EngineClosed)
    }

    pub fn play(&self) -> Result<()> {
        self.send(TransportCommand::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(TransportCommand::Pause)
    }

    pub fn toggle_play_pause(&self) -> Result<()> {
        self.send(TransportCommand::TogglePlayPause)
    }

    pub fn next(&self) -> Result<()> {
        self.send(TransportCommand::Next)
    }

    pub fn prev(&self) -> Result<()> {
        self.send(TransportCommand::Prev)
    }

    pub fn seek(&self, percent: f64) -> Result<()> {
        self.send(TransportCommand::Seek(percent))
    }

    pub fn set_volume(&self, level: f32) -> Result<()> {
        self.send(TransportCommand::SetVolume(level))
    }

    pub fn mute(&self) -> Result<()> {
        self.send(TransportCommand::Mute)
    }

    pub fn unmute(&self) -> Result<()> {
        self.send(TransportCommand::Unmute)
    }

    pub fn toggle_mute(&self) -> Result<()> {
        self.send(TransportCommand::ToggleMute)
    }

    pub fn update_inputs(&self, inputs: PlayerInputs) -> Result<()> {
        self.send(TransportCommand::UpdateInputs(Box::new(inputs)))
    }

    /// Stop the engine and release every resource
    pub fn shutdown(&self) -> Result<()> {
        self.send(TransportCommand::Shutdown)
    }
}

/// Seek entry point handed out through [`PlaybackEvent::SeekHandlerReady`]
///
/// Seeks always apply to whichever slot is active when they are processed.
#[derive(Debug, Clone)]
pub struct SeekHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl SeekHandle {
    /// Seek to `percent` (0-100) of the current song
    pub fn seek(&self, percent: f64) -> Result<()> {
        self.tx
            .send(EngineMessage::Command(TransportCommand::Seek(percent)))
            .map_err(|_| PlaybackError::EngineClosed)
    }
}

/// Gapless dual-slot playback engine
pub struct PlaybackEngine {
    config: PlaybackConfig,
    arbiter: SlotArbiter,
    preload: PreloadPipeline,
    volume: Volume,
    inputs: PlayerInputs,

    /// Desired play state
    intent: bool,

    /// Last play state reported to the collaborator
    reported_playing: bool,

    /// Duration reported by the active slot
    duration: Option<f64>,

    next_token: u64,
    pending_retry: Option<u64>,
    pending_skip: Option<u64>,
    shut_down: bool,

    inbox: mpsc::UnboundedReceiver<EngineMessage>,
    tx: mpsc::UnboundedSender<EngineMessage>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    media_session: Option<Box<dyn MediaSessionSink>>,
}

impl PlaybackEngine {
    /// Create an engine with two slots built by `make_slot`
    ///
    /// `make_slot` is called once for slot A and once for slot B, each time
    /// with the emitter that slot must report through. Returns the engine,
    /// a command handle and the collaborator event stream.
    pub fn new<F>(
        config: PlaybackConfig,
        fetcher: Arc<dyn AudioFetcher>,
        store: Arc<dyn ResourceStore>,
        mut make_slot: F,
    ) -> (Self, EngineHandle, mpsc::UnboundedReceiver<PlaybackEvent>)
    where
        F: FnMut(SlotEmitter) -> Box<dyn AudioSlot>,
    {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let slot_a = make_slot(SlotEmitter::new(SlotId::A, tx.clone()));
        let slot_b = make_slot(SlotEmitter::new(SlotId::B, tx.clone()));
        let mut arbiter = SlotArbiter::new(slot_a, slot_b, store);

        let volume = Volume::new(config.initial_volume);
        arbiter.set_volume_all(volume.gain());

        let preload = PreloadPipeline::new(fetcher, config.min_preload_bytes, tx.clone());

        let engine = Self {
            config,
            arbiter,
            preload,
            volume,
            inputs: PlayerInputs::default(),
            intent: false,
            reported_playing: false,
            duration: None,
            next_token: 0,
            pending_retry: None,
            pending_skip: None,
            shut_down: false,
            inbox,
            tx: tx.clone(),
            events,
            media_session: None,
        };

        engine.emit(PlaybackEvent::SeekHandlerReady(engine.seek_handle()));

        (engine, EngineHandle { tx }, events_rx)
    }

    /// Attach an OS media-session sink
    #[must_use]
    pub fn with_media_session(mut self, sink: Box<dyn MediaSessionSink>) -> Self {
        self.media_session = Some(sink);
        self
    }

    /// Process messages until a shutdown command arrives
    pub async fn run(mut self) {
        info!(active = %self.arbiter.active(), "Playback engine started");
        while self.step().await {}
    }

    /// Wait for one message and process it
    ///
    /// Returns `false` once the engine has shut down.
    pub async fn step(&mut self) -> bool {
        if self.shut_down {
            return false;
        }
        match self.inbox.recv().await {
            Some(message) => self.dispatch(message).await,
            None => false,
        }
    }

    /// Process one already-queued message without waiting
    ///
    /// Returns `None` when the inbox is empty.
    pub async fn try_step(&mut self) -> Option<bool> {
        if self.shut_down {
            return Some(false);
        }
        match self.inbox.try_recv() {
            Ok(message) => Some(self.dispatch(message).await),
            Err(_) => None,
        }
    }

    /// Process queued messages until the inbox is empty
    pub async fn settle(&mut self) -> usize {
        let mut processed = 0;
        while let Some(true) = self.try_step().await {
            processed += 1;
        }
        processed
    }

    async fn dispatch(&mut self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Command(command) => return self.handle_command(command).await,
            EngineMessage::Slot(event) => self.handle_slot_event(event).await,
            EngineMessage::Preload(completion) => self.handle_preload(*completion),
            EngineMessage::RetryPlay { token } => self.handle_retry(token).await,
            EngineMessage::ErrorSkip { token } => self.handle_error_skip(token),
        }
        true
    }

    async fn handle_command(&mut self, command: TransportCommand) -> bool {
        trace!(?command, "Transport command");
        match command {
            TransportCommand::Play => self.play().await,
            TransportCommand::Pause => self.pause(),
            TransportCommand::TogglePlayPause => self.toggle_play_pause().await,
            TransportCommand::Next => self.next(),
            TransportCommand::Prev => self.prev(),
            TransportCommand::Seek(percent) => self.seek(percent),
            TransportCommand::SetVolume(level) => self.set_volume(level),
            TransportCommand::Mute => self.mute(),
            TransportCommand::Unmute => self.unmute(),
            TransportCommand::ToggleMute => self.toggle_mute(),
            TransportCommand::UpdateInputs(inputs) => self.update_inputs(*inputs).await,
            TransportCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    // ===== Collaborator inputs =====

    /// Apply a new input cycle from the collaborator
    ///
    /// Binds the current song to the active slot (reloading only when it is
    /// not already resident), keeps the preload of the next song going and
    /// reconciles the play intent.
    pub async fn update_inputs(&mut self, inputs: PlayerInputs) {
        let song_changed = song_id(self.inputs.current_song.as_ref())
            != song_id(inputs.current_song.as_ref());

        self.inputs = inputs;
        self.intent = self.inputs.is_playing;

        if let Some(song) = self.inputs.current_song.clone() {
            if self.arbiter.bind_current(&song) == Binding::Loaded {
                self.duration = None;
                self.pending_retry = None;
                if self.pending_skip.take().is_some() {
                    debug!(song_id = %song.id, "New song loaded, pending skip cancelled");
                }
            }
        }

        self.sync_preload();

        if song_changed {
            self.notify_now_playing();
        }

        self.reconcile().await;
    }

    fn sync_preload(&mut self) {
        match &self.inputs.next_song {
            Some(next) => {
                let target = self.arbiter.inactive();
                self.preload.request(target, next);
            }
            None => self.preload.reset(),
        }
    }

    /// Bring the active slot in line with the play intent
    async fn reconcile(&mut self) {
        let active = self.arbiter.active();

        if self.intent {
            let can_start = {
                let slot = self.arbiter.slot(active);
                slot.source().is_some() && slot.is_paused()
            } && self.pending_retry.is_none()
                && self.pending_skip.is_none()
                && !self.arbiter.is_faulted(active);

            if can_start {
                self.start_playback().await;
            }
        } else {
            if !self.arbiter.slot(active).is_paused() {
                self.arbiter.slot_mut(active).pause();
            }
            self.set_reported_playing(false);
        }
    }

    /// Start the active slot, scheduling one retry on refusal
    async fn start_playback(&mut self) {
        let active = self.arbiter.active();
        match self.arbiter.slot_mut(active).play().await {
            Ok(()) => {
                debug!(slot = %active, song_id = %self.song_label(), "Playback started");
                self.set_reported_playing(true);
            }
            Err(error) => {
                warn!(
                    slot = %active,
                    song_id = %self.song_label(),
                    error = %error,
                    "Playback refused, retrying"
                );
                let token = self.next_token();
                self.pending_retry = Some(token);
                self.schedule(
                    self.config.play_retry_delay(),
                    EngineMessage::RetryPlay { token },
                );
            }
        }
    }

    async fn handle_retry(&mut self, token: u64) {
        if self.pending_retry != Some(token) {
            trace!(token, "Stale play retry ignored");
            return;
        }
        self.pending_retry = None;

        let active = self.arbiter.active();
        if !self.intent || !self.arbiter.slot(active).is_paused() {
            return;
        }

        match self.arbiter.slot_mut(active).play().await {
            Ok(()) => {
                info!(slot = %active, song_id = %self.song_label(), "Playback started on retry");
                self.set_reported_playing(true);
            }
            Err(error) => {
                warn!(
                    slot = %active,
                    song_id = %self.song_label(),
                    error = %error,
                    "Playback blocked after retry, pausing"
                );
                self.intent = false;
                self.inputs.is_playing = false;
                self.reported_playing = false;
                self.emit(PlaybackEvent::PlaybackBlocked { error });
                self.emit(PlaybackEvent::PlayStateChanged { playing: false });
                if let Some(sink) = self.media_session.as_mut() {
                    sink.playback_state(false);
                }
            }
        }
    }

    // ===== Transport =====

    /// Set the play intent and start the active slot
    pub async fn play(&mut self) {
        self.intent = true;
        self.inputs.is_playing = true;
        self.reconcile().await;
    }

    /// Clear the play intent and pause the active slot
    pub fn pause(&mut self) {
        self.intent = false;
        self.inputs.is_playing = false;

        let active = self.arbiter.active();
        if !self.arbiter.slot(active).is_paused() {
            self.arbiter.slot_mut(active).pause();
        }
        self.set_reported_playing(false);
    }

    pub async fn toggle_play_pause(&mut self) {
        if self.intent {
            self.pause();
        } else {
            self.play().await;
        }
    }

    /// Ask the collaborator for the next song
    pub fn next(&mut self) {
        self.pending_skip = None;
        self.emit(PlaybackEvent::AdvanceRequested {
            reason: AdvanceReason::User,
        });
    }

    /// Ask the collaborator for the previous song
    pub fn prev(&mut self) {
        self.pending_skip = None;
        self.emit(PlaybackEvent::RewindRequested);
    }

    /// Seek the active slot to `percent` (0-100) of the known duration
    ///
    /// No-op while the duration is unknown.
    pub fn seek(&mut self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        let Some(total) = self.known_duration() else {
            debug!(percent, "Seek ignored, duration unknown");
            return;
        };

        let percent = percent.clamp(0.0, 100.0);
        let seconds = percent / 100.0 * total;
        let active = self.arbiter.active();

        debug!(slot = %active, seconds, "Seeking");
        self.arbiter.slot_mut(active).set_current_time(seconds);
        self.emit(PlaybackEvent::ProgressChanged { percent });
    }

    /// Set the volume of both slots
    pub fn set_volume(&mut self, level: f32) {
        self.volume.set_level(level);
        self.apply_volume();
    }

    pub fn mute(&mut self) {
        self.volume.mute();
        self.apply_volume();
    }

    pub fn unmute(&mut self) {
        self.volume.unmute();
        self.apply_volume();
    }

    pub fn toggle_mute(&mut self) {
        self.volume.toggle_mute();
        self.apply_volume();
    }

    fn apply_volume(&mut self) {
        self.arbiter.set_volume_all(self.volume.gain());
    }

    /// Stop everything and release all resources
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.preload.shutdown();
        self.arbiter.teardown();
        self.pending_retry = None;
        self.pending_skip = None;
        self.intent = false;
        self.set_reported_playing(false);
        self.shut_down = true;
        info!("Playback engine stopped");
    }

    // ===== Slot events =====

    /// React to an event reported by one of the slots
    pub async fn handle_slot_event(&mut self, event: SlotEvent) {
        let active = self.arbiter.active();

        if event.slot != active {
            if let SlotEventKind::Error(info) = &event.kind {
                warn!(
                    slot = %event.slot,
                    song_id = ?self.arbiter.song_id(event.slot),
                    message = %info.message,
                    "Inactive slot failed, discarding its preload"
                );
                self.arbiter.mark_faulted(event.slot);
            }
            return;
        }

        match event.kind {
            SlotEventKind::TimeUpdate { current, total } => self.on_time_update(current, total),
            SlotEventKind::Ended => self.on_ended().await,
            SlotEventKind::Error(info) => self.on_active_error(info),
        }
    }

    fn on_time_update(&mut self, current: f64, total: f64) {
        self.emit(PlaybackEvent::TimeUpdated { current });

        if total.is_finite() && total > 0.0 {
            self.duration = Some(total);
            self.emit(PlaybackEvent::DurationChanged { total });

            let percent = (current / total * 100.0).clamp(0.0, 100.0);
            self.emit(PlaybackEvent::ProgressChanged { percent });
        }
    }

    async fn on_ended(&mut self) {
        let target = self.arbiter.inactive();
        let next = self
            .inputs
            .next_song
            .clone()
            .filter(|next| self.arbiter.is_viable_for(target, next));

        let Some(next) = next else {
            debug!(song_id = %self.song_label(), "Track ended without a preloaded successor");
            self.emit(PlaybackEvent::AdvanceRequested {
                reason: AdvanceReason::Ended { gapless: false },
            });
            return;
        };

        self.preload.cancel(target);
        let active = self.arbiter.swap();
        self.duration = None;
        self.pending_retry = None;
        self.pending_skip = None;

        if self.intent {
            self.start_swapped(active, &next).await;
        }

        self.emit(PlaybackEvent::ActiveSlotChanged { active });
        self.emit(PlaybackEvent::SeekHandlerReady(self.seek_handle()));
        self.emit(PlaybackEvent::AdvanceRequested {
            reason: AdvanceReason::Ended { gapless: true },
        });
    }

    /// Start the slot that just took over, forcing the remote source once
    /// if the preloaded one refuses
    async fn start_swapped(&mut self, active: SlotId, next: &Song) {
        let error = match self.arbiter.slot_mut(active).play().await {
            Ok(()) => {
                info!(slot = %active, song_id = %next.id, title = %next.title, "Gapless transition");
                self.set_reported_playing(true);
                return;
            }
            Err(error) => error,
        };

        warn!(
            slot = %active,
            song_id = %next.id,
            error = %error,
            "Swapped slot refused to play, forcing remote source"
        );

        let error = if self.arbiter.force_remote(active, next) {
            match self.arbiter.slot_mut(active).play().await {
                Ok(()) => {
                    self.set_reported_playing(true);
                    return;
                }
                Err(error) => error,
            }
        } else {
            error
        };

        error!(slot = %active, song_id = %next.id, title = %next.title, error = %error, "Gapless swap failed");
        self.emit(PlaybackEvent::TrackFailed {
            song_id: Some(next.id.clone()),
            message: error.to_string(),
        });
        self.schedule_error_skip();
    }

    fn on_active_error(&mut self, info: SlotErrorInfo) {
        let active = self.arbiter.active();
        let current = self.arbiter.slot(active).source().map(SlotSource::locator);
        if let (Some(reported), Some(current)) = (info.locator.as_deref(), current) {
            if reported != current {
                debug!(
                    slot = %active,
                    locator = reported,
                    message = %info.message,
                    "Error from a replaced source ignored"
                );
                return;
            }
        }

        if self.pending_skip.is_some() {
            debug!(message = %info.message, "Skip already pending, error ignored");
            return;
        }

        let song = self.inputs.current_song.as_ref();
        error!(
            slot = %self.arbiter.active(),
            song_id = %self.song_label(),
            title = song.map_or("", |s| s.title.as_str()),
            message = %info.message,
            locator = ?info.locator,
            "Active slot failed, skipping"
        );

        self.emit(PlaybackEvent::TrackFailed {
            song_id: song.map(|s| s.id.clone()),
            message: info.message,
        });
        self.schedule_error_skip();
    }

    fn schedule_error_skip(&mut self) {
        let token = self.next_token();
        self.pending_skip = Some(token);
        self.schedule(self.config.error_skip_delay(), EngineMessage::ErrorSkip { token });
    }

    fn handle_error_skip(&mut self, token: u64) {
        if self.pending_skip != Some(token) {
            trace!(token, "Stale error skip ignored");
            return;
        }
        self.pending_skip = None;
        self.emit(PlaybackEvent::AdvanceRequested {
            reason: AdvanceReason::Error,
        });
    }

    // ===== Preload =====

    fn handle_preload(&mut self, completion: PreloadCompletion) {
        let Some(completion) = self.preload.accept(completion) else {
            return;
        };
        let PreloadCompletion {
            slot, song, result, ..
        } = completion;

        match self.arbiter.install_preload(slot, &song, result) {
            Ok(()) => {
                info!(slot = %slot, song_id = %song.id, title = %song.title, "Next song preloaded");
            }
            Err(e) => {
                warn!(
                    slot = %slot,
                    song_id = %song.id,
                    title = %song.title,
                    error = %e,
                    "Preload failed, using remote URL"
                );
            }
        }
    }

    // ===== Accessors =====

    pub fn active_slot(&self) -> SlotId {
        self.arbiter.active()
    }

    pub fn arbiter(&self) -> &SlotArbiter {
        &self.arbiter
    }

    /// Desired play state
    pub fn intent(&self) -> bool {
        self.intent
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn inputs(&self) -> &PlayerInputs {
        &self.inputs
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Duration reported by the active slot, else the catalog duration
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.or_else(|| {
            self.inputs
                .current_song
                .as_ref()
                .and_then(Song::known_duration)
        })
    }

    /// A fresh seek entry point
    pub fn seek_handle(&self) -> SeekHandle {
        SeekHandle {
            tx: self.tx.clone(),
        }
    }

    // ===== Helpers =====

    fn emit(&self, event: PlaybackEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver dropped");
        }
    }

    fn set_reported_playing(&mut self, playing: bool) {
        if self.reported_playing == playing {
            return;
        }
        self.reported_playing = playing;
        self.emit(PlaybackEvent::PlayStateChanged { playing });
        if let Some(sink) = self.media_session.as_mut() {
            sink.playback_state(playing);
        }
    }

    fn notify_now_playing(&mut self) {
        let (Some(sink), Some(song)) = (self.media_session.as_mut(), &self.inputs.current_song)
        else {
            return;
        };
        sink.now_playing(&NowPlaying::from(song));
    }

    fn schedule(&self, delay: Duration, message: EngineMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(message).is_err() {
                trace!("Engine gone, timer dropped");
            }
        });
    }

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn song_label(&self) -> &str {
        self.inputs
            .current_song
            .as_ref()
            .map_or("none", |song| song.id.as_str())
    }
}

fn song_id(song: Option<&Song>) -> Option<&SongId> {
    song.map(|song| &song.id)
}
