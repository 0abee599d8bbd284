//! Queue session
//!
//! Reference collaborator for the engine: owns the queue, the current song,
//! the traversal mode and the play intent, and turns engine notifications
//! into new [`PlayerInputs`].

use crate::events::PlaybackEvent;
use crate::mode::{resolve_next, resolve_prev};
use crate::types::{PlaybackMode, PlayerInputs, Song};
use tracing::debug;

/// Queue state driving a [`PlaybackEngine`](crate::PlaybackEngine)
#[derive(Debug, Clone, Default)]
pub struct QueueSession {
    queue: Vec<Song>,
    current: Option<Song>,
    /// Song handed out as `next_song`; advancing moves exactly here so the
    /// preloaded slot and the swap agree, including under shuffle
    upcoming: Option<Song>,
    mode: PlaybackMode,
    is_playing: bool,
}

impl QueueSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session over `queue`, positioned on its first song and paused
    pub fn with_queue(queue: Vec<Song>) -> Self {
        let mut session = Self {
            current: queue.first().cloned(),
            queue,
            ..Self::default()
        };
        session.refresh_upcoming();
        session
    }

    /// Start playing `song`
    ///
    /// With a `context` list the queue is replaced by it; otherwise the song
    /// is appended when it is not queued yet.
    pub fn play_song(&mut self, song: Song, context: Option<Vec<Song>>) {
        match context {
            Some(list) => self.queue = list,
            None => {
                if !self.queue.iter().any(|queued| queued.id == song.id) {
                    self.queue.push(song.clone());
                }
            }
        }

        debug!(song_id = %song.id, title = %song.title, "Playing song");
        self.current = Some(song);
        self.is_playing = true;
        self.refresh_upcoming();
    }

    /// Replace the queue, keeping the current song
    pub fn set_queue(&mut self, queue: Vec<Song>) {
        self.queue = queue;
        self.refresh_upcoming();
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.refresh_upcoming();
    }

    /// Toggle to the next mode (loop, shuffle, repeat-one)
    pub fn cycle_mode(&mut self) -> PlaybackMode {
        self.set_mode(self.mode.cycle());
        self.mode
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    /// Move to the upcoming song
    ///
    /// Returns `false` when there is nothing to move to.
    pub fn advance(&mut self) -> bool {
        let Some(next) = self.upcoming.clone() else {
            return false;
        };
        self.current = Some(next);
        self.refresh_upcoming();
        true
    }

    /// Move to the previous song
    pub fn rewind(&mut self) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        let Some(prev) = resolve_prev(&self.queue, &current.id, self.mode).cloned() else {
            return false;
        };
        self.current = Some(prev);
        self.refresh_upcoming();
        true
    }

    /// Inputs for the next engine update
    pub fn inputs(&self) -> PlayerInputs {
        PlayerInputs {
            current_song: self.current.clone(),
            next_song: self.upcoming.clone(),
            playback_mode: self.mode,
            is_playing: self.is_playing,
        }
    }

    /// Apply an engine notification
    ///
    /// Returns `true` when the inputs changed and should be sent back.
    pub fn apply_event(&mut self, event: &PlaybackEvent) -> bool {
        match event {
            PlaybackEvent::AdvanceRequested { .. } => self.advance(),
            PlaybackEvent::RewindRequested => self.rewind(),
            PlaybackEvent::PlayStateChanged { playing } => {
                let changed = self.is_playing != *playing;
                self.is_playing = *playing;
                changed
            }
            PlaybackEvent::PlaybackBlocked { .. } => {
                let changed = self.is_playing;
                self.is_playing = false;
                changed
            }
            _ => false,
        }
    }

    pub fn queue(&self) -> &[Song] {
        &self.queue
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn upcoming(&self) -> Option<&Song> {
        self.upcoming.as_ref()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    fn refresh_upcoming(&mut self) {
        self.upcoming = self
            .current
            .as_ref()
            .and_then(|current| resolve_next(&self.queue, &current.id, self.mode))
            .cloned();
    }
}
