//! Playback events
//!
//! Notifications the engine pushes to its collaborator, plus the optional
//! media-session sink for OS "now playing" integration.
//!
//! The engine never picks songs itself: track boundaries surface as
//! [`PlaybackEvent::AdvanceRequested`] and the collaborator answers with new
//! inputs.

use crate::engine::SeekHandle;
use crate::error::SlotError;
use crate::types::{SlotId, Song, SongId};

/// Why the engine asks for the next song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceReason {
    /// User pressed "next"
    User,

    /// Active slot played to its end
    Ended {
        /// Whether the preloaded slot already took over
        gapless: bool,
    },

    /// Active slot failed and the skip delay elapsed
    Error,
}

/// Events emitted by the playback engine
#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    /// Collaborator should move to the next song
    AdvanceRequested { reason: AdvanceReason },

    /// Collaborator should move to the previous song
    RewindRequested,

    /// Position of the active slot in seconds
    TimeUpdated { current: f64 },

    /// Duration of the active source in seconds
    DurationChanged { total: f64 },

    /// Position as a percentage (0-100)
    ProgressChanged { percent: f64 },

    /// Seek entry point, re-issued whenever the active slot flips
    SeekHandlerReady(SeekHandle),

    /// Effective play state changed
    PlayStateChanged { playing: bool },

    /// Platform refused to play even after the retry
    PlaybackBlocked { error: SlotError },

    /// Active slot could not play the current song
    TrackFailed {
        song_id: Option<SongId>,
        message: String,
    },

    /// Gapless swap moved playback to another slot
    ActiveSlotChanged { active: SlotId },
}

/// Metadata shown by the OS media controls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
}

impl From<&Song> for NowPlaying {
    fn from(song: &Song) -> Self {
        Self {
            title: song.title.clone(),
            artist: song.artist.clone(),
            album: song.album.clone(),
            artwork_url: (!song.cover_url.is_empty()).then(|| song.cover_url.clone()),
        }
    }
}

/// Receiver for media-session updates
#[cfg_attr(test, mockall::automock)]
pub trait MediaSessionSink: Send {
    /// Current song changed
    fn now_playing(&mut self, metadata: &NowPlaying);

    /// Effective play state changed
    fn playback_state(&mut self, playing: bool);
}
