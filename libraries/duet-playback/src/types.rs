//! Core types for playback management

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Stable song identifier
///
/// Catalog services hand out both numeric and string ids. Ids are compared by
/// their canonical string form, so `7` and `"7"` name the same song.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SongId(String);

impl SongId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SongId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for SongId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for SongId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for SongId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SongId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Self(text),
            RawId::Signed(number) => Self(number.to_string()),
            RawId::Unsigned(number) => Self(number.to_string()),
        })
    }
}

/// A playable queue entry
///
/// Immutable once placed in a queue. Field names serialise in camelCase so
/// queues exported by a web front end load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Stable identifier within a session
    pub id: SongId,

    /// Stream URL, `None` until the catalog layer resolves it
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Track title
    pub title: String,

    /// Artist name
    #[serde(default)]
    pub artist: String,

    /// Album name
    #[serde(default)]
    pub album: String,

    /// Artwork URL
    #[serde(default)]
    pub cover_url: String,

    /// Duration in seconds (0 = unknown)
    #[serde(default)]
    pub duration: f64,

    /// Source catalog tag (netease, kuwo, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl Song {
    /// Create a song with only an id and a title
    pub fn new(id: impl Into<SongId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            audio_url: None,
            title: title.into(),
            artist: String::new(),
            album: String::new(),
            cover_url: String::new(),
            duration: 0.0,
            platform: None,
        }
    }

    #[must_use]
    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    /// Known duration in seconds, if any
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration.is_finite() && self.duration > 0.0).then_some(self.duration)
    }
}

/// One of the two interchangeable playback channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotId {
    A,
    B,
}

impl SlotId {
    /// The opposite slot
    pub fn other(self) -> Self {
        match self {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SlotId::A => 0,
            SlotId::B => 1,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::A => f.write_str("A"),
            SlotId::B => f.write_str("B"),
        }
    }
}

/// Queue traversal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackMode {
    /// Walk the queue in order, wrapping at both ends
    #[default]
    Loop,

    /// Uniform random pick, immediate repeats allowed
    Shuffle,

    /// Keep playing the current song
    RepeatOne,
}

impl PlaybackMode {
    /// Next mode in the toggle order: loop, shuffle, repeat-one
    #[must_use]
    pub fn cycle(self) -> Self {
        match self {
            PlaybackMode::Loop => PlaybackMode::Shuffle,
            PlaybackMode::Shuffle => PlaybackMode::RepeatOne,
            PlaybackMode::RepeatOne => PlaybackMode::Loop,
        }
    }
}

/// Everything the collaborator hands the engine on each update cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerInputs {
    /// Song the user perceives as playing
    pub current_song: Option<Song>,

    /// Song to preload into the inactive slot
    pub next_song: Option<Song>,

    /// Current traversal mode
    pub playback_mode: PlaybackMode,

    /// Desired play intent
    pub is_playing: bool,
}
