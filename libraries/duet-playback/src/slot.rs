//! Audio slot abstraction
//!
//! A slot is one decodable-media output unit (a browser audio element, an OS
//! sink, the virtual-clock slot in [`crate::sim`]). The engine owns two of
//! them and never assumes anything about their event cadence.

use crate::engine::EngineMessage;
use crate::error::SlotError;
use crate::resource::{ResourceId, ResourceRef};
use crate::types::SlotId;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

/// What a slot is pointed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    /// Stream straight from the network
    Remote(String),

    /// Locally materialised preload
    Resource(ResourceRef),
}

impl SlotSource {
    /// Address the platform should open
    pub fn locator(&self) -> &str {
        match self {
            SlotSource::Remote(url) => url,
            SlotSource::Resource(resource) => &resource.locator,
        }
    }

    /// Remote URL, if the slot streams directly
    pub fn remote_url(&self) -> Option<&str> {
        match self {
            SlotSource::Remote(url) => Some(url),
            SlotSource::Resource(_) => None,
        }
    }

    /// Resource id, if the slot plays a preload
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            SlotSource::Remote(_) => None,
            SlotSource::Resource(resource) => Some(resource.id),
        }
    }
}

/// Platform audio output unit
///
/// Implementations push their events through the [`SlotEmitter`] they were
/// constructed with.
///
/// After `Ended` the slot is paused at the end of its source; a later
/// [`play`](AudioSlot::play) starts it again from the beginning.
#[async_trait]
pub trait AudioSlot: Send {
    /// Point the slot at a new source
    ///
    /// Replaces whatever was loaded and leaves the slot paused at 0. Decoding
    /// pipelines restart on every call, so callers must not reload a source
    /// that is already playing.
    fn load(&mut self, source: SlotSource);

    /// Start or resume playback
    ///
    /// # Errors
    /// [`SlotError::Blocked`] when the platform refuses (autoplay policy),
    /// [`SlotError::Decode`] when the source is unusable,
    /// [`SlotError::NoSource`] when nothing is loaded.
    async fn play(&mut self) -> Result<(), SlotError>;

    /// Pause playback, keeping the position
    fn pause(&mut self);

    /// Jump to `seconds` from the start of the source
    fn set_current_time(&mut self, seconds: f64);

    /// Output gain in 0.0..=1.0
    fn set_volume(&mut self, gain: f32);

    /// Current output gain
    fn volume(&self) -> f32;

    /// Source currently assigned
    fn source(&self) -> Option<&SlotSource>;

    /// Whether the slot is paused (or has never started)
    fn is_paused(&self) -> bool;
}

/// Event kinds a slot may report
#[derive(Debug, Clone, PartialEq)]
pub enum SlotEventKind {
    /// Playback position moved; `total` may be NaN while unknown
    TimeUpdate { current: f64, total: f64 },

    /// Source played to its end
    Ended,

    /// Source failed to load or decode
    Error(SlotErrorInfo),
}

/// Details of a slot failure
#[derive(Debug, Clone, PartialEq)]
pub struct SlotErrorInfo {
    pub message: String,
    /// Source that was loaded when the failure happened
    pub locator: Option<String>,
}

/// Event tagged with the slot it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SlotEvent {
    pub slot: SlotId,
    pub kind: SlotEventKind,
}

impl SlotEvent {
    pub fn new(slot: SlotId, kind: SlotEventKind) -> Self {
        Self { slot, kind }
    }
}

/// Channel a slot uses to report events to its engine
///
/// Cheap to clone; every clone reports for the same slot. Sends after the
/// engine is gone are dropped.
#[derive(Debug, Clone)]
pub struct SlotEmitter {
    slot: SlotId,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl SlotEmitter {
    pub(crate) fn new(slot: SlotId, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { slot, tx }
    }

    /// Slot this emitter reports for
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn time_update(&self, current: f64, total: f64) {
        self.emit(SlotEventKind::TimeUpdate { current, total });
    }

    pub fn ended(&self) {
        self.emit(SlotEventKind::Ended);
    }

    pub fn error(&self, message: impl Into<String>, locator: Option<String>) {
        self.emit(SlotEventKind::Error(SlotErrorInfo {
            message: message.into(),
            locator,
        }));
    }

    /// Send an arbitrary event kind
    pub fn emit(&self, kind: SlotEventKind) {
        let event = SlotEvent::new(self.slot, kind);
        if self.tx.send(EngineMessage::Slot(event)).is_err() {
            trace!(slot = %self.slot, "Engine gone, slot event dropped");
        }
    }
}
