//! Slot arbiter
//!
//! Owns both slots and the active/inactive designation. Decides whether the
//! current song is already resident in the active slot (exact URL or
//! signature match) or has to be loaded, installs preloads into the inactive
//! slot and performs the ping-pong swap.
//!
//! The arbiter never reassigns the source of a slot that already holds the
//! song it is asked to bind: loading restarts the decode pipeline.

use crate::error::PreloadError;
use crate::preload::ValidatedAudio;
use crate::resource::{ResourceHandle, ResourceStore, Signature};
use crate::slot::{AudioSlot, SlotSource};
use crate::types::{SlotId, Song, SongId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of binding the current song to the active slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Active slot already holds the song, nothing was touched
    Resident,

    /// Active slot was pointed at the song's remote URL
    Loaded,

    /// Song has no URL yet, the slot was left alone
    Unresolved,
}

struct SlotState {
    slot: Box<dyn AudioSlot>,
    /// Preloaded resource backing the current source
    handle: Option<ResourceHandle>,
    signature: Option<Signature>,
    /// Song the current source represents
    song_id: Option<SongId>,
    /// Source reported an error since it was loaded
    faulted: bool,
}

impl SlotState {
    fn new(slot: Box<dyn AudioSlot>) -> Self {
        Self {
            slot,
            handle: None,
            signature: None,
            song_id: None,
            faulted: false,
        }
    }

    /// Drop the resource first so at most one live resource exists per slot
    fn release(&mut self) {
        self.signature = None;
        self.handle = None;
    }

    fn load(&mut self, source: SlotSource, song_id: SongId) {
        self.slot.load(source);
        self.song_id = Some(song_id);
        self.faulted = false;
    }

    fn signature_matches(&self, song: &Song) -> bool {
        let Some(signature) = &self.signature else {
            return false;
        };
        signature.song_id == song.id
            && self.slot.source().and_then(SlotSource::resource_id) == Some(signature.resource_id)
    }

    fn url_matches(&self, song: &Song) -> bool {
        match (self.slot.source().and_then(SlotSource::remote_url), song.audio_url.as_deref()) {
            (Some(loaded), Some(wanted)) => loaded == wanted,
            _ => false,
        }
    }
}

/// Active/inactive bookkeeping for the two slots
pub struct SlotArbiter {
    slots: [SlotState; 2],
    active: SlotId,
    store: Arc<dyn ResourceStore>,
}

impl SlotArbiter {
    /// Both slots start empty with A active
    pub fn new(
        slot_a: Box<dyn AudioSlot>,
        slot_b: Box<dyn AudioSlot>,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            slots: [SlotState::new(slot_a), SlotState::new(slot_b)],
            active: SlotId::A,
            store,
        }
    }

    pub fn active(&self) -> SlotId {
        self.active
    }

    pub fn inactive(&self) -> SlotId {
        self.active.other()
    }

    pub fn slot(&self, id: SlotId) -> &dyn AudioSlot {
        self.slots[id.index()].slot.as_ref()
    }

    pub fn slot_mut(&mut self, id: SlotId) -> &mut dyn AudioSlot {
        self.slots[id.index()].slot.as_mut()
    }

    /// Song the slot's source represents
    pub fn song_id(&self, id: SlotId) -> Option<&SongId> {
        self.slots[id.index()].song_id.as_ref()
    }

    pub fn signature(&self, id: SlotId) -> Option<&Signature> {
        self.slots[id.index()].signature.as_ref()
    }

    /// Whether the active slot already holds `song`
    pub fn matches_active(&self, song: &Song) -> bool {
        let state = &self.slots[self.active.index()];
        state.url_matches(song) || state.signature_matches(song)
    }

    /// Make sure the active slot holds `song`
    ///
    /// A resident song is left untouched. Otherwise the slot's resource is
    /// released and the remote URL loaded in its place; the designation
    /// never changes here.
    pub fn bind_current(&mut self, song: &Song) -> Binding {
        if self.matches_active(song) {
            return Binding::Resident;
        }

        let active = self.active;
        let Some(url) = song.audio_url.clone() else {
            warn!(slot = %active, song_id = %song.id, title = %song.title, "Current song has no audio URL yet");
            return Binding::Unresolved;
        };

        info!(slot = %active, song_id = %song.id, title = %song.title, "Loading song into active slot");

        let state = &mut self.slots[active.index()];
        state.release();
        state.load(SlotSource::Remote(url), song.id.clone());
        Binding::Loaded
    }

    /// Put the outcome of a preload into `slot`
    ///
    /// The previous resource of the slot is revoked before a new one is
    /// materialised. Any failure falls back to the remote URL and is
    /// returned so the caller can log it.
    pub fn install_preload(
        &mut self,
        slot: SlotId,
        song: &Song,
        result: Result<ValidatedAudio, PreloadError>,
    ) -> Result<(), PreloadError> {
        if slot == self.active {
            debug!(slot = %slot, song_id = %song.id, "Ignoring preload for the active slot");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let state = &mut self.slots[slot.index()];
        state.release();

        let materialized = result.and_then(|audio| {
            ResourceHandle::materialize(store, audio.body, audio.content_type.as_deref())
        });

        match materialized {
            Ok(handle) => {
                let reference = handle.reference().clone();
                state.signature = Some(Signature {
                    resource_id: reference.id,
                    song_id: song.id.clone(),
                });
                state.handle = Some(handle);
                state.load(SlotSource::Resource(reference), song.id.clone());
                debug!(slot = %slot, song_id = %song.id, title = %song.title, "Preload installed");
                Ok(())
            }
            Err(e) => {
                match song.audio_url.clone() {
                    Some(url) => state.load(SlotSource::Remote(url), song.id.clone()),
                    None => state.song_id = None,
                }
                Err(e)
            }
        }
    }

    /// Whether `slot` can take over playback of `song` without reloading
    pub fn is_viable_for(&self, slot: SlotId, song: &Song) -> bool {
        let state = &self.slots[slot.index()];
        !state.faulted && (state.signature_matches(song) || state.url_matches(song))
    }

    /// Flip the designation and return the new active slot
    pub fn swap(&mut self) -> SlotId {
        self.active = self.active.other();
        info!(active = %self.active, "Swapped active slot");
        self.active
    }

    /// Invalidate whatever `slot` holds after it reported an error
    pub fn mark_faulted(&mut self, slot: SlotId) {
        let state = &mut self.slots[slot.index()];
        state.faulted = true;
        state.release();
    }

    pub fn is_faulted(&self, slot: SlotId) -> bool {
        self.slots[slot.index()].faulted
    }

    /// Point `slot` at the song's remote URL regardless of what it holds
    ///
    /// Returns `false` when the song has no URL.
    pub fn force_remote(&mut self, slot: SlotId, song: &Song) -> bool {
        let Some(url) = song.audio_url.clone() else {
            return false;
        };
        let state = &mut self.slots[slot.index()];
        state.release();
        state.load(SlotSource::Remote(url), song.id.clone());
        true
    }

    /// Apply the same gain to both slots
    pub fn set_volume_all(&mut self, gain: f32) {
        for state in &mut self.slots {
            state.slot.set_volume(gain);
        }
    }

    /// Pause both slots and release every resource
    pub fn teardown(&mut self) {
        for state in &mut self.slots {
            state.slot.pause();
            state.release();
        }
    }
}
