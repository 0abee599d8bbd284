//! Duet Player - Gapless Playback Core
//!
//! Platform-agnostic dual-slot playback with network preloading.
//!
//! This crate provides:
//! - Two interchangeable audio slots with ping-pong swapping on track end
//! - Preloading of the next song into the inactive slot (fetch, validate,
//!   materialise as a local resource, fall back to the remote URL)
//! - Signature matching so a resident song is never reloaded mid-play
//! - Transport control (play/pause, next/prev, seek, volume, mute)
//! - Bounded play retry and debounced error skip
//! - Loop, shuffle and repeat-one queue traversal
//!
//! # Architecture
//!
//! `duet-playback` knows nothing about the platform that produces sound.
//! Audio output is provided through the [`AudioSlot`] trait, the network
//! through [`AudioFetcher`] and local resources through [`ResourceStore`].
//!
//! [`PlaybackEngine`] is a single-task actor: commands, slot events,
//! preload completions and timers all flow through one inbox. The
//! collaborator owning the queue (see [`QueueSession`]) feeds it
//! [`PlayerInputs`] and answers its [`PlaybackEvent`]s.
//!
//! # Example: Simulated Playback
//!
//! ```rust,no_run
//! use duet_playback::{
//!     HttpFetcher, MemoryResourceStore, PlaybackConfig, PlaybackEngine, QueueSession,
//!     SimulatedSlot, SimulationOptions, Song,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> duet_playback::Result<()> {
//! let config = PlaybackConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(&config)?);
//! let store = Arc::new(MemoryResourceStore::new());
//!
//! let (engine, handle, mut events) = PlaybackEngine::new(
//!     config,
//!     fetcher,
//!     store.clone(),
//!     SimulatedSlot::factory(SimulationOptions::default(), Some(store)),
//! );
//! tokio::spawn(engine.run());
//!
//! let mut session = QueueSession::new();
//! let queue = vec![
//!     Song::new("1", "First").with_audio_url("https://cdn.example.com/1.mp3"),
//!     Song::new("2", "Second").with_audio_url("https://cdn.example.com/2.mp3"),
//! ];
//! session.play_song(queue[0].clone(), Some(queue));
//! handle.update_inputs(session.inputs())?;
//!
//! while let Some(event) = events.recv().await {
//!     if session.apply_event(&event) {
//!         handle.update_inputs(session.inputs())?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod arbiter;
pub mod config;
pub mod engine;
mod error;
pub mod events;
pub mod mode;
pub mod preload;
pub mod resource;
pub mod session;
pub mod sim;
pub mod slot;
pub mod types;
mod volume;

// Public exports
pub use arbiter::{Binding, SlotArbiter};
pub use config::PlaybackConfig;
pub use engine::{EngineHandle, PlaybackEngine, SeekHandle, TransportCommand};
pub use error::{ConfigError, PlaybackError, PreloadError, Result, SlotError};
pub use events::{AdvanceReason, MediaSessionSink, NowPlaying, PlaybackEvent};
pub use mode::{resolve_next, resolve_prev};
pub use preload::{validate, AudioFetcher, FetchedAudio, HttpFetcher, ValidatedAudio};
pub use resource::{
    MemoryResourceStore, ResourceHandle, ResourceId, ResourceRef, ResourceStore, Signature,
};
pub use session::QueueSession;
pub use sim::{SimulatedSlot, SimulationOptions};
pub use slot::{AudioSlot, SlotEmitter, SlotErrorInfo, SlotEvent, SlotEventKind, SlotSource};
pub use types::{PlaybackMode, PlayerInputs, SlotId, Song, SongId};
pub use volume::Volume;
