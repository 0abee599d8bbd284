//! Virtual-clock audio slot
//!
//! [`SimulatedSlot`] behaves like a media element without producing sound:
//! while playing, a ticker task advances its position, reports time updates
//! and finally `Ended`. Used by the `duet simulate` command and by tests
//! running under paused tokio time.

use crate::error::SlotError;
use crate::resource::ResourceStore;
use crate::slot::{AudioSlot, SlotEmitter, SlotSource};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Timing of simulated tracks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    /// Length of every loaded source
    pub track_length: Duration,
    /// Interval between time updates
    pub tick: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            track_length: Duration::from_secs(180),
            tick: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
struct Clock {
    position: f64,
    playing: bool,
    /// Bumped on every load/play/pause so stale tickers stop
    generation: u64,
}

/// [`AudioSlot`] driven by a virtual clock
pub struct SimulatedSlot {
    emitter: SlotEmitter,
    options: SimulationOptions,
    store: Option<Arc<dyn ResourceStore>>,
    source: Option<SlotSource>,
    volume: f32,
    clock: Arc<Mutex<Clock>>,
}

impl SimulatedSlot {
    pub fn new(emitter: SlotEmitter, options: SimulationOptions) -> Self {
        Self {
            emitter,
            options,
            store: None,
            source: None,
            volume: 1.0,
            clock: Arc::new(Mutex::new(Clock::default())),
        }
    }

    /// Refuse to play resources that are no longer in `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Factory suitable for [`PlaybackEngine::new`](crate::PlaybackEngine::new)
    pub fn factory(
        options: SimulationOptions,
        store: Option<Arc<dyn ResourceStore>>,
    ) -> impl FnMut(SlotEmitter) -> Box<dyn AudioSlot> {
        move |emitter| -> Box<dyn AudioSlot> {
            let slot = SimulatedSlot::new(emitter, options);
            match &store {
                Some(store) => Box::new(slot.with_store(Arc::clone(store))),
                None => Box::new(slot),
            }
        }
    }

    /// Current position in seconds
    pub fn position(&self) -> f64 {
        self.clock().position
    }

    fn total(&self) -> f64 {
        self.options.track_length.as_secs_f64()
    }

    fn clock(&self) -> std::sync::MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_ticker(&self, generation: u64) {
        let clock = Arc::clone(&self.clock);
        let emitter = self.emitter.clone();
        let tick = self.options.tick;
        let total = self.total();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let mut state = clock.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation != generation || !state.playing {
                    trace!(slot = %emitter.slot(), "Ticker stopped");
                    return;
                }

                state.position = (state.position + tick.as_secs_f64()).min(total);
                let position = state.position;

                if position >= total {
                    state.playing = false;
                    drop(state);
                    emitter.time_update(total, total);
                    emitter.ended();
                    return;
                }

                drop(state);
                emitter.time_update(position, total);
            }
        });
    }
}

#[async_trait]
impl AudioSlot for SimulatedSlot {
    fn load(&mut self, source: SlotSource) {
        trace!(slot = %self.emitter.slot(), locator = source.locator(), "Loading source");
        self.source = Some(source);

        let mut clock = self.clock();
        clock.generation += 1;
        clock.position = 0.0;
        clock.playing = false;
    }

    async fn play(&mut self) -> Result<(), SlotError> {
        let Some(source) = &self.source else {
            return Err(SlotError::NoSource);
        };

        if let (Some(store), Some(id)) = (&self.store, source.resource_id()) {
            if store.open(id).is_none() {
                return Err(SlotError::Decode(format!("resource {} was revoked", id)));
            }
        }

        let total = self.total();
        let generation = {
            let mut clock = self.clock();
            if clock.playing {
                return Ok(());
            }
            if clock.position >= total {
                clock.position = 0.0;
            }
            clock.playing = true;
            clock.generation += 1;
            clock.generation
        };

        self.spawn_ticker(generation);
        Ok(())
    }

    fn pause(&mut self) {
        let mut clock = self.clock();
        if clock.playing {
            clock.playing = false;
            clock.generation += 1;
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        let total = self.total();
        let position = seconds.clamp(0.0, total);
        self.clock().position = position;
        self.emitter.time_update(position, total);
    }

    fn set_volume(&mut self, gain: f32) {
        self.volume = gain;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn source(&self) -> Option<&SlotSource> {
        self.source.as_ref()
    }

    fn is_paused(&self) -> bool {
        !self.clock().playing
    }
}
