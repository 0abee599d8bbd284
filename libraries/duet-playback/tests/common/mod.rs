//! Shared fixtures for engine integration tests
//!
//! `MockSlot` records everything the engine does to a slot, `MockFetcher`
//! serves canned preload responses, and `Harness` wires both into an engine
//! that tests drive message by message.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use duet_playback::{
    AudioFetcher, AudioSlot, EngineHandle, FetchedAudio, MemoryResourceStore, PlaybackConfig,
    PlaybackEngine, PlaybackEvent, PlayerInputs, PreloadError, SlotEmitter, SlotError, SlotId,
    SlotSource, Song,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};

// ===== Songs =====

pub fn song(id: &str) -> Song {
    Song::new(id, format!("Song {}", id)).with_audio_url(url_for(id))
}

pub fn url_for(id: &str) -> String {
    format!("https://cdn.test/{}.mp3", id)
}

pub fn inputs(current: Option<&Song>, next: Option<&Song>, playing: bool) -> PlayerInputs {
    PlayerInputs {
        current_song: current.cloned(),
        next_song: next.cloned(),
        is_playing: playing,
        ..PlayerInputs::default()
    }
}

// ===== Responses =====

pub fn audio_body(size: usize) -> FetchedAudio {
    FetchedAudio {
        status: 200,
        content_type: Some("audio/mpeg".to_string()),
        body: Bytes::from(vec![0xAB; size]),
    }
}

pub fn html_page() -> FetchedAudio {
    FetchedAudio {
        status: 200,
        content_type: Some("text/html; charset=utf-8".to_string()),
        body: Bytes::from("<html><body>blocked</body></html>".repeat(200)),
    }
}

// ===== Slot =====

/// What the engine did to one slot
#[derive(Debug)]
pub struct SlotProbe {
    pub loads: Vec<SlotSource>,
    pub play_calls: usize,
    pub pause_calls: usize,
    pub seeks: Vec<f64>,
    pub volume: f32,
    pub paused: bool,
    /// Number of upcoming `play()` calls that fail as blocked
    pub fail_plays: usize,
}

impl Default for SlotProbe {
    fn default() -> Self {
        Self {
            loads: Vec::new(),
            play_calls: 0,
            pause_calls: 0,
            seeks: Vec::new(),
            volume: 1.0,
            paused: true,
            fail_plays: 0,
        }
    }
}

impl SlotProbe {
    pub fn current_source(&self) -> Option<&SlotSource> {
        self.loads.last()
    }
}

/// Holds the next `play()` until released
#[derive(Debug, Default)]
pub struct PlayGate {
    armed: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl PlayGate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

pub struct MockSlot {
    probe: Arc<Mutex<SlotProbe>>,
    gate: Arc<PlayGate>,
    source: Option<SlotSource>,
    volume: f32,
    paused: bool,
}

impl MockSlot {
    pub fn new(probe: Arc<Mutex<SlotProbe>>, gate: Arc<PlayGate>) -> Self {
        Self {
            probe,
            gate,
            source: None,
            volume: 1.0,
            paused: true,
        }
    }
}

#[async_trait]
impl AudioSlot for MockSlot {
    fn load(&mut self, source: SlotSource) {
        self.source = Some(source.clone());
        self.paused = true;
        let mut probe = self.probe.lock().unwrap();
        probe.loads.push(source);
        probe.paused = true;
    }

    async fn play(&mut self) -> Result<(), SlotError> {
        if self.gate.armed.swap(false, Ordering::SeqCst) {
            self.gate.entered.notify_one();
            self.gate.release.notified().await;
        }

        let mut probe = self.probe.lock().unwrap();
        probe.play_calls += 1;

        if probe.fail_plays > 0 {
            probe.fail_plays -= 1;
            return Err(SlotError::Blocked("autoplay policy".to_string()));
        }
        if self.source.is_none() {
            return Err(SlotError::NoSource);
        }

        self.paused = false;
        probe.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        self.paused = true;
        let mut probe = self.probe.lock().unwrap();
        probe.pause_calls += 1;
        probe.paused = true;
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.probe.lock().unwrap().seeks.push(seconds);
    }

    fn set_volume(&mut self, gain: f32) {
        self.volume = gain;
        self.probe.lock().unwrap().volume = gain;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn source(&self) -> Option<&SlotSource> {
        self.source.as_ref()
    }

    fn is_paused(&self) -> bool {
        self.paused
    }
}

// ===== Fetcher =====

/// Serves canned responses; unknown URLs get a valid audio body
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Result<FetchedAudio, String>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: impl Into<String>, response: FetchedAudio) {
        self.responses.lock().unwrap().insert(url.into(), Ok(response));
    }

    pub fn fail(&self, url: impl Into<String>, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.into(), Err(message.to_string()));
    }

    /// Hold fetches of `url` until the returned notify fires
    pub fn gate(&self, url: impl Into<String>) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(url.into(), notify.clone());
        notify
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAudio, PreloadError> {
        self.calls.lock().unwrap().push(url.to_string());

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok(fetched)) => Ok(fetched),
            Some(Err(message)) => Err(PreloadError::Transport(message)),
            None => Ok(audio_body(4096)),
        }
    }
}

// ===== Harness =====

pub struct Harness {
    pub engine: PlaybackEngine,
    pub handle: EngineHandle,
    pub events: mpsc::UnboundedReceiver<PlaybackEvent>,
    pub fetcher: Arc<MockFetcher>,
    pub store: Arc<MemoryResourceStore>,
    pub gate: Arc<PlayGate>,
    probes: Vec<Arc<Mutex<SlotProbe>>>,
    emitters: Vec<SlotEmitter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PlaybackConfig::default())
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        let fetcher = Arc::new(MockFetcher::new());
        let store = Arc::new(MemoryResourceStore::new());
        let gate = Arc::new(PlayGate::default());

        let mut probes = Vec::new();
        let mut emitters = Vec::new();

        let (engine, handle, events) = PlaybackEngine::new(
            config,
            fetcher.clone(),
            store.clone(),
            |emitter| -> Box<dyn AudioSlot> {
                let probe = Arc::new(Mutex::new(SlotProbe::default()));
                probes.push(probe.clone());
                emitters.push(emitter);
                Box::new(MockSlot::new(probe, gate.clone()))
            },
        );

        Self {
            engine,
            handle,
            events,
            fetcher,
            store,
            gate,
            probes,
            emitters,
        }
    }

    pub fn probe(&self, slot: SlotId) -> MutexGuard<'_, SlotProbe> {
        self.probes[slot_index(slot)].lock().unwrap()
    }

    pub fn emitter(&self, slot: SlotId) -> &SlotEmitter {
        &self.emitters[slot_index(slot)]
    }

    /// Every event emitted so far
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Let spawned tasks run and process whatever they queued
    pub async fn settle(&mut self) {
        for _ in 0..8 {
            tokio::task::yield_now().await;
            self.engine.settle().await;
        }
    }
}

fn slot_index(slot: SlotId) -> usize {
    match slot {
        SlotId::A => 0,
        SlotId::B => 1,
    }
}

// ===== Event helpers =====

pub fn is_advance(event: &PlaybackEvent) -> bool {
    matches!(event, PlaybackEvent::AdvanceRequested { .. })
}

pub fn count(events: &[PlaybackEvent], predicate: impl Fn(&PlaybackEvent) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}

/// Position of the first event matching `predicate`
pub fn position_of(
    events: &[PlaybackEvent],
    predicate: impl Fn(&PlaybackEvent) -> bool,
) -> Option<usize> {
    events.iter().position(predicate)
}
