//! Preload pipeline
//!
//! Fetches the upcoming song while the current one plays, validates the
//! response and hands the bytes back to the engine, which materialises them
//! into the inactive slot. Every failure is recoverable: the engine points
//! the slot at the remote URL instead.

use crate::config::PlaybackConfig;
use crate::engine::EngineMessage;
use crate::error::PreloadError;
use crate::types::{SlotId, Song, SongId};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Raw response of a preload fetch
#[derive(Debug, Clone)]
pub struct FetchedAudio {
    /// HTTP status code
    pub status: u16,
    /// `content-type` header, if the server sent one
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Response that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedAudio {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Source of preload bytes
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// GET `url`
    ///
    /// Non-success statuses are returned as a [`FetchedAudio`], not an
    /// error; only transport-level failures are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedAudio, PreloadError>;
}

/// [`AudioFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Build a fetcher with the configured timeout and user agent
    pub fn new(config: &PlaybackConfig) -> Result<Self, PreloadError> {
        let http = Client::builder()
            .timeout(config.fetch_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PreloadError::Transport(e.to_string()))?;

        Ok(Self { http })
    }

    /// Wrap an existing client
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAudio, PreloadError> {
        if url.trim().is_empty() {
            return Err(PreloadError::MissingUrl);
        }

        let parsed = url::Url::parse(url).map_err(|e| PreloadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(url = %parsed, "Fetching preload");

        let response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|e| PreloadError::Transport(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Error pages are never used, skip downloading them
        if !status.is_success() {
            return Ok(FetchedAudio {
                status: status.as_u16(),
                content_type,
                body: Bytes::new(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PreloadError::Transport(e.to_string()))?;

        debug!(url = %url, status = status.as_u16(), size = body.len(), "Preload fetched");

        Ok(FetchedAudio {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Check that a response is real audio
///
/// Requires a 2xx status, an `audio/*` content type when one is present and
/// at least `min_bytes` of body.
pub fn validate(fetched: FetchedAudio, min_bytes: usize) -> Result<ValidatedAudio, PreloadError> {
    if !(200..300).contains(&fetched.status) {
        return Err(PreloadError::BadStatus(fetched.status));
    }

    if let Some(content_type) = &fetched.content_type {
        let normalized = content_type.trim().to_ascii_lowercase();
        if !normalized.starts_with("audio/") {
            return Err(PreloadError::WrongContentType(content_type.clone()));
        }
    }

    if fetched.body.len() < min_bytes {
        return Err(PreloadError::TooSmall {
            size: fetched.body.len(),
            minimum: min_bytes,
        });
    }

    Ok(ValidatedAudio {
        body: fetched.body,
        content_type: fetched.content_type,
    })
}

/// Result of one preload task, posted back to the engine
#[derive(Debug)]
pub(crate) struct PreloadCompletion {
    pub slot: SlotId,
    pub generation: u64,
    pub song: Song,
    pub result: Result<ValidatedAudio, PreloadError>,
}

/// Target slot, song and the URL it resolved to when requested
#[derive(Debug, Clone, PartialEq, Eq)]
struct PreloadKey {
    slot: SlotId,
    song_id: SongId,
    url: Option<String>,
}

/// Per-slot bookkeeping for in-flight preloads
///
/// Each slot has a generation counter. Starting or cancelling a preload
/// bumps it, so completions of superseded tasks are recognised and dropped.
pub(crate) struct PreloadPipeline {
    fetcher: Arc<dyn AudioFetcher>,
    min_bytes: usize,
    generations: [u64; 2],
    in_flight: [Option<JoinHandle<()>>; 2],
    key: Option<PreloadKey>,
    inbox: mpsc::UnboundedSender<EngineMessage>,
}

impl PreloadPipeline {
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        min_bytes: usize,
        inbox: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        Self {
            fetcher,
            min_bytes,
            generations: [0; 2],
            in_flight: [None, None],
            key: None,
            inbox,
        }
    }

    /// Preload `song` into `slot` unless it was already requested there
    ///
    /// A song whose URL resolves after the first request is requested again.
    /// Returns `true` when a new fetch was started.
    pub fn request(&mut self, slot: SlotId, song: &Song) -> bool {
        let key = PreloadKey {
            slot,
            song_id: song.id.clone(),
            url: song.audio_url.clone(),
        };
        if self.key.as_ref() == Some(&key) {
            return false;
        }

        self.cancel(slot);
        self.key = Some(key);

        let Some(url) = song.audio_url.clone() else {
            debug!(song_id = %song.id, title = %song.title, "Next song has no audio URL, not preloading");
            return false;
        };

        let index = slot.index();
        let generation = self.generations[index];
        let fetcher = Arc::clone(&self.fetcher);
        let min_bytes = self.min_bytes;
        let inbox = self.inbox.clone();
        let song = song.clone();

        debug!(slot = %slot, song_id = %song.id, generation, "Starting preload");

        self.in_flight[index] = Some(tokio::spawn(async move {
            let result = match fetcher.fetch(&url).await {
                Ok(fetched) => validate(fetched, min_bytes),
                Err(e) => Err(e),
            };

            let completion = PreloadCompletion {
                slot,
                generation,
                song,
                result,
            };
            if inbox.send(EngineMessage::Preload(Box::new(completion))).is_err() {
                trace!(slot = %slot, "Engine gone, preload result dropped");
            }
        }));

        true
    }

    /// Abort any fetch targeting `slot` and forget its key
    pub fn cancel(&mut self, slot: SlotId) {
        let index = slot.index();
        self.generations[index] += 1;

        if let Some(task) = self.in_flight[index].take() {
            debug!(slot = %slot, "Cancelling in-flight preload");
            task.abort();
        }

        if self.key.as_ref().is_some_and(|key| key.slot == slot) {
            self.key = None;
        }
    }

    /// Forget the key so the next request always starts a fetch
    pub fn reset(&mut self) {
        if let Some(slot) = self.key.as_ref().map(|key| key.slot) {
            self.cancel(slot);
        }
    }

    /// Filter out completions of superseded tasks
    pub fn accept(&mut self, completion: PreloadCompletion) -> Option<PreloadCompletion> {
        let index = completion.slot.index();
        if completion.generation != self.generations[index] {
            debug!(
                slot = %completion.slot,
                song_id = %completion.song.id,
                generation = completion.generation,
                "Discarding superseded preload"
            );
            return None;
        }

        self.in_flight[index] = None;
        Some(completion)
    }

    #[cfg(test)]
    pub fn is_in_flight(&self, slot: SlotId) -> bool {
        self.in_flight[slot.index()].is_some()
    }

    /// Abort everything
    pub fn shutdown(&mut self) {
        self.cancel(SlotId::A);
        self.cancel(SlotId::B);
        self.key = None;
    }
}

impl Drop for PreloadPipeline {
    fn drop(&mut self) {
        for task in self.in_flight.iter_mut().filter_map(Option::take) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(status: u16, content_type: Option<&str>, size: usize) -> FetchedAudio {
        FetchedAudio {
            status,
            content_type: content_type.map(str::to_string),
            body: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn accepts_real_audio() {
        let audio = validate(fetched(200, Some("audio/mpeg"), 4096), 1000).unwrap();
        assert_eq!(audio.body.len(), 4096);
        assert_eq!(audio.content_type.as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn rejects_non_success_status() {
        let err = validate(fetched(404, Some("audio/mpeg"), 4096), 1000).unwrap_err();
        assert!(matches!(err, PreloadError::BadStatus(404)));
    }

    #[test]
    fn rejects_html_error_page() {
        let err = validate(fetched(200, Some("text/html; charset=utf-8"), 4096), 1000).unwrap_err();
        assert!(matches!(err, PreloadError::WrongContentType(_)));
    }

    #[test]
    fn content_type_check_ignores_case_and_whitespace() {
        assert!(validate(fetched(200, Some(" Audio/MPEG"), 4096), 1000).is_ok());
    }

    #[test]
    fn missing_content_type_is_accepted() {
        assert!(validate(fetched(200, None, 4096), 1000).is_ok());
    }

    #[test]
    fn rejects_tiny_bodies() {
        let err = validate(fetched(200, Some("audio/mpeg"), 999), 1000).unwrap_err();
        assert!(matches!(
            err,
            PreloadError::TooSmall {
                size: 999,
                minimum: 1000
            }
        ));

        assert!(validate(fetched(200, Some("audio/mpeg"), 1000), 1000).is_ok());
    }

    struct StaticFetcher;

    #[async_trait]
    impl AudioFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedAudio, PreloadError> {
            Ok(fetched(200, Some("audio/mpeg"), 2048))
        }
    }

    fn song(id: &str) -> Song {
        Song::new(id, id).with_audio_url(format!("https://cdn/{}.mp3", id))
    }

    #[tokio::test]
    async fn same_key_does_not_refetch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pipeline = PreloadPipeline::new(Arc::new(StaticFetcher), 1000, tx);

        assert!(pipeline.request(SlotId::B, &song("s2")));
        assert!(!pipeline.request(SlotId::B, &song("s2")));
        assert!(pipeline.request(SlotId::A, &song("s2")));
    }

    #[tokio::test]
    async fn song_without_url_is_not_fetched() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pipeline = PreloadPipeline::new(Arc::new(StaticFetcher), 1000, tx);

        assert!(!pipeline.request(SlotId::B, &Song::new("s2", "Unresolved")));
        assert!(!pipeline.is_in_flight(SlotId::B));
    }

    #[tokio::test]
    async fn late_resolved_url_starts_fetch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pipeline = PreloadPipeline::new(Arc::new(StaticFetcher), 1000, tx);

        assert!(!pipeline.request(SlotId::B, &Song::new("s2", "Unresolved")));
        assert!(!pipeline.request(SlotId::B, &Song::new("s2", "Unresolved")));
        assert!(pipeline.request(SlotId::B, &song("s2")));
        assert!(pipeline.is_in_flight(SlotId::B));
        assert!(!pipeline.request(SlotId::B, &song("s2")));
    }

    #[tokio::test]
    async fn superseded_completion_is_discarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = PreloadPipeline::new(Arc::new(StaticFetcher), 1000, tx);

        pipeline.request(SlotId::B, &song("s2"));
        let first = match rx.recv().await {
            Some(EngineMessage::Preload(completion)) => *completion,
            _ => panic!("expected preload completion"),
        };

        pipeline.request(SlotId::B, &song("s4"));
        assert!(pipeline.accept(first).is_none());

        let second = match rx.recv().await {
            Some(EngineMessage::Preload(completion)) => *completion,
            _ => panic!("expected preload completion"),
        };
        let accepted = pipeline.accept(second).unwrap();
        assert_eq!(accepted.song.id.as_str(), "s4");
        assert!(accepted.result.is_ok());
    }
}
