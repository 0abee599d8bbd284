//! HTTP preload tests
//!
//! These tests use a mock server to verify fetching, validation and the
//! engine's fallback to the remote URL when a preload is rejected.

use duet_playback::{
    validate, AudioFetcher, HttpFetcher, MemoryResourceStore, PlaybackConfig, PlaybackEngine,
    PlayerInputs, PreloadError, SimulatedSlot, SimulationOptions, SlotId, SlotSource, Song,
};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&PlaybackConfig::default()).unwrap()
}

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn audio(size: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(vec![0x49u8; size], "audio/mpeg")
}

// =============================================================================
// Fetch Tests
// =============================================================================

mod fetch {
    use super::*;

    #[tokio::test]
    async fn test_audio_response_passes_validation() {
        let server = MockServer::start().await;
        serve(&server, "/a.mp3", audio(4096)).await;

        let fetched = fetcher()
            .fetch(&format!("{}/a.mp3", server.uri()))
            .await
            .unwrap();

        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.content_type.as_deref(), Some("audio/mpeg"));

        let validated = validate(fetched, 1000).unwrap();
        assert_eq!(validated.body.len(), 4096);
    }

    #[tokio::test]
    async fn test_not_found_is_bad_status() {
        let server = MockServer::start().await;
        serve(&server, "/missing.mp3", ResponseTemplate::new(404)).await;

        let fetched = fetcher()
            .fetch(&format!("{}/missing.mp3", server.uri()))
            .await
            .unwrap();

        assert!(fetched.body.is_empty());
        assert!(matches!(
            validate(fetched, 1000),
            Err(PreloadError::BadStatus(404))
        ));
    }

    #[tokio::test]
    async fn test_html_interstitial_is_rejected() {
        let server = MockServer::start().await;
        let page = "<html><body>Please log in</body></html>".repeat(100);
        serve(
            &server,
            "/a.mp3",
            ResponseTemplate::new(200).set_body_raw(page, "text/html"),
        )
        .await;

        let fetched = fetcher()
            .fetch(&format!("{}/a.mp3", server.uri()))
            .await
            .unwrap();

        assert!(matches!(
            validate(fetched, 1000),
            Err(PreloadError::WrongContentType(_))
        ));
    }

    #[tokio::test]
    async fn test_truncated_audio_is_too_small() {
        let server = MockServer::start().await;
        serve(&server, "/a.mp3", audio(200)).await;

        let fetched = fetcher()
            .fetch(&format!("{}/a.mp3", server.uri()))
            .await
            .unwrap();

        assert!(matches!(
            validate(fetched, 1000),
            Err(PreloadError::TooSmall {
                size: 200,
                minimum: 1000
            })
        ));
    }

    #[tokio::test]
    async fn test_configured_user_agent_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.mp3"))
            .and(header("user-agent", "duet-test/1.0"))
            .respond_with(audio(2048))
            .expect(1)
            .mount(&server)
            .await;

        let config = PlaybackConfig {
            user_agent: "duet-test/1.0".to_string(),
            ..PlaybackConfig::default()
        };
        let fetched = HttpFetcher::new(&config)
            .unwrap()
            .fetch(&format!("{}/a.mp3", server.uri()))
            .await
            .unwrap();

        assert_eq!(fetched.status, 200);
    }
}

// =============================================================================
// Transport Error Tests
// =============================================================================

mod transport_errors {
    use super::*;

    #[tokio::test]
    async fn test_empty_url_is_missing() {
        let result = fetcher().fetch("").await;
        assert!(matches!(result, Err(PreloadError::MissingUrl)));
    }

    #[tokio::test]
    async fn test_malformed_url_is_invalid() {
        let result = fetcher().fetch("not a url").await;
        assert!(matches!(result, Err(PreloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let result = fetcher().fetch("http://127.0.0.1:1/a.mp3").await;
        assert!(matches!(result, Err(PreloadError::Transport(_))));
    }
}

// =============================================================================
// Engine Preload Tests
// =============================================================================

mod engine_preload {
    use super::*;

    fn song_at(server: &MockServer, id: &str) -> Song {
        Song::new(id, format!("Song {}", id)).with_audio_url(format!("{}/{}.mp3", server.uri(), id))
    }

    /// Engine with simulated slots and a real HTTP fetcher, paused so the
    /// only inbox traffic is the preload completion
    fn engine() -> (PlaybackEngine, Arc<MemoryResourceStore>) {
        let store = Arc::new(MemoryResourceStore::new());
        let (engine, _handle, _events) = PlaybackEngine::new(
            PlaybackConfig::default(),
            Arc::new(fetcher()),
            store.clone(),
            SimulatedSlot::factory(SimulationOptions::default(), Some(store.clone())),
        );
        (engine, store)
    }

    fn paused_inputs(current: &Song, next: &Song) -> PlayerInputs {
        PlayerInputs {
            current_song: Some(current.clone()),
            next_song: Some(next.clone()),
            is_playing: false,
            ..PlayerInputs::default()
        }
    }

    #[tokio::test]
    async fn test_valid_preload_becomes_local_resource() {
        let server = MockServer::start().await;
        serve(&server, "/s2.mp3", audio(8192)).await;
        let (s1, s2) = (song_at(&server, "s1"), song_at(&server, "s2"));

        let (mut engine, store) = engine();
        engine.update_inputs(paused_inputs(&s1, &s2)).await;
        assert!(engine.step().await);

        let source = engine.arbiter().slot(SlotId::B).source().cloned();
        assert!(matches!(source, Some(SlotSource::Resource(_))));
        assert_eq!(store.live_count(), 1);
        assert!(engine.arbiter().is_viable_for(SlotId::B, &s2));
    }

    #[tokio::test]
    async fn test_rejected_preload_falls_back_to_remote_url() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/s2.mp3",
            ResponseTemplate::new(200).set_body_raw("<html>captcha</html>".repeat(100), "text/html"),
        )
        .await;
        let (s1, s2) = (song_at(&server, "s1"), song_at(&server, "s2"));

        let (mut engine, store) = engine();
        engine.update_inputs(paused_inputs(&s1, &s2)).await;
        assert!(engine.step().await);

        let source = engine.arbiter().slot(SlotId::B).source().cloned();
        assert_eq!(source, Some(SlotSource::Remote(s2.audio_url.clone().unwrap())));
        assert_eq!(store.live_count(), 0);
        assert!(engine.arbiter().is_viable_for(SlotId::B, &s2));
    }
}
