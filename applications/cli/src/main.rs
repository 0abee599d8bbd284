/// Duet - gapless playback tools
use async_trait::async_trait;
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use duet_playback::{
    validate, AdvanceReason, AudioFetcher, FetchedAudio, HttpFetcher, MemoryResourceStore,
    PlaybackConfig, PlaybackEngine, PlaybackEvent, PlaybackMode, PreloadError, QueueSession,
    SimulatedSlot, SimulationOptions, Song,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "duet")]
#[command(about = "Duet Player gapless playback tools", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./duet.toml when present)
    #[arg(short, long, global = true, env = "DUET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch audio URLs and report whether they would preload
    Probe {
        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Play a queue through simulated slots and print transport events
    Simulate {
        /// JSON file holding an array of songs
        #[arg(short, long)]
        queue: PathBuf,
        /// Serve synthetic audio instead of fetching song URLs
        #[arg(long)]
        offline: bool,
        /// Simulated length of every track in seconds
        #[arg(long, default_value_t = 5)]
        track_secs: u64,
        /// Interval between progress updates in milliseconds
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,
        /// Track changes to play before stopping (defaults to the queue length)
        #[arg(long)]
        tracks: Option<usize>,
        /// Queue traversal mode
        #[arg(long, value_enum, default_value_t = ModeArg::Loop)]
        mode: ModeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Loop,
    Shuffle,
    RepeatOne,
}

impl From<ModeArg> for PlaybackMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Loop => PlaybackMode::Loop,
            ModeArg::Shuffle => PlaybackMode::Shuffle,
            ModeArg::RepeatOne => PlaybackMode::RepeatOne,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=info,duet_playback=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = PlaybackConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Probe { urls } => probe(&config, &urls).await?,
        Commands::Simulate {
            queue,
            offline,
            track_secs,
            tick_ms,
            tracks,
            mode,
        } => {
            let options = SimulationOptions {
                track_length: Duration::from_secs(track_secs.max(1)),
                tick: Duration::from_millis(tick_ms.max(10)),
            };
            simulate(config, &queue, offline, options, tracks, mode.into()).await?;
        }
    }

    Ok(())
}

async fn probe(config: &PlaybackConfig, urls: &[String]) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(config)?;
    let mut rejected = 0;

    for url in urls {
        let outcome = match fetcher.fetch(url).await {
            Ok(fetched) => validate(fetched, config.min_preload_bytes),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(audio) => println!(
                "ok        {} ({} bytes, {})",
                url,
                audio.body.len(),
                audio.content_type.as_deref().unwrap_or("no content type")
            ),
            Err(e) => {
                rejected += 1;
                println!("streamed  {} ({})", url, e);
            }
        }
    }

    if rejected > 0 {
        anyhow::bail!(
            "{} of {} URLs would fall back to streaming",
            rejected,
            urls.len()
        );
    }
    Ok(())
}

async fn simulate(
    config: PlaybackConfig,
    queue_path: &Path,
    offline: bool,
    options: SimulationOptions,
    tracks: Option<usize>,
    mode: PlaybackMode,
) -> anyhow::Result<()> {
    let queue = load_queue(queue_path)?;
    let Some(first) = queue.first().cloned() else {
        anyhow::bail!("queue file {} holds no songs", queue_path.display());
    };
    let target = tracks.unwrap_or(queue.len());

    let fetcher: Arc<dyn AudioFetcher> = if offline {
        Arc::new(OfflineFetcher::new(config.min_preload_bytes))
    } else {
        Arc::new(HttpFetcher::new(&config)?)
    };
    let store = Arc::new(MemoryResourceStore::new());

    let (engine, handle, mut events) = PlaybackEngine::new(
        config,
        fetcher,
        store.clone(),
        SimulatedSlot::factory(options, Some(store.clone())),
    );
    let engine_task = tokio::spawn(engine.run());

    let mut session = QueueSession::new();
    session.set_mode(mode);
    session.play_song(first, Some(queue));
    announce(&session);
    handle.update_inputs(session.inputs())?;

    let mut changes = 0;
    let mut gapless = 0;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let Some(event) = event else {
            break;
        };

        report(&event);

        if let PlaybackEvent::AdvanceRequested { reason } = &event {
            changes += 1;
            if matches!(reason, AdvanceReason::Ended { gapless: true }) {
                gapless += 1;
            }
        }

        if session.apply_event(&event) {
            if matches!(event, PlaybackEvent::AdvanceRequested { .. }) {
                announce(&session);
            }
            if changes >= target {
                break;
            }
            handle.update_inputs(session.inputs())?;
        } else if changes >= target {
            break;
        }
    }

    handle.shutdown()?;
    engine_task.await?;

    println!(
        "{} track changes, {} gapless, {} resources left",
        changes,
        gapless,
        store.live_count()
    );
    Ok(())
}

fn load_queue(path: &Path) -> anyhow::Result<Vec<Song>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read queue file {}: {}", path.display(), e))?;
    let songs: Vec<Song> = serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid queue file {}: {}", path.display(), e))?;
    Ok(songs)
}

fn announce(session: &QueueSession) {
    if let Some(song) = session.current() {
        let artist = if song.artist.is_empty() {
            "Unknown artist"
        } else {
            song.artist.as_str()
        };
        println!("> {} - {} [{}]", artist, song.title, song.id);
    }
}

fn report(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::PlayStateChanged { playing } => {
            println!("  {}", if *playing { "playing" } else { "paused" });
        }
        PlaybackEvent::ActiveSlotChanged { active } => println!("  slot {} active", active),
        PlaybackEvent::AdvanceRequested { reason } => println!("  advance ({:?})", reason),
        PlaybackEvent::RewindRequested => println!("  rewind"),
        PlaybackEvent::PlaybackBlocked { error } => println!("  blocked: {}", error),
        PlaybackEvent::TrackFailed { song_id, message } => match song_id {
            Some(id) => println!("  track {} failed: {}", id, message),
            None => println!("  track failed: {}", message),
        },
        PlaybackEvent::DurationChanged { total } => {
            tracing::debug!(total, "Duration known");
        }
        PlaybackEvent::TimeUpdated { .. }
        | PlaybackEvent::ProgressChanged { .. }
        | PlaybackEvent::SeekHandlerReady(_) => {}
    }
}

/// Serves a synthetic audio body for every URL
struct OfflineFetcher {
    body: Bytes,
}

impl OfflineFetcher {
    fn new(min_bytes: usize) -> Self {
        Self {
            body: Bytes::from(vec![0u8; min_bytes.max(1) * 4]),
        }
    }
}

#[async_trait]
impl AudioFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAudio, PreloadError> {
        if url.is_empty() {
            return Err(PreloadError::MissingUrl);
        }
        tracing::debug!(url, "Serving offline audio");
        Ok(FetchedAudio {
            status: 200,
            content_type: Some("audio/mpeg".to_string()),
            body: self.body.clone(),
        })
    }
}
