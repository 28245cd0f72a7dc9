//! Audio Player (pmp-ap) - crossfade demo entry point
//!
//! Plays a short queue of simulated tracks through the crossfade engine
//! and logs every state transition. Useful for tuning crossfade settings
//! without an audio device.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pmp_ap::playback::simulated::{SimulatedEngine, SimulatedEngineFactory};
use pmp_ap::playback::{
    CrossfadeController, CrossfadeState, DualPlayerManager, EngineHandle, EngineOptions,
    MediaItem, PlaybackEngine, SystemMemoryProbe,
};
use pmp_common::{config, FadeCurve, SettingsStore};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pmp-ap
#[derive(Parser, Debug)]
#[command(name = "pmp-ap")]
#[command(about = "Crossfade playback engine demo for the personal music player")]
#[command(version)]
struct Args {
    /// Config file (TOML with a [crossfade] table)
    #[arg(short, long, env = "PMP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the crossfade duration in milliseconds
    #[arg(short, long)]
    duration_ms: Option<u64>,

    /// Override the fade curve (linear, exponential, s_curve)
    #[arg(long)]
    curve: Option<FadeCurve>,

    /// Number of simulated tracks in the queue
    #[arg(short, long, default_value = "3")]
    tracks: usize,

    /// Length of each simulated track in seconds
    #[arg(long, default_value = "15")]
    track_secs: u64,

    /// Start with crossfading switched off
    #[arg(long)]
    no_crossfade: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pmp_ap=debug,pmp_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let player_config =
        config::load_or_default(args.config.as_deref()).context("Failed to load config")?;
    let store = SettingsStore::new(player_config.crossfade)
        .context("Invalid crossfade settings in config")?;
    store
        .update(|settings| {
            if let Some(duration_ms) = args.duration_ms {
                settings.duration_ms = duration_ms;
            }
            if let Some(curve) = args.curve {
                settings.curve = curve;
            }
            if args.no_crossfade {
                settings.enabled = false;
            }
        })
        .context("Invalid crossfade override")?;
    info!("Crossfade settings: {:?}", store.current());

    let factory = Arc::new(SimulatedEngineFactory::new());
    let dual = DualPlayerManager::new(factory.clone(), Arc::new(SystemMemoryProbe::new()));
    let controller = CrossfadeController::new(store.subscribe(), dual);
    tokio::spawn(log_state_changes(controller.subscribe_state()));

    let queue: Vec<MediaItem> = (1..=args.tracks)
        .map(|n| {
            MediaItem::new(format!("track-{}", n), format!("sim://track-{}", n))
                .with_title(format!("Track {}", n))
                // Pairs of tracks share an album to show direct cuts
                .with_album(format!("Album {}", (n + 1) / 2))
                .with_duration_ms(args.track_secs * 1000)
        })
        .collect();

    tokio::select! {
        result = play_queue(&controller, &factory, queue) => result?,
        _ = signal::ctrl_c() => info!("Interrupted"),
    }

    controller.release();
    info!("Shutdown complete");
    Ok(())
}

/// Play `queue` front to back, crossfading at every track boundary
async fn play_queue(
    controller: &CrossfadeController,
    factory: &SimulatedEngineFactory,
    queue: Vec<MediaItem>,
) -> Result<()> {
    let Some(first) = queue.first() else {
        warn!("Empty queue, nothing to play");
        return Ok(());
    };

    // The playback layer's own player handles the first track
    let main = Arc::new(SimulatedEngine::new("main", EngineOptions::default()));
    main.set_media_item(first)?;
    main.prepare()?;
    main.play()?;
    info!("Playing '{}'", first.id);

    let (transition_tx, mut transition_rx) = mpsc::unbounded_channel::<()>();
    let mut engine: EngineHandle = main.clone();

    for (index, current) in queue.iter().enumerate() {
        let next = queue.get(index + 1).cloned();
        main.set_has_next_item(next.is_some());
        factory.set_has_next_item(next.is_some());
        controller.set_main_player(engine.clone());
        controller.set_next_media_item(next.clone());

        let Some(next) = next else {
            wait_until_ended(engine.as_ref()).await;
            info!("Queue finished after '{}'", current.id);
            return Ok(());
        };

        let settings = controller.settings();
        let too_short = current
            .duration_ms
            .is_some_and(|duration| duration <= settings.duration_ms);
        let skip = !settings.enabled
            || too_short
            || controller.should_skip_crossfade(current.album.as_deref(), next.album.as_deref());
        if skip {
            info!("Cutting directly from '{}' to '{}'", current.id, next.id);
            wait_until_ended(engine.as_ref()).await;
            engine.stop()?;
            engine.set_media_item(&next)?;
            engine.prepare()?;
            engine.play()?;
            continue;
        }

        let trigger_controller = controller.clone();
        let trigger_tx = transition_tx.clone();
        controller.start_position_monitor(engine.clone(), move || {
            let done_tx = trigger_tx.clone();
            trigger_controller.crossfade_to_next(move || {
                let _ = done_tx.send(());
            });
        });

        transition_rx
            .recv()
            .await
            .context("Transition channel closed")?;

        // After a crossfade the dual player's active slot carries the track
        engine = controller.main_player().unwrap_or(engine);
        info!("Now playing '{}'", next.id);
    }

    Ok(())
}

async fn wait_until_ended(engine: &dyn PlaybackEngine) {
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    loop {
        interval.tick().await;
        let ended = engine
            .duration_ms()
            .is_some_and(|duration| engine.current_position_ms() >= duration);
        if ended || !engine.is_playing() {
            break;
        }
    }
}

async fn log_state_changes(mut state: tokio::sync::watch::Receiver<CrossfadeState>) {
    let mut last_logged_progress = -1.0_f32;
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        match current {
            CrossfadeState::Crossfading { progress, fade_out_volume, fade_in_volume } => {
                // One line per 10% of progress
                if (progress - last_logged_progress).abs() >= 0.1 || progress >= 1.0 {
                    last_logged_progress = progress;
                    info!(
                        "Crossfading {:>3.0}% (out {:.2}, in {:.2})",
                        progress * 100.0,
                        fade_out_volume,
                        fade_in_volume
                    );
                }
            }
            other => {
                last_logged_progress = -1.0;
                info!("Crossfade state: {:?}", other);
            }
        }
    }
}
