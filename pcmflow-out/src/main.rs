//! pcmflow output engine (pcmflow-out) - Main entry point
//!
//! Streams a test tone through the output engine to an audio device until
//! interrupted. Useful for checking device negotiation, surround decoding and
//! tempo stretching on real hardware.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pcmflow_common::logging::init_tracing;
use pcmflow_common::{ConfigResolver, TomlConfig};
use pcmflow_out::audio::CpalHost;
use pcmflow_out::stream::FixedClock;
use pcmflow_out::tone::ToneMixer;
use pcmflow_out::AudioStream;
use tokio::signal;
use tracing::info;

/// Output sample rate of the tone mixer
const MIXER_SAMPLE_RATE: u32 = 48000;

/// Command-line arguments for pcmflow-out
#[derive(Parser, Debug)]
#[command(name = "pcmflow-out")]
#[command(about = "Real-time PCM output streaming engine (test tone)")]
#[command(version)]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "PCMFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Extra device buffers beyond the minimum of two
    #[arg(short, long, env = "PCMFLOW_LATENCY")]
    latency: Option<u32>,

    /// Decode to 5.1 surround
    #[arg(long, env = "PCMFLOW_SURROUND")]
    surround: bool,

    /// Initial volume percent (0-100)
    #[arg(long, env = "PCMFLOW_VOLUME")]
    volume: Option<u8>,

    /// Output device name
    #[arg(short, long)]
    device: Option<String>,

    /// Test tone frequency in Hz
    #[arg(short, long, default_value = "440")]
    frequency: f64,

    /// Playback speed multiplier reported by the tone source
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve and load configuration before logging so the log settings apply
    let resolver = ConfigResolver::new("pcmflow");
    let config_path = resolver.resolve(args.config.as_deref());
    let mut config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!(
        "Starting pcmflow-out (git {}, built {}, {})",
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!("Configuration: {}", path.display());
    }

    if args.list_devices {
        for name in CpalHost::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    // Command-line overrides
    if let Some(latency) = args.latency {
        config.audio.latency = latency;
    }
    if args.surround {
        config.audio.dpl2_decoder = true;
    }
    if let Some(volume) = args.volume {
        config.audio.volume = volume;
    }
    if args.device.is_some() {
        config.audio.device = args.device.clone();
    }

    let mixer = Arc::new(ToneMixer::new(MIXER_SAMPLE_RATE, args.frequency));
    mixer.set_speed(args.speed);

    // 256-frame blocks per cycle
    let clock = Arc::new(FixedClock {
        ticks_per_second: 486_000_000,
        dma_sample_rate: 6_000,
    });

    let stream = Arc::new(AudioStream::new(
        Arc::new(CpalHost::new()),
        mixer.clone(),
        clock,
        config.audio.clone(),
    ));

    // Audio device setup is blocking; keep it off the async workers
    let starter = Arc::clone(&stream);
    tokio::task::spawn_blocking(move || starter.start())
        .await
        .context("Stream start task failed")?
        .context("Failed to start audio stream")?;

    info!(
        "Playing {:.1}Hz tone at speed {:.2} (Ctrl+C to stop)",
        args.frequency,
        args.speed
    );

    // Producer-side notifier, standing in for an upstream that signals new data
    let notifier = stream.notifier();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(2));
        loop {
            interval.tick().await;
            notifier.notify();
        }
    });

    shutdown_signal().await;

    ticker.abort();
    let stopper = Arc::clone(&stream);
    tokio::task::spawn_blocking(move || stopper.stop())
        .await
        .context("Stream stop task failed")?;

    info!("Shutdown complete ({} frames generated)", mixer.position());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
