use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

use audio_sentry::{
    CaptureController, Config, DiskProbe, LogNotifier, SimDevice, TickOutcome, Uploader,
};

#[derive(Parser)]
#[command(name = "audio-sentry", about = "Sound-triggered audio capture agent")]
struct Cli {
    /// Configuration file (extension optional, TOML expected).
    #[arg(long, default_value = "config/audio-sentry")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan-and-upload pass over the recordings directory.
    Upload {
        /// Directory to scan instead of the configured one.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Drive the capture state machine with a simulated device.
    Simulate {
        /// Number of amplitude polls before shutting down.
        #[arg(long, default_value_t = 150)]
        ticks: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Upload { dir } => {
            let dir = dir.unwrap_or_else(|| cfg.capture.output_dir.clone());
            info!("uploading recordings from {} to {}", dir.display(), cfg.upload.endpoint_url);

            let uploader = Uploader::new(cfg.upload.endpoint_url.as_str())?;
            let report = uploader.run_pass(&dir).await?;

            info!(
                "done: {} scanned, {} uploaded, {} left in place",
                report.scanned, report.uploaded, report.failed
            );
        }

        Command::Simulate { ticks } => {
            let device = SimDevice::new();
            // Alternate ten-poll bursts of sound with stretches of silence so
            // both retention and discard rotations show up in the log.
            device.push_amplitudes((0..ticks).map(|i| {
                if (i / 10) % 4 == 0 {
                    1500
                } else {
                    200
                }
            }));

            let mut controller = CaptureController::new(
                cfg.capture.clone(),
                Box::new(device),
                Box::new(LogNotifier),
                Box::new(DiskProbe),
            );

            controller.start().await?;
            info!("simulated capture started ({} polls)", ticks);

            let period = cfg.capture.poll_interval();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for _ in 0..ticks {
                ticker.tick().await;
                match controller.tick().await {
                    Ok(TickOutcome::Recording { .. }) => {}
                    Ok(TickOutcome::Rotated { retained }) => match retained {
                        Some(path) => info!("segment retained: {}", path.display()),
                        None => info!("silent segment discarded"),
                    },
                    Err(e) => {
                        info!("capture terminated early: {}", e);
                        return Ok(());
                    }
                }
            }

            controller.shutdown().await;
            info!("simulation finished");
        }
    }

    Ok(())
}
