//! mediabridge-probe - run the media controls without a host player
//!
//! Registers the OS now playing surface, logs every remote command it
//! receives and, when `peaks.mpv_socket` is configured, polls peak levels
//! from a running mpv. Stop with Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mediabridge::{HostWindow, MediaControlFacade, PeakMeter, PlaybackState, Settings, TrackMetadata};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load();
    let facade = Arc::new(MediaControlFacade::init(&settings, HostWindow::default()));

    let mut commands = facade.command_channel();
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            tracing::info!("Remote command: {:?}", command);
        }
    });

    facade.update_track(&TrackMetadata::new("MediaBridge probe", &settings.identity.display_name));
    facade.update_state(PlaybackState::Paused);

    #[cfg(unix)]
    let mpv = match &settings.peaks.mpv_socket {
        Some(path) => {
            let source = Arc::new(
                mediabridge::peaks::MpvIpcSource::connect(path)
                    .with_context(|| format!("connecting to mpv at {}", path.display()))?,
            );
            source
                .set_peaks_enabled(true)
                .context("inserting the astats filter")?;
            facade.attach_peak_source(source.clone());
            Some(source)
        }
        None => None,
    };

    let poll = Duration::from_millis(settings.peaks.poll_interval_ms.max(1));
    let mut interval = tokio::time::interval(poll);
    let mut meter = PeakMeter::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                match facade.read_peaks() {
                    Ok(sample) => {
                        meter.update(&sample);
                        tracing::debug!(
                            "Peaks L {:.1} dB R {:.1} dB, RMS L {:.1} dB R {:.1} dB",
                            meter.left_peak, meter.right_peak, meter.left_rms, meter.right_rms
                        );
                    }
                    Err(e) if e.is_transient() => tracing::trace!("Peaks not ready: {}", e),
                    Err(e) => tracing::debug!("Peak read failed: {}", e),
                }
            }
        }
    }

    #[cfg(unix)]
    if let Some(source) = mpv {
        if let Err(e) = source.set_peaks_enabled(false) {
            tracing::warn!("Failed to remove the astats filter: {}", e);
        }
    }

    facade.shutdown();
    Ok(())
}
