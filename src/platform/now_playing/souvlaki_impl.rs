//! Windows/macOS now playing using souvlaki
//!
//! Windows: System Media Transport Controls (needs the host window handle)
//! macOS: MPNowPlayingInfoCenter with MPRemoteCommandCenter callbacks

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata as SouvlakiMetadata, MediaPlayback,
    MediaPosition, PlatformConfig, SeekDirection,
};

use super::{NowPlaying, NowPlayingSnapshot};
use crate::error::{BridgeError, Result};
use crate::model::{PlaybackState, TrackMetadata, sanitize_volume};
use crate::platform::remote_commands::{OsTransportEvent, RemoteCommandRouter};
use crate::settings::IdentitySettings;

/// Step used when the OS asks for a seek without saying how far
const DEFAULT_SEEK_STEP: f64 = 10.0;

fn to_souvlaki_playback(snapshot: &NowPlayingSnapshot) -> MediaPlayback {
    let progress = snapshot
        .position()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(MediaPosition);
    match snapshot.state {
        PlaybackState::Playing => MediaPlayback::Playing { progress },
        PlaybackState::Paused => MediaPlayback::Paused { progress },
        PlaybackState::Stopped => MediaPlayback::Stopped,
    }
}

fn to_transport_event(event: MediaControlEvent) -> Option<OsTransportEvent> {
    let event = match event {
        MediaControlEvent::Play => OsTransportEvent::Play,
        MediaControlEvent::Pause => OsTransportEvent::Pause,
        MediaControlEvent::Toggle => OsTransportEvent::Toggle,
        MediaControlEvent::Next => OsTransportEvent::Next,
        MediaControlEvent::Previous => OsTransportEvent::Previous,
        MediaControlEvent::Stop => OsTransportEvent::Stop,
        MediaControlEvent::Seek(direction) => OsTransportEvent::SeekBy(match direction {
            SeekDirection::Forward => DEFAULT_SEEK_STEP,
            SeekDirection::Backward => -DEFAULT_SEEK_STEP,
        }),
        MediaControlEvent::SeekBy(direction, duration) => {
            let secs = duration.as_secs_f64();
            OsTransportEvent::SeekBy(match direction {
                SeekDirection::Forward => secs,
                SeekDirection::Backward => -secs,
            })
        }
        MediaControlEvent::SetPosition(pos) => OsTransportEvent::SetPosition(pos.0.as_secs_f64()),
        MediaControlEvent::SetVolume(volume) => OsTransportEvent::SetVolume(sanitize_volume(volume)?),
        MediaControlEvent::Raise => OsTransportEvent::Raise,
        MediaControlEvent::Quit => OsTransportEvent::Quit,
        // Opening URIs is left to the host
        _ => return None,
    };
    Some(event)
}

struct Inner {
    controls: MediaControls,
    snapshot: NowPlayingSnapshot,
}

impl Inner {
    fn publish_metadata(&mut self) {
        let Some(track) = self.snapshot.track.as_ref() else {
            return;
        };
        let metadata = SouvlakiMetadata {
            title: Some(track.title.as_str()),
            artist: Some(track.artist.as_str()),
            album: track.album.as_deref(),
            cover_url: track.cover_art.as_deref(),
            duration: self
                .snapshot
                .duration()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        };
        if let Err(e) = self.controls.set_metadata(metadata) {
            tracing::debug!("Failed to set now playing metadata: {:?}", e);
        }
    }

    fn publish_playback(&mut self) {
        let playback = to_souvlaki_playback(&self.snapshot);
        if let Err(e) = self.controls.set_playback(playback) {
            tracing::debug!("Failed to set now playing state: {:?}", e);
        }
    }
}

pub struct SouvlakiNowPlaying {
    inner: Mutex<Option<Inner>>,
}

impl std::fmt::Debug for SouvlakiNowPlaying {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SouvlakiNowPlaying").finish()
    }
}

impl SouvlakiNowPlaying {
    pub fn start(
        identity: &IdentitySettings,
        hwnd: Option<isize>,
        router: Arc<RemoteCommandRouter>,
    ) -> Result<Self> {
        #[cfg(target_os = "windows")]
        let hwnd = match hwnd {
            Some(hwnd) => Some(hwnd as *mut std::ffi::c_void),
            None => {
                return Err(BridgeError::init(
                    "media controls",
                    "SMTC requires a window handle",
                ));
            }
        };

        #[cfg(target_os = "macos")]
        let hwnd = {
            let _ = hwnd;
            None
        };

        let config = PlatformConfig {
            dbus_name: &identity.dbus_name, // Not used on Windows/macOS
            display_name: &identity.display_name,
            hwnd,
        };

        let mut controls = MediaControls::new(config)
            .map_err(|e| BridgeError::init("media controls", format!("{:?}", e)))?;

        controls
            .attach(move |event: MediaControlEvent| {
                if let Some(event) = to_transport_event(event) {
                    router.deliver(event);
                }
            })
            .map_err(|e| BridgeError::init("media controls event handler", format!("{:?}", e)))?;

        tracing::info!("Media controls (souvlaki) initialized successfully");
        Ok(Self {
            inner: Mutex::new(Some(Inner {
                controls,
                snapshot: NowPlayingSnapshot::default(),
            })),
        })
    }
}

impl NowPlaying for SouvlakiNowPlaying {
    fn set_track(&self, track: &TrackMetadata) {
        if let Some(inner) = self.inner.lock().as_mut() {
            if inner.snapshot.apply_track(track) {
                inner.publish_metadata();
                // Clamping to the new duration may have moved the position
                inner.publish_playback();
            }
        }
    }

    fn set_position(&self, seconds: f64) {
        if let Some(inner) = self.inner.lock().as_mut() {
            if inner.snapshot.apply_position(seconds) {
                inner.publish_playback();
            }
        }
    }

    fn set_state(&self, state: PlaybackState) {
        if let Some(inner) = self.inner.lock().as_mut() {
            if inner.snapshot.apply_state(state) {
                inner.publish_playback();
            }
        }
    }

    fn shutdown(&self) {
        if let Some(mut inner) = self.inner.lock().take() {
            if let Err(e) = inner.controls.detach() {
                tracing::debug!("Failed to detach media controls: {:?}", e);
            }
            tracing::info!("Media controls (souvlaki) shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_position_maps_to_absolute_seek() {
        let event = to_transport_event(MediaControlEvent::SetPosition(MediaPosition(
            Duration::from_secs_f64(42.5),
        )));
        assert_eq!(event, Some(OsTransportEvent::SetPosition(42.5)));
    }

    #[test]
    fn test_relative_seeks() {
        assert_eq!(
            to_transport_event(MediaControlEvent::Seek(SeekDirection::Backward)),
            Some(OsTransportEvent::SeekBy(-DEFAULT_SEEK_STEP))
        );
        assert_eq!(
            to_transport_event(MediaControlEvent::SeekBy(
                SeekDirection::Forward,
                Duration::from_secs(5)
            )),
            Some(OsTransportEvent::SeekBy(5.0))
        );
    }

    #[test]
    fn test_window_events_are_forwarded() {
        assert_eq!(
            to_transport_event(MediaControlEvent::Raise),
            Some(OsTransportEvent::Raise)
        );
        assert_eq!(
            to_transport_event(MediaControlEvent::Quit),
            Some(OsTransportEvent::Quit)
        );
        assert_eq!(
            to_transport_event(MediaControlEvent::SetVolume(1.5)),
            Some(OsTransportEvent::SetVolume(1.0))
        );
        assert_eq!(to_transport_event(MediaControlEvent::SetVolume(f64::NAN)), None);
        assert_eq!(
            to_transport_event(MediaControlEvent::OpenUri("file:///a.mp3".to_string())),
            None
        );
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        let mut snap = NowPlayingSnapshot::default();
        snap.apply_state(PlaybackState::Playing);
        snap.apply_position(1e20);
        assert!(matches!(
            to_souvlaki_playback(&snap),
            MediaPlayback::Playing { progress: Some(_) }
        ));

        let mut live = TrackMetadata::new("Radio", "Station");
        live.duration = f64::INFINITY;
        snap.apply_track(&live);
        assert_eq!(snap.duration(), None);
    }

    #[test]
    fn test_stopped_playback_has_no_progress() {
        let mut snap = NowPlayingSnapshot::default();
        snap.apply_position(10.0);
        assert!(matches!(to_souvlaki_playback(&snap), MediaPlayback::Stopped));
        snap.apply_state(PlaybackState::Paused);
        assert!(matches!(
            to_souvlaki_playback(&snap),
            MediaPlayback::Paused { progress: Some(_) }
        ));
    }
}
