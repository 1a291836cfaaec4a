//! Now playing surface abstraction
//!
//! Pushes track metadata, position and playback state to the OS-wide media
//! surface, and feeds transport events from that surface to the
//! [`RemoteCommandRouter`].
//!
//! - Linux: MPRIS D-Bus interface (mpris-server)
//! - Windows: System Media Transport Controls (SMTC) via souvlaki
//! - macOS: MPNowPlayingInfoCenter / MPRemoteCommandCenter via souvlaki
//! - Anything else: [`NoopNowPlaying`]
//!
//! Every update is best-effort: failures are logged and swallowed so the OS
//! integration can never stall playback.

use std::sync::Arc;

use super::remote_commands::RemoteCommandRouter;
use crate::error::Result;
use crate::model::{LoopMode, MAX_SECONDS, PlaybackState, TrackMetadata, sanitize_seconds, sanitize_volume};
use crate::settings::IdentitySettings;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(any(target_os = "windows", target_os = "macos"))]
mod souvlaki_impl;

/// OS now playing surface.
///
/// The three setters are independent: any may be called first, in any order,
/// from any thread.
pub trait NowPlaying: Send + Sync {
    fn set_track(&self, track: &TrackMetadata);
    fn set_position(&self, seconds: f64);
    fn set_state(&self, state: PlaybackState);
    /// Volume from 0.0 to 1.0; only MPRIS shows it
    fn set_volume(&self, _volume: f64) {}
    fn set_loop_mode(&self, _mode: LoopMode) {}
    fn shutdown(&self) {}
}

/// Last state pushed to a surface.
///
/// Backends merge each partial update into this cache and re-publish the
/// whole surface from it; `apply_*` report whether anything changed so
/// repeated identical updates are not re-published.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlayingSnapshot {
    pub track: Option<TrackMetadata>,
    pub state: PlaybackState,
    pub loop_mode: LoopMode,
    position: f64,
    volume: f64,
}

impl Default for NowPlayingSnapshot {
    fn default() -> Self {
        Self {
            track: None,
            state: PlaybackState::Stopped,
            loop_mode: LoopMode::None,
            position: 0.0,
            volume: 1.0,
        }
    }
}

impl NowPlayingSnapshot {
    pub fn apply_track(&mut self, track: &TrackMetadata) -> bool {
        if self.track.as_ref() == Some(track) {
            return false;
        }
        self.track = Some(track.clone());
        self.position = self.clamp_position(self.position);
        true
    }

    pub fn apply_position(&mut self, seconds: f64) -> bool {
        let position = self.clamp_position(seconds);
        if position == self.position {
            return false;
        }
        self.position = position;
        true
    }

    pub fn apply_state(&mut self, state: PlaybackState) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        true
    }

    /// NaN is ignored; anything else is clamped to `0.0..=1.0`
    pub fn apply_volume(&mut self, volume: f64) -> bool {
        match sanitize_volume(volume) {
            Some(volume) if volume != self.volume => {
                self.volume = volume;
                true
            }
            _ => false,
        }
    }

    pub fn apply_loop_mode(&mut self, mode: LoopMode) -> bool {
        if self.loop_mode == mode {
            return false;
        }
        self.loop_mode = mode;
        true
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Position to publish; a stopped surface has none
    pub fn position(&self) -> Option<f64> {
        match self.state {
            PlaybackState::Stopped => None,
            _ => Some(self.position),
        }
    }

    /// Track length; unknown or infinite lengths (live streams) give `None`
    pub fn duration(&self) -> Option<f64> {
        self.track
            .as_ref()
            .map(|t| t.duration)
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.min(MAX_SECONDS))
    }

    fn clamp_position(&self, seconds: f64) -> f64 {
        let seconds = sanitize_seconds(seconds);
        match self.duration() {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

/// Surface for platforms without one
#[derive(Debug, Default)]
pub struct NoopNowPlaying;

impl NowPlaying for NoopNowPlaying {
    fn set_track(&self, _track: &TrackMetadata) {}
    fn set_position(&self, _seconds: f64) {}
    fn set_state(&self, _state: PlaybackState) {}
}

/// Start the native surface for this platform.
///
/// `hwnd` is the host's top-level window; SMTC needs it on Windows and the
/// other platforms ignore it.
#[cfg(target_os = "linux")]
pub fn start(
    identity: &IdentitySettings,
    _hwnd: Option<isize>,
    router: Arc<RemoteCommandRouter>,
) -> Result<Box<dyn NowPlaying>> {
    Ok(Box::new(linux::MprisNowPlaying::start(identity, router)?))
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
pub fn start(
    identity: &IdentitySettings,
    hwnd: Option<isize>,
    router: Arc<RemoteCommandRouter>,
) -> Result<Box<dyn NowPlaying>> {
    Ok(Box::new(souvlaki_impl::SouvlakiNowPlaying::start(
        identity, hwnd, router,
    )?))
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
pub fn start(
    _identity: &IdentitySettings,
    _hwnd: Option<isize>,
    _router: Arc<RemoteCommandRouter>,
) -> Result<Box<dyn NowPlaying>> {
    Err(crate::error::BridgeError::PlatformUnsupported("now playing"))
}
