//! Data types shared by the facade and the platform capabilities

use serde::{Deserialize, Serialize};

/// Metadata for the current track.
///
/// A snapshot: the facade replaces it wholesale on track change and hands
/// clones to the platform capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    /// Display artist; multiple artists are joined with ", "
    pub artist: String,
    pub album: Option<String>,
    /// Cover art as a file path or URI (file://, http://)
    pub cover_art: Option<String>,
    /// Track length in seconds, never negative
    pub duration: f64,
}

impl TrackMetadata {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            ..Default::default()
        }
    }

    /// Build the display artist from several names
    pub fn join_artists<S: AsRef<str>>(artists: &[S]) -> String {
        artists
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_cover_art(mut self, cover_art: impl Into<String>) -> Self {
        self.cover_art = Some(cover_art.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = sanitize_seconds(seconds);
        self
    }
}

/// Playback state as reflected to the OS surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// One level-meter reading from the playback engine.
///
/// Units are whatever the backend reports (mpv's astats filter uses dBFS).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeakSample {
    pub left_peak: f64,
    pub right_peak: f64,
    pub left_rms: f64,
    pub right_rms: f64,
}

impl PeakSample {
    /// Every channel at negative infinity
    pub const SILENCE: PeakSample = PeakSample {
        left_peak: f64::NEG_INFINITY,
        right_peak: f64::NEG_INFINITY,
        left_rms: f64::NEG_INFINITY,
        right_rms: f64::NEG_INFINITY,
    };
}

/// Repeat mode as shown to MPRIS clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    #[default]
    None,
    /// Repeat the current track
    Track,
    /// Repeat the whole queue
    Playlist,
}

/// Transport instruction originating outside the host UI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    /// Bring the host window to the front
    Raise,
    Quit,
    Play,
    Pause,
    Stop,
    Toggle,
    NextTrack,
    PreviousTrack,
    /// Absolute position in seconds
    Seek(f64),
    /// Relative offset in seconds, negative seeks backwards
    SeekBy(f64),
    /// Volume from 0.0 to 1.0
    SetVolume(f64),
    SetLoopMode(LoopMode),
}

impl RemoteCommand {
    /// The numeric payload, if this command carries one
    pub fn value(&self) -> Option<f64> {
        match self {
            RemoteCommand::Seek(v) | RemoteCommand::SeekBy(v) | RemoteCommand::SetVolume(v) => {
                Some(*v)
            }
            _ => None,
        }
    }
}

/// Largest duration or position passed on to an OS surface (about 31 years)
pub const MAX_SECONDS: f64 = 1.0e9;

/// Clamp a seconds value to `0.0..=MAX_SECONDS`; NaN and infinities become 0
pub(crate) fn sanitize_seconds(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.min(MAX_SECONDS)
    } else {
        0.0
    }
}

/// Clamp a volume to `0.0..=1.0`; `None` for NaN
pub(crate) fn sanitize_volume(volume: f64) -> Option<f64> {
    (!volume.is_nan()).then(|| volume.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_artists() {
        assert_eq!(TrackMetadata::join_artists(&["A", "B", "C"]), "A, B, C");
        assert_eq!(TrackMetadata::join_artists::<&str>(&[]), "");
    }

    #[test]
    fn test_duration_never_negative() {
        assert_eq!(TrackMetadata::new("t", "a").with_duration(-3.0).duration, 0.0);
        assert_eq!(TrackMetadata::new("t", "a").with_duration(f64::NAN).duration, 0.0);
        assert_eq!(TrackMetadata::new("t", "a").with_duration(181.5).duration, 181.5);
        assert_eq!(
            TrackMetadata::new("t", "a").with_duration(1e20).duration,
            MAX_SECONDS
        );
    }

    #[test]
    fn test_volume_is_clamped() {
        assert_eq!(sanitize_volume(0.4), Some(0.4));
        assert_eq!(sanitize_volume(1.7), Some(1.0));
        assert_eq!(sanitize_volume(f64::NEG_INFINITY), Some(0.0));
        assert_eq!(sanitize_volume(f64::NAN), None);
    }

    #[test]
    fn test_command_payloads() {
        assert_eq!(RemoteCommand::Seek(42.5).value(), Some(42.5));
        assert_eq!(RemoteCommand::SeekBy(-10.0).value(), Some(-10.0));
        assert_eq!(RemoteCommand::Play.value(), None);
        assert_eq!(RemoteCommand::Toggle.value(), None);
        assert_eq!(RemoteCommand::SetVolume(0.5).value(), Some(0.5));
        assert_eq!(RemoteCommand::Raise.value(), None);
        assert_eq!(RemoteCommand::SetLoopMode(LoopMode::Track).value(), None);
    }
}
