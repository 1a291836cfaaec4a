//! Linux MPRIS D-Bus integration using LocalPlayerInterface trait

use std::sync::Arc;

use mpris_server::{
    LocalPlayerInterface, LocalRootInterface, LocalServer, LoopStatus, Metadata, PlaybackRate,
    PlaybackStatus, Property, Time, TrackId, Volume,
    zbus::{Result, fdo},
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{NowPlaying, NowPlayingSnapshot};
use crate::error::BridgeError;
use crate::model::{LoopMode, PlaybackState, TrackMetadata, sanitize_volume};
use crate::platform::remote_commands::{OsTransportEvent, RemoteCommandRouter};
use crate::settings::IdentitySettings;

fn seconds_to_time(seconds: f64) -> Time {
    Time::from_micros((seconds * 1_000_000.0) as i64)
}

fn time_to_seconds(time: Time) -> f64 {
    time.as_micros() as f64 / 1_000_000.0
}

/// Convert the cached surface state to mpris-server Metadata
fn to_mpris_metadata(snapshot: &NowPlayingSnapshot, track_id: u64, object_root: &str) -> Metadata {
    let Some(track) = snapshot.track.as_ref() else {
        return Metadata::default();
    };

    let mut builder = Metadata::builder().trackid(
        TrackId::try_from(format!("{}/track/{}", object_root, track_id))
            .unwrap_or(TrackId::NO_TRACK),
    );

    if !track.title.is_empty() {
        builder = builder.title(track.title.clone());
    }

    if !track.artist.is_empty() {
        builder = builder.artist(
            track
                .artist
                .split(", ")
                .map(str::to_string)
                .collect::<Vec<_>>(),
        );
    }

    if let Some(ref album) = track.album {
        builder = builder.album(album.clone());
    }

    if let Some(duration) = snapshot.duration() {
        builder = builder.length(seconds_to_time(duration));
    }

    if let Some(ref art) = track.cover_art {
        // MPRIS wants a URI; bare paths become file:// URIs
        let art_url = if art.contains("://") {
            art.clone()
        } else {
            format!("file://{}", art)
        };
        builder = builder.art_url(art_url);
    }

    builder.build()
}

impl From<LoopMode> for LoopStatus {
    fn from(mode: LoopMode) -> Self {
        match mode {
            LoopMode::None => LoopStatus::None,
            LoopMode::Track => LoopStatus::Track,
            LoopMode::Playlist => LoopStatus::Playlist,
        }
    }
}

impl From<LoopStatus> for LoopMode {
    fn from(status: LoopStatus) -> Self {
        match status {
            LoopStatus::None => LoopMode::None,
            LoopStatus::Track => LoopMode::Track,
            LoopStatus::Playlist => LoopMode::Playlist,
        }
    }
}

impl From<PlaybackState> for PlaybackStatus {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Playing => PlaybackStatus::Playing,
            PlaybackState::Paused => PlaybackStatus::Paused,
            PlaybackState::Stopped => PlaybackStatus::Stopped,
        }
    }
}

/// State shared between the host-facing handle and the D-Bus thread
#[derive(Debug, Default)]
struct MprisShared {
    snapshot: NowPlayingSnapshot,
    /// Bumped on every track change so clients see a fresh trackid
    track_id: u64,
}

struct MprisPlayer {
    shared: Arc<Mutex<MprisShared>>,
    router: Arc<RemoteCommandRouter>,
    identity: String,
    desktop_entry: String,
    object_root: String,
}

impl MprisPlayer {
    fn has_track(&self) -> bool {
        self.shared.lock().snapshot.track.is_some()
    }
}

impl LocalRootInterface for MprisPlayer {
    async fn raise(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Raise);
        Ok(())
    }

    async fn quit(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Quit);
        Ok(())
    }

    async fn can_quit(&self) -> fdo::Result<bool> {
        Ok(self.router.is_registered())
    }

    async fn fullscreen(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn set_fullscreen(&self, _fullscreen: bool) -> Result<()> {
        Ok(())
    }

    async fn can_set_fullscreen(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn can_raise(&self) -> fdo::Result<bool> {
        Ok(self.router.is_registered())
    }

    async fn has_track_list(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn identity(&self) -> fdo::Result<String> {
        Ok(self.identity.clone())
    }

    async fn desktop_entry(&self) -> fdo::Result<String> {
        Ok(self.desktop_entry.clone())
    }

    async fn supported_uri_schemes(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }

    async fn supported_mime_types(&self) -> fdo::Result<Vec<String>> {
        Ok(vec![])
    }
}

impl LocalPlayerInterface for MprisPlayer {
    async fn next(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Next);
        Ok(())
    }

    async fn previous(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Previous);
        Ok(())
    }

    async fn pause(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Pause);
        Ok(())
    }

    async fn play(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Play);
        Ok(())
    }

    async fn play_pause(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Toggle);
        Ok(())
    }

    async fn stop(&self) -> fdo::Result<()> {
        self.router.deliver(OsTransportEvent::Stop);
        Ok(())
    }

    async fn seek(&self, offset: Time) -> fdo::Result<()> {
        self.router
            .deliver(OsTransportEvent::SeekBy(time_to_seconds(offset)));
        Ok(())
    }

    async fn set_position(&self, track_id: TrackId, position: Time) -> fdo::Result<()> {
        // Stale trackids must be ignored per the MPRIS spec
        let current = {
            let shared = self.shared.lock();
            format!("{}/track/{}", self.object_root, shared.track_id)
        };
        if track_id.as_str() == current {
            self.router
                .deliver(OsTransportEvent::SetPosition(time_to_seconds(position)));
        }
        Ok(())
    }

    async fn open_uri(&self, _uri: String) -> fdo::Result<()> {
        Ok(())
    }

    async fn playback_status(&self) -> fdo::Result<PlaybackStatus> {
        Ok(self.shared.lock().snapshot.state.into())
    }

    async fn loop_status(&self) -> fdo::Result<LoopStatus> {
        Ok(self.shared.lock().snapshot.loop_mode.into())
    }

    async fn set_loop_status(&self, loop_status: LoopStatus) -> Result<()> {
        // The host reports the mode it settled on through set_loop_mode
        self.router
            .deliver(OsTransportEvent::SetLoopMode(loop_status.into()));
        Ok(())
    }

    async fn rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(PlaybackRate::default())
    }

    async fn set_rate(&self, _rate: PlaybackRate) -> Result<()> {
        Ok(())
    }

    async fn shuffle(&self) -> fdo::Result<bool> {
        Ok(false)
    }

    async fn set_shuffle(&self, _shuffle: bool) -> Result<()> {
        Ok(())
    }

    async fn metadata(&self) -> fdo::Result<Metadata> {
        let shared = self.shared.lock();
        Ok(to_mpris_metadata(
            &shared.snapshot,
            shared.track_id,
            &self.object_root,
        ))
    }

    async fn volume(&self) -> fdo::Result<Volume> {
        Ok(self.shared.lock().snapshot.volume())
    }

    async fn set_volume(&self, volume: Volume) -> Result<()> {
        if let Some(volume) = sanitize_volume(volume) {
            self.router.deliver(OsTransportEvent::SetVolume(volume));
        }
        Ok(())
    }

    async fn position(&self) -> fdo::Result<Time> {
        let position = self.shared.lock().snapshot.position().unwrap_or(0.0);
        Ok(seconds_to_time(position))
    }

    async fn minimum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(PlaybackRate::default())
    }

    async fn maximum_rate(&self) -> fdo::Result<PlaybackRate> {
        Ok(PlaybackRate::default())
    }

    async fn can_go_next(&self) -> fdo::Result<bool> {
        Ok(self.has_track())
    }

    async fn can_go_previous(&self) -> fdo::Result<bool> {
        Ok(self.has_track())
    }

    async fn can_play(&self) -> fdo::Result<bool> {
        Ok(self.has_track())
    }

    async fn can_pause(&self) -> fdo::Result<bool> {
        Ok(self.has_track())
    }

    async fn can_seek(&self) -> fdo::Result<bool> {
        Ok(self.shared.lock().snapshot.duration().is_some())
    }

    async fn can_control(&self) -> fdo::Result<bool> {
        Ok(true)
    }
}

/// What changed, for the PropertiesChanged signal
#[derive(Debug)]
enum Change {
    Track(Metadata, bool),
    Status(PlaybackStatus),
    Seeked(Time),
    Volume(Volume),
    Loop(LoopStatus),
}

/// Wait for the D-Bus thread to report whether the server registered
fn wait_until_registered(
    ready_rx: &std::sync::mpsc::Receiver<std::result::Result<(), String>>,
) -> crate::error::Result<()> {
    match ready_rx.recv_timeout(REGISTER_TIMEOUT) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(reason)) => Err(BridgeError::init("MPRIS server", reason)),
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
            Err(BridgeError::init("MPRIS server", "timed out registering on D-Bus"))
        }
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
            Err(BridgeError::init("MPRIS server", "D-Bus thread exited"))
        }
    }
}

/// MPRIS now playing surface (Linux implementation)
#[derive(Debug)]
pub struct MprisNowPlaying {
    shared: Arc<Mutex<MprisShared>>,
    change_tx: Mutex<Option<mpsc::UnboundedSender<Change>>>,
    object_root: String,
}

impl MprisNowPlaying {
    /// Start the MPRIS service on a dedicated thread with its own runtime
    pub fn start(
        identity: &IdentitySettings,
        router: Arc<RemoteCommandRouter>,
    ) -> crate::error::Result<Self> {
        let (change_tx, mut change_rx) = mpsc::unbounded_channel::<Change>();
        let shared = Arc::new(Mutex::new(MprisShared::default()));
        let object_root = format!("/org/{}", identity.dbus_name.replace(['-', '.'], "_"));
        let player = MprisPlayer {
            shared: shared.clone(),
            router,
            identity: identity.display_name.clone(),
            desktop_entry: identity.dbus_name.clone(),
            object_root: object_root.clone(),
        };
        let bus_name = identity.dbus_name.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::init("MPRIS runtime", e))?;

        std::thread::Builder::new()
            .name("mpris".to_string())
            .spawn(move || {
                let local = tokio::task::LocalSet::new();
                local.block_on(&rt, async move {
                    let server = match LocalServer::new(&bus_name, player).await {
                        Ok(server) => server,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    // The caller may have timed out and gone away
                    let _ = ready_tx.send(Ok(()));
                    tracing::info!("MPRIS server registered as {}", bus_name);

                    tokio::select! {
                        _ = server.run() => {}
                        _ = async {
                            while let Some(change) = change_rx.recv().await {
                                let result = match change {
                                    Change::Track(metadata, can_seek) => {
                                        server.properties_changed([
                                            Property::Metadata(metadata),
                                            Property::CanGoNext(true),
                                            Property::CanGoPrevious(true),
                                            Property::CanPlay(true),
                                            Property::CanPause(true),
                                            Property::CanSeek(can_seek),
                                        ]).await
                                    }
                                    Change::Status(status) => {
                                        server.properties_changed([Property::PlaybackStatus(status)]).await
                                    }
                                    Change::Seeked(position) => {
                                        server.emit(mpris_server::Signal::Seeked { position }).await
                                    }
                                    Change::Volume(volume) => {
                                        server.properties_changed([Property::Volume(volume)]).await
                                    }
                                    Change::Loop(status) => {
                                        server.properties_changed([Property::LoopStatus(status)]).await
                                    }
                                };
                                if let Err(e) = result {
                                    tracing::debug!("Failed to notify MPRIS clients: {}", e);
                                }
                            }
                        } => {}
                    }
                    tracing::info!("MPRIS server stopped");
                });
            })
            .map_err(|e| BridgeError::init("MPRIS thread", e))?;

        // On failure the thread has already returned and dropped the sender side
        wait_until_registered(&ready_rx)?;

        Ok(Self {
            shared,
            change_tx: Mutex::new(Some(change_tx)),
            object_root,
        })
    }

    fn notify(&self, change: Change) {
        if let Some(tx) = self.change_tx.lock().as_ref() {
            let _ = tx.send(change);
        }
    }
}

impl NowPlaying for MprisNowPlaying {
    fn set_track(&self, track: &TrackMetadata) {
        let change = {
            let mut shared = self.shared.lock();
            if !shared.snapshot.apply_track(track) {
                return;
            }
            shared.track_id += 1;
            Change::Track(
                to_mpris_metadata(&shared.snapshot, shared.track_id, &self.object_root),
                shared.snapshot.duration().is_some(),
            )
        };
        self.notify(change);
    }

    fn set_position(&self, seconds: f64) {
        // Clients poll Position; only jumps are signalled
        let jumped = {
            let mut shared = self.shared.lock();
            let before = shared.snapshot.position();
            if !shared.snapshot.apply_position(seconds) {
                return;
            }
            match (before, shared.snapshot.position()) {
                (Some(before), Some(after)) if (after - before).abs() > SEEK_JUMP_SECONDS => {
                    Some(after)
                }
                _ => None,
            }
        };
        if let Some(position) = jumped {
            self.notify(Change::Seeked(seconds_to_time(position)));
        }
    }

    fn set_state(&self, state: PlaybackState) {
        if self.shared.lock().snapshot.apply_state(state) {
            self.notify(Change::Status(state.into()));
        }
    }

    fn set_volume(&self, volume: f64) {
        let changed = {
            let mut shared = self.shared.lock();
            shared
                .snapshot
                .apply_volume(volume)
                .then(|| shared.snapshot.volume())
        };
        if let Some(volume) = changed {
            self.notify(Change::Volume(volume));
        }
    }

    fn set_loop_mode(&self, mode: LoopMode) {
        if self.shared.lock().snapshot.apply_loop_mode(mode) {
            self.notify(Change::Loop(mode.into()));
        }
    }

    fn shutdown(&self) {
        // Dropping the sender ends the update loop, which ends the server
        if self.change_tx.lock().take().is_some() {
            tracing::info!("MPRIS server shutting down");
        }
    }
}

/// Position changes larger than this between updates count as a seek
const SEEK_JUMP_SECONDS: f64 = 2.0;

const REGISTER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_for_empty_surface() {
        let snap = NowPlayingSnapshot::default();
        let metadata = to_mpris_metadata(&snap, 0, "/org/mediabridge");
        assert!(metadata.title().is_none());
    }

    #[test]
    fn test_metadata_fields() {
        let mut snap = NowPlayingSnapshot::default();
        snap.apply_track(
            &TrackMetadata::new("Song", "A, B")
                .with_album("Album")
                .with_cover_art("/tmp/cover.png")
                .with_duration(90.0),
        );
        let metadata = to_mpris_metadata(&snap, 3, "/org/mediabridge");
        assert_eq!(metadata.title(), Some("Song"));
        assert_eq!(metadata.album(), Some("Album"));
        assert_eq!(metadata.length(), Some(Time::from_secs(90)));
    }

    #[test]
    fn test_registration_failure_is_reported() {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        tx.send(Err("org.freedesktop.DBus.Error.FileNotFound".to_string()))
            .unwrap();
        let err = wait_until_registered(&rx).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InitializationFailure { what: "MPRIS server", .. }
        ));

        let (tx, rx) = std::sync::mpsc::sync_channel::<std::result::Result<(), String>>(1);
        drop(tx);
        assert!(wait_until_registered(&rx).is_err());

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        tx.send(Ok(())).unwrap();
        assert!(wait_until_registered(&rx).is_ok());
    }

    #[test]
    fn test_unreachable_bus_fails_start() {
        let identity = IdentitySettings {
            dbus_name: "mediabridge_test".to_string(),
            display_name: "Test".to_string(),
        };
        // Only meaningful without any session bus, as in CI containers
        let runtime_bus = std::env::var_os("XDG_RUNTIME_DIR")
            .map(|dir| std::path::Path::new(&dir).join("bus").exists())
            .unwrap_or(false)
            || std::path::Path::new("/run/user").exists();
        if std::env::var_os("DBUS_SESSION_BUS_ADDRESS").is_none() && !runtime_bus {
            let result =
                MprisNowPlaying::start(&identity, Arc::new(RemoteCommandRouter::new()));
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_loop_mode_mapping() {
        for mode in [LoopMode::None, LoopMode::Track, LoopMode::Playlist] {
            assert_eq!(LoopMode::from(LoopStatus::from(mode)), mode);
        }
    }

    #[test]
    fn test_time_conversion() {
        assert_eq!(time_to_seconds(seconds_to_time(42.5)), 42.5);
        assert_eq!(time_to_seconds(Time::from_micros(-10_000_000)), -10.0);
    }
}
