//! Single entry point the host player talks to
//!
//! [`MediaControlFacade`] owns one instance of every capability. Whatever the
//! platform cannot provide, or the settings switch off, is replaced by its
//! no-op at [`MediaControlFacade::init`], so host code never branches on
//! platform.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};
use crate::model::{LoopMode, PeakSample, PlaybackState, RemoteCommand, TrackMetadata};
use crate::peaks::{PeakReader, PropertySource};
use crate::platform::callback::CallbackSlot;
use crate::platform::now_playing::{self, NoopNowPlaying, NowPlaying};
use crate::platform::remote_commands::RemoteCommandRouter;
use crate::platform::taskbar::{self, IconSet, NoopTransportButtons, TaskbarButton, TransportButtons};
use crate::platform::window_geometry::{self, UnsupportedGeometry, WindowGeometry};
use crate::settings::Settings;

type BoxedPeakSource = Box<dyn PropertySource + Send + Sync>;

/// What the host knows about its own window
#[derive(Debug, Clone, Default)]
pub struct HostWindow {
    /// Native top-level window (HWND on Windows)
    pub hwnd: Option<isize>,
    /// Taskbar button icons
    pub icons: IconSet,
}

/// Which capabilities ended up live rather than no-op
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub now_playing: bool,
    pub remote_commands: bool,
    pub taskbar: bool,
    pub window_geometry: bool,
}

pub struct MediaControlFacade {
    router: Arc<RemoteCommandRouter>,
    presses: Arc<CallbackSlot<TaskbarButton>>,
    now_playing: Box<dyn NowPlaying>,
    taskbar: Box<dyn TransportButtons>,
    geometry: Box<dyn WindowGeometry>,
    peaks: RwLock<Option<PeakReader<BoxedPeakSource>>>,
    peak_property: String,
    capabilities: Capabilities,
}

impl std::fmt::Debug for MediaControlFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaControlFacade")
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Log a capability that fell back to its no-op
fn degraded(capability: &str, err: &BridgeError) {
    match err {
        BridgeError::PlatformUnsupported(_) => {
            tracing::debug!("{} not available on this platform", capability)
        }
        _ => tracing::warn!("Failed to create {}: {}", capability, err),
    }
}

impl MediaControlFacade {
    /// Create every capability this platform supports.
    ///
    /// Call on the host window's UI thread when a window is given; the taskbar
    /// buttons bind to that thread. Never fails: each capability that cannot
    /// start is logged once and replaced by its no-op.
    pub fn init(settings: &Settings, host: HostWindow) -> Self {
        let router = Arc::new(RemoteCommandRouter::new());
        let presses = Arc::new(CallbackSlot::default());
        let mut capabilities = Capabilities::default();

        let now_playing: Box<dyn NowPlaying> = if settings.capabilities.now_playing {
            // With remote commands off the surface still runs, its events go nowhere
            let events = if settings.capabilities.remote_commands {
                router.clone()
            } else {
                Arc::new(RemoteCommandRouter::new())
            };
            match now_playing::start(&settings.identity, host.hwnd, events) {
                Ok(surface) => {
                    capabilities.now_playing = true;
                    capabilities.remote_commands = settings.capabilities.remote_commands;
                    surface
                }
                Err(e) => {
                    degraded("now playing", &e);
                    Box::new(NoopNowPlaying)
                }
            }
        } else {
            Box::new(NoopNowPlaying)
        };

        let taskbar: Box<dyn TransportButtons> = if settings.taskbar.enabled {
            match taskbar::start(
                host.hwnd,
                settings.taskbar.labels.clone(),
                &host.icons,
                presses.clone(),
            ) {
                Ok(buttons) => {
                    capabilities.taskbar = true;
                    buttons
                }
                Err(e) => {
                    degraded("taskbar buttons", &e);
                    Box::new(NoopTransportButtons)
                }
            }
        } else {
            Box::new(NoopTransportButtons)
        };

        let geometry: Box<dyn WindowGeometry> = if settings.capabilities.window_geometry {
            capabilities.window_geometry = cfg!(target_os = "linux");
            window_geometry::controller()
        } else {
            Box::new(UnsupportedGeometry)
        };

        tracing::info!("Media controls initialized: {:?}", capabilities);
        Self {
            router,
            presses,
            now_playing,
            taskbar,
            geometry,
            peaks: RwLock::new(None),
            peak_property: settings.peaks.property.clone(),
            capabilities,
        }
    }

    /// Build a facade from explicit capability implementations
    pub fn from_parts(
        now_playing: Box<dyn NowPlaying>,
        taskbar: Box<dyn TransportButtons>,
        geometry: Box<dyn WindowGeometry>,
    ) -> Self {
        Self {
            router: Arc::new(RemoteCommandRouter::new()),
            presses: Arc::new(CallbackSlot::default()),
            now_playing,
            taskbar,
            geometry,
            peaks: RwLock::new(None),
            peak_property: crate::peaks::ASTATS_PROPERTY.to_string(),
            capabilities: Capabilities {
                now_playing: true,
                remote_commands: true,
                taskbar: true,
                window_geometry: true,
            },
        }
    }

    /// Router that OS callbacks deliver into
    pub fn router(&self) -> &Arc<RemoteCommandRouter> {
        &self.router
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn update_track(&self, track: &TrackMetadata) {
        self.now_playing.set_track(track);
    }

    pub fn update_position(&self, seconds: f64) {
        self.now_playing.set_position(seconds);
    }

    /// Volume from 0.0 to 1.0, shown where the surface supports it
    pub fn update_volume(&self, volume: f64) {
        self.now_playing.set_volume(volume);
    }

    pub fn update_loop_mode(&self, mode: LoopMode) {
        self.now_playing.set_loop_mode(mode);
    }

    /// Publish the state and mirror it on the taskbar play/pause button
    pub fn update_state(&self, state: PlaybackState) {
        self.now_playing.set_state(state);
        self.set_is_playing(state.is_playing());
    }

    pub fn set_is_playing(&self, playing: bool) {
        if let Err(e) = self.taskbar.set_is_playing(playing) {
            tracing::debug!("Failed to update taskbar state: {}", e);
        }
    }

    /// Resize every top-level window of this process
    pub fn resize_main_window(&self, width: u32, height: u32) -> Result<usize> {
        self.geometry
            .resize_windows_owned_by(std::process::id(), width, height)
    }

    pub fn resize_windows_owned_by(&self, pid: u32, width: u32, height: u32) -> Result<usize> {
        self.geometry.resize_windows_owned_by(pid, width, height)
    }

    /// Read peaks from `source` from now on, replacing any earlier source
    pub fn attach_peak_source<S>(&self, source: S)
    where
        S: PropertySource + Send + Sync + 'static,
    {
        let reader = PeakReader::with_property(
            Box::new(source) as BoxedPeakSource,
            self.peak_property.clone(),
        );
        *self.peaks.write() = Some(reader);
    }

    pub fn detach_peak_source(&self) {
        *self.peaks.write() = None;
    }

    pub fn read_peaks(&self) -> Result<PeakSample> {
        self.read_peaks_with(PeakSample::default())
    }

    /// Read peaks; fields the engine did not report keep `defaults`
    pub fn read_peaks_with(&self, defaults: PeakSample) -> Result<PeakSample> {
        match self.peaks.read().as_ref() {
            Some(reader) => reader.read_peaks_with(defaults),
            None => Err(BridgeError::Unavailable("peak source".to_string())),
        }
    }

    /// Levels for a meter; silence when stopped, paused or unreadable
    pub fn read_peaks_or_silence(&self, playing: bool) -> PeakSample {
        match self.peaks.read().as_ref() {
            Some(reader) => reader.read_peaks_or_silence(playing),
            None => PeakSample::SILENCE,
        }
    }

    /// Handle OS transport commands; replaces any earlier handler.
    ///
    /// Runs on the OS callback thread.
    pub fn on_remote_command<F>(&self, handler: F)
    where
        F: Fn(RemoteCommand) + Send + Sync + 'static,
    {
        self.router.register(handler);
    }

    /// Queue OS transport commands instead of handling them inline
    pub fn command_channel(&self) -> mpsc::UnboundedReceiver<RemoteCommand> {
        self.router.channel()
    }

    /// Handle taskbar button presses; runs on the window's UI thread
    pub fn on_taskbar_button<F>(&self, handler: F)
    where
        F: Fn(TaskbarButton) + Send + Sync + 'static,
    {
        self.presses.register(handler);
    }

    /// Tear down OS integrations and drop the host callbacks
    pub fn shutdown(&self) {
        self.now_playing.shutdown();
        self.taskbar.shutdown();
        self.router.clear();
        self.presses.clear();
        self.detach_peak_source();
        tracing::info!("Media controls shut down");
    }
}
