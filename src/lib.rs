//! MediaBridge - OS media integration for desktop players
//!
//! One facade over the OS now playing surface, remote transport commands,
//! taskbar transport buttons, window resizing by pid and playback engine
//! peak levels. Each capability degrades to a no-op where the platform has
//! none, so the host calls the same API everywhere.

pub mod error;
pub mod facade;
pub mod model;
pub mod peaks;
pub mod platform;
pub mod settings;

pub use error::{BridgeError, Result};
pub use facade::{Capabilities, HostWindow, MediaControlFacade};
pub use model::{LoopMode, PeakSample, PlaybackState, RemoteCommand, TrackMetadata};
pub use peaks::{PeakMeter, PeakReader, PropertyNode, PropertySource};
pub use platform::taskbar::{IconImage, IconSet, RowOrder, TaskbarButton};
pub use settings::Settings;
