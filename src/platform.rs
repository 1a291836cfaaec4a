//! Platform abstraction layer
//!
//! One module per capability, with platform implementations inside each
//! capability module and a no-op for platforms that lack it.
//!
//! # Structure
//! - `now_playing/` - OS now playing surface (MPRIS, SMTC, MPNowPlayingInfoCenter)
//! - `remote_commands.rs` - OS transport events to host commands
//! - `taskbar/` - Taskbar thumbnail transport buttons (Win32)
//! - `window_geometry/` - Resize windows by owning pid (X11)
//! - `callback.rs` - Replaceable host callback slot

pub mod callback;
pub mod now_playing;
pub mod remote_commands;
pub mod taskbar;
pub mod window_geometry;
