//! Resize every top-level window owned by a process
//!
//! Only X11 exposes a window tree with a pid property; everywhere else the
//! controller is [`UnsupportedGeometry`].

use crate::error::{BridgeError, Result};

#[cfg(target_os = "linux")]
pub mod x11;

/// Window tree queries needed to find and resize windows by pid
pub trait WindowTree {
    type Window: Copy;

    fn root(&self) -> Self::Window;
    fn children(&self, window: Self::Window) -> Result<Vec<Self::Window>>;
    /// Pid property of `window`, if it has one
    fn pid_of(&self, window: Self::Window) -> Option<u32>;
    fn resize(&self, window: Self::Window, width: u32, height: u32) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

/// Walk the tree below `window` and collect every window owned by `pid`.
///
/// Matching windows are still descended into. A subtree whose query fails is
/// skipped.
pub fn collect_windows_owned_by<T: WindowTree>(
    tree: &T,
    window: T::Window,
    pid: u32,
    out: &mut Vec<T::Window>,
) {
    if tree.pid_of(window) == Some(pid) {
        out.push(window);
    }

    match tree.children(window) {
        Ok(children) => {
            for child in children {
                collect_windows_owned_by(tree, child, pid, out);
            }
        }
        Err(e) => tracing::debug!("Skipping window subtree: {}", e),
    }
}

/// Resize all windows owned by `pid` and flush; returns how many matched
pub fn resize_windows_owned_by<T: WindowTree>(
    tree: &T,
    pid: u32,
    width: u32,
    height: u32,
) -> Result<usize> {
    let mut windows = Vec::new();
    collect_windows_owned_by(tree, tree.root(), pid, &mut windows);
    if windows.is_empty() {
        return Err(BridgeError::NoMatchingWindows { pid });
    }

    // Individual failures are not reported separately
    for window in &windows {
        if let Err(e) = tree.resize(*window, width, height) {
            tracing::debug!("Failed to resize window: {}", e);
        }
    }
    tree.flush()?;

    tracing::debug!("Resized {} window(s) of pid {} to {}x{}", windows.len(), pid, width, height);
    Ok(windows.len())
}

/// Resize capability as seen by the facade
pub trait WindowGeometry: Send + Sync {
    fn resize_windows_owned_by(&self, pid: u32, width: u32, height: u32) -> Result<usize>;
}

#[derive(Debug, Default)]
pub struct UnsupportedGeometry;

impl WindowGeometry for UnsupportedGeometry {
    fn resize_windows_owned_by(&self, _pid: u32, _width: u32, _height: u32) -> Result<usize> {
        Err(BridgeError::PlatformUnsupported("window geometry"))
    }
}

/// Controller for this platform
pub fn controller() -> Box<dyn WindowGeometry> {
    #[cfg(target_os = "linux")]
    {
        Box::new(x11::X11Geometry)
    }

    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedGeometry)
    }
}
