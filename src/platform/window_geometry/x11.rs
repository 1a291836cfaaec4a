//! X11 window tree via x11rb

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConfigureWindowAux, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::{WindowGeometry, WindowTree, resize_windows_owned_by};
use crate::error::{BridgeError, Result};

fn x11_err(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::WindowSystem(e.to_string())
}

/// One display connection plus the atoms needed for the walk
pub struct X11Tree {
    conn: RustConnection,
    root: Window,
    /// `None` when no client ever set `_NET_WM_PID`
    pid_atom: Option<u32>,
}

impl X11Tree {
    pub fn connect() -> Result<Self> {
        let (conn, screen) = x11rb::connect(None)
            .map_err(|e| BridgeError::init("X11 display", e))?;
        let root = conn.setup().roots[screen].root;
        let atom = conn
            .intern_atom(true, b"_NET_WM_PID")
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?
            .atom;
        let pid_atom = (atom != u32::from(AtomEnum::NONE)).then_some(atom);
        Ok(Self {
            conn,
            root,
            pid_atom,
        })
    }
}

impl WindowTree for X11Tree {
    type Window = Window;

    fn root(&self) -> Window {
        self.root
    }

    fn children(&self, window: Window) -> Result<Vec<Window>> {
        let reply = self
            .conn
            .query_tree(window)
            .map_err(x11_err)?
            .reply()
            .map_err(x11_err)?;
        Ok(reply.children)
    }

    fn pid_of(&self, window: Window) -> Option<u32> {
        let atom = self.pid_atom?;
        let reply = self
            .conn
            .get_property(false, window, atom, AtomEnum::CARDINAL, 0, 1)
            .ok()?
            .reply()
            .ok()?;
        reply.value32()?.next()
    }

    fn resize(&self, window: Window, width: u32, height: u32) -> Result<()> {
        let aux = ConfigureWindowAux::new().width(width).height(height);
        self.conn
            .configure_window(window, &aux)
            .map_err(x11_err)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush().map_err(x11_err)
    }
}

/// Opens a fresh display connection per call
#[derive(Debug, Default)]
pub struct X11Geometry;

impl WindowGeometry for X11Geometry {
    fn resize_windows_owned_by(&self, pid: u32, width: u32, height: u32) -> Result<usize> {
        let tree = X11Tree::connect()?;
        resize_windows_owned_by(&tree, pid, width, height)
    }
}
