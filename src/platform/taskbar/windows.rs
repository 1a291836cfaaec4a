//! Win32 thumbnail toolbar (ITaskbarList3)
//!
//! The host window is subclassed with `SetWindowSubclass`: our procedure
//! handles button clicks and the private state message and hands everything
//! else to `DefSubclassProc`, which chains to the host's own procedure.

use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::Arc;

use windows::Win32::Foundation::{BOOL, HANDLE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::Graphics::Gdi::{
    BI_BITFIELDS, BITMAPINFO, BITMAPV5HEADER, CreateBitmap, CreateDIBSection, DIB_RGB_COLORS,
    DeleteObject, GetDC, ReleaseDC,
};
use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
};
use windows::Win32::UI::Shell::{
    DefSubclassProc, ITaskbarList3, RemoveWindowSubclass, SetWindowSubclass, TaskbarList,
    THB_FLAGS, THB_ICON, THB_TOOLTIP, THBF_DISABLED, THBF_ENABLED, THUMBBUTTON,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateIconIndirect, DestroyIcon, HICON, ICONINFO, PostMessageW, RegisterWindowMessageW,
    WM_APP, WM_COMMAND, WM_NCDESTROY,
};
use windows::core::w;

use super::{
    ButtonDescriptor, IconImage, IconSet, TaskbarButton, TaskbarHandle, TaskbarTransportWidget,
    ThumbBar, TransportButtons, TransportIcon, UiWaker,
};
use crate::error::{BridgeError, Result};
use crate::platform::callback::CallbackSlot;
use crate::settings::TaskbarLabels;

const WM_SET_PLAYING_STATE: u32 = WM_APP + 1;
const WM_DETACH_TASKBAR: u32 = WM_APP + 2;
/// Notification code in the high word of WM_COMMAND for thumbnail clicks
const THBN_CLICKED: u32 = 0x1800;
const SUBCLASS_ID: usize = 0x4D42;

fn loword(wparam: WPARAM) -> u32 {
    (wparam.0 & 0xFFFF) as u32
}

fn hiword(wparam: WPARAM) -> u32 {
    ((wparam.0 >> 16) & 0xFFFF) as u32
}

fn to_tooltip(text: &str) -> [u16; 260] {
    let mut tip = [0u16; 260];
    for (slot, unit) in tip.iter_mut().take(259).zip(text.encode_utf16()) {
        *slot = unit;
    }
    tip
}

/// Build an HICON from BGRA pixels, honouring the buffer's row order
fn create_icon(image: &IconImage) -> Result<HICON> {
    let width = image.width as i32;
    let height = image.height as i32;
    let header = BITMAPV5HEADER {
        bV5Size: std::mem::size_of::<BITMAPV5HEADER>() as u32,
        bV5Width: width,
        // Negative height means top-down rows
        bV5Height: match image.row_order {
            super::RowOrder::TopDown => -height,
            super::RowOrder::BottomUp => height,
        },
        bV5Planes: 1,
        bV5BitCount: 32,
        bV5Compression: BI_BITFIELDS,
        bV5RedMask: 0x00FF_0000,
        bV5GreenMask: 0x0000_FF00,
        bV5BlueMask: 0x0000_00FF,
        bV5AlphaMask: 0xFF00_0000,
        ..Default::default()
    };

    unsafe {
        let hdc = GetDC(HWND(0));
        let mut bits: *mut c_void = std::ptr::null_mut();
        let color = CreateDIBSection(
            hdc,
            &header as *const BITMAPV5HEADER as *const BITMAPINFO,
            DIB_RGB_COLORS,
            &mut bits,
            HANDLE(0),
            0,
        );
        ReleaseDC(HWND(0), hdc);
        let color = color.map_err(|e| BridgeError::init("taskbar icon bitmap", e))?;
        if bits.is_null() {
            let _ = DeleteObject(color);
            return Err(BridgeError::init("taskbar icon bitmap", "no pixel buffer"));
        }
        std::ptr::copy_nonoverlapping(image.bgra.as_ptr(), bits as *mut u8, image.bgra.len());

        // The mask is ignored for 32-bit icons with alpha but must exist
        let mask = CreateBitmap(width, height, 1, 1, None);
        let info = ICONINFO {
            fIcon: BOOL(1),
            xHotspot: 0,
            yHotspot: 0,
            hbmMask: mask,
            hbmColor: color,
        };
        let icon = CreateIconIndirect(&info);
        let _ = DeleteObject(color);
        let _ = DeleteObject(mask);
        icon.map_err(|e| BridgeError::init("taskbar icon", e))
    }
}

/// ITaskbarList3 bound to one window
pub struct WindowsThumbBar {
    hwnd: HWND,
    taskbar: ITaskbarList3,
    icons: HashMap<TransportIcon, HICON>,
}

impl WindowsThumbBar {
    fn new(hwnd: HWND) -> Result<Self> {
        unsafe {
            // S_FALSE / RPC_E_CHANGED_MODE both leave COM usable on this thread
            let _ = CoInitializeEx(None, COINIT_APARTMENTTHREADED);
            let taskbar: ITaskbarList3 = CoCreateInstance(&TaskbarList, None, CLSCTX_INPROC_SERVER)
                .map_err(|e| BridgeError::init("taskbar list", e))?;
            taskbar
                .HrInit()
                .map_err(|e| BridgeError::init("taskbar list", e))?;
            Ok(Self {
                hwnd,
                taskbar,
                icons: HashMap::new(),
            })
        }
    }

    fn to_native(&self, buttons: &[ButtonDescriptor]) -> Vec<THUMBBUTTON> {
        buttons
            .iter()
            .map(|b| {
                let mut native = THUMBBUTTON {
                    dwMask: THB_FLAGS | THB_TOOLTIP,
                    iId: b.button.id(),
                    szTip: to_tooltip(&b.tooltip),
                    dwFlags: if b.enabled { THBF_ENABLED } else { THBF_DISABLED },
                    ..Default::default()
                };
                if let Some(icon) = b.icon.and_then(|kind| self.icons.get(&kind)) {
                    native.dwMask |= THB_ICON;
                    native.hIcon = *icon;
                }
                native
            })
            .collect()
    }
}

impl ThumbBar for WindowsThumbBar {
    fn load_icon(&mut self, icon: TransportIcon, image: &IconImage) -> Result<()> {
        let handle = create_icon(image)?;
        if let Some(old) = self.icons.insert(icon, handle) {
            unsafe {
                let _ = DestroyIcon(old);
            }
        }
        Ok(())
    }

    fn add_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()> {
        let native = self.to_native(buttons);
        unsafe { self.taskbar.ThumbBarAddButtons(self.hwnd, &native) }
            .map_err(|e| BridgeError::init("taskbar buttons", e))
    }

    fn update_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()> {
        let native = self.to_native(buttons);
        unsafe { self.taskbar.ThumbBarUpdateButtons(self.hwnd, &native) }
            .map_err(|e| BridgeError::Unavailable(format!("taskbar update: {}", e)))
    }
}

impl Drop for WindowsThumbBar {
    fn drop(&mut self) {
        for (_, icon) in self.icons.drain() {
            unsafe {
                let _ = DestroyIcon(icon);
            }
        }
    }
}

/// Posts the private state message to the window's queue
struct PostMessageWaker {
    hwnd: isize,
}

impl UiWaker for PostMessageWaker {
    fn wake(&self) -> Result<()> {
        unsafe { PostMessageW(HWND(self.hwnd), WM_SET_PLAYING_STATE, WPARAM(0), LPARAM(0)) }
            .map_err(|e| BridgeError::Unavailable(format!("taskbar window: {}", e)))
    }
}

/// Everything the subclass procedure touches; lives on the UI thread
struct SubclassState {
    widget: TaskbarTransportWidget<WindowsThumbBar>,
    taskbar_created: u32,
}

unsafe extern "system" fn subclass_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    _id: usize,
    ref_data: usize,
) -> LRESULT {
    // SAFETY: ref_data is the Box leaked in `WindowsTaskbar::init`, freed only
    // in `detach`, and this procedure only runs on the window's thread.
    let state = unsafe { &mut *(ref_data as *mut SubclassState) };

    match msg {
        WM_COMMAND if hiword(wparam) == THBN_CLICKED => {
            if state.widget.press(loword(wparam)) {
                return LRESULT(0);
            }
        }
        WM_SET_PLAYING_STATE => {
            state.widget.drain();
            return LRESULT(0);
        }
        WM_DETACH_TASKBAR => {
            unsafe { detach(hwnd, ref_data) };
            return LRESULT(0);
        }
        WM_NCDESTROY => {
            unsafe { detach(hwnd, ref_data) };
        }
        m if m == state.taskbar_created => {
            // First showing, or Explorer restarted; add the buttons again
            if state.widget.attach_or_defer() {
                tracing::debug!("Taskbar buttons added");
            }
        }
        _ => {}
    }

    unsafe { DefSubclassProc(hwnd, msg, wparam, lparam) }
}

/// Remove the subclass and free its state
///
/// # Safety
/// `ref_data` must be the live pointer installed by `WindowsTaskbar::init`,
/// and this must run on the window's thread.
unsafe fn detach(hwnd: HWND, ref_data: usize) {
    unsafe {
        let _ = RemoveWindowSubclass(hwnd, Some(subclass_proc), SUBCLASS_ID);
        drop(Box::from_raw(ref_data as *mut SubclassState));
    }
    tracing::info!("Taskbar buttons detached");
}

/// Taskbar transport buttons on a Win32 window
#[derive(Debug)]
pub struct WindowsTaskbar {
    hwnd: isize,
    handle: TaskbarHandle,
}

impl WindowsTaskbar {
    /// Subclass the window and add the buttons.
    ///
    /// If the taskbar button does not exist yet the add waits for
    /// `TaskbarButtonCreated`. Must run on the thread that owns `hwnd`.
    pub fn init(
        hwnd: isize,
        labels: TaskbarLabels,
        icons: &IconSet,
        presses: Arc<CallbackSlot<TaskbarButton>>,
    ) -> Result<Self> {
        if hwnd == 0 {
            return Err(BridgeError::init("taskbar buttons", "no window handle"));
        }
        let bar = WindowsThumbBar::new(HWND(hwnd))?;
        let widget = TaskbarTransportWidget::new(bar, labels, icons, presses);
        let handle = widget.handle(Arc::new(PostMessageWaker { hwnd }));

        let taskbar_created = unsafe { RegisterWindowMessageW(w!("TaskbarButtonCreated")) };
        let state = Box::into_raw(Box::new(SubclassState {
            widget,
            taskbar_created,
        }));
        let installed =
            unsafe { SetWindowSubclass(HWND(hwnd), Some(subclass_proc), SUBCLASS_ID, state as usize) };
        if !installed.as_bool() {
            // SAFETY: the subclass was never installed, so we still own the box
            drop(unsafe { Box::from_raw(state) });
            return Err(BridgeError::init("taskbar buttons", "SetWindowSubclass failed"));
        }

        // SAFETY: the subclass owns the box now, and its procedure runs on
        // this same thread, so nothing else touches the state during the call.
        unsafe { (*state).widget.attach_or_defer() };

        tracing::info!("Taskbar buttons initialized");
        Ok(Self { hwnd, handle })
    }
}

impl TransportButtons for WindowsTaskbar {
    fn set_is_playing(&self, playing: bool) -> Result<()> {
        self.handle.set_is_playing(playing)
    }

    /// Ask the UI thread to remove the subclass; safe from any thread
    fn shutdown(&self) {
        if let Err(e) =
            unsafe { PostMessageW(HWND(self.hwnd), WM_DETACH_TASKBAR, WPARAM(0), LPARAM(0)) }
        {
            tracing::debug!("Failed to post taskbar detach: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_split() {
        let wparam = WPARAM(((THBN_CLICKED as usize) << 16) | 2);
        assert_eq!(hiword(wparam), THBN_CLICKED);
        assert_eq!(loword(wparam), 2);
    }

    #[test]
    fn test_tooltip_is_nul_terminated() {
        let tip = to_tooltip("Pause");
        assert_eq!(&tip[..5], "Pause".encode_utf16().collect::<Vec<_>>().as_slice());
        assert_eq!(tip[5], 0);

        let long = "x".repeat(400);
        let tip = to_tooltip(&long);
        assert_eq!(tip[259], 0);
    }
}
