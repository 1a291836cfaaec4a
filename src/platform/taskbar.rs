//! Taskbar transport buttons
//!
//! Three buttons (previous, play/pause, next) rendered by the OS into the
//! window's taskbar thumbnail. The OS widget may only be touched from the
//! window's UI thread, so state changes from other threads go through a
//! [`TaskbarHandle`]: it records the latest requested state and wakes the UI
//! thread, which drains and applies only that latest state. Rapid repeated
//! calls therefore coalesce into one redraw.
//!
//! The widget logic here is platform independent; the OS side sits behind
//! [`ThumbBar`] (icon conversion and button add/update) and [`UiWaker`]
//! (waking the UI thread). The Win32 implementation lives in `windows`.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::callback::CallbackSlot;
use crate::error::{BridgeError, Result};
use crate::settings::TaskbarLabels;

#[cfg(target_os = "windows")]
pub mod windows;

/// Button slot; the discriminant is the id reported on press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskbarButton {
    Previous = 0,
    PlayPause = 1,
    Next = 2,
}

impl TaskbarButton {
    pub const ALL: [TaskbarButton; 3] = [
        TaskbarButton::Previous,
        TaskbarButton::PlayPause,
        TaskbarButton::Next,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(TaskbarButton::Previous),
            1 => Some(TaskbarButton::PlayPause),
            2 => Some(TaskbarButton::Next),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportIcon {
    Previous,
    Next,
    Play,
    Pause,
}

/// State of one thumbnail button
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonDescriptor {
    pub button: TaskbarButton,
    pub enabled: bool,
    /// None when the icon failed to convert; the button shows its tooltip only
    pub icon: Option<TransportIcon>,
    pub tooltip: String,
}

/// Pixel row order of an icon buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// First row in the buffer is the top of the image
    TopDown,
    /// First row in the buffer is the bottom of the image
    BottomUp,
}

/// Raw icon pixels: 32-bit BGRA, straight (not premultiplied) alpha
#[derive(Debug, Clone, PartialEq)]
pub struct IconImage {
    pub width: u32,
    pub height: u32,
    pub row_order: RowOrder,
    pub bgra: Vec<u8>,
}

impl IconImage {
    pub fn from_bgra(width: u32, height: u32, row_order: RowOrder, bgra: Vec<u8>) -> Result<Self> {
        check_len(width, height, bgra.len())?;
        Ok(Self {
            width,
            height,
            row_order,
            bgra,
        })
    }

    /// From top-down RGBA with straight alpha
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        check_len(width, height, rgba.len())?;
        let bgra = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0], px[3]])
            .collect();
        Ok(Self {
            width,
            height,
            row_order: RowOrder::TopDown,
            bgra,
        })
    }

    /// From top-down RGBA with premultiplied alpha
    pub fn from_premultiplied_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        check_len(width, height, rgba.len())?;
        let unpremultiply = |c: u8, a: u8| -> u8 {
            if a == 0 {
                c
            } else {
                ((c as u16 * 0xFF) / a as u16).min(0xFF) as u8
            }
        };
        let bgra = rgba
            .chunks_exact(4)
            .flat_map(|px| {
                let a = px[3];
                [
                    unpremultiply(px[2], a),
                    unpremultiply(px[1], a),
                    unpremultiply(px[0], a),
                    a,
                ]
            })
            .collect();
        Ok(Self {
            width,
            height,
            row_order: RowOrder::TopDown,
            bgra,
        })
    }

    /// Decode a PNG or JPEG file image
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| BridgeError::FormatMismatch(format!("icon image: {}", e)))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Self::from_rgba(width, height, image.as_raw())
    }

    /// Rows in top-down order regardless of how they are stored
    pub fn top_down_bgra(&self) -> std::borrow::Cow<'_, [u8]> {
        match self.row_order {
            RowOrder::TopDown => std::borrow::Cow::Borrowed(&self.bgra),
            RowOrder::BottomUp => {
                let stride = self.width as usize * 4;
                let mut rows = Vec::with_capacity(self.bgra.len());
                for row in self.bgra.chunks_exact(stride).rev() {
                    rows.extend_from_slice(row);
                }
                std::borrow::Cow::Owned(rows)
            }
        }
    }
}

fn check_len(width: u32, height: u32, len: usize) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || len != expected {
        return Err(BridgeError::FormatMismatch(format!(
            "icon buffer is {} bytes, expected {} for {}x{}",
            len, expected, width, height
        )));
    }
    Ok(())
}

/// Icons supplied once at initialization; any may be missing
#[derive(Debug, Clone, Default)]
pub struct IconSet {
    pub previous: Option<IconImage>,
    pub next: Option<IconImage>,
    pub play: Option<IconImage>,
    pub pause: Option<IconImage>,
}

impl IconSet {
    fn iter(&self) -> impl Iterator<Item = (TransportIcon, &IconImage)> {
        [
            (TransportIcon::Previous, self.previous.as_ref()),
            (TransportIcon::Next, self.next.as_ref()),
            (TransportIcon::Play, self.play.as_ref()),
            (TransportIcon::Pause, self.pause.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, image)| image.map(|image| (kind, image)))
    }
}

/// OS thumbnail toolbar. Only ever called on the window's UI thread.
pub trait ThumbBar {
    /// Convert an icon into an OS handle and keep it
    fn load_icon(&mut self, icon: TransportIcon, image: &IconImage) -> Result<()>;
    fn add_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()>;
    /// Redraw all buttons in one batch
    fn update_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()>;
}

/// Wakes the UI thread so it drains the pending state
pub trait UiWaker: Send + Sync {
    fn wake(&self) -> Result<()>;
}

const PENDING_NONE: u8 = 0;
const PENDING_PAUSED: u8 = 1;
const PENDING_PLAYING: u8 = 2;

/// Latest requested state plus a single-slot wake queue
#[derive(Debug)]
struct Pending {
    state: AtomicU8,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Pending {
    fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        Self {
            state: AtomicU8::new(PENDING_NONE),
            wake_tx,
            wake_rx,
        }
    }

    /// Take the latest state. The wake token goes first so a store racing
    /// with this drain either lands here or schedules another wake.
    fn take(&self) -> Option<bool> {
        let _ = self.wake_rx.try_recv();
        match self.state.swap(PENDING_NONE, Ordering::AcqRel) {
            PENDING_PLAYING => Some(true),
            PENDING_PAUSED => Some(false),
            _ => None,
        }
    }
}

/// Thread-safe entry point for changing the play/pause button
#[derive(Clone)]
pub struct TaskbarHandle {
    pending: Arc<Pending>,
    waker: Arc<dyn UiWaker>,
}

impl std::fmt::Debug for TaskbarHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskbarHandle").finish()
    }
}

impl TaskbarHandle {
    /// Record the state and wake the UI thread; callable from any thread
    pub fn set_is_playing(&self, playing: bool) -> Result<()> {
        let state = if playing {
            PENDING_PLAYING
        } else {
            PENDING_PAUSED
        };
        self.pending.state.store(state, Ordering::Release);
        match self.pending.wake_tx.try_send(()) {
            Ok(()) => {
                if let Err(e) = self.waker.wake() {
                    // Nobody will drain this token, free the slot for the next call
                    let _ = self.pending.wake_rx.try_recv();
                    return Err(e);
                }
                Ok(())
            }
            // A wake is already queued and will pick up the new state
            Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => {
                Err(BridgeError::Unavailable("taskbar UI thread".to_string()))
            }
        }
    }
}

/// Taskbar buttons as seen from outside the UI thread
pub trait TransportButtons: Send + Sync {
    fn set_is_playing(&self, playing: bool) -> Result<()>;
    fn shutdown(&self) {}
}

#[derive(Debug, Default)]
pub struct NoopTransportButtons;

impl TransportButtons for NoopTransportButtons {
    fn set_is_playing(&self, _playing: bool) -> Result<()> {
        Ok(())
    }
}

/// Create the buttons on the host window.
///
/// Must run on the thread that owns `hwnd`.
#[cfg(target_os = "windows")]
pub fn start(
    hwnd: Option<isize>,
    labels: TaskbarLabels,
    icons: &IconSet,
    presses: Arc<CallbackSlot<TaskbarButton>>,
) -> Result<Box<dyn TransportButtons>> {
    let hwnd = hwnd.ok_or_else(|| BridgeError::init("taskbar buttons", "no window handle"))?;
    Ok(Box::new(windows::WindowsTaskbar::init(
        hwnd, labels, icons, presses,
    )?))
}

#[cfg(not(target_os = "windows"))]
pub fn start(
    _hwnd: Option<isize>,
    _labels: TaskbarLabels,
    _icons: &IconSet,
    _presses: Arc<CallbackSlot<TaskbarButton>>,
) -> Result<Box<dyn TransportButtons>> {
    Err(BridgeError::PlatformUnsupported("taskbar buttons"))
}

/// Button state machine, owned by the UI thread
pub struct TaskbarTransportWidget<B: ThumbBar> {
    bar: B,
    labels: TaskbarLabels,
    buttons: [ButtonDescriptor; 3],
    loaded: HashSet<TransportIcon>,
    playing: bool,
    /// Buttons have been added to the thumbnail
    attached: bool,
    pending: Arc<Pending>,
    presses: Arc<CallbackSlot<TaskbarButton>>,
}

impl<B: ThumbBar> TaskbarTransportWidget<B> {
    /// Convert the icons and lay out the buttons in the paused state.
    ///
    /// An icon that fails to convert is logged and left out; the others
    /// still load.
    pub fn new(
        mut bar: B,
        labels: TaskbarLabels,
        icons: &IconSet,
        presses: Arc<CallbackSlot<TaskbarButton>>,
    ) -> Self {
        let mut loaded = HashSet::new();
        for (kind, image) in icons.iter() {
            match bar.load_icon(kind, image) {
                Ok(()) => {
                    loaded.insert(kind);
                }
                Err(e) => tracing::warn!("Failed to convert {:?} taskbar icon: {}", kind, e),
            }
        }

        let icon = |kind: TransportIcon| loaded.contains(&kind).then_some(kind);
        let buttons = [
            ButtonDescriptor {
                button: TaskbarButton::Previous,
                enabled: true,
                icon: icon(TransportIcon::Previous),
                tooltip: labels.previous.clone(),
            },
            ButtonDescriptor {
                button: TaskbarButton::PlayPause,
                enabled: true,
                icon: icon(TransportIcon::Play),
                tooltip: labels.play.clone(),
            },
            ButtonDescriptor {
                button: TaskbarButton::Next,
                enabled: true,
                icon: icon(TransportIcon::Next),
                tooltip: labels.next.clone(),
            },
        ];

        Self {
            bar,
            labels,
            buttons,
            loaded,
            playing: false,
            attached: false,
            pending: Arc::new(Pending::new()),
            presses,
        }
    }

    /// Add the buttons to the window's thumbnail
    pub fn attach(&mut self) -> Result<()> {
        self.bar.add_buttons(&self.buttons)?;
        self.attached = true;
        Ok(())
    }

    /// Attach now if the OS accepts it, otherwise wait for the next
    /// taskbar-created notification. Returns whether the buttons are shown.
    pub fn attach_or_defer(&mut self) -> bool {
        match self.attach() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Taskbar buttons deferred until the taskbar is ready: {}", e);
                false
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn handle(&self, waker: Arc<dyn UiWaker>) -> TaskbarHandle {
        TaskbarHandle {
            pending: self.pending.clone(),
            waker,
        }
    }

    /// Apply the latest pending state, if any. Returns whether a redraw ran.
    pub fn drain(&mut self) -> bool {
        let Some(playing) = self.pending.take() else {
            return false;
        };
        self.playing = playing;

        let (icon, tooltip) = if playing {
            (TransportIcon::Pause, &self.labels.pause)
        } else {
            (TransportIcon::Play, &self.labels.play)
        };
        let slot = &mut self.buttons[TaskbarButton::PlayPause as usize];
        slot.icon = self.loaded.contains(&icon).then_some(icon);
        slot.tooltip = tooltip.clone();

        // Not shown yet; `attach` will add the buttons in this state
        if !self.attached {
            return true;
        }
        if let Err(e) = self.bar.update_buttons(&self.buttons) {
            tracing::debug!("Failed to update taskbar buttons: {}", e);
        }
        true
    }

    /// Forward a press reported by the OS; unknown ids are ignored
    pub fn press(&self, id: u32) -> bool {
        match TaskbarButton::from_id(id) {
            Some(button) => {
                tracing::debug!("Taskbar button pressed: {:?}", button);
                self.presses.dispatch(button)
            }
            None => false,
        }
    }

    pub fn buttons(&self) -> &[ButtonDescriptor; 3] {
        &self.buttons
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn bar(&self) -> &B {
        &self.bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FakeBar {
        fail_icon: Option<TransportIcon>,
        /// Number of add calls to reject, like a window not yet shown
        reject_adds: usize,
        added: Vec<Vec<ButtonDescriptor>>,
        updates: Vec<Vec<ButtonDescriptor>>,
    }

    impl ThumbBar for FakeBar {
        fn load_icon(&mut self, icon: TransportIcon, _image: &IconImage) -> Result<()> {
            if self.fail_icon == Some(icon) {
                return Err(BridgeError::init("icon", "CreateIconIndirect failed"));
            }
            Ok(())
        }

        fn add_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()> {
            if self.reject_adds > 0 {
                self.reject_adds -= 1;
                return Err(BridgeError::init("taskbar buttons", "E_FAIL"));
            }
            self.added.push(buttons.to_vec());
            Ok(())
        }

        fn update_buttons(&mut self, buttons: &[ButtonDescriptor]) -> Result<()> {
            self.updates.push(buttons.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingWaker {
        wakes: AtomicUsize,
        fail: bool,
    }

    impl UiWaker for CountingWaker {
        fn wake(&self) -> Result<()> {
            if self.fail {
                return Err(BridgeError::Unavailable("window".into()));
            }
            self.wakes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn icon() -> IconImage {
        IconImage::from_rgba(1, 1, &[10, 20, 30, 255]).unwrap()
    }

    fn full_icons() -> IconSet {
        IconSet {
            previous: Some(icon()),
            next: Some(icon()),
            play: Some(icon()),
            pause: Some(icon()),
        }
    }

    fn widget(bar: FakeBar) -> TaskbarTransportWidget<FakeBar> {
        TaskbarTransportWidget::new(
            bar,
            TaskbarLabels::default(),
            &full_icons(),
            Arc::new(CallbackSlot::default()),
        )
    }

    #[test]
    fn test_initial_layout() {
        let mut w = widget(FakeBar::default());
        w.attach().unwrap();
        let added = &w.bar().added[0];
        assert_eq!(added.len(), 3);
        assert_eq!(added[0].tooltip, "Previous");
        assert_eq!(added[1].icon, Some(TransportIcon::Play));
        assert_eq!(added[1].tooltip, "Play");
        assert_eq!(added[2].icon, Some(TransportIcon::Next));
        assert!(added.iter().all(|b| b.enabled));
    }

    #[test]
    fn test_early_attach_is_deferred() {
        let mut w = widget(FakeBar {
            reject_adds: 1,
            ..Default::default()
        });
        assert!(!w.attach_or_defer());
        assert!(!w.is_attached());

        let handle = w.handle(Arc::new(CountingWaker::default()));
        handle.set_is_playing(true).unwrap();
        assert!(w.drain());
        assert!(w.bar().updates.is_empty());

        // Taskbar-created arrives later
        assert!(w.attach_or_defer());
        let added = &w.bar().added[0];
        assert_eq!(added[1].icon, Some(TransportIcon::Pause));
        assert_eq!(added[1].tooltip, "Pause");
    }

    #[test]
    fn test_playing_shows_pause() {
        let mut w = widget(FakeBar::default());
        w.attach().unwrap();
        let waker = Arc::new(CountingWaker::default());
        let handle = w.handle(waker.clone());

        handle.set_is_playing(true).unwrap();
        assert!(w.drain());
        let labels = TaskbarLabels::default();
        let play_pause = &w.buttons()[1];
        assert_eq!(play_pause.tooltip, labels.pause);
        assert_eq!(play_pause.icon, Some(TransportIcon::Pause));

        handle.set_is_playing(false).unwrap();
        assert!(w.drain());
        let play_pause = &w.buttons()[1];
        assert_eq!(play_pause.tooltip, labels.play);
        assert_eq!(play_pause.icon, Some(TransportIcon::Play));

        // One batched redraw of all three buttons per drain
        assert_eq!(w.bar().updates.len(), 2);
        assert!(w.bar().updates.iter().all(|u| u.len() == 3));
    }

    #[test]
    fn test_rapid_calls_coalesce_to_latest() {
        let mut w = widget(FakeBar::default());
        w.attach().unwrap();
        let waker = Arc::new(CountingWaker::default());
        let handle = w.handle(waker.clone());

        handle.set_is_playing(true).unwrap();
        handle.set_is_playing(false).unwrap();
        handle.set_is_playing(true).unwrap();
        assert_eq!(waker.wakes.load(Ordering::SeqCst), 1);

        assert!(w.drain());
        assert!(w.is_playing());
        assert!(!w.drain());
        assert_eq!(w.bar().updates.len(), 1);
    }

    #[test]
    fn test_calls_from_other_threads() {
        let mut w = widget(FakeBar::default());
        let handle = w.handle(Arc::new(CountingWaker::default()));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let h = handle.clone();
                std::thread::spawn(move || h.set_is_playing(true).unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(w.drain());
        assert_eq!(w.buttons()[1].icon, Some(TransportIcon::Pause));
    }

    #[test]
    fn test_failed_wake_does_not_block_later_wakes() {
        let mut w = widget(FakeBar::default());
        let failing = w.handle(Arc::new(CountingWaker {
            fail: true,
            ..Default::default()
        }));
        assert!(failing.set_is_playing(true).is_err());

        let waker = Arc::new(CountingWaker::default());
        let handle = w.handle(waker.clone());
        handle.set_is_playing(false).unwrap();
        assert_eq!(waker.wakes.load(Ordering::SeqCst), 1);
        assert!(w.drain());
        assert!(!w.is_playing());
    }

    #[test]
    fn test_icon_failure_keeps_other_icons() {
        let mut w = widget(FakeBar {
            fail_icon: Some(TransportIcon::Pause),
            ..Default::default()
        });
        assert_eq!(w.buttons()[0].icon, Some(TransportIcon::Previous));
        assert_eq!(w.buttons()[1].icon, Some(TransportIcon::Play));

        let handle = w.handle(Arc::new(CountingWaker::default()));
        handle.set_is_playing(true).unwrap();
        w.drain();
        assert_eq!(w.buttons()[1].icon, None);
        assert_eq!(w.buttons()[1].tooltip, "Pause");
    }

    #[test]
    fn test_press_forwards_button() {
        let presses = Arc::new(CallbackSlot::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        presses.register(move |b| sink.lock().push(b));
        let w = TaskbarTransportWidget::new(
            FakeBar::default(),
            TaskbarLabels::default(),
            &IconSet::default(),
            presses,
        );

        assert!(w.press(0));
        assert!(w.press(1));
        assert!(w.press(2));
        assert!(!w.press(7));
        assert_eq!(
            seen.lock().as_slice(),
            &[
                TaskbarButton::Previous,
                TaskbarButton::PlayPause,
                TaskbarButton::Next
            ]
        );
    }

    #[test]
    fn test_icon_conversions() {
        let straight = IconImage::from_rgba(1, 1, &[200, 100, 50, 128]).unwrap();
        assert_eq!(straight.bgra, vec![50, 100, 200, 128]);

        let pre = IconImage::from_premultiplied_rgba(1, 1, &[64, 32, 0, 128]).unwrap();
        assert_eq!(pre.bgra, vec![0, 63, 127, 128]);

        let transparent = IconImage::from_premultiplied_rgba(1, 1, &[0, 0, 0, 0]).unwrap();
        assert_eq!(transparent.bgra, vec![0, 0, 0, 0]);

        assert!(IconImage::from_rgba(2, 2, &[0; 12]).is_err());
        assert!(IconImage::from_bgra(0, 0, RowOrder::TopDown, vec![]).is_err());
    }

    #[test]
    fn test_bottom_up_rows_are_flipped() {
        let image = IconImage::from_bgra(
            1,
            2,
            RowOrder::BottomUp,
            vec![1, 1, 1, 1, 2, 2, 2, 2],
        )
        .unwrap();
        assert_eq!(image.top_down_bgra().as_ref(), &[2, 2, 2, 2, 1, 1, 1, 1]);
    }
}
