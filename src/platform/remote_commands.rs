//! Remote command routing
//!
//! OS transport events (media keys, Control Center, MPRIS clients, SMTC) are
//! turned into [`RemoteCommand`]s by the now playing backends and handed to
//! the router, which calls the host handler synchronously on the delivering
//! thread. That thread usually is not the host's UI thread, so handlers must
//! either be thread-safe or queue the command; [`RemoteCommandRouter::channel`]
//! does the latter.
//!
//! There is one handler per router. Registering again replaces it; there is
//! no separate unregister beyond [`RemoteCommandRouter::clear`].

use tokio::sync::mpsc;

use super::callback::CallbackSlot;
use crate::model::{LoopMode, RemoteCommand};

/// Transport event as delivered by an OS callback, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OsTransportEvent {
    Play,
    Pause,
    Stop,
    Toggle,
    Next,
    Previous,
    /// Absolute position in seconds
    SetPosition(f64),
    /// Relative offset in seconds
    SeekBy(f64),
    Raise,
    Quit,
    /// Volume from 0.0 to 1.0
    SetVolume(f64),
    SetLoopMode(LoopMode),
}

impl From<OsTransportEvent> for RemoteCommand {
    fn from(event: OsTransportEvent) -> Self {
        match event {
            OsTransportEvent::Play => RemoteCommand::Play,
            OsTransportEvent::Pause => RemoteCommand::Pause,
            OsTransportEvent::Stop => RemoteCommand::Stop,
            OsTransportEvent::Toggle => RemoteCommand::Toggle,
            OsTransportEvent::Next => RemoteCommand::NextTrack,
            OsTransportEvent::Previous => RemoteCommand::PreviousTrack,
            OsTransportEvent::SetPosition(secs) => RemoteCommand::Seek(secs),
            OsTransportEvent::SeekBy(secs) => RemoteCommand::SeekBy(secs),
            OsTransportEvent::Raise => RemoteCommand::Raise,
            OsTransportEvent::Quit => RemoteCommand::Quit,
            OsTransportEvent::SetVolume(volume) => RemoteCommand::SetVolume(volume),
            OsTransportEvent::SetLoopMode(mode) => RemoteCommand::SetLoopMode(mode),
        }
    }
}

#[derive(Debug, Default)]
pub struct RemoteCommandRouter {
    slot: CallbackSlot<RemoteCommand>,
}

impl RemoteCommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, handler: F)
    where
        F: Fn(RemoteCommand) + Send + Sync + 'static,
    {
        self.slot.register(handler);
    }

    pub fn clear(&self) {
        self.slot.clear();
    }

    /// Whether someone is listening; surfaces use it for CanRaise/CanQuit
    pub fn is_registered(&self) -> bool {
        self.slot.is_registered()
    }

    /// Route commands into a channel for the host to drain on its own thread
    pub fn channel(&self) -> mpsc::UnboundedReceiver<RemoteCommand> {
        self.slot.channel()
    }

    /// Entry point for OS callbacks
    pub fn deliver(&self, event: OsTransportEvent) {
        let command = RemoteCommand::from(event);
        tracing::debug!("Remote command received: {:?}", command);
        if !self.slot.dispatch(command) {
            tracing::debug!("No handler registered, dropping {:?}", command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_router() -> (RemoteCommandRouter, Arc<Mutex<Vec<RemoteCommand>>>) {
        let router = RemoteCommandRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        router.register(move |cmd| sink.lock().push(cmd));
        (router, seen)
    }

    #[test]
    fn test_seek_keeps_exact_value() {
        let (router, seen) = recording_router();
        router.deliver(OsTransportEvent::SetPosition(42.5));
        assert_eq!(seen.lock().as_slice(), &[RemoteCommand::Seek(42.5)]);
        assert_eq!(seen.lock()[0].value(), Some(42.5));
    }

    #[test]
    fn test_play_has_no_payload() {
        let (router, seen) = recording_router();
        router.deliver(OsTransportEvent::Play);
        assert_eq!(seen.lock()[0], RemoteCommand::Play);
        assert_eq!(seen.lock()[0].value(), None);
    }

    #[test]
    fn test_every_event_maps() {
        let (router, seen) = recording_router();
        for event in [
            OsTransportEvent::Pause,
            OsTransportEvent::Stop,
            OsTransportEvent::Toggle,
            OsTransportEvent::Next,
            OsTransportEvent::Previous,
            OsTransportEvent::SeekBy(-10.0),
            OsTransportEvent::Raise,
            OsTransportEvent::Quit,
            OsTransportEvent::SetVolume(0.25),
            OsTransportEvent::SetLoopMode(LoopMode::Playlist),
        ] {
            router.deliver(event);
        }
        assert_eq!(
            seen.lock().as_slice(),
            &[
                RemoteCommand::Pause,
                RemoteCommand::Stop,
                RemoteCommand::Toggle,
                RemoteCommand::NextTrack,
                RemoteCommand::PreviousTrack,
                RemoteCommand::SeekBy(-10.0),
                RemoteCommand::Raise,
                RemoteCommand::Quit,
                RemoteCommand::SetVolume(0.25),
                RemoteCommand::SetLoopMode(LoopMode::Playlist),
            ]
        );
    }

    #[test]
    fn test_is_registered_follows_handler() {
        let router = RemoteCommandRouter::new();
        assert!(!router.is_registered());
        let _rx = router.channel();
        assert!(router.is_registered());
        router.clear();
        assert!(!router.is_registered());
    }

    #[test]
    fn test_delivery_from_another_thread() {
        let router = Arc::new(RemoteCommandRouter::new());
        let mut rx = router.channel();
        let r = router.clone();
        std::thread::spawn(move || r.deliver(OsTransportEvent::Next))
            .join()
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), RemoteCommand::NextTrack);
    }

    #[test]
    fn test_unhandled_commands_are_dropped() {
        let router = RemoteCommandRouter::new();
        router.deliver(OsTransportEvent::Play);
        let mut rx = router.channel();
        assert!(rx.try_recv().is_err());
    }
}
