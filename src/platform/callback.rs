//! Replaceable host callback shared between an OS callback thread and the host

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// One registered handler; registering again replaces it
pub struct CallbackSlot<T> {
    handler: RwLock<Option<Handler<T>>>,
}

impl<T> Default for CallbackSlot<T> {
    fn default() -> Self {
        Self {
            handler: RwLock::new(None),
        }
    }
}

impl<T> std::fmt::Debug for CallbackSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

impl<T> CallbackSlot<T> {
    pub fn clear(&self) {
        *self.handler.write() = None;
    }

    pub fn is_registered(&self) -> bool {
        self.handler.read().is_some()
    }
}

impl<T: Send + 'static> CallbackSlot<T> {
    pub fn register<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Install a handler that forwards into a channel and return its receiver
    pub fn channel(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(move |value| {
            let _ = tx.send(value);
        });
        rx
    }

    /// Invoke the handler on the calling thread; false when none is registered.
    ///
    /// The lock is released before the handler runs, so a handler may
    /// re-register.
    pub fn dispatch(&self, value: T) -> bool {
        let handler = self.handler.read().clone();
        match handler {
            Some(handler) => {
                handler(value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_without_handler() {
        let slot = CallbackSlot::<u32>::default();
        assert!(!slot.dispatch(1));
    }

    #[test]
    fn test_register_replaces_previous() {
        let slot = CallbackSlot::<u32>::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        slot.register(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        slot.register(move |v| {
            s.fetch_add(v as usize, Ordering::SeqCst);
        });

        assert!(slot.dispatch(5));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_channel_forwards_in_order() {
        let slot = CallbackSlot::<u32>::default();
        let mut rx = slot.channel();
        slot.dispatch(1);
        slot.dispatch(2);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), 2);
    }

    #[test]
    fn test_clear() {
        let slot = CallbackSlot::<u32>::default();
        slot.register(|_| {});
        slot.clear();
        assert!(!slot.is_registered());
    }

    #[test]
    fn test_debug_for_non_send_payload() {
        // Rc is neither Send nor Sync
        let slot = CallbackSlot::<std::rc::Rc<u32>>::default();
        assert!(format!("{:?}", slot).contains("registered: false"));
        slot.clear();
    }
}
