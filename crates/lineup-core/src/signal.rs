//! Provider-level notifications.
//!
//! Column and ranking changes travel through the
//! [`EventDispatcher`](crate::EventDispatcher), which knows about event kinds
//! and owners. A [`Signal`] is the simpler channel a data provider exposes
//! for one notification with one payload shape, such as the rankings being
//! added or the selection changing.
//!
//! ```
//! use lineup_core::Signal;
//!
//! let selection_changed = Signal::<Vec<usize>>::new();
//! let listener = selection_changed.connect(|rows| assert_eq!(rows, &[1, 4]));
//! selection_changed.emit(vec![1, 4]);
//! assert!(selection_changed.disconnect(listener));
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Handle returned by [`Signal::connect`].
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A notification with any number of listeners.
///
/// Listeners run in connection order on the emitting thread, after the
/// listener table has been released. A listener may therefore connect or
/// disconnect while it runs; the change applies from the next emission.
pub struct Signal<Args> {
    slots: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("listeners", &self.connection_count())
            .finish()
    }
}

impl<Args: 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
        }
    }

    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.slots.lock().insert(Arc::new(slot))
    }

    /// `false` if the listener was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn emit(&self, args: Args) {
        let listeners: Vec<Slot<Args>> = self.slots.lock().values().cloned().collect();
        if listeners.is_empty() {
            return;
        }
        tracing::trace!(target: targets::SIGNAL, listeners = listeners.len(), "notify");
        for listener in &listeners {
            listener(&args);
        }
    }
}

static_assertions::assert_impl_all!(Signal<Vec<usize>>: Send, Sync);
