//! Multi-kind event dispatcher with owner-scoped listeners.
//!
//! [`EventDispatcher<K, E>`] generalizes [`Signal`](crate::Signal) to a set of
//! event kinds `K` sharing one payload type `E`. Listeners register for a
//! single kind and receive every payload fired for it.
//!
//! Besides anonymous listeners (removed through their [`ListenerId`]), a
//! listener may be registered under an [`OwnerTag`]. At most one listener
//! exists per `(kind, owner)` pair: registering again replaces the previous
//! slot, and all listeners of an owner can be dropped at once with
//! [`off_owner`](EventDispatcher::off_owner).
//!
//! ```
//! use lineup_core::{EventDispatcher, OwnerTag};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Kind { Dirty, Width }
//!
//! let events = EventDispatcher::<Kind, f64>::new();
//! let owner = OwnerTag::new();
//! events.on_owned(Kind::Width, owner, |w| println!("width {w}"));
//! events.fire(Kind::Width, &120.0);
//! assert_eq!(events.off_owner(owner), 1);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{CoreError, CoreResult};
use crate::logging::targets;

new_key_type! {
    /// Handle of a registered listener.
    pub struct ListenerId;
}

/// Identifies the subscriber that owns a group of listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerTag(u64);

impl OwnerTag {
    /// Allocate a process-unique owner tag.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw numeric value of this tag.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for OwnerTag {
    fn default() -> Self {
        Self::new()
    }
}

type Slot<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<K, E> {
    kind: K,
    owner: Option<OwnerTag>,
    slot: Slot<E>,
}

/// A typed publish/subscribe hub keyed by event kind.
pub struct EventDispatcher<K, E> {
    listeners: Mutex<SlotMap<ListenerId, Listener<K, E>>>,
    blocked: AtomicBool,
}

impl<K, E> Default for EventDispatcher<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    E: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> fmt::Debug for EventDispatcher<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listeners.lock().len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

impl<K, E> EventDispatcher<K, E>
where
    K: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    E: 'static,
{
    /// Create a dispatcher without listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Register an anonymous listener for `kind`.
    pub fn on<F>(&self, kind: K, slot: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.listeners.lock().insert(Listener {
            kind,
            owner: None,
            slot: Arc::new(slot),
        })
    }

    /// Register a listener for `kind` on behalf of `owner`.
    ///
    /// Any listener previously registered for the same `(kind, owner)` pair
    /// is replaced.
    pub fn on_owned<F>(&self, kind: K, owner: OwnerTag, slot: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        listeners.retain(|_, l| !(l.kind == kind && l.owner == Some(owner)));
        listeners.insert(Listener {
            kind,
            owner: Some(owner),
            slot: Arc::new(slot),
        })
    }

    /// Remove a listener by handle. Returns `false` if it was already gone.
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.lock().remove(id).is_some()
    }

    /// Remove a listener by handle, failing on stale handles.
    pub fn try_off(&self, id: ListenerId) -> CoreResult<()> {
        if self.off(id) {
            Ok(())
        } else {
            Err(CoreError::InvalidListener)
        }
    }

    /// Remove the listener registered for `(kind, owner)`.
    pub fn off_owned(&self, kind: K, owner: OwnerTag) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|_, l| !(l.kind == kind && l.owner == Some(owner)));
        listeners.len() != before
    }

    /// Remove every listener registered by `owner`, returning how many were dropped.
    pub fn off_owner(&self, owner: OwnerTag) -> usize {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|_, l| l.owner != Some(owner));
        before - listeners.len()
    }

    /// Remove all listeners.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.lock().values().filter(|l| l.kind == kind).count()
    }

    /// Whether anyone listens to `kind`.
    pub fn has_listeners(&self, kind: K) -> bool {
        self.listeners.lock().values().any(|l| l.kind == kind)
    }

    /// Suppress or resume delivery.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether delivery is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Deliver `event` to every listener of `kind`.
    pub fn fire(&self, kind: K, event: &E) {
        if self.is_blocked() {
            return;
        }
        let slots: Vec<Slot<E>> = self
            .listeners
            .lock()
            .values()
            .filter(|l| l.kind == kind)
            .map(|l| l.slot.clone())
            .collect();
        if slots.is_empty() {
            return;
        }
        tracing::trace!(target: targets::DISPATCH, ?kind, listeners = slots.len(), "firing event");
        for slot in slots {
            slot(event);
        }
    }

    /// Fire a list of kinds in order, building each payload with `make`.
    pub fn fire_all(&self, kinds: &[K], mut make: impl FnMut(K) -> E) {
        for &kind in kinds {
            if self.has_listeners(kind) {
                let event = make(kind);
                self.fire(kind, &event);
            }
        }
    }
}

static_assertions::assert_impl_all!(EventDispatcher<u8, String>: Send, Sync);
