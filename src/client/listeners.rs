//! Inbound message listener registry
//!
//! Listeners are plain callbacks. Dispatch takes a snapshot under the read
//! lock and invokes callbacks after releasing it, so a listener may add or
//! remove listeners without deadlocking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::client::types::InboundMessage;

/// Callback invoked for every inbound data message
pub type Listener = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Handle returned by `add`, used to remove the listener later
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Thread-safe listener map shared between the client handle and its task
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<ListenerId, Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().await.insert(id, listener);
        id
    }

    /// Returns false if `id` was not registered
    pub async fn remove(&self, id: ListenerId) -> bool {
        self.listeners.write().await.remove(&id).is_some()
    }

    pub async fn clear(&self) {
        self.listeners.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.listeners.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.read().await.is_empty()
    }

    /// Deliver `msg` to every registered listener in registration order
    ///
    /// Returns the number of listeners invoked.
    pub async fn dispatch(&self, msg: &InboundMessage) -> usize {
        let snapshot: Vec<Listener> = self.listeners.read().await.values().cloned().collect();
        for listener in &snapshot {
            listener(msg);
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
