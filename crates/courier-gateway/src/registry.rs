use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::connection::ConnectionHandle;
use crate::notify::{Notice, Notifier};

/// Who is online right now: username -> live connection handle.
///
/// Every operation takes the single map lock, so a check and the write that
/// depends on it always see the same snapshot. Handles are closed after the
/// lock is released; a slow peer never stalls the registry.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    online: Mutex<HashMap<String, ConnectionHandle>>,
    notifier: Arc<dyn Notifier>,
}

impl PresenceRegistry {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                online: Mutex::new(HashMap::new()),
                notifier,
            }),
        }
    }

    /// Insert or overwrite the entry for `username`. A displaced handle for a
    /// different connection is closed.
    pub async fn add(&self, username: &str, handle: ConnectionHandle) {
        let new_id = handle.id();
        let (displaced, online) = {
            let mut map = self.inner.online.lock().await;
            let displaced = map.insert(username.to_string(), handle);
            (displaced, map.len())
        };

        debug!(online, "{} added to presence registry", username);
        self.inner.notifier.notify(Notice::Online {
            username: username.to_string(),
        });

        if let Some(old) = displaced.filter(|old| old.id() != new_id) {
            old.close().await;
        }
    }

    /// Insert `username` only if it is not online yet. Returns false, leaving
    /// the registry untouched, when another connection already holds it.
    pub async fn join(&self, username: &str, handle: ConnectionHandle) -> bool {
        let online = {
            let mut map = self.inner.online.lock().await;
            if map.contains_key(username) {
                return false;
            }
            map.insert(username.to_string(), handle);
            map.len()
        };

        debug!(online, "{} joined presence registry", username);
        self.inner.notifier.notify(Notice::Online {
            username: username.to_string(),
        });
        true
    }

    /// Remove `username` whatever connection it holds, closing that handle.
    /// Returns whether an entry existed; removing twice is harmless.
    pub async fn remove(&self, username: &str) -> bool {
        let (removed, online) = {
            let mut map = self.inner.online.lock().await;
            let removed = map.remove(username);
            (removed, map.len())
        };

        match removed {
            Some(handle) => {
                self.removed(username, handle, online).await;
                true
            }
            None => false,
        }
    }

    /// Remove `username` only if its entry belongs to connection `conn_id`.
    /// Used by a session tearing itself down, so it cannot evict a newer
    /// session of the same user.
    pub async fn remove_connection(&self, username: &str, conn_id: Uuid) -> bool {
        let (removed, online) = {
            let mut map = self.inner.online.lock().await;
            let owned = map.get(username).is_some_and(|h| h.id() == conn_id);
            let removed = if owned { map.remove(username) } else { None };
            (removed, map.len())
        };

        match removed {
            Some(handle) => {
                self.removed(username, handle, online).await;
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.inner.online.lock().await.contains_key(username)
    }

    /// Whether `username` is online through connection `conn_id`.
    pub async fn is_current(&self, username: &str, conn_id: Uuid) -> bool {
        self.inner
            .online
            .lock()
            .await
            .get(username)
            .is_some_and(|h| h.id() == conn_id)
    }

    pub async fn get(&self, username: &str) -> Option<ConnectionHandle> {
        self.inner.online.lock().await.get(username).cloned()
    }

    pub async fn size(&self) -> usize {
        self.inner.online.lock().await.len()
    }

    async fn removed(&self, username: &str, handle: ConnectionHandle, online: usize) {
        handle.close().await;
        debug!(online, "{} removed from presence registry", username);
        self.inner.notifier.notify(Notice::Offline {
            username: username.to_string(),
        });
    }
}
