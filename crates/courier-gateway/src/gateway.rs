use std::sync::Arc;

use tracing::{debug, info, warn};

use courier_db::Store;

use crate::connection::Connection;
use crate::error::SessionError;
use crate::notify::{Notice, Notifier};
use crate::registry::PresenceRegistry;
use crate::store::StoreHandle;
use crate::supervisor::Gate;

/// The three session types, one per WebSocket route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Messaging,
    Registration,
    Deletion,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Messaging => "/messaging",
            Self::Registration => "/registration",
            Self::Deletion => "/deletion",
        }
    }
}

/// Shared state of the relay, cloned into every connection task.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    store: StoreHandle,
    registry: PresenceRegistry,
    notifier: Arc<dyn Notifier>,
    gate: Gate,
}

impl Gateway {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                store: StoreHandle::new(store),
                registry: PresenceRegistry::new(notifier.clone()),
                notifier,
                gate: Gate::default(),
            }),
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    pub fn gate(&self) -> &Gate {
        &self.inner.gate
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.inner.notifier.as_ref()
    }

    /// Admission path for every accepted connection. A closed gate drops the
    /// connection before any protocol frame is read or written.
    pub async fn handle(&self, endpoint: Endpoint, conn: Connection) {
        if !self.gate().is_open() {
            debug!(
                "Gate closed, refusing {} connection from {}",
                endpoint.path(),
                conn.remote_addr()
            );
            conn.close().await;
            return;
        }

        match endpoint {
            Endpoint::Messaging => self.relay(conn).await,
            Endpoint::Registration => self.register(conn).await,
            Endpoint::Deletion => self.deregister(conn).await,
        }
    }

    /// Log a session failure. Refusals answered with a flag are routine;
    /// everything else also fires the error notice.
    pub(crate) fn report(&self, err: &SessionError) {
        match err {
            SessionError::Rejected { .. } => {
                info!(category = err.category(), scope = err.scope(), "{}", err);
            }
            _ => {
                warn!(category = err.category(), scope = err.scope(), "{}", err);
                self.notifier().notify(Notice::Error {
                    category: err.category(),
                });
            }
        }
    }
}
