use std::sync::Arc;

use courier_db::Store;

use crate::error::SessionError;

/// Async face of the blocking [`Store`]: every call runs on tokio's
/// blocking pool so sessions never stall a runtime worker.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn Store>,
}

impl StoreHandle {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run `f` against the store; failures are tagged with `scope`.
    pub async fn call<T, F>(&self, scope: &'static str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&dyn Store) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| SessionError::Store {
                scope,
                cause: anyhow::anyhow!("store task failed: {}", e),
            })?
            .map_err(|cause| SessionError::Store { scope, cause })
    }

    pub async fn probe(&self) -> anyhow::Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.probe()).await?
    }
}
