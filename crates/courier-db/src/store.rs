use anyhow::Result;

use courier_types::{MailboxMessage, NewIdentity};

use crate::models::StoredMessage;

/// Outcome of creating an identity together with its mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    /// Another identity already owns this client secret
    SecretTaken,
    /// Another identity already owns this username
    UsernameTaken,
}

/// The durable store as seen by the relay.
///
/// Calls are blocking; the gateway runs them on tokio's blocking pool.
/// Every method is a single attempt: failures are reported, never retried.
pub trait Store: Send + Sync + 'static {
    fn identity_exists_by_secret(&self, secret: &[u8]) -> Result<bool>;

    fn username_for_secret(&self, secret: &[u8]) -> Result<Option<String>>;

    fn identity_exists_by_username(&self, username: &str) -> Result<bool>;

    /// Insert the identity and provision its empty mailbox, all or nothing.
    fn create_identity_and_mailbox(&self, identity: &NewIdentity) -> Result<Registration>;

    /// Delete the identity, its mailbox and all queued messages, all or nothing.
    fn delete_identity_and_mailbox(&self, username: &str) -> Result<()>;

    fn set_last_known_address(&self, username: &str, address: &str) -> Result<()>;

    /// Queued messages in arrival order.
    fn list_mailbox(&self, username: &str) -> Result<Vec<StoredMessage>>;

    fn delete_mailbox_message(&self, username: &str, message: &StoredMessage) -> Result<()>;

    fn enqueue_mailbox_message(&self, username: &str, message: &MailboxMessage) -> Result<()>;

    /// Liveness check. `Ok` means the store answered a trivial query.
    fn probe(&self) -> Result<()>;
}
