use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message waiting in an offline recipient's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub sender: String,
}

/// Identity record written at registration.
/// The relay only ever holds the secret hash and username transiently.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub client_secret: Vec<u8>,
    pub username: String,
    pub name: String,
    pub last_address: Option<String>,
}
