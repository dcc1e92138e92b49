/// Database row types. These map directly to SQLite rows and stay
/// independent of the wire types in courier-types.
use courier_types::MailboxMessage;

/// A mailbox row. The id is what deletion keys on, so two identical
/// messages from the same sender are still delivered twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: i64,
    pub message: MailboxMessage,
}
