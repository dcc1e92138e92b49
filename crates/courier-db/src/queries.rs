use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use courier_types::{MailboxMessage, NewIdentity};

use crate::Database;
use crate::models::StoredMessage;
use crate::store::{Registration, Store};

impl Store for Database {
    // -- Identities --

    fn identity_exists_by_secret(&self, secret: &[u8]) -> Result<bool> {
        self.with_conn(|conn| secret_exists(conn, secret))
    }

    fn username_for_secret(&self, secret: &[u8]) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username FROM identities WHERE client_secret = ?1",
                [secret],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn identity_exists_by_username(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| username_exists(conn, username))
    }

    fn create_identity_and_mailbox(&self, identity: &NewIdentity) -> Result<Registration> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Re-checked inside the transaction: the pre-checks done by the
            // register session may be stale by now.
            if secret_exists(&tx, &identity.client_secret)? {
                return Ok(Registration::SecretTaken);
            }
            if username_exists(&tx, &identity.username)? {
                return Ok(Registration::UsernameTaken);
            }

            let inserted = tx.execute(
                "INSERT INTO identities (username, client_secret, name, last_address) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    identity.username,
                    identity.client_secret,
                    identity.name.trim(),
                    identity.last_address
                ],
            );
            if let Err(rusqlite::Error::SqliteFailure(e, _)) = &inserted {
                if let Some(conflict) = registration_conflict(e) {
                    return Ok(conflict);
                }
            }
            inserted?;
            tx.execute(
                "INSERT INTO mailboxes (username) VALUES (?1)",
                [&identity.username],
            )?;

            tx.commit()?;
            Ok(Registration::Created)
        })
    }

    fn delete_identity_and_mailbox(&self, username: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM mailbox_messages WHERE username = ?1", [username])?;
            tx.execute("DELETE FROM mailboxes WHERE username = ?1", [username])?;
            let deleted = tx.execute("DELETE FROM identities WHERE username = ?1", [username])?;
            if deleted == 0 {
                // Dropping the transaction rolls back the two deletes above
                return Err(anyhow!("Identity not found: {}", username));
            }

            tx.commit()?;
            Ok(())
        })
    }

    fn set_last_known_address(&self, username: &str, address: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE identities SET last_address = ?1 WHERE username = ?2",
                (address, username),
            )?;
            Ok(())
        })
    }

    // -- Mailboxes --

    fn list_mailbox(&self, username: &str) -> Result<Vec<StoredMessage>> {
        self.with_conn(|conn| query_mailbox(conn, username))
    }

    fn delete_mailbox_message(&self, username: &str, message: &StoredMessage) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM mailbox_messages WHERE id = ?1 AND username = ?2",
                rusqlite::params![message.id, username],
            )?;
            Ok(())
        })
    }

    fn enqueue_mailbox_message(&self, username: &str, message: &MailboxMessage) -> Result<()> {
        // The foreign key on mailboxes rejects users without a provisioned mailbox
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mailbox_messages (username, sent_at, text, sender) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, message.timestamp, message.text, message.sender],
            )?;
            Ok(())
        })
    }

    fn probe(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

fn secret_exists(conn: &Connection, secret: &[u8]) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM identities WHERE client_secret = ?1)",
        [secret],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn username_exists(conn: &Connection, username: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM identities WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Which uniqueness rule a failed identity insert broke. Other failures,
/// including non-uniqueness constraints, are not a registration outcome.
fn registration_conflict(e: &rusqlite::ffi::Error) -> Option<Registration> {
    match e.extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => Some(Registration::SecretTaken),
        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Some(Registration::UsernameTaken),
        _ => None,
    }
}

fn query_mailbox(conn: &Connection, username: &str) -> Result<Vec<StoredMessage>> {
    let mut stmt = conn.prepare(
        "SELECT id, sent_at, text, sender
         FROM mailbox_messages
         WHERE username = ?1
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([username], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                message: MailboxMessage {
                    timestamp: row.get::<_, DateTime<Utc>>(1)?,
                    text: row.get(2)?,
                    sender: row.get(3)?,
                },
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
