use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS identities (
            username        TEXT PRIMARY KEY,
            client_secret   BLOB NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            last_address    TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- A row here means the user's mailbox is provisioned
        CREATE TABLE IF NOT EXISTS mailboxes (
            username    TEXT PRIMARY KEY REFERENCES identities(username) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS mailbox_messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL REFERENCES mailboxes(username) ON DELETE CASCADE,
            sent_at     TEXT NOT NULL,
            text        TEXT NOT NULL,
            sender      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_mailbox_messages_user
            ON mailbox_messages(username, id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
