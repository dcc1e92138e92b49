use tracing::{debug, info};

use courier_types::{OutboundMessage, ResponseFlag};

use crate::connection::{Connection, ConnectionHandle};
use crate::error::SessionError;
use crate::gateway::Gateway;

impl Gateway {
    /// A `/messaging` session: authenticate, join the presence registry,
    /// flush the mailbox, then relay frames until the connection ends.
    pub async fn relay(&self, mut conn: Connection) {
        let username = match self.authenticate(&mut conn, "relay-auth").await {
            Ok(username) => username,
            Err(e) => {
                self.report(&e);
                conn.close().await;
                return;
            }
        };

        if !self.registry().join(&username, conn.handle().clone()).await {
            self.report(&SessionError::protocol(
                "relay-join",
                format!("{} is already online", username),
            ));
            conn.close().await;
            return;
        }
        info!("{} connected from {}", username, conn.remote_addr());

        if let Err(e) = self.run_session(&username, &mut conn).await {
            self.report(&e);
        }

        self.registry().remove_connection(&username, conn.handle().id()).await;
        conn.close().await;
        info!("{} disconnected", username);
    }

    async fn run_session(&self, username: &str, conn: &mut Connection) -> Result<(), SessionError> {
        conn.handle()
            .respond(ResponseFlag::Approved)
            .await
            .map_err(SessionError::transport("relay-join"))?;

        let name = username.to_string();
        let address = conn.remote_addr().ip().to_string();
        self.store()
            .call("relay-join", move |store| store.set_last_known_address(&name, &address))
            .await?;

        self.flush_mailbox(username, conn.handle()).await?;
        self.receive_loop(username, conn).await
    }

    /// Hand every queued message to the freshly joined user in mailbox
    /// order. Each message leaves the mailbox before it is pushed; a failed
    /// push re-enqueues it at the end of the mailbox.
    async fn flush_mailbox(&self, username: &str, handle: &ConnectionHandle) -> Result<(), SessionError> {
        let name = username.to_string();
        let queued = self
            .store()
            .call("relay-flush", move |store| store.list_mailbox(&name))
            .await?;

        if !queued.is_empty() {
            debug!("Flushing {} queued messages to {}", queued.len(), username);
        }

        for stored in queued {
            let name = username.to_string();
            let message = stored.message.clone();
            self.store()
                .call("relay-flush", move |store| store.delete_mailbox_message(&name, &stored))
                .await?;

            self.push(username, handle, message.into())
                .await
                .map_err(SessionError::transport("relay-flush"))?;
        }
        Ok(())
    }

    async fn receive_loop(&self, username: &str, conn: &mut Connection) -> Result<(), SessionError> {
        while let Some(frame) = conn
            .next_frame()
            .await
            .map_err(SessionError::transport("relay-loop"))?
        {
            let message: OutboundMessage = serde_json::from_slice(&frame)
                .map_err(|e| SessionError::protocol("relay-loop", format!("undecodable message: {}", e)))?;

            if message.to.iter().any(|recipient| recipient == username) {
                return Err(SessionError::protocol(
                    "relay-loop",
                    format!("{} addressed a message to itself", username),
                ));
            }

            let gateway = self.clone();
            let sender = username.to_string();
            let handle = conn.handle().clone();
            tokio::spawn(async move { gateway.dispatch(&sender, &handle, message).await });
        }
        Ok(())
    }
}
