use futures_util::future::join_all;
use tracing::{debug, warn};

use courier_types::validation::validate_outbound;
use courier_types::{DeliveredMessage, MailboxMessage, OutboundMessage, ResponseFlag};

use crate::connection::ConnectionHandle;
use crate::error::SessionError;
use crate::gateway::Gateway;

const SCOPE: &str = "delivery";

impl Gateway {
    /// Deliver `message` from `sender` to every recipient.
    ///
    /// Runs detached from the sender's receive loop. Recipients are handled
    /// concurrently; each gets one `RCV` (or `NSU`) back to the sender while
    /// the sender is still online. A store failure or a failed ack tears the
    /// sender's session down.
    pub async fn dispatch(&self, sender: &str, sender_handle: &ConnectionHandle, mut message: OutboundMessage) {
        if let Err(e) = validate_outbound(&message) {
            debug!("Dropping message from {}: {}", sender, e);
            return;
        }
        message.text = message.text.trim().to_string();

        let delivered = DeliveredMessage {
            timestamp: message.timestamp,
            text: message.text,
            sender: sender.to_string(),
        };

        let outcomes = join_all(
            message
                .to
                .iter()
                .map(|recipient| self.deliver_to(recipient, sender, sender_handle, delivered.clone())),
        )
        .await;

        let mut failed = false;
        for err in outcomes.into_iter().filter_map(Result::err) {
            self.report(&err);
            failed = true;
        }
        if failed {
            self.registry().remove_connection(sender, sender_handle.id()).await;
            sender_handle.close().await;
        }
    }

    async fn deliver_to(
        &self,
        recipient: &str,
        sender: &str,
        sender_handle: &ConnectionHandle,
        message: DeliveredMessage,
    ) -> Result<(), SessionError> {
        let name = recipient.to_string();
        let exists = self
            .store()
            .call(SCOPE, move |store| store.identity_exists_by_username(&name))
            .await?;

        if !exists {
            debug!("{} sent to unknown user {}", sender, recipient);
            return self.ack(sender, sender_handle, ResponseFlag::NoSuchUser).await;
        }

        match self.registry().get(recipient).await {
            // A failed push is already compensated by enqueue, so the sender
            // still gets its ack
            Some(handle) => {
                let _ = self.push(recipient, &handle, message).await;
            }
            None => self.enqueue(recipient, message.into()).await?,
        }

        self.ack(sender, sender_handle, ResponseFlag::Received).await
    }

    /// Send `message` over the recipient's live connection. On failure the
    /// message goes back into the recipient's mailbox and the broken
    /// connection is removed from the registry.
    pub(crate) async fn push(
        &self,
        recipient: &str,
        handle: &ConnectionHandle,
        message: DeliveredMessage,
    ) -> Result<(), axum::Error> {
        let Err(e) = handle.send_json(&message).await else {
            return Ok(());
        };

        warn!("Push to {} failed, requeueing: {}", recipient, e);
        if let Err(store_err) = self.enqueue(recipient, message.into()).await {
            self.report(&store_err);
        }
        self.registry().remove_connection(recipient, handle.id()).await;
        handle.close().await;
        Err(e)
    }

    async fn enqueue(&self, recipient: &str, message: MailboxMessage) -> Result<(), SessionError> {
        let name = recipient.to_string();
        self.store()
            .call(SCOPE, move |store| store.enqueue_mailbox_message(&name, &message))
            .await
    }

    /// Answer the sender if it is still online through the same connection.
    async fn ack(&self, sender: &str, sender_handle: &ConnectionHandle, flag: ResponseFlag) -> Result<(), SessionError> {
        if !self.registry().is_current(sender, sender_handle.id()).await {
            return Ok(());
        }
        sender_handle
            .respond(flag)
            .await
            .map_err(SessionError::transport(SCOPE))
    }
}
