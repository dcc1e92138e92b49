use tracing::info;

use courier_types::ResponseFlag;

use crate::connection::Connection;
use crate::gateway::Gateway;
use crate::notify::Notice;

const SCOPE: &str = "deregister";

impl Gateway {
    /// A `/deletion` session. Deletes the identity together with its
    /// mailbox and kicks any live relay session of that user.
    pub async fn deregister(&self, mut conn: Connection) {
        let username = match self.authenticate(&mut conn, SCOPE).await {
            Ok(username) => username,
            Err(e) => {
                self.report(&e);
                conn.close().await;
                return;
            }
        };

        let name = username.clone();
        let deleted = self
            .store()
            .call(SCOPE, move |store| store.delete_identity_and_mailbox(&name))
            .await;

        if let Err(e) = deleted {
            self.report(&e);
            self.registry().remove(&username).await;
            conn.close().await;
            return;
        }

        if let Err(e) = conn.handle().respond(ResponseFlag::Approved).await {
            info!("{}: could not confirm deletion of {}: {}", SCOPE, username, e);
        }
        self.registry().remove(&username).await;
        info!("Deleted identity {}", username);
        self.notifier().notify(Notice::Deregistered { username });
        conn.close().await;
    }
}
