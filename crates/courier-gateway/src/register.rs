use tracing::info;

use courier_db::Registration as Outcome;
use courier_types::validation::validate_registration;
use courier_types::{NewIdentity, Registration, ResponseFlag};

use crate::auth::{read_first, reject};
use crate::connection::Connection;
use crate::error::SessionError;
use crate::gateway::Gateway;
use crate::notify::Notice;

const SCOPE: &str = "register";

impl Gateway {
    /// A `/registration` session: one frame in, one flag out, then close.
    pub async fn register(&self, mut conn: Connection) {
        match self.create_identity(&mut conn).await {
            Ok(username) => {
                info!("Registered {} from {}", username, conn.remote_addr());
                self.notifier().notify(Notice::Registered { username });
            }
            Err(e) => self.report(&e),
        }
        conn.close().await;
    }

    async fn create_identity(&self, conn: &mut Connection) -> Result<String, SessionError> {
        let request: Registration = read_first(conn, SCOPE).await?;
        validate_registration(&request).map_err(|source| SessionError::Validation { scope: SCOPE, source })?;

        let secret = request.client_secret.clone();
        if self
            .store()
            .call(SCOPE, move |store| store.identity_exists_by_secret(&secret))
            .await?
        {
            return Err(reject(conn.handle(), SCOPE, ResponseFlag::AlreadyRegistered).await);
        }

        let username = request.username.clone();
        if self
            .store()
            .call(SCOPE, move |store| store.identity_exists_by_username(&username))
            .await?
        {
            return Err(reject(conn.handle(), SCOPE, ResponseFlag::InvalidUsername).await);
        }

        let identity = NewIdentity {
            client_secret: request.client_secret,
            username: request.username,
            name: request.name.trim().to_string(),
            last_address: Some(conn.remote_addr().ip().to_string()),
        };
        let username = identity.username.clone();

        // Uniqueness is re-checked inside the insert transaction
        let outcome = self
            .store()
            .call(SCOPE, move |store| store.create_identity_and_mailbox(&identity))
            .await?;
        match outcome {
            Outcome::Created => {}
            Outcome::SecretTaken => {
                return Err(reject(conn.handle(), SCOPE, ResponseFlag::AlreadyRegistered).await);
            }
            Outcome::UsernameTaken => {
                return Err(reject(conn.handle(), SCOPE, ResponseFlag::InvalidUsername).await);
            }
        }

        conn.handle()
            .respond(ResponseFlag::Approved)
            .await
            .map_err(SessionError::transport(SCOPE))?;
        Ok(username)
    }
}
