use serde::de::DeserializeOwned;
use tracing::debug;

use courier_types::validation::validate_authentication;
use courier_types::{Authentication, ResponseFlag};

use crate::connection::{Connection, ConnectionHandle};
use crate::error::SessionError;
use crate::gateway::Gateway;

impl Gateway {
    /// Verify the opening credential frame of a relay or deletion session.
    ///
    /// Shape violations and store errors end the session without a
    /// response; a secret that is unknown or bound to another username is
    /// answered with `IAT`. Returns the verified username.
    pub(crate) async fn authenticate(
        &self,
        conn: &mut Connection,
        scope: &'static str,
    ) -> Result<String, SessionError> {
        let auth: Authentication = read_first(conn, scope).await?;
        validate_authentication(&auth).map_err(|source| SessionError::Validation { scope, source })?;

        let secret = auth.client_secret.clone();
        let known = self
            .store()
            .call(scope, move |store| store.identity_exists_by_secret(&secret))
            .await?;
        if !known {
            return Err(reject(conn.handle(), scope, ResponseFlag::InvalidAuthentication).await);
        }

        let secret = auth.client_secret;
        let owner = self
            .store()
            .call(scope, move |store| store.username_for_secret(&secret))
            .await?;
        if owner.as_deref() != Some(auth.username.as_str()) {
            return Err(reject(conn.handle(), scope, ResponseFlag::InvalidAuthentication).await);
        }

        Ok(auth.username)
    }
}

/// Read and decode the first data frame of a session.
pub(crate) async fn read_first<T: DeserializeOwned>(
    conn: &mut Connection,
    scope: &'static str,
) -> Result<T, SessionError> {
    let frame = conn
        .next_frame()
        .await
        .map_err(SessionError::transport(scope))?
        .ok_or_else(|| SessionError::protocol(scope, "connection closed before first frame"))?;

    serde_json::from_slice(&frame).map_err(|e| SessionError::protocol(scope, format!("undecodable frame: {}", e)))
}

/// Answer with `flag` and produce the matching session error. A failed send
/// changes nothing: the session ends either way.
pub(crate) async fn reject(
    handle: &ConnectionHandle,
    scope: &'static str,
    flag: ResponseFlag,
) -> SessionError {
    if let Err(e) = handle.respond(flag).await {
        debug!("{}: could not send {}: {}", scope, flag.as_str(), e);
    }
    SessionError::Rejected { scope, flag }
}
