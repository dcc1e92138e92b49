use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::api::{Authentication, OutboundMessage, Registration};

/// Longest accepted username or display name, in characters.
pub const MAX_NAME_CHARS: usize = 50;

/// Client secrets are SHA-1 digests.
pub const SECRET_HASH_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty field {0}")]
    Empty(&'static str),
    #[error("too long {0}")]
    TooLong(&'static str),
    #[error("whitespace in {0}")]
    Whitespace(&'static str),
    #[error("invalid size {0}")]
    InvalidSize(&'static str),
    #[error("client secret is the digest of empty input")]
    EmptyInputDigest,
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Empty("userName"));
    }
    if username.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong("userName"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::Whitespace("userName"));
    }
    Ok(())
}

pub fn validate_secret(secret: &[u8]) -> Result<(), ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::Empty("clientID"));
    }
    if secret == Sha1::digest(b"").as_slice() {
        return Err(ValidationError::EmptyInputDigest);
    }
    if secret.len() != SECRET_HASH_LEN {
        return Err(ValidationError::InvalidSize("clientID"));
    }
    Ok(())
}

pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty("name"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::TooLong("name"));
    }
    Ok(())
}

pub fn validate_authentication(auth: &Authentication) -> Result<(), ValidationError> {
    validate_username(&auth.username)?;
    validate_secret(&auth.client_secret)
}

pub fn validate_registration(reg: &Registration) -> Result<(), ValidationError> {
    validate_display_name(&reg.name)?;
    validate_username(&reg.username)?;
    validate_secret(&reg.client_secret)
}

/// Shape check for a relayed message. Text is judged after trimming.
pub fn validate_outbound(message: &OutboundMessage) -> Result<(), ValidationError> {
    if message.to.is_empty() {
        return Err(ValidationError::Empty("to"));
    }
    if message.to.iter().any(|user| user.is_empty()) {
        return Err(ValidationError::Empty("recipient"));
    }
    if message.text.trim().is_empty() {
        return Err(ValidationError::Empty("text"));
    }
    Ok(())
}
