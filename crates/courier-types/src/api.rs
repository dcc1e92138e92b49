use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::MailboxMessage;

// -- Responses --

/// The only structured acknowledgment vocabulary of the relay. Every session
/// type answers with one of these three-letter flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFlag {
    /// A message was processed for one recipient
    #[serde(rename = "RCV")]
    Received,
    /// The requested operation succeeded
    #[serde(rename = "APV")]
    Approved,
    /// The username cannot be used (already taken)
    #[serde(rename = "IUN")]
    InvalidUsername,
    /// A recipient is not a registered user
    #[serde(rename = "NSU")]
    NoSuchUser,
    /// The client secret is already registered
    #[serde(rename = "ART")]
    AlreadyRegistered,
    /// The credential pair does not match a registered identity
    #[serde(rename = "IAT")]
    InvalidAuthentication,
}

impl ResponseFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RCV",
            Self::Approved => "APV",
            Self::InvalidUsername => "IUN",
            Self::NoSuchUser => "NSU",
            Self::AlreadyRegistered => "ART",
            Self::InvalidAuthentication => "IAT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub value: ResponseFlag,
}

impl From<ResponseFlag> for Response {
    fn from(value: ResponseFlag) -> Self {
        Self { value }
    }
}

// -- Handshakes --

/// First frame of a `/messaging` or `/deletion` connection.
///
/// Missing or null fields decode to empty values so that validation, not
/// decoding, decides the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(rename = "clientID", alias = "clientSecretHash", with = "base64_bytes", default)]
    pub client_secret: Vec<u8>,
    #[serde(rename = "userName", default)]
    pub username: String,
}

/// First and only frame of a `/registration` connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    #[serde(rename = "clientID", alias = "clientSecretHash", with = "base64_bytes", default)]
    pub client_secret: Vec<u8>,
    #[serde(rename = "userName", default)]
    pub username: String,
    #[serde(default)]
    pub name: String,
}

// -- Messages --

/// A message sent by an authenticated client. The sender is never taken
/// from the frame; older clients that still send a `sender` field have it
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    #[serde(alias = "To", default, deserialize_with = "null_as_empty")]
    pub to: Vec<String>,
}

/// A missing or null field reads as empty; validation drops the message.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A message pushed by the relay to its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    #[serde(rename = "timeStamp")]
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub sender: String,
}

impl From<MailboxMessage> for DeliveredMessage {
    fn from(message: MailboxMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            text: message.text,
            sender: message.sender,
        }
    }
}

impl From<DeliveredMessage> for MailboxMessage {
    fn from(message: DeliveredMessage) -> Self {
        Self {
            timestamp: message.timestamp,
            text: message.text,
            sender: message.sender,
        }
    }
}

/// Raw secret bytes travel as standard base64 strings.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as B64;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => B64.decode(encoded).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
