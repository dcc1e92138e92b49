//! Wire types and field rules shared by the relay gateway, the store and
//! the server binary.

pub mod api;
pub mod models;
pub mod validation;

pub use api::{
    Authentication, DeliveredMessage, OutboundMessage, Registration, Response, ResponseFlag,
};
pub use models::{MailboxMessage, NewIdentity};
