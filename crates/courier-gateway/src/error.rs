use thiserror::Error;

use courier_types::ResponseFlag;
use courier_types::validation::ValidationError;

/// Why a session ended early. Every variant carries the scope (the step of
/// the session that failed) so a log line alone pinpoints the failure.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed frame, self-addressed message, duplicate login
    #[error("{scope}: protocol violation: {detail}")]
    Protocol { scope: &'static str, detail: String },

    /// A decoded frame broke a field rule
    #[error("{scope}: invalid frame: {source}")]
    Validation {
        scope: &'static str,
        #[source]
        source: ValidationError,
    },

    /// The request was refused with a response flag (`IAT` counts as an
    /// authentication failure, the others as validation)
    #[error("{scope}: rejected with {}", .flag.as_str())]
    Rejected { scope: &'static str, flag: ResponseFlag },

    /// A durable store call failed
    #[error("{scope}: store failure: {cause:#}")]
    Store { scope: &'static str, cause: anyhow::Error },

    /// Sending to or receiving from the peer failed
    #[error("{scope}: transport failure: {cause}")]
    Transport {
        scope: &'static str,
        #[source]
        cause: axum::Error,
    },
}

impl SessionError {
    pub fn scope(&self) -> &'static str {
        match self {
            Self::Protocol { scope, .. }
            | Self::Validation { scope, .. }
            | Self::Rejected { scope, .. }
            | Self::Store { scope, .. }
            | Self::Transport { scope, .. } => scope,
        }
    }

    /// Category label used in logs and notifications.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "protocol",
            Self::Rejected {
                flag: ResponseFlag::InvalidAuthentication,
                ..
            } => "auth",
            Self::Validation { .. } | Self::Rejected { .. } => "validation",
            Self::Store { .. } => "store",
            Self::Transport { .. } => "transport",
        }
    }

    pub(crate) fn protocol(scope: &'static str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            scope,
            detail: detail.into(),
        }
    }

    pub(crate) fn transport(scope: &'static str) -> impl FnOnce(axum::Error) -> Self {
        move |cause| Self::Transport { scope, cause }
    }
}
