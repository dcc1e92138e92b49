//! Side-effect notifications for registry changes, account changes and errors.
//!
//! The relay calls [`Notifier::notify`] and moves on. Implementations must
//! not block and the relay never depends on them succeeding.
use std::fmt;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A relay session joined the presence registry
    Online { username: String },
    /// A presence entry was removed
    Offline { username: String },
    /// A new identity was created
    Registered { username: String },
    /// An identity was deleted
    Deregistered { username: String },
    /// A session ended on an error of the given category
    Error { category: &'static str },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online { username } => write!(f, "online user={}", username),
            Self::Offline { username } => write!(f, "offline user={}", username),
            Self::Registered { username } => write!(f, "registered user={}", username),
            Self::Deregistered { username } => write!(f, "deregistered user={}", username),
            Self::Error { category } => write!(f, "error category={}", category),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that uses the `tracing` crate.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        tracing::debug!(target: "courier::notice", "{}", notice);
    }
}

/// Rings the terminal bell on stderr for every notice.
///
/// The write happens on the blocking pool so a stalled terminal never holds
/// up a session. Outside a tokio runtime the notice is dropped.
pub struct TerminalBell;

impl Notifier for TerminalBell {
    fn notify(&self, notice: Notice) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        runtime.spawn_blocking(move || {
            let mut stderr = std::io::stderr().lock();
            if stderr.write_all(b"\x07").and_then(|_| stderr.flush()).is_err() {
                tracing::trace!("bell for {} not rung", notice);
            }
        });
    }
}

/// No-op notifier that discards all notices.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}
