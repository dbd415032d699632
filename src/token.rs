//! Per-event continuation handle.
//!
//! The host hands every lifecycle event an opaque token that must be
//! resolved exactly once.  `EventToken::resolve` consumes the token, so a
//! second resolution does not compile.  A token dropped without a
//! disposition still releases the host with `Continue`, logs an error and,
//! in debug builds, panics.

use serde::Serialize;
use tokio::sync::oneshot;

/// Final decision handed back to the host for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "message", rename_all = "camelCase")]
pub enum Disposition {
    /// Let the operation proceed.
    Allow,
    /// Stop the operation and show `message` to the user.
    Block(String),
    /// Release the host without any user-visible effect.
    Continue,
}

impl Disposition {
    pub fn block(message: impl Into<String>) -> Self {
        Disposition::Block(message.into())
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Disposition::Block(_))
    }
}

pub struct EventToken {
    event: String,
    tx: Option<oneshot::Sender<Disposition>>,
}

/// Host side of an `EventToken`.
pub struct Completion {
    rx: oneshot::Receiver<Disposition>,
}

impl EventToken {
    pub fn new(event: impl Into<String>) -> (EventToken, Completion) {
        let (tx, rx) = oneshot::channel();
        (
            EventToken {
                event: event.into(),
                tx: Some(tx),
            },
            Completion { rx },
        )
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn resolve(mut self, disposition: Disposition) {
        tracing::trace!(event = %self.event, ?disposition, "resolving event token");
        if let Some(tx) = self.tx.take() {
            if tx.send(disposition).is_err() {
                tracing::debug!(event = %self.event, "host stopped waiting for event token");
            }
        }
    }
}

impl Drop for EventToken {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::error!(event = %self.event, "event token dropped without a disposition");
            let _ = tx.send(Disposition::Continue);
            if cfg!(debug_assertions) && !std::thread::panicking() {
                panic!("event token for '{}' dropped unresolved", self.event);
            }
        }
    }
}

impl Completion {
    pub async fn wait(self) -> Disposition {
        // The token always sends before its sender goes away.
        self.rx.await.unwrap_or(Disposition::Continue)
    }
}
