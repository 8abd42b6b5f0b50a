//! Session-lost notification seam
//!
//! When a refresh cycle fails, the stored session is gone and the host
//! application has to move its UI to an unauthenticated state. Hosts plug
//! in behavior by implementing `SessionEvents`; `SessionWatch` is a
//! ready-made implementation for hosts that prefer awaiting a channel.

use tokio::sync::watch;

/// Callback surface for session lifecycle events.
///
/// `session_lost` fires exactly once per failed refresh cycle, after the
/// token store has been cleared. Implementations must not block; anything
/// that needs to await should be spawned.
pub trait SessionEvents: Send + Sync {
    fn session_lost(&self);
}

/// Default wiring: the loss is logged by the refresh cycle and otherwise
/// ignored.
#[derive(Debug, Default)]
pub struct NullSession;

impl SessionEvents for NullSession {
    fn session_lost(&self) {}
}

/// Watch-channel notifier. Subscribers observe `true` once the session is
/// lost.
#[derive(Debug)]
pub struct SessionWatch {
    sender: watch::Sender<bool>,
}

impl SessionWatch {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Receiver for awaiting the loss signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for SessionWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents for SessionWatch {
    fn session_lost(&self) {
        // send_replace succeeds even while no receiver is subscribed
        self.sender.send_replace(true);
    }
}
