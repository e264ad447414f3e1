//! crates/manga_progress_core/src/session.rs
//!
//! The authentication context as an explicit state machine that other
//! components subscribe to.

use tokio::sync::watch;
use tracing::info;

use crate::domain::{PrincipalId, Session};

/// Publishes session transitions. Held by whatever talks to the identity provider.
#[derive(Debug)]
pub struct SessionHandle {
    tx: watch::Sender<Session>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    /// Starts anonymous.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Session::Anonymous);
        Self { tx }
    }

    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Marks `principal` as signed in. Signing in again as the same principal is a no-op.
    pub fn sign_in(&self, principal: PrincipalId) {
        let next = Session::Authenticated(principal);
        self.tx.send_if_modified(|session| {
            if *session == next {
                return false;
            }
            info!(principal = ?next.principal(), "session authenticated");
            *session = next;
            true
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|session| {
            if *session == Session::Anonymous {
                return false;
            }
            info!("session signed out");
            *session = Session::Anonymous;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let handle = SessionHandle::new();
        let mut rx = handle.subscribe();
        assert_eq!(*rx.borrow(), Session::Anonymous);

        handle.sign_in(PrincipalId::new("u1"));
        rx.changed().await.unwrap();
        assert_eq!(
            *rx.borrow_and_update(),
            Session::Authenticated(PrincipalId::new("u1"))
        );

        handle.sign_out();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Session::Anonymous);
    }

    #[test]
    fn repeated_sign_in_does_not_notify() {
        let handle = SessionHandle::new();
        let rx = handle.subscribe();
        handle.sign_in(PrincipalId::new("u1"));
        assert!(rx.has_changed().unwrap());

        let rx = handle.subscribe();
        handle.sign_in(PrincipalId::new("u1"));
        assert!(!rx.has_changed().unwrap());
        handle.sign_out();
        assert!(rx.has_changed().unwrap());
    }
}
