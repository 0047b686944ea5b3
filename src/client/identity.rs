//! Active identity handle
//!
//! Shared between the auth resolver (the only writer) and the sync core,
//! which re-reads it before every write so a sign-out or account switch
//! stops an in-flight cycle from writing under the old identity.

use std::sync::Arc;
use tokio::sync::watch;

use crate::client::types::Identity;

#[derive(Debug, Clone)]
pub struct IdentityHandle {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl IdentityHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current identity, cloned out of the channel
    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    pub fn current_uid(&self) -> Option<String> {
        self.sender.borrow().as_ref().map(|identity| identity.uid.clone())
    }

    /// Whether `uid` is still the active identity
    pub fn is_current(&self, uid: &str) -> bool {
        self.sender
            .borrow()
            .as_ref()
            .is_some_and(|identity| identity.uid == uid)
    }

    pub fn is_remote(&self) -> bool {
        self.sender
            .borrow()
            .as_ref()
            .is_some_and(|identity| identity.is_from_remote)
    }

    pub(crate) fn replace(&self, identity: Option<Identity>) -> Option<Identity> {
        self.sender.send_replace(identity)
    }

    /// Receiver notified on every identity change
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}

impl Default for IdentityHandle {
    fn default() -> Self {
        Self::new()
    }
}
