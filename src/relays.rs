//! The persisted, ordered set of relays an article is published to.

use tracing::info;

use crate::{
    error::{Error, Result},
    state::{StateStore, RELAYS},
};

pub const DEFAULT_RELAYS: [&str; 5] = [
    "wss://relay.damus.io",
    "wss://nostr.wine",
    "wss://relay.primal.net",
    "wss://nostr.lol",
    "wss://nostr.mom",
];

#[derive(Debug, Clone)]
pub struct RelayManager {
    state: StateStore,
}

impl RelayManager {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Persisted relays, or the defaults when none were ever saved.
    pub fn load_or_default(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .get::<Vec<String>>(RELAYS)?
            .unwrap_or_else(|| DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()))
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.load_or_default()
    }

    /// Append `endpoint` after trimming; it must be a new `ws://`/`wss://` URL.
    pub fn add(&self, endpoint: &str) -> Result<Vec<String>> {
        let endpoint = endpoint.trim();
        if !is_relay_url(endpoint) {
            return Err(Error::InvalidScheme);
        }
        let mut relays = self.load_or_default()?;
        if relays.iter().any(|r| r == endpoint) {
            return Err(Error::Duplicate(endpoint.to_string()));
        }
        relays.push(endpoint.to_string());
        self.state.set(RELAYS, &relays)?;
        info!(relay = endpoint, "relay added");
        Ok(relays)
    }

    pub fn remove(&self, index: usize) -> Result<Vec<String>> {
        let mut relays = self.load_or_default()?;
        if index >= relays.len() {
            return Err(Error::NoSuchRelay(index));
        }
        let removed = relays.remove(index);
        self.state.set(RELAYS, &relays)?;
        info!(relay = %removed, "relay removed");
        Ok(relays)
    }
}

pub fn is_relay_url(endpoint: &str) -> bool {
    endpoint.starts_with("wss://") || endpoint.starts_with("ws://")
}
