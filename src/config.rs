//! Configuration loading from `.env` files.

use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};

use crate::{
    builder::DEFAULT_TOPICS,
    publish::{PublishOptions, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_LINGER_MS},
};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding `state.json`.
    pub store_root: PathBuf,
    /// Per-relay bound on connect plus handshake, in milliseconds.
    pub relay_timeout_ms: u64,
    /// How long a relay socket stays open after sending, in milliseconds.
    pub relay_linger_ms: u64,
    /// `t` tags attached to every published article.
    pub topic_tags: Vec<String>,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let store_root = PathBuf::from(env::var("STORE_ROOT").context("STORE_ROOT is not set")?);
        let relay_timeout_ms = millis("RELAY_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)?;
        let relay_linger_ms = millis("RELAY_LINGER_MS", DEFAULT_LINGER_MS)?;
        let topic_tags = match env::var("TOPIC_TAGS") {
            Ok(s) => csv_strings(s),
            Err(_) => DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        };
        let tor_socks = env::var("TOR_SOCKS").ok().filter(|s| !s.is_empty());
        Ok(Self {
            store_root,
            relay_timeout_ms,
            relay_linger_ms,
            topic_tags,
            tor_socks,
        })
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            connect_timeout: Duration::from_millis(self.relay_timeout_ms),
            linger: Duration::from_millis(self.relay_linger_ms),
            tor_socks: self.tor_socks.clone(),
        }
    }
}

/// Read a millisecond value, falling back to `default` when unset or blank.
fn millis(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse()
            .with_context(|| format!("{var} must be a whole number of milliseconds")),
        _ => Ok(default),
    }
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Take the env lock, recovering it if an earlier test panicked while holding it.
#[cfg(test)]
pub(crate) fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}
