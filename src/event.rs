//! Nostr event model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// NIP-23 long-form content.
pub const KIND_LONG_FORM: u32 = 30023;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. Articles published by this tool carry:
///
/// - `title` – the article title
/// - `url` – where the article was read
/// - `published_at` – Unix seconds at signing time
/// - `t` – free-form topic or hashtag
/// - `author` – the article byline, when known
///
/// For example, a `["t", "news"]` tag from the protocol is represented as
/// `Tag(vec!["t".into(), "news".into()])`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a two element `[key, value]` tag.
    pub fn pair(key: &str, value: impl Into<String>) -> Self {
        Tag(vec![key.to_string(), value.into()])
    }

    /// The tag type, e.g. `t` or `title`.
    pub fn key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Event fields covered by the id hash, before a key has signed them.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedEvent {
    pub kind: u32,
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
}

/// Signed Nostr event as sent to relays.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "79be...",
///   "kind": 30023,
///   "created_at": 1700000000,
///   "tags": [["title", "Hello"], ["t", "web-archive"]],
///   "content": "**Original source:** ...",
///   "sig": "deadbeef"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (x-only, hex).
    pub pubkey: String,
    /// Kind number, `30023` for articles.
    pub kind: u32,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Ordered tags; order is preserved through signing.
    pub tags: Vec<Tag>,
    /// Markdown body including the source header.
    pub content: String,
    /// Schnorr signature over the event hash.
    pub sig: String,
}

impl Event {
    /// The `["EVENT", <event>]` frame relays expect on publish.
    pub fn to_wire(&self) -> Result<String> {
        let msg = serde_json::json!(["EVENT", self]);
        Ok(serde_json::to_string(&msg)?)
    }

    /// Tag keys in order, handy for diagnostics.
    pub fn tag_keys(&self) -> Vec<&str> {
        self.tags.iter().filter_map(Tag::key).collect()
    }
}

/// Compute the NIP-01 event hash over `[0, pubkey, created_at, kind, tags, content]`.
pub fn event_hash(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Result<[u8; 32]> {
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    let data = serde_json::to_vec(&arr)?;
    let hash = Sha256::digest(&data);
    Ok(hash.into())
}
