//! File-backed key/value state shared by the session, relay list and preferences.
//!
//! Everything lives in a single `state.json` under `STORE_ROOT`. Each call
//! re-reads the file so a value written by another invocation is never shadowed
//! by a stale copy, and every write goes through a temp file that is persisted
//! over the original.

use std::{fs, io::Write, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;

pub const SECRET_KEY: &str = "secretKey";
pub const RELAYS: &str = "relays";
pub const THEME: &str = "theme";
pub const FONT_SIZE: &str = "fontSize";
pub const CURRENT_ARTICLE: &str = "currentArticle";
pub const EXTRACTED_AT: &str = "extractedAt";

const STATE_FILE: &str = "state.json";

/// Handle to the persisted state document rooted at `root`.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Ensure the storage directory exists.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Read the whole document. A missing file is an empty document.
    pub fn load(&self) -> Result<Map<String, Value>> {
        let path = self.path();
        if !path.exists() {
            return Ok(Map::new());
        }
        let data = fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&data)? {
            Value::Object(map) => Ok(map),
            other => {
                warn!("ignoring non-object state document: {}", other);
                Ok(Map::new())
            }
        }
    }

    /// Typed lookup of a single key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.load()?.remove(key) {
            Some(Value::Null) | None => Ok(None),
            Some(val) => Ok(Some(serde_json::from_value(val)?)),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_many(vec![(key, serde_json::to_value(value)?)])
    }

    /// Write several keys in one atomic replace.
    pub fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<()> {
        let mut map = self.load()?;
        for (key, val) in entries {
            debug!(key, "state set");
            map.insert(key.to_string(), val);
        }
        self.save(&map)
    }

    /// Remove keys; absent keys are ignored.
    pub fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.load()?;
        let mut changed = false;
        for key in keys {
            changed |= map.remove(*key).is_some();
        }
        if changed {
            debug!(?keys, "state remove");
            self.save(&map)?;
        }
        Ok(())
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        self.init()?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(&mut tmp, map)?;
        tmp.write_all(b"\n")?;
        tmp.persist(self.path())?;
        Ok(())
    }
}
