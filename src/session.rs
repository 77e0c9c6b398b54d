//! Session context tying identity, the stored article and the relay list
//! together for one invocation.

use serde_json::Value;
use tracing::{debug, info};

use crate::{
    builder,
    error::{Error, Result},
    event::{Event, Tag},
    extract::{Article, NOTHING_READABLE},
    keys::{self, KeyManager, SigningIdentity},
    publish::{self, PublishOptions, PublishReport},
    relays::RelayManager,
    state::{StateStore, CURRENT_ARTICLE, EXTRACTED_AT},
};

/// Stored article data older than this is discarded.
pub const FRESHNESS_MS: u64 = 5 * 60 * 1000;

pub const NO_ARTICLE_MSG: &str = "No article data found. Please extract an article first.";
pub const EXPIRED_MSG: &str = "Article data has expired. Please extract again.";

/// What the reader can show for the stored article.
#[derive(Debug, Clone, PartialEq)]
pub enum ArticleView {
    Ready(Article),
    /// Nothing stored.
    Empty,
    /// Stored data was too old and has been removed.
    Expired,
    Failed(String),
}

impl ArticleView {
    /// User-facing text for the non-ready states.
    pub fn message(&self) -> Option<&str> {
        match self {
            ArticleView::Ready(_) => None,
            ArticleView::Empty => Some(NO_ARTICLE_MSG),
            ArticleView::Expired => Some(EXPIRED_MSG),
            ArticleView::Failed(msg) => Some(msg),
        }
    }
}

/// Stale iff a timestamp is present and older than [`FRESHNESS_MS`].
pub fn is_fresh(extracted_at: Option<u64>, now_ms: u64) -> bool {
    match extracted_at {
        Some(at) => at >= now_ms.saturating_sub(FRESHNESS_MS),
        None => true,
    }
}

#[derive(Debug)]
pub struct Session {
    state: StateStore,
    keys: KeyManager,
    relays: RelayManager,
    identity: Option<SigningIdentity>,
}

impl Session {
    /// Open a session over `state`, restoring any saved identity.
    pub fn open(state: StateStore) -> Result<Self> {
        let keys = KeyManager::new(state.clone());
        let identity = keys.restore()?;
        debug!(logged_in = identity.is_some(), "session opened");
        Ok(Self {
            relays: RelayManager::new(state.clone()),
            state,
            keys,
            identity,
        })
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn relays(&self) -> &RelayManager {
        &self.relays
    }

    pub fn identity(&self) -> Option<&SigningIdentity> {
        self.identity.as_ref()
    }

    pub fn npub(&self) -> Result<Option<String>> {
        self.identity.as_ref().map(SigningIdentity::npub).transpose()
    }

    /// Replace the identity only when `input` is a valid key.
    pub fn login(&mut self, input: &str) -> Result<&SigningIdentity> {
        let identity = self.keys.login(input)?;
        Ok(self.identity.insert(identity))
    }

    pub fn logout(&mut self) -> Result<()> {
        self.keys.logout()?;
        self.identity = None;
        Ok(())
    }

    pub fn record_extraction(&self, article: &Article, now_ms: u64) -> Result<()> {
        self.state.set_many(vec![
            (CURRENT_ARTICLE, serde_json::to_value(article)?),
            (EXTRACTED_AT, Value::from(now_ms)),
        ])?;
        info!(
            url = %article.source_url,
            ok = article.extracted_successfully,
            "article stored"
        );
        Ok(())
    }

    /// Current article view; expired data is removed as a side effect.
    pub fn load_article(&self, now_ms: u64) -> Result<ArticleView> {
        let Some(article) = self.state.get::<Article>(CURRENT_ARTICLE)? else {
            return Ok(ArticleView::Empty);
        };
        let extracted_at = self.state.get::<u64>(EXTRACTED_AT)?;
        if !is_fresh(extracted_at, now_ms) {
            info!("stored article expired");
            self.state.remove(&[CURRENT_ARTICLE, EXTRACTED_AT])?;
            return Ok(ArticleView::Expired);
        }
        if !article.extracted_successfully || !article.has_content() {
            let msg = article
                .error_detail
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| NOTHING_READABLE.to_string());
            return Ok(ArticleView::Failed(msg));
        }
        Ok(ArticleView::Ready(article))
    }

    /// Build, sign and fan out the stored article.
    ///
    /// Every precondition is checked before a single connection is opened.
    pub async fn publish(
        &self,
        now_ms: u64,
        topics: &[String],
        opts: &PublishOptions,
    ) -> Result<(Event, PublishReport)> {
        let identity = self.identity.as_ref().ok_or(Error::MissingIdentity)?;
        let endpoints = self.relays.load_or_default()?;
        if endpoints.is_empty() {
            return Err(Error::NoRelays);
        }
        let article = match self.load_article(now_ms)? {
            ArticleView::Ready(article) => article,
            ArticleView::Empty => return Err(Error::NoArticle),
            ArticleView::Expired => return Err(Error::StaleArticle),
            ArticleView::Failed(msg) => return Err(Error::ExtractionFailed(msg)),
        };

        let event = builder::build(Some(&article), Some(identity), now_ms / 1000, topics)?;
        keys::verify(&event)?;
        info!(
            id = %event.id,
            title = event.tags.first().and_then(Tag::value).unwrap_or_default(),
            relays = endpoints.len(),
            "publishing article"
        );
        debug!(tags = ?event.tag_keys(), "event built");
        let report = publish::publish(&event, &endpoints, opts).await?;
        Ok((event, report))
    }
}
