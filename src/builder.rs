//! Assembly of the signed kind-30023 article event.

use crate::{
    error::{Error, Result},
    event::{Event, Tag, UnsignedEvent, KIND_LONG_FORM},
    extract::Article,
    keys::{self, SigningIdentity},
    markdown,
};

const UNKNOWN_SOURCE: &str = "Unknown";
const SHARED_WITH: &str = "Reader to Nostr";

/// Topic tags used when none are configured.
pub const DEFAULT_TOPICS: [&str; 3] = ["web-archive", "wayback", "ReadToRelay"];

/// Build and sign the long-form event for `article`.
pub fn build(
    article: Option<&Article>,
    identity: Option<&SigningIdentity>,
    now_seconds: u64,
    topics: &[String],
) -> Result<Event> {
    let identity = identity.ok_or(Error::MissingIdentity)?;
    let article = article
        .filter(|a| a.has_content())
        .ok_or(Error::NoArticle)?;

    let body = if !article.html_content.is_empty() {
        markdown::convert(&article.html_content)
    } else {
        article.text_content.clone()
    };
    let content = format!("{}{}", header(&article.source_url), body);

    let title = if article.title.is_empty() {
        "Untitled"
    } else {
        article.title.as_str()
    };
    let mut tags = vec![
        Tag::pair("title", title),
        Tag::pair("url", article.source_url.as_str()),
        Tag::pair("published_at", now_seconds.to_string()),
    ];
    tags.extend(canonical_topics(topics).into_iter().map(|t| Tag::pair("t", t)));
    if !article.byline.is_empty() {
        tags.push(Tag::pair("author", article.byline.as_str()));
    }

    keys::sign(
        UnsignedEvent {
            kind: KIND_LONG_FORM,
            created_at: now_seconds,
            tags,
            content,
        },
        identity,
    )
}

/// Source attribution placed above the article body.
pub fn header(source_url: &str) -> String {
    let label = if source_url.is_empty() {
        UNKNOWN_SOURCE
    } else {
        source_url
    };
    [
        format!("**Original source:** [{label}]({source_url})"),
        format!("**Shared with:** {SHARED_WITH}"),
        String::new(),
        "---".to_string(),
        String::new(),
    ]
    .join("\n")
}

/// Trimmed, non-empty topics in first-seen order.
pub fn canonical_topics(topics: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for topic in topics.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|seen| seen == topic) {
            out.push(topic.to_string());
        }
    }
    out
}
