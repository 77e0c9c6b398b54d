//! Readable-article extraction from a full HTML document.
//!
//! [`extract`] never fails: a parser error or an unreadable page becomes an
//! [`Article`] with `extracted_successfully == false` and the reason in
//! `error_detail`, so callers can show it like any other result.

use scraper::{node::Node, ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const UNTITLED: &str = "Untitled";
pub const NOTHING_READABLE: &str = "Could not extract readable content from the page";

/// Upper bound on elements the heuristic parser will walk.
pub const DEFAULT_MAX_ELEMS: usize = 200_000;

/// Result of one extraction attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub title: String,
    pub html_content: String,
    pub text_content: String,
    pub excerpt: String,
    pub byline: String,
    pub source_url: String,
    pub extracted_successfully: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Article {
    /// True when there is a body to publish in either form.
    pub fn has_content(&self) -> bool {
        !self.html_content.is_empty() || !self.text_content.is_empty()
    }
}

/// What a readability parser pulls out of a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArticle {
    pub title: Option<String>,
    pub content: String,
    pub text_content: String,
    pub excerpt: Option<String>,
    pub byline: Option<String>,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Aborting parsing document; {0} elements found")]
    TooManyElements(usize),
}

/// A readability algorithm: `Ok(None)` means the page has no article.
pub trait Readability {
    fn parse(&self, doc: &Html) -> Result<Option<ParsedArticle>, ParseError>;
}

/// Parse `source` and map the parser's result onto an [`Article`].
///
/// The parser only ever sees a freshly parsed copy of `source`.
pub fn extract(source: &str, source_url: &str, parser: &dyn Readability) -> Article {
    let doc = Html::parse_document(source);
    let doc_title = select_first(&doc, "title")
        .map(|t| collapse(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    match parser.parse(&doc) {
        Ok(Some(parsed)) => {
            debug!(url = source_url, chars = parsed.text_content.len(), "article extracted");
            Article {
                title: parsed
                    .title
                    .filter(|t| !t.is_empty())
                    .or(doc_title)
                    .unwrap_or_else(|| UNTITLED.to_string()),
                html_content: parsed.content,
                text_content: parsed.text_content,
                excerpt: parsed.excerpt.unwrap_or_default(),
                byline: parsed.byline.unwrap_or_default(),
                source_url: source_url.to_string(),
                extracted_successfully: true,
                error_detail: None,
            }
        }
        Ok(None) => {
            warn!(url = source_url, "no readable content found");
            failed(doc_title, source_url, NOTHING_READABLE.to_string())
        }
        Err(e) => {
            warn!(url = source_url, "readability extraction failed: {e}");
            failed(doc_title, source_url, e.to_string())
        }
    }
}

fn failed(doc_title: Option<String>, source_url: &str, detail: String) -> Article {
    Article {
        title: doc_title.unwrap_or_else(|| UNTITLED.to_string()),
        source_url: source_url.to_string(),
        extracted_successfully: false,
        error_detail: Some(detail),
        ..Article::default()
    }
}

/// Heuristic readability: prefer semantic containers, else the block with the
/// most paragraph text.
#[derive(Debug, Clone)]
pub struct ReadabilityLike {
    pub max_elems: usize,
}

impl Default for ReadabilityLike {
    fn default() -> Self {
        Self {
            max_elems: DEFAULT_MAX_ELEMS,
        }
    }
}

impl Readability for ReadabilityLike {
    fn parse(&self, doc: &Html) -> Result<Option<ParsedArticle>, ParseError> {
        if let Ok(all) = Selector::parse("*") {
            let count = doc.select(&all).count();
            if self.max_elems > 0 && count > self.max_elems {
                return Err(ParseError::TooManyElements(count));
            }
        }

        let Some(root) = content_root(doc) else {
            return Ok(None);
        };
        let text_content = visible_text(root).trim().to_string();
        if text_content.is_empty() {
            return Ok(None);
        }

        let title = meta_content(doc, "meta[property='og:title']")
            .or_else(|| select_text(doc, "title"))
            .or_else(|| select_text(doc, "h1"));
        let byline = meta_content(doc, "meta[name='author']")
            .or_else(|| select_text(doc, "[rel='author']"))
            .or_else(|| select_text(doc, ".byline"))
            .or_else(|| select_text(doc, ".author"));
        let excerpt = meta_content(doc, "meta[name='description']")
            .or_else(|| meta_content(doc, "meta[property='og:description']"))
            .or_else(|| first_paragraph(root));

        Ok(Some(ParsedArticle {
            title,
            content: root.inner_html().trim().to_string(),
            text_content,
            excerpt,
            byline,
        }))
    }
}

fn content_root(doc: &Html) -> Option<ElementRef<'_>> {
    for css in ["article", "main", "[role='main']"] {
        if let Some(el) = select_first(doc, css) {
            if !visible_text(el).trim().is_empty() {
                return Some(el);
            }
        }
    }
    let blocks = Selector::parse("div, section, td, body").ok()?;
    doc.select(&blocks)
        .map(|el| (paragraph_score(el), el))
        .filter(|(score, _)| *score > 0)
        .fold(None, |best: Option<(usize, ElementRef)>, (score, el)| match best {
            Some((top, _)) if top >= score => best,
            _ => Some((score, el)),
        })
        .map(|(_, el)| el)
}

/// Characters of text in the direct `<p>` children of `el`.
fn paragraph_score(el: ElementRef) -> usize {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "p")
        .map(|p| visible_text(p).trim().len())
        .sum()
}

/// Text of `el` excluding scripts, styles and `<noscript>` fallbacks.
fn visible_text(el: ElementRef) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if matches!(e.name(), "script" | "style" | "noscript") => {}
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    out.push_str(&visible_text(child_el));
                }
            }
            _ => {}
        }
    }
    out
}

fn first_paragraph(root: ElementRef) -> Option<String> {
    let sel = Selector::parse("p").ok()?;
    root.select(&sel)
        .map(|p| collapse(&visible_text(p)))
        .find(|t| !t.is_empty())
}

fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(css).ok()?;
    doc.select(&sel).next()
}

fn select_text(doc: &Html, css: &str) -> Option<String> {
    select_first(doc, css)
        .map(|el| collapse(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn meta_content(doc: &Html, css: &str) -> Option<String> {
    select_first(doc, css)
        .and_then(|el| el.value().attr("content"))
        .map(collapse)
        .filter(|t| !t.is_empty())
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html>
<head>
  <title>Doc Title</title>
  <meta property="og:title" content="Open Graph Title">
  <meta name="author" content="Jane Doe">
  <meta name="description" content="A short summary.">
  <script>var tracking = 1;</script>
</head>
<body>
  <nav><a href="/">Home</a></nav>
  <article>
    <h1>Heading</h1>
    <p>First paragraph of the story.</p>
    <p>Second paragraph.</p>
    <script>console.log("x")</script>
  </article>
  <footer>Copyright</footer>
</body>
</html>"#;

    struct Failing;

    impl Readability for Failing {
        fn parse(&self, _doc: &Html) -> Result<Option<ParsedArticle>, ParseError> {
            Err(ParseError::TooManyElements(7))
        }
    }

    #[test]
    fn extracts_article_fields() {
        let article = extract(PAGE, "https://example.com/story", &ReadabilityLike::default());
        assert!(article.extracted_successfully);
        assert_eq!(article.title, "Open Graph Title");
        assert_eq!(article.byline, "Jane Doe");
        assert_eq!(article.excerpt, "A short summary.");
        assert_eq!(article.source_url, "https://example.com/story");
        assert!(article.html_content.contains("<p>First paragraph of the story.</p>"));
        assert!(article.text_content.contains("Second paragraph."));
        assert!(!article.text_content.contains("console.log"));
        assert!(!article.text_content.contains("Copyright"));
        assert!(article.error_detail.is_none());
    }

    #[test]
    fn falls_back_to_densest_block() {
        let page = r#"<html><head><title>T</title></head><body>
            <div class="sidebar"><p>ad</p></div>
            <div class="post"><p>Long body text here.</p><p>And more of it.</p></div>
        </body></html>"#;
        let article = extract(page, "u", &ReadabilityLike::default());
        assert!(article.extracted_successfully);
        assert_eq!(article.title, "T");
        assert!(article.text_content.starts_with("Long body text here."));
        assert!(!article.text_content.contains("ad\n"));
        assert_eq!(article.excerpt, "Long body text here.");
    }

    #[test]
    fn empty_page_is_not_an_error() {
        let page = "<html><head><title>Blank</title></head><body></body></html>";
        let article = extract(page, "u", &ReadabilityLike::default());
        assert!(!article.extracted_successfully);
        assert_eq!(article.title, "Blank");
        assert_eq!(article.error_detail.as_deref(), Some(NOTHING_READABLE));
        assert!(!article.has_content());
    }

    #[test]
    fn parser_errors_become_failed_articles() {
        let article = extract("<p>x</p>", "https://e.org", &Failing);
        assert!(!article.extracted_successfully);
        assert_eq!(article.title, UNTITLED);
        assert_eq!(article.source_url, "https://e.org");
        assert_eq!(
            article.error_detail.as_deref(),
            Some("Aborting parsing document; 7 elements found")
        );
    }

    #[test]
    fn element_limit_is_enforced() {
        let parser = ReadabilityLike { max_elems: 3 };
        let article = extract(PAGE, "u", &parser);
        assert!(!article.extracted_successfully);
        assert!(article
            .error_detail
            .unwrap()
            .starts_with("Aborting parsing document"));
    }

    #[test]
    fn article_serializes_camel_case() {
        let article = extract(PAGE, "https://example.com/story", &ReadabilityLike::default());
        let val = serde_json::to_value(&article).unwrap();
        assert_eq!(val["sourceUrl"], "https://example.com/story");
        assert_eq!(val["extractedSuccessfully"], true);
        assert!(val.get("errorDetail").is_none());
        let back: Article = serde_json::from_value(val).unwrap();
        assert_eq!(back, article);
    }
}
