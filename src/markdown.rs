//! HTML to Markdown conversion for article bodies.
//!
//! Output uses ATX headings, `-` bullets, fenced code blocks, `*`/`**`
//! emphasis and inline links. Paragraphs with no visible text are dropped, and
//! input without any markup passes through untouched so converting twice is a
//! no-op.

use scraper::{node::Node, ElementRef, Html};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingStyle {
    /// `# Title`
    Atx,
    /// `Title` underlined with `=` or `-` for levels 1 and 2, ATX below that.
    Setext,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub heading_style: HeadingStyle,
    pub bullet_marker: char,
    pub fence: &'static str,
    pub em_delimiter: &'static str,
    pub strong_delimiter: &'static str,
    pub hr: &'static str,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            heading_style: HeadingStyle::Atx,
            bullet_marker: '-',
            fence: "```",
            em_delimiter: "*",
            strong_delimiter: "**",
            hr: "* * *",
        }
    }
}

const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "head", "template", "title", "meta", "link",
];

const BLOCKS: &[&str] = &[
    "address", "article", "aside", "body", "dd", "details", "dialog", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "header", "html", "main", "nav",
    "section", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "tr",
];

/// Convert with the default [`Options`].
pub fn convert(html: &str) -> String {
    MarkdownConverter::default().convert(html)
}

/// True if `input` contains something that looks like a tag.
pub fn has_markup(input: &str) -> bool {
    let bytes = input.as_bytes();
    let Some(last_gt) = bytes.iter().rposition(|&b| b == b'>') else {
        return false;
    };
    bytes.windows(2).enumerate().any(|(i, w)| {
        i < last_gt
            && w[0] == b'<'
            && (w[1].is_ascii_alphabetic() || w[1] == b'/' || w[1] == b'!')
    })
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    opts: Options,
}

impl MarkdownConverter {
    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    pub fn convert(&self, html: &str) -> String {
        if !has_markup(html) {
            return html.to_string();
        }
        let doc = Html::parse_fragment(html);
        let raw = self.children(doc.root_element());
        tidy(&raw, self.opts.fence)
    }

    fn children(&self, el: ElementRef) -> String {
        let mut pieces = Vec::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => pieces.push(escape(&collapse_ws(text))),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        pieces.push(self.element(child_el));
                    }
                }
                _ => {}
            }
        }
        join_pieces(pieces, is_block(el.value().name()))
    }

    fn element(&self, el: ElementRef) -> String {
        let name = el.value().name();
        match name {
            n if SKIPPED.contains(&n) => String::new(),
            "p" => {
                if el.text().all(|t| t.trim().is_empty()) {
                    return String::new();
                }
                block(&inline_lines(&self.children(el)))
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(name.as_bytes()[1] - b'0');
                let text = inline_lines(&self.children(el)).replace("  \n", " ");
                if text.is_empty() {
                    return String::new();
                }
                block(&self.heading(level, &text))
            }
            "br" => "  \n".to_string(),
            "hr" => block(self.opts.hr),
            "em" | "i" => wrap_inline(&self.children(el), self.opts.em_delimiter),
            "strong" | "b" => wrap_inline(&self.children(el), self.opts.strong_delimiter),
            "code" => inline_code(&el.text().collect::<String>()),
            "pre" => block(&self.code_block(el)),
            "a" => self.link(el),
            "img" => image(el),
            "ul" | "ol" => self.list(el, name == "ol"),
            "blockquote" => {
                let inner = tidy(&self.children(el), self.opts.fence);
                if inner.is_empty() {
                    return String::new();
                }
                let quoted: Vec<String> = inner
                    .lines()
                    .map(|l| if l.is_empty() { ">".into() } else { format!("> {l}") })
                    .collect();
                block(&quoted.join("\n"))
            }
            n if BLOCKS.contains(&n) => block(self.children(el).trim()),
            _ => self.children(el),
        }
    }

    fn heading(&self, level: usize, text: &str) -> String {
        match (self.opts.heading_style, level) {
            (HeadingStyle::Setext, 1) => format!("{text}\n{}", "=".repeat(text.chars().count())),
            (HeadingStyle::Setext, 2) => format!("{text}\n{}", "-".repeat(text.chars().count())),
            _ => format!("{} {text}", "#".repeat(level)),
        }
    }

    fn code_block(&self, pre: ElementRef) -> String {
        let code_el = pre
            .children()
            .filter_map(ElementRef::wrap)
            .find(|c| c.value().name() == "code");
        let lang = code_el
            .and_then(|c| {
                c.value()
                    .classes()
                    .find_map(|cls| cls.strip_prefix("language-").map(str::to_string))
            })
            .unwrap_or_default();
        let source = code_el.unwrap_or(pre);
        let text: String = source.text().collect();
        let fence = self.opts.fence;
        format!("{fence}{lang}\n{}\n{fence}", text.trim_end_matches('\n'))
    }

    fn link(&self, el: ElementRef) -> String {
        let text = self.children(el);
        let href = el.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() || text.trim().is_empty() {
            return text;
        }
        let title = el
            .value()
            .attr("title")
            .filter(|t| !t.is_empty())
            .map(|t| format!(" \"{}\"", t.replace('"', "\\\"")))
            .unwrap_or_default();
        let (lead, body, trail) = split_ws(&text);
        format!("{lead}[{body}]({}{title}){trail}", href.replace(')', "%29"))
    }

    fn list(&self, el: ElementRef, ordered: bool) -> String {
        let start: usize = el
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(1);
        let mut items = Vec::new();
        for (i, li) in el
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "li")
            .enumerate()
        {
            let marker = if ordered {
                format!("{}. ", start.saturating_add(i))
            } else {
                format!("{} ", self.opts.bullet_marker)
            };
            let pad = " ".repeat(marker.len());
            let content = tidy(&self.children(li), self.opts.fence);
            let content = content
                .lines()
                .map(|l| if l.is_empty() { String::new() } else { format!("{pad}{l}") })
                .collect::<Vec<_>>()
                .join("\n");
            items.push(format!("{marker}{}", content.trim_start()));
        }
        if items.is_empty() {
            return String::new();
        }
        let body = items.join("\n");
        let nested = el
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| p.value().name() == "li");
        if nested {
            format!("\n{body}\n")
        } else {
            block(&body)
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "li" | "ul" | "ol" | "blockquote" | "pre"
    ) || BLOCKS.contains(&name)
}

fn block(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    format!("\n\n{content}\n\n")
}

fn image(el: ElementRef) -> String {
    let src = el.value().attr("src").unwrap_or_default().trim();
    if src.is_empty() {
        return String::new();
    }
    let alt = el.value().attr("alt").unwrap_or_default();
    let title = el
        .value()
        .attr("title")
        .filter(|t| !t.is_empty())
        .map(|t| format!(" \"{t}\""))
        .unwrap_or_default();
    format!("![{alt}]({src}{title})")
}

fn inline_code(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

/// Surround inline content with `delim`, keeping edge whitespace outside.
fn wrap_inline(content: &str, delim: &str) -> String {
    let (lead, body, trail) = split_ws(content);
    if body.is_empty() {
        return content.to_string();
    }
    format!("{lead}{delim}{body}{delim}{trail}")
}

fn split_ws(s: &str) -> (&str, &str, &str) {
    let body = s.trim();
    let lead = if s.starts_with(char::is_whitespace) && !body.is_empty() { " " } else { "" };
    let trail = if s.ends_with(char::is_whitespace) && !body.is_empty() { " " } else { "" };
    (lead, body, trail)
}

/// Trim each hard-break segment of an inline run.
fn inline_lines(content: &str) -> String {
    content
        .split("  \n")
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("  \n")
        .trim()
        .to_string()
}

/// Concatenate rendered children, dropping whitespace that touches a block edge.
///
/// The edges of a block container count as block edges; the edges of an inline
/// container do not, so `<em> x </em>` keeps its spaces for the caller.
fn join_pieces(pieces: Vec<String>, in_block: bool) -> String {
    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        let after_block = if out.is_empty() {
            in_block
        } else {
            out.ends_with('\n')
        };
        let before_block = pieces[i + 1..]
            .iter()
            .find(|p| !p.is_empty())
            .map_or(in_block, |p| p.starts_with('\n'));
        let mut s = piece.as_str();
        if !s.contains('\n') {
            if after_block {
                s = s.trim_start();
            }
            if before_block {
                s = s.trim_end();
            }
        }
        out.push_str(s);
    }
    out
}

fn collapse_ws(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for c in text.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c') {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// Backslash-escape characters Markdown would otherwise interpret.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    let lead = out.len() - out.trim_start().len();
    let (ws, rest) = out.split_at(lead);
    let needs_escape = rest.starts_with('#')
        || rest.starts_with("> ")
        || rest.starts_with("- ")
        || rest.starts_with("+ ")
        || rest.starts_with('=')
        || ordered_marker(rest);
    if !needs_escape {
        return out;
    }
    if ordered_marker(rest) {
        let dot = rest.find('.').unwrap_or(0);
        format!("{ws}{}\\{}", &rest[..dot], &rest[dot..])
    } else {
        format!("{ws}\\{rest}")
    }
}

fn ordered_marker(s: &str) -> bool {
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && s[digits..].starts_with(". ")
}

/// Collapse blank-line runs and trim, leaving fenced code untouched.
fn tidy(raw: &str, fence: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0;
    for line in raw.split('\n') {
        if line.trim_start().starts_with(fence) {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            lines.push("");
            continue;
        }
        blank_run = 0;
        lines.push(line);
    }
    let joined = lines.join("\n");
    joined.trim_matches('\n').to_string()
}
