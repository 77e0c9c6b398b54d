//! Command line interface for reading articles and sharing them on Nostr.
//! Supports key management, article extraction from saved HTML, display,
//! relay list maintenance and multi-relay publishing.

mod builder;
mod config;
mod error;
mod event;
mod extract;
mod keys;
mod markdown;
mod prefs;
mod publish;
mod relays;
mod session;
mod state;

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::Settings;
use extract::{Article, ReadabilityLike};
use keys::SigningIdentity;
use markdown::{HeadingStyle, MarkdownConverter};
use publish::Outcome;
use session::{ArticleView, Session};
use state::StateStore;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "readrelay",
    author,
    version,
    about = "Extract readable articles and publish them to Nostr relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Store a signing key given as `nsec1...` or 64 hex characters.
    Login { key: String },
    /// Forget the stored signing key.
    Logout,
    /// Print the `npub` of the stored key.
    Whoami {
        /// Print the secret key as `nsec1...` instead.
        #[arg(long)]
        nsec: bool,
    },
    /// Extract the readable article from an HTML file (`-` for stdin).
    Extract {
        file: String,
        /// Address the page was loaded from.
        #[arg(long)]
        url: String,
    },
    /// Print the current article as Markdown.
    Show {
        /// Underline level 1 and 2 headings instead of `#` prefixes.
        #[arg(long)]
        setext: bool,
    },
    /// Sign the current article and send it to every configured relay.
    Publish {
        /// Topic tag; repeat for several. Defaults to `TOPIC_TAGS`.
        #[arg(long = "topic", value_name = "TOPIC")]
        topics: Vec<String>,
    },
    /// Manage the relay list.
    Relays {
        #[command(subcommand)]
        action: RelayAction,
    },
    /// Reader display preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

/// Operations available under `readrelay relays`.
#[derive(Subcommand)]
enum RelayAction {
    /// Show relays with their indexes.
    List,
    /// Append a `ws://` or `wss://` relay.
    Add { url: String },
    /// Remove the relay at `index`.
    Remove { index: usize },
}

/// Operations available under `readrelay prefs`.
#[derive(Subcommand)]
enum PrefsAction {
    Show,
    /// Switch between light and dark.
    Theme,
    /// Grow or shrink the font by `delta` steps.
    Font {
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    let state = StateStore::new(cfg.store_root.clone());
    state.init().context("creating STORE_ROOT")?;
    let mut session = Session::open(state)?;
    let now = now_ms()?;

    match cli.command {
        Commands::Login { key } => {
            let identity = session.login(&key)?;
            println!("Logged in as {}", identity.npub()?);
        }
        Commands::Logout => {
            session.logout()?;
            println!("Logged out");
        }
        Commands::Whoami { nsec } => {
            let shown = if nsec {
                session.identity().map(SigningIdentity::nsec).transpose()?
            } else {
                session.npub()?
            };
            println!("{}", shown.as_deref().unwrap_or("Not logged in"));
        }
        Commands::Extract { file, url } => {
            let html = read_source(&file)?;
            let article = extract::extract(&html, &url, &ReadabilityLike::default());
            session.record_extraction(&article, now)?;
            if !article.extracted_successfully {
                bail!(
                    "{}",
                    article.error_detail.unwrap_or_else(|| "extraction failed".into())
                );
            }
            println!("Extracted: {}", article.title);
        }
        Commands::Show { setext } => match session.load_article(now)? {
            ArticleView::Ready(article) => {
                let heading_style = if setext {
                    HeadingStyle::Setext
                } else {
                    HeadingStyle::Atx
                };
                let converter = MarkdownConverter::new(markdown::Options {
                    heading_style,
                    ..Default::default()
                });
                print!("{}", render(&article, &converter));
            }
            view => bail!("{}", view.message().unwrap_or_default()),
        },
        Commands::Publish { topics } => {
            let topics = if topics.is_empty() {
                cfg.topic_tags.clone()
            } else {
                topics
            };
            let opts = cfg.publish_options();
            tokio::select! {
                res = session.publish(now, &topics, &opts) => {
                    let (event, report) = res?;
                    println!("{}", report.summary());
                    for outcome in report.outcomes.iter().filter(|o| o.state == Outcome::Failure) {
                        println!(
                            "  {}: {}",
                            outcome.endpoint,
                            outcome.detail.as_deref().unwrap_or_default()
                        );
                    }
                    println!("Event id: {}", event.id);
                }
                _ = tokio::signal::ctrl_c() => {
                    bail!("publish interrupted");
                }
            }
        }
        Commands::Relays { action } => {
            let relays = session.relays();
            let list = match action {
                RelayAction::List => relays.list()?,
                RelayAction::Add { url } => relays.add(&url)?,
                RelayAction::Remove { index } => relays.remove(index)?,
            };
            for (i, url) in list.iter().enumerate() {
                println!("{i}: {url}");
            }
        }
        Commands::Prefs { action } => {
            let store = session.state();
            let prefs = match action {
                PrefsAction::Show => prefs::load(store)?,
                PrefsAction::Theme => prefs::toggle_theme(store)?,
                PrefsAction::Font { delta } => prefs::change_font_size(store, delta)?,
            };
            println!("theme: {}", prefs.theme);
            println!("font size: {}", prefs.font_size);
        }
    }
    Ok(())
}

fn now_ms() -> anyhow::Result<u64> {
    let since = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before 1970")?;
    Ok(since.as_millis() as u64)
}

fn read_source(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        return io::read_to_string(io::stdin()).context("reading stdin");
    }
    fs::read_to_string(file).with_context(|| format!("reading {file}"))
}

/// Markdown view of an article headed by its title, byline and source.
fn render(article: &Article, converter: &MarkdownConverter) -> String {
    let mut out = format!("# {}\n\n", article.title);
    if !article.byline.is_empty() {
        out.push_str(&format!("By {}\n\n", article.byline));
    }
    if !article.source_url.is_empty() {
        out.push_str(&format!("<{}>\n\n", article.source_url));
    }
    if !article.html_content.is_empty() {
        out.push_str(&converter.convert(&article.html_content));
    } else {
        out.push_str(&article.text_content);
    }
    out.push('\n');
    out
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let base_dir = match env_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let store_root = base_dir.join("readrelay-data");
    let mut content = String::new();
    content.push_str(&format!("STORE_ROOT={}\n", display_path(&store_root)));
    content.push_str(&format!(
        "RELAY_TIMEOUT_MS={}\n",
        publish::DEFAULT_CONNECT_TIMEOUT_MS
    ));
    content.push_str(&format!("RELAY_LINGER_MS={}\n", publish::DEFAULT_LINGER_MS));
    content.push_str(&format!("TOPIC_TAGS={}\n", builder::DEFAULT_TOPICS.join(",")));
    content.push_str("TOR_SOCKS=\n");
    fs::write(env_path, content)?;
    Ok(())
}

fn display_path(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(not(test))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("readrelay=info")),
        )
        .with_writer(io::stderr)
        .init();
    // tokio-tungstenite builds its TLS config from the process-wide provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    run(cli).await
}
