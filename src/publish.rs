//! Fan-out of one signed event to many relays.
//!
//! Every endpoint runs its own connect/send/linger cycle; the report is only
//! built once all of them have settled, so a slow or dead relay never hides
//! the result of a healthy one.

use std::time::Duration;

use anyhow::anyhow;
use futures_util::{future::join_all, SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};
use tokio_tungstenite::{client_async_tls, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{error::Result, event::Event};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_LINGER_MS: u64 = 1000;

const TIMEOUT_DETAIL: &str = "Connection timeout";
const FAILED_DETAIL: &str = "Connection failed";

/// Knobs for a single publish run.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Bound on TCP connect plus WebSocket handshake.
    pub connect_timeout: Duration,
    /// How long the socket stays open after the event is sent.
    pub linger: Duration,
    /// Optional SOCKS5 proxy (`host:port`), e.g. a local Tor daemon.
    pub tor_socks: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            linger: Duration::from_millis(DEFAULT_LINGER_MS),
            tor_socks: None,
        }
    }
}

/// Per-relay lifecycle, logged as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Open,
    Sending,
    Lingering,
    Closed,
    TimedOut,
    ConnectionError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub endpoint: String,
    pub state: Outcome,
    pub detail: Option<String>,
}

impl PublishOutcome {
    fn success(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Outcome::Success,
            detail: None,
        }
    }

    fn failure(endpoint: &str, detail: String) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Outcome::Failure,
            detail: Some(detail),
        }
    }
}

/// Outcomes in endpoint order with their tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub outcomes: Vec<PublishOutcome>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl PublishReport {
    pub fn from_outcomes(outcomes: Vec<PublishOutcome>) -> Self {
        let success_count = outcomes
            .iter()
            .filter(|o| o.state == Outcome::Success)
            .count();
        let failure_count = outcomes.len() - success_count;
        Self {
            outcomes,
            success_count,
            failure_count,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn summary(&self) -> String {
        let mut msg = format!(
            "Posted to {}/{} relays successfully!",
            self.success_count,
            self.total()
        );
        if self.failure_count > 0 {
            msg.push_str(&format!(" ({} failed)", self.failure_count));
        }
        msg
    }
}

/// Send `event` to every endpoint concurrently and wait for all of them.
///
/// Only serializing the event can fail; relay problems end up in the report.
pub async fn publish(
    event: &Event,
    endpoints: &[String],
    opts: &PublishOptions,
) -> Result<PublishReport> {
    let frame = event.to_wire()?;
    let outcomes = join_all(
        endpoints
            .iter()
            .map(|endpoint| publish_one(endpoint, &frame, opts)),
    )
    .await;
    let report = PublishReport::from_outcomes(outcomes);
    info!(
        id = %event.id,
        ok = report.success_count,
        failed = report.failure_count,
        "publish finished"
    );
    Ok(report)
}

async fn publish_one(endpoint: &str, frame: &str, opts: &PublishOptions) -> PublishOutcome {
    debug!(relay = endpoint, state = ?RelayState::Connecting);
    let connect = connect_ws(endpoint, opts.tor_socks.as_deref());
    let ws = match timeout(opts.connect_timeout, connect).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(relay = endpoint, state = ?RelayState::ConnectionError);
            warn!(relay = endpoint, "connect failed: {e}");
            return PublishOutcome::failure(endpoint, failure_detail(&e));
        }
        Err(_) => {
            debug!(relay = endpoint, state = ?RelayState::TimedOut);
            warn!(relay = endpoint, "connect timed out");
            return PublishOutcome::failure(endpoint, TIMEOUT_DETAIL.to_string());
        }
    };
    debug!(relay = endpoint, state = ?RelayState::Open);

    match deliver(endpoint, ws, frame, opts.linger).await {
        Ok(()) => {
            debug!(relay = endpoint, state = ?RelayState::Closed);
            info!(relay = endpoint, "event delivered");
            PublishOutcome::success(endpoint)
        }
        Err(e) => {
            debug!(relay = endpoint, state = ?RelayState::ConnectionError);
            warn!(relay = endpoint, "delivery failed: {e}");
            PublishOutcome::failure(endpoint, failure_detail(&e))
        }
    }
}

/// Send the frame, then keep reading until the linger window ends or the
/// relay hangs up.
async fn deliver(
    endpoint: &str,
    mut ws: RelaySocket,
    frame: &str,
    linger: Duration,
) -> anyhow::Result<()> {
    debug!(relay = endpoint, state = ?RelayState::Sending);
    ws.send(Message::Text(frame.to_string())).await?;

    debug!(relay = endpoint, state = ?RelayState::Lingering);
    let window = sleep(linger);
    tokio::pin!(window);
    let mut peer_closed = false;
    loop {
        tokio::select! {
            _ = &mut window => break,
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(txt))) => debug!(relay = endpoint, "relay replied: {txt}"),
                Some(Ok(Message::Close(_))) | None => {
                    peer_closed = true;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    if !peer_closed {
        if let Err(e) = ws.close(None).await {
            debug!(relay = endpoint, "close after linger: {e}");
        }
    }
    Ok(())
}

fn failure_detail(e: &anyhow::Error) -> String {
    let text = e.to_string();
    if text.trim().is_empty() {
        FAILED_DETAIL.to_string()
    } else {
        text
    }
}

type RelaySocket = WebSocketStream<MaybeTlsStream<Box<dyn AsyncReadWrite + Unpin + Send>>>;

/// Open a WebSocket to `relay`, through `tor_socks` when set. `wss://` gets TLS.
async fn connect_ws(relay: &str, tor_socks: Option<&str>) -> anyhow::Result<RelaySocket> {
    let url = Url::parse(relay)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(anyhow!("unsupported scheme: {}", url.scheme()));
    }
    let host = url.host_str().ok_or_else(|| anyhow!("missing host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| anyhow!("missing port"))?;
    let req = relay.into_client_request()?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = tor_socks {
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(TcpStream::connect((host, port)).await?)
    };
    let (ws, _) = client_async_tls(req, stream).await?;
    Ok(ws)
}

trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Tag, KIND_LONG_FORM};
    use std::time::Instant;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn sample_event() -> Event {
        Event {
            id: "aa11".into(),
            pubkey: "p".into(),
            kind: KIND_LONG_FORM,
            created_at: 1,
            tags: vec![Tag::pair("title", "Hello")],
            content: "body".into(),
            sig: "ff".into(),
        }
    }

    fn quick() -> PublishOptions {
        PublishOptions {
            connect_timeout: Duration::from_millis(300),
            linger: Duration::from_millis(100),
            tor_socks: None,
        }
    }

    /// Relay that acknowledges the first frame and returns it.
    async fn acking_relay() -> (String, tokio::task::JoinHandle<Option<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut first = None;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(txt) = msg {
                    if first.is_none() {
                        let _ = ws
                            .send(Message::Text(r#"["OK","aa11",true,""]"#.into()))
                            .await;
                        first = Some(txt);
                    }
                }
            }
            first
        });
        (url, handle)
    }

    /// Accepts TCP but never answers the handshake.
    async fn silent_relay() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            sleep(Duration::from_secs(10)).await;
        });
        (url, handle)
    }

    #[tokio::test]
    async fn one_good_one_silent_relay() {
        let (good, server) = acking_relay().await;
        let (silent, hold) = silent_relay().await;

        let report = publish(&sample_event(), &[good.clone(), silent.clone()], &quick())
            .await
            .unwrap();
        hold.abort();

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.outcomes[0].endpoint, good);
        assert_eq!(report.outcomes[0].state, Outcome::Success);
        assert_eq!(report.outcomes[1].endpoint, silent);
        assert_eq!(report.outcomes[1].detail.as_deref(), Some("Connection timeout"));
        assert_eq!(report.summary(), "Posted to 1/2 relays successfully! (1 failed)");

        let frame = server.await.unwrap().unwrap();
        let val: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(val[0], "EVENT");
        assert_eq!(val[1]["id"], "aa11");
    }

    #[tokio::test]
    async fn refused_connection_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let report = publish(&sample_event(), &[url], &quick()).await.unwrap();
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.state, Outcome::Failure);
        let detail = outcome.detail.as_deref().unwrap();
        assert!(!detail.is_empty());
        assert_ne!(detail, "Connection timeout");
    }

    #[tokio::test]
    async fn malformed_endpoints_fail_without_touching_others() {
        let (good, server) = acking_relay().await;
        let endpoints = vec!["not a url".to_string(), good, "http://example.com".to_string()];
        let report = publish(&sample_event(), &endpoints, &quick()).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert_eq!(report.outcomes[0].state, Outcome::Failure);
        assert_eq!(report.outcomes[1].state, Outcome::Success);
        assert_eq!(report.outcomes[2].state, Outcome::Failure);
        assert!(server.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn peer_close_ends_linger_early() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let opts = PublishOptions {
            linger: Duration::from_secs(5),
            ..quick()
        };
        let started = Instant::now();
        let report = publish(&sample_event(), &[url], &opts).await.unwrap();
        assert_eq!(report.success_count, 1);
        assert!(started.elapsed() < Duration::from_secs(4));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reset_during_linger_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let _ = ws.send(Message::Text(r#"["OK","x",true,""]"#.into())).await;
            drop(ws);
        });

        let opts = PublishOptions {
            linger: Duration::from_secs(2),
            ..quick()
        };
        let report = publish(&sample_event(), &[url.clone()], &opts).await.unwrap();
        server.await.unwrap();
        assert_eq!(report.failure_count, 1);
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.endpoint, url);
        assert_eq!(outcome.state, Outcome::Failure);
        let detail = outcome.detail.as_deref().unwrap();
        assert!(detail.to_lowercase().contains("reset"), "{detail}");
    }

    #[tokio::test]
    async fn empty_endpoint_list() {
        let report = publish(&sample_event(), &[], &quick()).await.unwrap();
        assert_eq!(report.total(), 0);
        assert_eq!(report.summary(), "Posted to 0/0 relays successfully!");
    }

    #[test]
    fn summary_omits_zero_failures() {
        let report = PublishReport::from_outcomes(vec![
            PublishOutcome::success("wss://a"),
            PublishOutcome::success("wss://b"),
        ]);
        assert_eq!(report.summary(), "Posted to 2/2 relays successfully!");
        let report = PublishReport::from_outcomes(vec![
            PublishOutcome::success("wss://a"),
            PublishOutcome::failure("wss://b", "x".into()),
            PublishOutcome::failure("wss://c", "y".into()),
        ]);
        assert_eq!(report.summary(), "Posted to 1/3 relays successfully! (2 failed)");
    }
}
