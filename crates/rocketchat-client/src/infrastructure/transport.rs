//! WebSocket transport: connects a [`Session`] to a Rocket.Chat server.
//!
//! This module is responsible for:
//!
//! 1. Opening the WebSocket (`ws://` or `wss://`) with tokio-tungstenite.
//! 2. Splitting it into a write sink and a read stream.
//! 3. Running the tasks of one connection:
//!    - **Writer**: drains the session's outbound channel into text frames.
//!    - **Reader**: feeds every inbound frame to
//!      [`Session::on_frame_received`], and calls
//!      [`Session::on_disconnect`] when the stream ends.
//!    - **Sweeper** (optional): expires calls older than the call timeout.
//! 4. Sending the DDP `connect` handshake.
//!
//! # Shutdown
//!
//! [`Connection::close`] tears the session down first, which fails pending
//! calls and drops the outbound sender.  The writer then sees its channel end,
//! sends a WebSocket Close frame, and exits; the reader exits on the server's
//! Close reply.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use crate::application::session::{ServerHandle, Session};

/// How long [`Connection::close`] waits for the reader to see the server's
/// Close reply before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Optional call-expiry policy for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    /// Calls pending longer than this fail with a timed-out outcome.
    pub call_timeout: Duration,
    /// How often pending calls are checked.
    pub sweep_interval: Duration,
}

/// A live connection and the tasks serving it.
pub struct Connection {
    session: Session,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    sweeper: Option<JoinHandle<()>>,
}

impl Connection {
    /// Opens a WebSocket to `url`, starts the connection tasks, and sends the
    /// DDP handshake.
    ///
    /// Returns as soon as the handshake is queued; calls may be issued right
    /// away.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket cannot be opened (bad URL, DNS, TLS,
    /// or HTTP upgrade failure).
    pub async fn open(url: &str, policy: Option<TimeoutPolicy>) -> anyhow::Result<Self> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("failed to open WebSocket to {url}"))?;
        info!("WebSocket connected to {url}");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let session = Session::new(url, out_tx);

        // ── Writer ────────────────────────────────────────────────────────────
        let name = url.to_string();
        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                debug!(server = %name, "→ {frame}");
                if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                    warn!(server = %name, "WebSocket send failed: {e}");
                    break;
                }
            }
            if let Err(e) = ws_tx.close().await {
                debug!(server = %name, "WebSocket close failed: {e}");
            }
        });

        // ── Reader ────────────────────────────────────────────────────────────
        let reader_session = session.clone();
        let reader = tokio::spawn(async move {
            let name = reader_session.handle().name().to_string();
            while let Some(next) = ws_rx.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => {
                        debug!(server = %name, "← {text}");
                        reader_session.on_frame_received(text.as_bytes());
                    }
                    Ok(WsMessage::Binary(bytes)) => {
                        reader_session.on_frame_received(&bytes);
                    }
                    Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                    Ok(WsMessage::Close(frame)) => {
                        debug!(server = %name, "WebSocket Close received: {frame:?}");
                        break;
                    }
                    Err(e) => {
                        warn!(server = %name, "WebSocket read failed: {e}");
                        break;
                    }
                }
            }
            let failed = reader_session.on_disconnect();
            info!(server = %name, failed_calls = failed, "connection closed");
        });

        // ── Sweeper ───────────────────────────────────────────────────────────
        let sweeper = policy.map(|policy| {
            let sweep_session = session.clone();
            tokio::spawn(async move {
                let mut ticker = interval(policy.sweep_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if sweep_session.handle().is_closed() {
                        break;
                    }
                    sweep_session.expire_stale(policy.call_timeout);
                }
            })
        });

        session
            .start_handshake()
            .context("connection closed before the handshake could be sent")?;

        Ok(Self {
            session,
            reader,
            writer,
            sweeper,
        })
    }

    /// The transport-facing session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The handle for issuing calls.
    pub fn handle(&self) -> &ServerHandle {
        self.session.handle()
    }

    /// Fails every pending call and shuts the connection down.
    pub async fn close(self) {
        self.session.on_disconnect();

        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        if let Err(e) = self.writer.await {
            debug!("writer task ended abnormally: {e}");
        }

        let mut reader = self.reader;
        if timeout(CLOSE_GRACE, &mut reader).await.is_err() {
            debug!("server did not answer Close; aborting reader");
            reader.abort();
        }
    }
}
