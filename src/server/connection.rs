//! Per-connection task
//!
//! Runs the WebSocket handshake, then multiplexes three sources until the
//! session ends: inbound frames, the outbound queue fed by the publisher,
//! and the keepalive timer.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::{Error, Result};
use crate::protocol::ServerMessage;
use crate::registry::{ConnectionReceiver, ConnectionRegistry, Outbound};
use crate::server::config::{ServerConfig, MIN_PING_INTERVAL};
use crate::session::Session;

enum Step {
    Inbound(Option<std::result::Result<Message, WsError>>),
    Outbound(Option<Outbound>),
    Keepalive,
}

/// A live WebSocket connection
pub struct Connection {
    session: Session,
    socket: WebSocketStream<TcpStream>,
    outbound: ConnectionReceiver,
    config: ServerConfig,
}

impl Connection {
    /// Complete the WebSocket handshake and register the session
    pub async fn accept(
        connection_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(config.max_message_size);
        ws_config.max_frame_size = Some(config.max_message_size);

        let handshake = tokio_tungstenite::accept_async_with_config(socket, Some(ws_config));
        let socket = tokio::time::timeout(config.handshake_timeout, handshake)
            .await
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "WebSocket handshake timed out",
                ))
            })??;

        let (session, outbound) = Session::open(registry, connection_id, peer_addr);

        Ok(Self {
            session,
            socket,
            outbound,
            config,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Serve the connection until it closes
    ///
    /// The session leaves the registry before this returns, whatever the
    /// outcome; the guard covers cancellation.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.serve().await;
        self.session.finish();

        tracing::debug!(
            connection_id = self.session.id,
            duration_ms = self.session.duration().as_millis() as u64,
            messages = self.session.messages_received,
            malformed = self.session.malformed_messages,
            "Session finished"
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        self.send_message(&ServerMessage::connected()).await?;

        let period = self.config.ping_interval.max(MIN_PING_INTERVAL);
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.session.is_open() {
            let step = tokio::select! {
                inbound = self.socket.next() => Step::Inbound(inbound),
                outbound = self.outbound.next() => Step::Outbound(outbound),
                _ = keepalive.tick() => Step::Keepalive,
            };

            match step {
                Step::Inbound(inbound) => self.on_inbound(inbound).await?,
                Step::Outbound(outbound) => self.on_outbound(outbound).await?,
                Step::Keepalive => self.on_keepalive().await?,
            }
        }

        Ok(())
    }

    async fn on_inbound(
        &mut self,
        inbound: Option<std::result::Result<Message, WsError>>,
    ) -> Result<()> {
        match inbound {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = self.session.handle_text(&text) {
                    self.send_message(&reply).await?;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(connection_id = self.session.id, "Peer closed");
                self.session.close();
            }
            Some(Ok(Message::Binary(data))) => {
                self.session.touch();
                tracing::debug!(
                    connection_id = self.session.id,
                    len = data.len(),
                    "Ignoring binary frame"
                );
            }
            Some(Ok(_)) => {
                // Ping/pong; tungstenite answers pings itself
                self.session.touch();
            }
            Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                self.session.close();
            }
            Some(Err(e)) => {
                self.session.close();
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn on_outbound(&mut self, outbound: Option<Outbound>) -> Result<()> {
        match outbound {
            Some(Outbound::Frame(frame)) => match text_message(&frame) {
                Some(message) => self.socket.send(message).await?,
                None => tracing::error!(
                    connection_id = self.session.id,
                    len = frame.len(),
                    "Dropping non-UTF-8 frame"
                ),
            },
            Some(Outbound::Evicted) => {
                self.session.on_evicted();
                tracing::info!(connection_id = self.session.id, "Evicted, closing");
                self.send_message(&ServerMessage::inventory_deleted()).await?;
                self.close_socket().await;
            }
            None => self.session.close(),
        }
        Ok(())
    }

    async fn on_keepalive(&mut self) -> Result<()> {
        if self.session.idle_for() > self.config.idle_timeout {
            tracing::debug!(
                connection_id = self.session.id,
                idle_ms = self.session.idle_for().as_millis() as u64,
                "Idle timeout"
            );
            self.session.close();
            self.close_socket().await;
            return Ok(());
        }

        self.socket.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn send_message(&mut self, message: &ServerMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close_socket(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(connection_id = self.session.id, error = %e, "Close failed");
        }
    }
}

/// Text frame for a serialized event
///
/// The shared buffer is copied once here, since text messages own their
/// payload.
fn text_message(frame: &Bytes) -> Option<Message> {
    String::from_utf8(frame.to_vec()).ok().map(Message::Text)
}
