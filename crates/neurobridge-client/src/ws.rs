//! WebSocket realtime transport
//!
//! Client-side transport speaking the JSON envelope protocol from
//! [`crate::wire`]. A small dedicated tokio runtime drives two tasks:
//!
//! - a reader that decodes frames into the single ordered inbound queue the
//!   sync loop drains, and
//! - a writer that drains the outbound queue into the socket.
//!
//! The sync loop side stays fully synchronous: [`WsChannel`] implements
//! [`RealtimeChannel`] with a plain blocking `recv_timeout` and a
//! non-blocking `send`. Reconnection and backoff are deliberately out of
//! scope; when the socket dies the loop sees `Closed`/`Fatal` and the run
//! owner decides what happens next.

use std::sync::mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::channel::{ChannelError, ChannelResult, RealtimeChannel};
use crate::wire::{decode_inbound, InboundMessage, OutboundMessage};

/// Errors raised while establishing the WebSocket connection.
#[derive(Debug, Error)]
pub enum WsError {
    /// Handshake or protocol failure.
    #[error("websocket connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The background runtime could not be built.
    #[error("runtime start failed: {0}")]
    Runtime(#[from] std::io::Error),

    /// The API key contained bytes not valid in an HTTP header.
    #[error("api key is not a valid header value")]
    InvalidApiKey,
}

/// Connection parameters for the realtime channel.
#[derive(Clone, Debug)]
pub struct WsConfig {
    /// WebSocket URL, e.g. `wss://brains.example.com/rt`.
    pub url: String,
    /// Machine API key, sent as `x-api-key` and `Authorization: Bearer`.
    pub api_key: Option<String>,
    /// Run to join after connecting.
    pub run_id: String,
}

/// WebSocket-backed [`RealtimeChannel`].
pub struct WsChannel {
    // Owns the runtime so the reader/writer tasks live as long as the channel.
    _runtime: tokio::runtime::Runtime,
    inbound: mpsc::Receiver<Result<InboundMessage, String>>,
    outbound: tokio_mpsc::UnboundedSender<OutboundMessage>,
}

impl WsChannel {
    /// Connect, authenticate and join the run room.
    ///
    /// # Errors
    ///
    /// Returns [`WsError`] if the runtime cannot start, the key is not a
    /// valid header value, or the handshake fails.
    pub fn connect(config: &WsConfig) -> Result<Self, WsError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let mut request = config
            .url
            .as_str()
            .into_client_request()
            .map_err(WsError::Connect)?;
        if let Some(key) = &config.api_key {
            let value =
                HeaderValue::from_str(key).map_err(|_| WsError::InvalidApiKey)?;
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| WsError::InvalidApiKey)?;
            request.headers_mut().insert("x-api-key", value);
            request.headers_mut().insert("Authorization", bearer);
        }

        let (stream, _response) =
            runtime.block_on(tokio_tungstenite::connect_async(request))?;
        let (sink, source) = stream.split();

        let (in_tx, in_rx) = mpsc::channel();
        let (out_tx, out_rx) = tokio_mpsc::unbounded_channel();

        runtime.spawn(read_task(source, in_tx));
        runtime.spawn(write_task(sink, out_rx));

        // Join the run room before anything else goes out.
        let _ = out_tx.send(OutboundMessage::Join {
            run_id: config.run_id.clone(),
        });

        Ok(Self {
            _runtime: runtime,
            inbound: in_rx,
            outbound: out_tx,
        })
    }
}

impl RealtimeChannel for WsChannel {
    fn recv_timeout(&mut self, timeout: Duration) -> ChannelResult<InboundMessage> {
        match self.inbound.recv_timeout(timeout) {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(reason)) => Err(ChannelError::Fatal(reason)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ChannelError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    fn send(&mut self, message: OutboundMessage) -> ChannelResult<()> {
        self.outbound
            .send(message)
            .map_err(|_| ChannelError::Closed)
    }
}

type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
>;
type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    Message,
>;

async fn read_task(
    mut source: WsStream,
    inbound: mpsc::Sender<Result<InboundMessage, String>>,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_inbound(&text) {
                Ok(Some(message)) => {
                    if inbound.send(Ok(message)).is_err() {
                        // Loop side hung up; nothing left to deliver to.
                        return;
                    }
                }
                Ok(None) => debug!("ignoring unknown realtime event"),
                // A malformed frame is a data fault, not a transport fault.
                Err(err) => warn!(error = %err, "dropping malformed frame"),
            },
            Ok(Message::Close(close)) => {
                match close {
                    Some(frame) if frame.code != CloseCode::Normal => {
                        let _ = inbound.send(Err(format!(
                            "server closed: {} ({})",
                            frame.reason, frame.code
                        )));
                    }
                    // Normal close: dropping the sender surfaces as Closed.
                    _ => {}
                }
                return;
            }
            Ok(_) => {} // ping/pong/binary
            Err(err) => {
                let _ = inbound.send(Err(err.to_string()));
                return;
            }
        }
    }
}

async fn write_task(mut sink: WsSink, mut outbound: tokio_mpsc::UnboundedReceiver<OutboundMessage>) {
    while let Some(message) = outbound.recv().await {
        if let Err(err) = sink.send(Message::Text(message.encode())).await {
            warn!(error = %err, "outbound send failed; writer stopping");
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
