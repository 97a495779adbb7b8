use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ChatApi;
use crate::errors::StreamError;
use crate::events::{EventContext, EventDispatcher, HandlerResult, WebSocketEvent};
use crate::model::Post;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
pub trait EventStream: Send {
    /// `Ok(None)` once the server has closed the stream.
    async fn next_event(&mut self) -> Result<Option<WebSocketEvent>, StreamError>;
    async fn close(&mut self) -> Result<(), StreamError>;
}

pub struct WebSocketEventStream {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
}

impl WebSocketEventStream {
    /// Opens the connection and authenticates it with the session token.
    pub async fn connect(url: &str, token: &SecretString) -> Result<Self, StreamError> {
        let (ws, _response) =
            connect_async(url).await.map_err(|error| StreamError::Connect(error.to_string()))?;
        let (mut writer, reader) = ws.split();

        let challenge = json!({
            "seq": 1,
            "action": "authentication_challenge",
            "data": { "token": token.expose_secret() },
        });
        writer
            .send(Message::Text(challenge.to_string().into()))
            .await
            .map_err(|error| StreamError::Connect(error.to_string()))?;

        Ok(Self { writer, reader })
    }
}

#[async_trait]
impl EventStream for WebSocketEventStream {
    async fn next_event(&mut self) -> Result<Option<WebSocketEvent>, StreamError> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = decode_frame(&text) {
                        return Ok(Some(event));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map_or(1000, |frame| u16::from(frame.code));
                    info!(code, "websocket closed by server");
                    return Ok(None);
                }
                Some(Ok(
                    Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_),
                )) => {}
                Some(Err(error)) => return Err(StreamError::Receive(error.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.writer.close().await.map_err(|error| StreamError::Close(error.to_string()))
    }
}

/// Frames without an `event` field are replies to our own actions.
fn decode_frame(text: &str) -> Option<WebSocketEvent> {
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(error) => {
            warn!(error = %error, "skipping websocket frame that is not json");
            return None;
        }
    };
    if value.get("event").is_none() {
        let status = value.get("status").and_then(Value::as_str).unwrap_or("unknown");
        let seq_reply = value.get("seq_reply").and_then(Value::as_i64).unwrap_or_default();
        debug!(status, seq_reply, "websocket action reply");
        return None;
    }

    match serde_json::from_value::<WebSocketEvent>(value) {
        Ok(event) => Some(event),
        Err(error) => {
            warn!(error = %error, "skipping websocket event that could not be decoded");
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    StreamClosed,
    StreamFailed,
    NoStream,
}

/// Reads events one at a time, dispatches each one and delivers the reply
/// before reading the next.
pub struct EventStreamRunner {
    dispatcher: EventDispatcher,
    api: Arc<dyn ChatApi>,
}

impl EventStreamRunner {
    pub fn new(dispatcher: EventDispatcher, api: Arc<dyn ChatApi>) -> Self {
        Self { dispatcher, api }
    }

    pub async fn run(
        &self,
        stream: Option<Box<dyn EventStream>>,
        shutdown: CancellationToken,
    ) -> StopReason {
        let Some(mut stream) = stream else {
            warn!(
                event_name = "ingress.stream.unavailable",
                "no event stream; waiting for shutdown without listening"
            );
            shutdown.cancelled().await;
            return StopReason::NoStream;
        };

        info!(event_name = "ingress.stream.listening", "listening for websocket events");
        let reason = loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => break StopReason::Shutdown,
                next = stream.next_event() => next,
            };

            match next {
                Ok(Some(event)) => self.handle(&event).await,
                Ok(None) => {
                    info!(event_name = "ingress.stream.closed", "event stream closed");
                    break StopReason::StreamClosed;
                }
                Err(stream_error) => {
                    let diagnostic = stream_error.diagnostic();
                    error!(
                        event_name = "ingress.stream.failed",
                        error_message = %diagnostic.message,
                        error_id = %diagnostic.id,
                        detailed_error = %diagnostic.detailed_error,
                        "event stream failed"
                    );
                    break StopReason::StreamFailed;
                }
            }
        };

        if reason != StopReason::StreamClosed {
            if let Err(close_error) = stream.close().await {
                warn!(error = %close_error, "closing event stream failed");
            }
        }
        reason
    }

    async fn handle(&self, event: &WebSocketEvent) {
        let context = EventContext::for_event(event);
        debug!(
            event_name = "ingress.stream.event_received",
            event_kind = event.kind.as_str(),
            channel_id = %event.broadcast.channel_id,
            correlation_id = %context.correlation_id,
            "received websocket event"
        );

        match self.dispatcher.dispatch(event, &context).await {
            Ok(HandlerResult::Responded(post)) => self.deliver(&post, &context).await,
            Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
            Err(dispatch_error) => {
                warn!(
                    correlation_id = %context.correlation_id,
                    error = %dispatch_error,
                    "event dispatch failed; continuing event loop"
                );
            }
        }
    }

    async fn deliver(&self, post: &Post, context: &EventContext) {
        match self.api.create_post(post).await {
            Ok(created) => {
                debug!(
                    event_name = "egress.post.created",
                    post_id = %created.id,
                    root_id = %post.root_id,
                    correlation_id = %context.correlation_id,
                    "reply delivered"
                );
            }
            Err(client_error) => {
                let diagnostic = client_error.diagnostic();
                error!(
                    event_name = "egress.post.failed",
                    channel_id = %post.channel_id,
                    correlation_id = %context.correlation_id,
                    error_message = %diagnostic.message,
                    error_id = %diagnostic.id,
                    detailed_error = %diagnostic.detailed_error,
                    "We failed to send a message to the logging channel"
                );
            }
        }
    }
}
