use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::Post;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum EventKind {
    Hello,
    Posted,
    PostEdited,
    PostDeleted,
    ChannelCreated,
    ChannelUpdated,
    Typing,
    StatusChange,
    Other(String),
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hello" => Self::Hello,
            "posted" => Self::Posted,
            "post_edited" => Self::PostEdited,
            "post_deleted" => Self::PostDeleted,
            "channel_created" => Self::ChannelCreated,
            "channel_updated" => Self::ChannelUpdated,
            "typing" => Self::Typing,
            "status_change" => Self::StatusChange,
            _ => Self::Other(value),
        }
    }
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hello => "hello",
            Self::Posted => "posted",
            Self::PostEdited => "post_edited",
            Self::PostDeleted => "post_deleted",
            Self::ChannelCreated => "channel_created",
            Self::ChannelUpdated => "channel_updated",
            Self::Typing => "typing",
            Self::StatusChange => "status_change",
            Self::Other(kind) => kind,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Broadcast {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub team_id: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct WebSocketEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub broadcast: Broadcast,
    #[serde(default)]
    pub seq: i64,
}

impl WebSocketEvent {
    /// The post carried by a `posted` event. The server sends it as a JSON
    /// document encoded inside a string.
    pub fn post(&self) -> Result<Option<Post>, serde_json::Error> {
        match self.data.get("post") {
            Some(Value::String(raw)) => serde_json::from_str(raw).map(Some),
            Some(other) => Post::deserialize(other).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn for_event(event: &WebSocketEvent) -> Self {
        Self { correlation_id: format!("ws-{}", event.seq) }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Post),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("event payload could not be decoded: {0}")]
    Payload(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_kind(&self) -> EventKind;
    async fn handle(
        &self,
        event: &WebSocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes events from a single channel to the handler registered for their
/// kind. Everything else is ignored, including every event when no channel
/// scope is set.
#[derive(Default)]
pub struct EventDispatcher {
    channel_id: Option<String>,
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn scoped_to(channel_id: Option<String>) -> Self {
        Self { channel_id, handlers: HashMap::new() }
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_kind(), Arc::new(handler));
    }

    pub fn in_scope(&self, event: &WebSocketEvent) -> bool {
        self.channel_id.as_deref() == Some(event.broadcast.channel_id.as_str())
    }

    pub async fn dispatch(
        &self,
        event: &WebSocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        if !self.in_scope(event) {
            return Ok(HandlerResult::Ignored);
        }
        let Some(handler) = self.handlers.get(&event.kind) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }
}
