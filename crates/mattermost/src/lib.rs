//! Mattermost Integration - HTTP API and websocket event stream
//!
//! This crate provides the chat-server side of eve:
//! - **Client** (`client`) - the v4 REST calls the bot makes (`ChatApi`)
//! - **Events** (`events`) - websocket event model and per-channel dispatch
//! - **Socket** (`socket`) - websocket connection and the event loop
//! - **Model** (`model`) - users, teams, channels and posts
//!
//! # Architecture
//!
//! ```text
//! Websocket → EventStreamRunner → EventDispatcher → Handler
//!                    ↓
//!              ChatApi::create_post ← Reply
//! ```

pub mod client;
pub mod errors;
pub mod events;
pub mod model;
pub mod socket;

pub use client::{ChatApi, HttpChatClient};
pub use errors::{ApiError, ClientError, Diagnostic, StreamError};
pub use events::{EventDispatcher, EventHandler, EventKind, HandlerResult, WebSocketEvent};
pub use model::{Channel, InitialLoad, Post, Team, User};
pub use socket::{EventStream, EventStreamRunner, StopReason, WebSocketEventStream};
