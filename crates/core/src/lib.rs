pub mod config;
pub mod reply;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use reply::{InboundMessage, Reply, ReplyEngine, FALLBACK_REPLY, KEYWORDS, RUNNING_REPLY};
