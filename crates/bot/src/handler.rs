use async_trait::async_trait;
use eve_core::reply::{InboundMessage, ReplyEngine};
use eve_mattermost::events::{
    EventContext, EventHandler, EventHandlerError, EventKind, HandlerResult, WebSocketEvent,
};
use eve_mattermost::model::Post;
use tracing::{debug, info};

/// Answers posts in the logging channel through the reply engine.
pub struct PostedHandler {
    engine: ReplyEngine,
    bot_user_id: String,
    channel_id: String,
}

impl PostedHandler {
    pub fn new(
        engine: ReplyEngine,
        bot_user_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self { engine, bot_user_id: bot_user_id.into(), channel_id: channel_id.into() }
    }
}

#[async_trait]
impl EventHandler for PostedHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::Posted
    }

    async fn handle(
        &self,
        event: &WebSocketEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let post = event
            .post()
            .map_err(|error| EventHandlerError::Payload(error.to_string()))?
            .ok_or_else(|| EventHandlerError::Payload("posted event carried no post".to_owned()))?;

        let message =
            InboundMessage { post_id: &post.id, user_id: &post.user_id, text: &post.message };
        let Some(reply) = self.engine.reply_to(&message, &self.bot_user_id) else {
            debug!(post_id = %post.id, correlation_id = %ctx.correlation_id, "ignoring own post");
            return Ok(HandlerResult::Processed);
        };

        info!(
            event_name = "bot.reply.selected",
            post_id = %post.id,
            matched_keyword = reply.matched_keyword.unwrap_or("none"),
            correlation_id = %ctx.correlation_id,
            "responding to logging channel message"
        );
        Ok(HandlerResult::Responded(Post::new(&self.channel_id, reply.text).in_thread(reply.root_id)))
    }
}
