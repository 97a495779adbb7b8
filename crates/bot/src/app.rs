use eve_core::config::AppConfig;
use eve_core::reply::ReplyEngine;
use eve_mattermost::client::{ChatApi, HttpChatClient};
use eve_mattermost::events::EventDispatcher;
use eve_mattermost::socket::{EventStream, EventStreamRunner};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::{
    bootstrap, connect_event_stream, report_failure, stopped_message, BootstrapError, BotContext,
};
use crate::handler::PostedHandler;
use crate::shutdown::spawn_signal_listener;

/// Bootstraps the bot, answers events until a shutdown signal arrives, then
/// announces the stop. Only startup failures are returned, already logged.
pub async fn run(config: AppConfig) -> Result<(), BootstrapError> {
    let result = run_until_shutdown(config).await;
    if let Err(error) = &result {
        report_failure("bot startup failed", &error.diagnostic());
    }
    result
}

async fn run_until_shutdown(config: AppConfig) -> Result<(), BootstrapError> {
    let ws_url = config.mattermost.websocket_url()?;
    let engine =
        ReplyEngine::new().map_err(|error| BootstrapError::ReplyEngine(error.to_string()))?;
    let client = HttpChatClient::new(&config.mattermost.url).map_err(BootstrapError::Client)?;

    let shutdown = CancellationToken::new();
    let listener = spawn_signal_listener(shutdown.clone());

    if let Some(context) = start(client, &config, &shutdown).await? {
        let stream = connect_event_stream(&context, &ws_url).await;
        serve(context, engine, stream, shutdown).await;
    }

    listener.abort();
    Ok(())
}

/// `Ok(None)` when shutdown was requested before bootstrap finished.
async fn start<C>(
    api: C,
    config: &AppConfig,
    shutdown: &CancellationToken,
) -> Result<Option<BotContext>, BootstrapError>
where
    C: ChatApi + 'static,
{
    tokio::select! {
        biased;
        () = shutdown.cancelled() => {
            info!(event_name = "system.bootstrap.interrupted", "shutdown requested during bootstrap");
            Ok(None)
        }
        context = bootstrap(api, config) => context.map(Some),
    }
}

/// Runs the event consumer until `shutdown` fires, waits for it to close the
/// stream, then posts the stop announcement.
async fn serve(
    context: BotContext,
    engine: ReplyEngine,
    stream: Option<Box<dyn EventStream>>,
    shutdown: CancellationToken,
) {
    let channel_id = context.log_channel_id().map(str::to_owned);
    let mut dispatcher = EventDispatcher::scoped_to(channel_id.clone());
    if let Some(channel_id) = channel_id {
        dispatcher.register(PostedHandler::new(engine, context.bot_user.id.clone(), channel_id));
    }

    let runner = EventStreamRunner::new(dispatcher, context.api.clone());
    let runner_shutdown = shutdown.clone();
    let consumer = tokio::spawn(async move { runner.run(stream, runner_shutdown).await });

    info!(
        event_name = "system.bot.started",
        bot_user_id = %context.bot_user.id,
        team_id = %context.team.id,
        "bot is running"
    );

    shutdown.cancelled().await;
    info!(event_name = "system.bot.stopping", "bot stopping");

    match consumer.await {
        Ok(reason) => {
            info!(event_name = "system.bot.consumer_stopped", reason = ?reason, "event consumer stopped")
        }
        Err(join_error) => warn!(error = %join_error, "event consumer task failed"),
    }

    context.send_to_log_channel(&stopped_message(), None).await;
    info!(event_name = "system.bot.stopped", "bot stopped");
}
