use std::sync::Arc;

use eve_core::config::{AppConfig, BotConfig, ConfigError};
use eve_mattermost::client::ChatApi;
use eve_mattermost::errors::{ClientError, Diagnostic};
use eve_mattermost::model::{Channel, Post, Team, User};
use eve_mattermost::socket::{EventStream, WebSocketEventStream};
use thiserror::Error;
use tracing::{error, info, warn};

pub const ROBOT_NAME: &str = "EVE";
pub const LOG_CHANNEL_DISPLAY_NAME: &str = "Debugging For Sample Bot";
pub const LOG_CHANNEL_PURPOSE: &str =
    "This is used as a test channel for logging bot debug messages";

/// Everything bootstrap resolved. Read-only once built.
pub struct BotContext {
    pub api: Arc<dyn ChatApi>,
    pub bot_user: User,
    pub team: Team,
    /// `None` when the channel could neither be found nor created.
    pub log_channel: Option<Channel>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not create the chat api client")]
    Client(#[source] ClientError),
    #[error("reply engine could not be built: {0}")]
    ReplyEngine(String),
    #[error("There was a problem pinging the Mattermost server. Are you sure it's running?")]
    Ping(#[source] ClientError),
    #[error("There was a problem logging into the Mattermost server. Are the bot credentials right?")]
    Login(#[source] ClientError),
    #[error("We failed to update the bot user")]
    UpdateUser(#[source] ClientError),
    #[error("We failed to get the initial load")]
    InitialLoad(#[source] ClientError),
    #[error("We do not appear to be a member of the team '{0}'")]
    TeamNotFound(String),
}

impl BootstrapError {
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Client(source)
            | Self::Ping(source)
            | Self::Login(source)
            | Self::UpdateUser(source)
            | Self::InitialLoad(source) => source.diagnostic(),
            Self::Config(source) => Diagnostic::new(self.to_string(), "bot.config", source.to_string()),
            Self::ReplyEngine(detail) => {
                Diagnostic::new(self.to_string(), "bot.reply_engine", detail.as_str())
            }
            Self::TeamNotFound(_) => Diagnostic::new(self.to_string(), "bot.team_not_found", ""),
        }
    }
}

pub(crate) fn report_failure(summary: &str, diagnostic: &Diagnostic) {
    error!(
        error_message = %diagnostic.message,
        error_id = %diagnostic.id,
        detailed_error = %diagnostic.detailed_error,
        "{summary}"
    );
}

impl BotContext {
    pub fn log_channel_id(&self) -> Option<&str> {
        self.log_channel.as_ref().map(|channel| channel.id.as_str())
    }

    /// Best-effort post to the logging channel. Failures are reported, never
    /// returned.
    pub async fn send_to_log_channel(&self, message: &str, reply_to: Option<&str>) {
        let Some(channel_id) = self.log_channel_id() else {
            report_failure(
                "We failed to send a message to the logging channel",
                &Diagnostic::new(
                    "no logging channel was resolved during bootstrap",
                    "bot.no_logging_channel",
                    format!("dropped message: {message}"),
                ),
            );
            return;
        };

        let mut post = Post::new(channel_id, message);
        if let Some(root_id) = reply_to {
            post = post.in_thread(root_id);
        }
        if let Err(client_error) = self.api.create_post(&post).await {
            report_failure(
                "We failed to send a message to the logging channel",
                &client_error.diagnostic(),
            );
        }
    }
}

pub fn started_message() -> String {
    format!("_{ROBOT_NAME} has **started** running_")
}

pub fn stopped_message() -> String {
    format!("_{ROBOT_NAME} has **stopped** running_")
}

/// Runs the startup sequence against `api`. Fatal steps return an error; the
/// logging channel step only reports its failures.
pub async fn bootstrap<C>(mut api: C, config: &AppConfig) -> Result<BotContext, BootstrapError>
where
    C: ChatApi + 'static,
{
    info!(event_name = "system.bootstrap.start", "starting bot bootstrap");

    let ping = api.ping().await.map_err(BootstrapError::Ping)?;
    info!(
        event_name = "system.bootstrap.server_detected",
        version = %ping.version,
        "Server detected and is running version {}",
        ping.version
    );

    let user = api
        .login(&config.bot.email, &config.bot.password)
        .await
        .map_err(BootstrapError::Login)?;
    info!(event_name = "system.bootstrap.logged_in", user_id = %user.id, "logged in as bot user");

    let bot_user = reconcile_profile(&api, user, &config.bot).await?;

    let initial_load = api.get_initial_load().await.map_err(BootstrapError::InitialLoad)?;
    let team = initial_load
        .team_named(&config.mattermost.team_name)
        .cloned()
        .ok_or_else(|| BootstrapError::TeamNotFound(config.mattermost.team_name.clone()))?;
    api.set_active_team(&team.id);
    info!(event_name = "system.bootstrap.team_resolved", team_id = %team.id, "bot team resolved");

    let log_channel = resolve_log_channel(&api, &team, &config.mattermost.log_channel).await;

    let context = BotContext { api: Arc::new(api), bot_user, team, log_channel };
    context.send_to_log_channel(&started_message(), None).await;

    info!(event_name = "system.bootstrap.complete", "bot bootstrap complete");
    Ok(context)
}

async fn reconcile_profile<C>(api: &C, user: User, bot: &BotConfig) -> Result<User, BootstrapError>
where
    C: ChatApi,
{
    if user.first_name == bot.first_name
        && user.last_name == bot.last_name
        && user.username == bot.user_name
    {
        return Ok(user);
    }

    let desired = User {
        first_name: bot.first_name.clone(),
        last_name: bot.last_name.clone(),
        username: bot.user_name.clone(),
        ..user
    };
    let updated = api.update_user(&desired).await.map_err(BootstrapError::UpdateUser)?;
    info!(
        event_name = "system.bootstrap.profile_updated",
        "Looks like this might be the first run so we've updated the bots account settings"
    );
    Ok(updated)
}

async fn resolve_log_channel<C>(api: &C, team: &Team, name: &str) -> Option<Channel>
where
    C: ChatApi,
{
    match api.get_channels().await {
        Ok(channels) => {
            if let Some(channel) = channels.into_iter().find(|channel| channel.name == name) {
                info!(
                    event_name = "system.bootstrap.channel_reused",
                    channel_id = %channel.id,
                    "using existing logging channel"
                );
                return Some(channel);
            }
        }
        Err(client_error) => {
            report_failure("We failed to get the channels", &client_error.diagnostic());
        }
    }

    let channel = Channel::open(&team.id, name, LOG_CHANNEL_DISPLAY_NAME, LOG_CHANNEL_PURPOSE);
    match api.create_channel(&channel).await {
        Ok(created) => {
            info!(
                event_name = "system.bootstrap.channel_created",
                channel_id = %created.id,
                "Looks like this might be the first run so we've created the channel {name}"
            );
            Some(created)
        }
        Err(client_error) => {
            report_failure(
                &format!("We failed to create the channel {name}"),
                &client_error.diagnostic(),
            );
            None
        }
    }
}

/// Opens the websocket with the session token. A failure is reported and
/// yields `None`; the bot keeps running without a stream.
pub async fn connect_event_stream(
    context: &BotContext,
    ws_url: &str,
) -> Option<Box<dyn EventStream>> {
    let Some(token) = context.api.auth_token() else {
        warn!(event_name = "system.bootstrap.stream_skipped", "no session token for the websocket");
        return None;
    };

    match WebSocketEventStream::connect(ws_url, &token).await {
        Ok(stream) => {
            info!(event_name = "system.bootstrap.stream_connected", ws_url, "websocket connected");
            Some(Box::new(stream))
        }
        Err(stream_error) => {
            report_failure("We failed to connect to the web socket", &stream_error.diagnostic());
            None
        }
    }
}
