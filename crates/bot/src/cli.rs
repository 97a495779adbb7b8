use std::path::PathBuf;

use clap::Parser;
use eve_core::config::{ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "eve",
    version,
    about = "Mattermost bot that answers liveness questions in its logging channel",
    after_help = "Examples:\n  eve --config conf/eve.toml\n  eve --mm_url https://chat.example.com --user_passwd secret"
)]
pub struct Cli {
    #[arg(long, env = "EVE_CONFIG", help = "Path to the TOML config file [default: conf/eve.toml]")]
    pub config: Option<PathBuf>,

    #[arg(long = "user_name", help = "Username the bot account should have")]
    pub user_name: Option<String>,
    #[arg(long = "user_first", help = "First name the bot account should have")]
    pub user_first: Option<String>,
    #[arg(long = "user_last", help = "Last name the bot account should have")]
    pub user_last: Option<String>,
    #[arg(long = "user_email", help = "Email used to log in")]
    pub user_email: Option<String>,
    #[arg(long = "user_passwd", help = "Password used to log in")]
    pub user_passwd: Option<String>,
    #[arg(long = "team_name", help = "Name of the team the bot works in")]
    pub team_name: Option<String>,
    #[arg(long = "mm_url", help = "Base URL of the Mattermost server")]
    pub mm_url: Option<String>,
    #[arg(long = "ws_url", help = "Websocket URL; derived from --mm_url when unset")]
    pub ws_url: Option<String>,
    #[arg(long = "channel_log", help = "Name of the logging channel")]
    pub channel_log: Option<String>,

    #[arg(long = "log_level", help = "trace, debug, info, warn or error")]
    pub log_level: Option<String>,
    #[arg(long = "log_format", help = "compact, pretty or json")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// A config path given on the command line or in `EVE_CONFIG` must exist.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                user_name: self.user_name.clone(),
                user_first: self.user_first.clone(),
                user_last: self.user_last.clone(),
                user_email: self.user_email.clone(),
                user_passwd: self.user_passwd.clone(),
                team_name: self.team_name.clone(),
                mm_url: self.mm_url.clone(),
                ws_url: self.ws_url.clone(),
                channel_log: self.channel_log.clone(),
                log_level: self.log_level.clone(),
                log_format: self.log_format,
            },
        }
    }
}
