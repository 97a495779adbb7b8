use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "conf/eve.toml";

const WEBSOCKET_PATH: &str = "/api/v4/websocket";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub mattermost: MattermostConfig,
    pub logging: LoggingConfig,
}

/// Identity and credentials of the bot's service account.
#[derive(Clone, Debug)]
pub struct BotConfig {
    pub user_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Debug)]
pub struct MattermostConfig {
    pub url: String,
    pub ws_url: Option<String>,
    pub team_name: String,
    pub log_channel: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Command-line values; each one that is set wins over file and environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub user_name: Option<String>,
    pub user_first: Option<String>,
    pub user_last: Option<String>,
    pub user_email: Option<String>,
    pub user_passwd: Option<String>,
    pub team_name: Option<String>,
    pub mm_url: Option<String>,
    pub ws_url: Option<String>,
    pub channel_log: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot: BotConfig {
                user_name: "eve".to_string(),
                first_name: "Eve".to_string(),
                last_name: "Bot".to_string(),
                email: "eve@localhost".to_string(),
                password: String::new().into(),
            },
            mattermost: MattermostConfig {
                url: "http://localhost:8065".to_string(),
                ws_url: None,
                team_name: "upmedia".to_string(),
                log_channel: "eve".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl MattermostConfig {
    /// Websocket endpoint: the explicit `ws_url`, or `url` with its scheme
    /// switched to ws/wss and the v4 websocket path appended.
    pub fn websocket_url(&self) -> Result<String, ConfigError> {
        if let Some(ws_url) = &self.ws_url {
            return Ok(ws_url.clone());
        }

        let mut url = Url::parse(self.url.trim())
            .map_err(|error| ConfigError::Validation(format!("mm_url is not a valid URL: {error}")))?;
        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ConfigError::Validation(format!(
                    "mm_url scheme `{other}` cannot be mapped to a websocket scheme"
                )))
            }
        };
        url.set_scheme(scheme).map_err(|()| {
            ConfigError::Validation(format!("could not switch mm_url scheme to `{scheme}`"))
        })?;
        let path = format!("{}{WEBSOCKET_PATH}", url.path().trim_end_matches('/'));
        url.set_path(&path);

        Ok(url.to_string())
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(user_name) = patch.user_name {
            self.bot.user_name = user_name;
        }
        if let Some(user_first) = patch.user_first {
            self.bot.first_name = user_first;
        }
        if let Some(user_last) = patch.user_last {
            self.bot.last_name = user_last;
        }
        if let Some(user_email) = patch.user_email {
            self.bot.email = user_email;
        }
        if let Some(user_passwd) = patch.user_passwd {
            self.bot.password = user_passwd.into();
        }
        if let Some(team_name) = patch.team_name {
            self.mattermost.team_name = team_name;
        }
        if let Some(mm_url) = patch.mm_url {
            self.mattermost.url = mm_url;
        }
        if let Some(ws_url) = patch.ws_url {
            self.mattermost.ws_url = Some(ws_url);
        }
        if let Some(channel_log) = patch.channel_log {
            self.mattermost.log_channel = channel_log;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("EVE_USER_NAME") {
            self.bot.user_name = value;
        }
        if let Some(value) = read_env("EVE_USER_FIRST") {
            self.bot.first_name = value;
        }
        if let Some(value) = read_env("EVE_USER_LAST") {
            self.bot.last_name = value;
        }
        if let Some(value) = read_env("EVE_USER_EMAIL") {
            self.bot.email = value;
        }
        if let Some(value) = read_env("EVE_USER_PASSWD") {
            self.bot.password = value.into();
        }
        if let Some(value) = read_env("EVE_TEAM_NAME") {
            self.mattermost.team_name = value;
        }
        if let Some(value) = read_env("EVE_MM_URL") {
            self.mattermost.url = value;
        }
        if let Some(value) = read_env("EVE_WS_URL") {
            self.mattermost.ws_url = Some(value);
        }
        if let Some(value) = read_env("EVE_CHANNEL_LOG") {
            self.mattermost.log_channel = value;
        }
        if let Some(value) = read_env("EVE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("EVE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(user_name) = overrides.user_name {
            self.bot.user_name = user_name;
        }
        if let Some(user_first) = overrides.user_first {
            self.bot.first_name = user_first;
        }
        if let Some(user_last) = overrides.user_last {
            self.bot.last_name = user_last;
        }
        if let Some(user_email) = overrides.user_email {
            self.bot.email = user_email;
        }
        if let Some(user_passwd) = overrides.user_passwd {
            self.bot.password = user_passwd.into();
        }
        if let Some(team_name) = overrides.team_name {
            self.mattermost.team_name = team_name;
        }
        if let Some(mm_url) = overrides.mm_url {
            self.mattermost.url = mm_url;
        }
        if let Some(ws_url) = overrides.ws_url {
            self.mattermost.ws_url = Some(ws_url);
        }
        if let Some(channel_log) = overrides.channel_log {
            self.mattermost.log_channel = channel_log;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bot(&self.bot)?;
        validate_mattermost(&self.mattermost)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    default_path.exists().then_some(default_path)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Expands `${VAR}` outside of full-line `#` comments.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
        } else {
            interpolate_line(line, &mut output)?;
        }
    }

    Ok(output)
}

fn interpolate_line(line: &str, output: &mut String) -> Result<(), ConfigError> {
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    if bot.user_name.trim().is_empty() {
        return Err(ConfigError::Validation("user_name must not be empty".to_string()));
    }
    if bot.email.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_email is required to log in as the bot user".to_string(),
        ));
    }

    Ok(())
}

fn validate_mattermost(mattermost: &MattermostConfig) -> Result<(), ConfigError> {
    let url = mattermost.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mm_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(ws_url) = &mattermost.ws_url {
        if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
            return Err(ConfigError::Validation(
                "ws_url must start with ws:// or wss://".to_string(),
            ));
        }
    }

    if mattermost.team_name.trim().is_empty() {
        return Err(ConfigError::Validation("team_name must not be empty".to_string()));
    }
    if mattermost.log_channel.trim().is_empty() {
        return Err(ConfigError::Validation("channel_log must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    user_name: Option<String>,
    user_first: Option<String>,
    user_last: Option<String>,
    user_email: Option<String>,
    user_passwd: Option<String>,
    team_name: Option<String>,
    mm_url: Option<String>,
    ws_url: Option<String>,
    channel_log: Option<String>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, MattermostConfig};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn mattermost(url: &str, ws_url: Option<&str>) -> MattermostConfig {
        MattermostConfig {
            url: url.to_string(),
            ws_url: ws_url.map(str::to_string),
            team_name: "upmedia".to_string(),
            log_channel: "eve".to_string(),
        }
    }

    #[test]
    fn defaults_load_without_a_config_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does/not/exist.toml")),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.bot.user_name == "eve", "default user name should be eve")?;
        ensure(config.mattermost.team_name == "upmedia", "default team should be upmedia")?;
        ensure(config.mattermost.log_channel == "eve", "default log channel should be eve")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn explicit_missing_file_is_an_error_when_required() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("does/not/exist.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "missing required file should be reported",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_EVE_PASSWORD", "hunter2");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("eve.toml");
            fs::write(
                &path,
                r#"
user_email = "eve@example.com"
user_passwd = "${TEST_EVE_PASSWORD}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.bot.email == "eve@example.com", "email should come from the file")?;
            ensure(
                config.bot.password.expose_secret() == "hunter2",
                "password should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_EVE_PASSWORD"]);
        result
    }

    #[test]
    fn commented_out_interpolation_is_left_alone() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["TEST_EVE_UNSET_PASSWORD"]);
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("eve.toml");
        fs::write(
            &path,
            "team_name = \"crew\"\n  # user_passwd = \"${TEST_EVE_UNSET_PASSWORD}\"\n",
        )
        .map_err(|err| err.to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(path),
            require_file: true,
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.mattermost.team_name == "crew", "team should come from the file")
    }

    #[test]
    fn shipped_sample_config_loads_without_extra_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["EVE_BOT_PASSWORD", "EVE_USER_PASSWD"]);
        let sample = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../conf/eve.toml");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(sample),
            require_file: true,
            ..LoadOptions::default()
        })
        .map_err(|err| format!("sample config failed to load: {err}"))?;

        ensure(config.bot.user_name == "eve", "sample user name should be eve")?;
        ensure(config.mattermost.log_channel == "eve", "sample log channel should be eve")
    }

    #[test]
    fn precedence_defaults_file_env_flags() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("EVE_TEAM_NAME", "team-from-env");
        env::set_var("EVE_CHANNEL_LOG", "channel-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("eve.toml");
            fs::write(
                &path,
                r#"
user_name = "eve-from-file"
team_name = "team-from-file"
channel_log = "channel-from-file"
mm_url = "https://chat.example.com"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    channel_log: Some("channel-from-flag".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.bot.user_name == "eve-from-file", "file value should beat default")?;
            ensure(config.mattermost.url == "https://chat.example.com", "file url should load")?;
            ensure(config.mattermost.team_name == "team-from-env", "env should beat file")?;
            ensure(
                config.mattermost.log_channel == "channel-from-flag",
                "flag should beat env and file",
            )?;
            ensure(config.logging.level == "debug", "flag log level should win")
        })();

        clear_vars(&["EVE_TEAM_NAME", "EVE_CHANNEL_LOG"]);
        result
    }

    #[test]
    fn validation_rejects_non_http_server_url() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                mm_url: Some("localhost:8065".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("mm_url")),
            "validation failure should mention mm_url",
        )
    }

    #[test]
    fn password_is_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                user_passwd: Some("very-secret-password".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(
            !format!("{config:?}").contains("very-secret-password"),
            "debug output should not contain the password",
        )
    }

    #[test]
    fn websocket_url_is_derived_from_server_url() {
        assert_eq!(
            mattermost("http://localhost:8065", None).websocket_url().expect("derived url"),
            "ws://localhost:8065/api/v4/websocket"
        );
        assert_eq!(
            mattermost("https://chat.example.com/mm/", None).websocket_url().expect("derived url"),
            "wss://chat.example.com/mm/api/v4/websocket"
        );
    }

    #[test]
    fn explicit_websocket_url_wins_over_derivation() {
        let config = mattermost("http://localhost:8065", Some("ws://10.0.0.5:8065/ws"));
        assert_eq!(config.websocket_url().expect("explicit url"), "ws://10.0.0.5:8065/ws");
    }
}
