use serde::Deserialize;
use thiserror::Error;

/// Error body returned by the Mattermost server on non-2xx responses.
#[derive(Clone, Debug, Default, Deserialize, Error, PartialEq, Eq)]
#[error("{message} ({id})")]
pub struct ApiError {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub detailed_error: String,
    #[serde(default)]
    pub status_code: u16,
}

/// The three fields every failure is reported with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub id: String,
    pub detailed_error: String,
}

impl Diagnostic {
    pub fn new(
        message: impl Into<String>,
        id: impl Into<String>,
        detailed_error: impl Into<String>,
    ) -> Self {
        Self { message: message.into(), id: id.into(), detailed_error: detailed_error.into() }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} response could not be decoded: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} requires a logged-in session")]
    NotAuthenticated { operation: &'static str },
    #[error("{operation} requires an active team")]
    NoActiveTeam { operation: &'static str },
    #[error("login response did not carry a session token")]
    MissingToken,
    #[error("http client could not be built: {0}")]
    Build(#[source] reqwest::Error),
}

impl ClientError {
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Api(error) => {
                Diagnostic::new(&error.message, &error.id, &error.detailed_error)
            }
            Self::Transport { operation, source } => Diagnostic::new(
                format!("{operation} request failed"),
                "client.transport",
                source.to_string(),
            ),
            Self::Decode { operation, source } => Diagnostic::new(
                format!("{operation} response could not be decoded"),
                "client.decode",
                source.to_string(),
            ),
            Self::NotAuthenticated { operation } => Diagnostic::new(
                format!("{operation} requires a logged-in session"),
                "client.not_authenticated",
                "",
            ),
            Self::NoActiveTeam { operation } => Diagnostic::new(
                format!("{operation} requires an active team"),
                "client.no_active_team",
                "",
            ),
            Self::MissingToken => Diagnostic::new(
                "login response did not carry a session token",
                "client.missing_token",
                "",
            ),
            Self::Build(source) => Diagnostic::new(
                "http client could not be built",
                "client.build",
                source.to_string(),
            ),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("websocket failed to connect: {0}")]
    Connect(String),
    #[error("websocket read failed: {0}")]
    Receive(String),
    #[error("websocket close failed: {0}")]
    Close(String),
}

impl StreamError {
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::Connect(detail) => {
                Diagnostic::new("We failed to connect to the web socket", "stream.connect", detail)
            }
            Self::Receive(detail) => {
                Diagnostic::new("We failed to read from the web socket", "stream.receive", detail)
            }
            Self::Close(detail) => {
                Diagnostic::new("We failed to close the web socket", "stream.close", detail)
            }
        }
    }
}
