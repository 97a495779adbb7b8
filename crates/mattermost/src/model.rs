use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// Profile fields the bot keeps in sync with its configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserPatch {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserPatch {
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    #[default]
    #[serde(rename = "O")]
    Open,
    #[serde(rename = "P")]
    Private,
    #[serde(rename = "D")]
    Direct,
    #[serde(rename = "G")]
    Group,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub team_id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(rename = "type", default)]
    pub channel_type: ChannelType,
}

impl Channel {
    pub fn open(
        team_id: impl Into<String>,
        name: impl Into<String>,
        display_name: impl Into<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            team_id: team_id.into(),
            name: name.into(),
            display_name: display_name.into(),
            purpose: purpose.into(),
            channel_type: ChannelType::Open,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
    /// Id of the thread root this post replies to; empty for top-level posts.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_id: String,
}

impl Post {
    pub fn new(channel_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), message: message.into(), ..Self::default() }
    }

    pub fn in_thread(mut self, root_id: impl Into<String>) -> Self {
        self.root_id = root_id.into();
        self
    }
}

/// Startup bundle: everything the bot needs to pick its team.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitialLoad {
    pub teams: Vec<Team>,
}

impl InitialLoad {
    pub fn team_named(&self, name: &str) -> Option<&Team> {
        self.teams.iter().find(|team| team.name == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ServerPing {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: String,
}
