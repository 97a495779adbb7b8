use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::errors::{ApiError, ClientError};
use crate::model::{Channel, InitialLoad, Post, ServerPing, Team, User, UserPatch};

pub const API_PREFIX: &str = "/api/v4";

/// Request/response operations the bot needs from the chat server.
///
/// `login` and `set_active_team` take `&mut self`: they are only called
/// during bootstrap, before the client is shared.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn ping(&self) -> Result<ServerPing, ClientError>;
    async fn login(&mut self, login_id: &str, password: &SecretString)
        -> Result<User, ClientError>;
    fn auth_token(&self) -> Option<SecretString>;
    async fn update_user(&self, user: &User) -> Result<User, ClientError>;
    async fn get_initial_load(&self) -> Result<InitialLoad, ClientError>;
    fn set_active_team(&mut self, team_id: &str);
    async fn get_channels(&self) -> Result<Vec<Channel>, ClientError>;
    async fn create_channel(&self, channel: &Channel) -> Result<Channel, ClientError>;
    async fn create_post(&self, post: &Post) -> Result<Post, ClientError>;
}

pub struct HttpChatClient {
    http: reqwest::Client,
    server_url: String,
    token: Option<SecretString>,
    team_id: Option<String>,
}

impl HttpChatClient {
    pub fn new(server_url: &str) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("eve-bot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http =
            reqwest::Client::builder().default_headers(headers).build().map_err(ClientError::Build)?;

        Ok(Self {
            http,
            server_url: server_url.trim().trim_end_matches('/').to_string(),
            token: None,
            team_id: None,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.server_url)
    }

    fn authorized(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_ref().ok_or(ClientError::NotAuthenticated { operation })?;
        Ok(builder.bearer_auth(token.expose_secret()))
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, ClientError> {
        debug!(operation, "sending chat api request");
        let response =
            builder.send().await.map_err(|source| ClientError::Transport { operation, source })?;
        ensure_success(operation, response).await
    }

    async fn send_json<T>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(operation, builder).await?;
        response.json::<T>().await.map_err(|source| ClientError::Decode { operation, source })
    }
}

async fn ensure_success(
    operation: &'static str,
    response: Response,
) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let mut error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| ApiError {
        id: "client.unexpected_status".to_owned(),
        message: format!("{operation} returned HTTP {status}"),
        detailed_error: body.clone(),
        status_code: status.as_u16(),
    });
    if error.status_code == 0 {
        error.status_code = status.as_u16();
    }

    Err(ClientError::Api(error))
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn ping(&self) -> Result<ServerPing, ClientError> {
        let operation = "ping";
        let response = self.send(operation, self.http.get(self.endpoint("/system/ping"))).await?;
        let version = response
            .headers()
            .get("X-Version-Id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let mut ping = response
            .json::<ServerPing>()
            .await
            .map_err(|source| ClientError::Decode { operation, source })?;
        if let Some(version) = version.filter(|value| !value.is_empty()) {
            ping.version = version;
        }
        Ok(ping)
    }

    async fn login(
        &mut self,
        login_id: &str,
        password: &SecretString,
    ) -> Result<User, ClientError> {
        let operation = "login";
        let body = json!({ "login_id": login_id, "password": password.expose_secret() });
        let response =
            self.send(operation, self.http.post(self.endpoint("/users/login")).json(&body)).await?;

        let token = response
            .headers()
            .get("Token")
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(|value| SecretString::from(value.to_owned()))
            .ok_or(ClientError::MissingToken)?;
        let user = response
            .json::<User>()
            .await
            .map_err(|source| ClientError::Decode { operation, source })?;

        self.token = Some(token);
        Ok(user)
    }

    fn auth_token(&self) -> Option<SecretString> {
        self.token.clone()
    }

    async fn update_user(&self, user: &User) -> Result<User, ClientError> {
        let operation = "update user";
        let request = self
            .http
            .put(self.endpoint(&format!("/users/{}/patch", user.id)))
            .json(&UserPatch::from_user(user));
        self.send_json(operation, self.authorized(operation, request)?).await
    }

    async fn get_initial_load(&self) -> Result<InitialLoad, ClientError> {
        let operation = "initial load";
        let request = self.http.get(self.endpoint("/users/me/teams"));
        let teams: Vec<Team> = self.send_json(operation, self.authorized(operation, request)?).await?;
        Ok(InitialLoad { teams })
    }

    fn set_active_team(&mut self, team_id: &str) {
        self.team_id = Some(team_id.to_owned());
    }

    async fn get_channels(&self) -> Result<Vec<Channel>, ClientError> {
        let operation = "get channels";
        let team_id = self.team_id.as_deref().ok_or(ClientError::NoActiveTeam { operation })?;
        let request =
            self.http.get(self.endpoint(&format!("/users/me/teams/{team_id}/channels")));
        self.send_json(operation, self.authorized(operation, request)?).await
    }

    async fn create_channel(&self, channel: &Channel) -> Result<Channel, ClientError> {
        let operation = "create channel";
        let mut channel = channel.clone();
        if channel.team_id.is_empty() {
            channel.team_id = self
                .team_id
                .clone()
                .ok_or(ClientError::NoActiveTeam { operation })?;
        }
        let request = self.http.post(self.endpoint("/channels")).json(&channel);
        self.send_json(operation, self.authorized(operation, request)?).await
    }

    async fn create_post(&self, post: &Post) -> Result<Post, ClientError> {
        let operation = "create post";
        let request = self.http.post(self.endpoint("/posts")).json(post);
        self.send_json(operation, self.authorized(operation, request)?).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::json;

    use super::{ChatApi, HttpChatClient};
    use crate::errors::ClientError;
    use crate::model::{Channel, Post, User};

    async fn logged_in_client(server: &mut mockito::Server) -> HttpChatClient {
        let _login = server
            .mock("POST", "/api/v4/users/login")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("Token", "session-token")
            .with_body(json!({ "id": "bot-id", "username": "eve" }).to_string())
            .create_async()
            .await;

        let mut client = HttpChatClient::new(&server.url()).expect("client should build");
        client
            .login("eve@example.com", &SecretString::from("secret".to_owned()))
            .await
            .expect("login should succeed");
        client
    }

    #[tokio::test]
    async fn ping_reads_version_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/system/ping")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("X-Version-Id", "9.11.0")
            .with_body(json!({ "status": "OK" }).to_string())
            .create_async()
            .await;

        let client = HttpChatClient::new(&server.url()).expect("client should build");
        let ping = client.ping().await.expect("ping should succeed");

        assert_eq!(ping.status, "OK");
        assert_eq!(ping.version, "9.11.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn login_stores_session_token_for_later_calls() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/api/v4/users/login")
            .match_body(Matcher::PartialJson(
                json!({ "login_id": "eve@example.com", "password": "secret" }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("Token", "session-token")
            .with_body(json!({ "id": "bot-id", "username": "eve" }).to_string())
            .create_async()
            .await;
        let teams = server
            .mock("GET", "/api/v4/users/me/teams")
            .match_header("authorization", "Bearer session-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{ "id": "team-1", "name": "upmedia" }]).to_string())
            .create_async()
            .await;

        let mut client = HttpChatClient::new(&server.url()).expect("client should build");
        let user = client
            .login("eve@example.com", &SecretString::from("secret".to_owned()))
            .await
            .expect("login should succeed");
        let load = client.get_initial_load().await.expect("initial load should succeed");

        assert_eq!(user.id, "bot-id");
        assert_eq!(
            client.auth_token().map(|token| token.expose_secret().to_owned()),
            Some("session-token".to_owned())
        );
        assert_eq!(load.teams.len(), 1);
        login.assert_async().await;
        teams.assert_async().await;
    }

    #[tokio::test]
    async fn login_failure_decodes_server_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v4/users/login")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "api.user.login.invalid_credentials_email_username",
                    "message": "Enter a valid email or username and/or password.",
                    "detailed_error": "",
                    "status_code": 401
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut client = HttpChatClient::new(&server.url()).expect("client should build");
        let error = client
            .login("eve@example.com", &SecretString::from("wrong".to_owned()))
            .await
            .expect_err("login should fail");

        let diagnostic = error.diagnostic();
        assert_eq!(diagnostic.id, "api.user.login.invalid_credentials_email_username");
        assert!(client.auth_token().is_none());
    }

    #[tokio::test]
    async fn non_json_error_body_still_yields_a_diagnostic() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/system/ping")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let client = HttpChatClient::new(&server.url()).expect("client should build");
        let error = client.ping().await.expect_err("ping should fail");

        let diagnostic = error.diagnostic();
        assert_eq!(diagnostic.id, "client.unexpected_status");
        assert_eq!(diagnostic.detailed_error, "bad gateway");
        assert!(diagnostic.message.contains("502"));
    }

    #[tokio::test]
    async fn authenticated_calls_fail_before_login() {
        let client = HttpChatClient::new("http://127.0.0.1:9").expect("client should build");
        let error = client
            .create_post(&Post::new("chan-1", "hello"))
            .await
            .expect_err("create post should require a session");

        assert!(matches!(error, ClientError::NotAuthenticated { .. }));
    }

    #[tokio::test]
    async fn channel_listing_is_scoped_to_the_active_team() {
        let mut server = mockito::Server::new_async().await;
        let mut client = logged_in_client(&mut server).await;

        let error = client.get_channels().await.expect_err("no team selected yet");
        assert!(matches!(error, ClientError::NoActiveTeam { .. }));

        let channels = server
            .mock("GET", "/api/v4/users/me/teams/team-1/channels")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{ "id": "c1", "team_id": "team-1", "name": "eve", "type": "O" }]).to_string())
            .create_async()
            .await;

        client.set_active_team("team-1");
        let listed = client.get_channels().await.expect("channels should load");

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "eve");
        channels.assert_async().await;
    }

    #[tokio::test]
    async fn create_channel_and_post_send_expected_bodies() {
        let mut server = mockito::Server::new_async().await;
        let mut client = logged_in_client(&mut server).await;
        client.set_active_team("team-1");

        let create_channel = server
            .mock("POST", "/api/v4/channels")
            .match_body(Matcher::PartialJson(
                json!({ "team_id": "team-1", "name": "eve", "type": "O" }),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(json!({ "id": "c-new", "team_id": "team-1", "name": "eve", "type": "O" }).to_string())
            .create_async()
            .await;
        let create_post = server
            .mock("POST", "/api/v4/posts")
            .match_body(Matcher::PartialJson(
                json!({ "channel_id": "c-new", "message": "Yes I'm running", "root_id": "p1" }),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(json!({ "id": "p2", "channel_id": "c-new", "message": "Yes I'm running" }).to_string())
            .create_async()
            .await;

        let channel = client
            .create_channel(&Channel::open("", "eve", "Debugging", "logs"))
            .await
            .expect("channel should be created");
        let post = client
            .create_post(&Post::new(&channel.id, "Yes I'm running").in_thread("p1"))
            .await
            .expect("post should be created");

        assert_eq!(channel.id, "c-new");
        assert_eq!(post.id, "p2");
        create_channel.assert_async().await;
        create_post.assert_async().await;
    }

    #[tokio::test]
    async fn update_user_patches_profile_fields() {
        let mut server = mockito::Server::new_async().await;
        let client = logged_in_client(&mut server).await;

        let patch = server
            .mock("PUT", "/api/v4/users/bot-id/patch")
            .match_body(Matcher::Json(
                json!({ "username": "eve", "first_name": "Eve", "last_name": "Bot" }),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "id": "bot-id", "username": "eve", "first_name": "Eve", "last_name": "Bot" })
                    .to_string(),
            )
            .create_async()
            .await;

        let updated = client
            .update_user(&User {
                id: "bot-id".to_owned(),
                username: "eve".to_owned(),
                first_name: "Eve".to_owned(),
                last_name: "Bot".to_owned(),
                email: "eve@example.com".to_owned(),
            })
            .await
            .expect("update should succeed");

        assert_eq!(updated.first_name, "Eve");
        patch.assert_async().await;
    }
}
