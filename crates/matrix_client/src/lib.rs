use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::MatrixConfig,
    error::ApiError,
    protocol::{
        CreateRoomRequest, CreateRoomResponse, JoinedRoomsResponse, LoginRequest, LoginResponse,
        MessageRequest, RefreshTokenRequest, RefreshTokenResponse, SendEventResponse,
        SyncResponse,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

const CLIENT_API_PATH: &str = "_matrix/client/v3/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("matrix configuration is incomplete; missing {}", .0.join(", "))]
    IncompleteConfig(Vec<&'static str>),
    #[error("invalid homeserver url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("homeserver unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited by homeserver")]
    RateLimited,
    #[error("homeserver returned {status}: {body}")]
    Server { status: StatusCode, body: String },
    #[error("homeserver response did not contain {0}")]
    MissingToken(&'static str),
    #[error("access token did not change after refresh")]
    TokenUnchanged,
    #[error("failed to decode homeserver response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl MatrixError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::MissingToken(_) | Self::TokenUnchanged
        )
    }
}

pub type Result<T> = std::result::Result<T, MatrixError>;

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub event_id: String,
    /// True when the access token was rotated to complete the send.
    pub refreshed: bool,
}

pub struct MatrixClient {
    http: Client,
    base_url: Url,
    server_domain: String,
    user_name: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    target_room: Option<String>,
}

impl MatrixClient {
    pub fn new(config: &MatrixConfig) -> Result<Self> {
        let server_domain = config
            .server_domain
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MatrixError::IncompleteConfig(vec!["server_domain"]))?
            .to_string();
        let base_url = client_api_url(&server_domain)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(MatrixError::Unreachable)?;

        Ok(Self {
            http,
            base_url,
            server_domain,
            user_name: config.user_name.clone(),
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
            target_room: config.target_room.clone(),
        })
    }

    /// Builds a client that is ready to send, rejecting configs missing required fields.
    pub fn for_dispatch(config: &MatrixConfig) -> Result<Self> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(MatrixError::IncompleteConfig(missing));
        }
        Self::new(config)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Current account state, including any rotated tokens.
    pub fn config(&self) -> MatrixConfig {
        MatrixConfig {
            server_domain: Some(self.server_domain.clone()),
            user_name: self.user_name.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            target_room: self.target_room.clone(),
        }
    }

    pub fn set_target_room(&mut self, room: impl Into<String>) {
        self.target_room = Some(room.into());
    }

    pub async fn login(&mut self, user_name: &str, password: &str) -> Result<()> {
        let request = LoginRequest::password(self.user_id(user_name), password);
        let response = self
            .send(self.request(Method::POST, "login", false)?.json(&request))
            .await?;
        let body: LoginResponse = decode(ensure_success(response).await?).await?;

        let access_token =
            non_empty(body.access_token).ok_or(MatrixError::MissingToken("access token"))?;
        let refresh_token =
            non_empty(body.refresh_token).ok_or(MatrixError::MissingToken("refresh token"))?;
        self.user_name = Some(user_name.to_string());
        self.access_token = Some(access_token);
        self.refresh_token = Some(refresh_token);
        info!(user = user_name, "logged in to homeserver");
        Ok(())
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or(MatrixError::MissingToken("refresh token"))?;
        let request = RefreshTokenRequest { refresh_token };
        let response = self
            .send(self.request(Method::POST, "refresh", false)?.json(&request))
            .await?;
        let body: RefreshTokenResponse = decode(ensure_success(response).await?).await?;

        self.access_token =
            Some(non_empty(body.access_token).ok_or(MatrixError::MissingToken("access token"))?);
        if let Some(rotated) = non_empty(body.refresh_token) {
            self.refresh_token = Some(rotated);
        }
        debug!("refreshed access token");
        Ok(())
    }

    /// Sends `body` as `m.text` to the configured target room.
    pub async fn send_to_target(&mut self, body: &str) -> Result<SendReceipt> {
        let room = self
            .target_room
            .clone()
            .ok_or_else(|| MatrixError::IncompleteConfig(vec!["target_room"]))?;
        self.send_text(&room, body).await
    }

    /// Sends a text message, refreshing the access token once on 401.
    pub async fn send_text(&mut self, room: &str, body: &str) -> Result<SendReceipt> {
        let txn_id = Uuid::new_v4().to_string();
        let request = MessageRequest::text(body);

        let first = self.put_message(room, &txn_id, &request).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            let event: SendEventResponse = decode(ensure_success(first).await?).await?;
            info!(room, event_id = %event.event_id, "message sent");
            return Ok(SendReceipt {
                event_id: event.event_id,
                refreshed: false,
            });
        }

        if self.refresh_token.is_none() {
            error!(room, "send rejected and no refresh token is available");
            return Err(MatrixError::MissingToken("refresh token"));
        }
        warn!(room, "send rejected with 401; refreshing access token");
        let previous = self.access_token.clone();
        self.refresh().await?;
        if self.access_token == previous {
            return Err(MatrixError::TokenUnchanged);
        }

        let second = self.put_message(room, &txn_id, &request).await?;
        if second.status() == StatusCode::UNAUTHORIZED {
            let body = second.text().await.unwrap_or_default();
            error!(room, "refreshed access token was rejected");
            return Err(MatrixError::Unauthorized(ApiError::from_body(&body).error));
        }
        let event: SendEventResponse = decode(ensure_success(second).await?).await?;
        info!(room, event_id = %event.event_id, "message sent after token refresh");
        Ok(SendReceipt {
            event_id: event.event_id,
            refreshed: true,
        })
    }

    pub async fn joined_rooms(&self) -> Result<Vec<String>> {
        let response = self
            .send(self.request(Method::GET, "joined_rooms", true)?)
            .await?;
        let body: JoinedRoomsResponse = decode(ensure_success(response).await?).await?;
        Ok(body.joined_rooms)
    }

    /// Joins every room with a pending invite; returns the joined room ids.
    pub async fn accept_invites(&self) -> Result<Vec<String>> {
        let response = self.send(self.request(Method::GET, "sync", true)?).await?;
        let body: SyncResponse = decode(ensure_success(response).await?).await?;
        let invites: Vec<String> = body
            .rooms
            .map(|rooms| rooms.invite.into_keys().collect())
            .unwrap_or_default();

        let mut joined = Vec::with_capacity(invites.len());
        for room in invites {
            let path = format!("join/{}", encode_segment(&room));
            let response = self
                .send(
                    self.request(Method::POST, &path, true)?
                        .json(&serde_json::json!({})),
                )
                .await?;
            ensure_success(response).await?;
            info!(room = %room, "accepted invite");
            joined.push(room);
        }
        Ok(joined)
    }

    /// Creates a room and invites `invite`; returns the new room id.
    pub async fn create_room(
        &self,
        name: Option<&str>,
        private: bool,
        invite: &str,
    ) -> Result<String> {
        let request =
            CreateRoomRequest::room(name.map(str::to_string), private, self.user_id(invite));
        self.post_create_room(&request).await
    }

    /// Creates a private direct chat with `invite`; returns the new room id.
    pub async fn create_private_chat(&self, invite: &str) -> Result<String> {
        self.post_create_room(&CreateRoomRequest::direct(self.user_id(invite)))
            .await
    }

    async fn post_create_room(&self, request: &CreateRoomRequest) -> Result<String> {
        let response = self
            .send(self.request(Method::POST, "createRoom", true)?.json(request))
            .await?;
        let body: CreateRoomResponse = decode(ensure_success(response).await?).await?;
        info!(room = %body.room_id, direct = request.is_direct, "created room");
        Ok(body.room_id)
    }

    /// Full `@user:host` id; values that already are one are kept.
    fn user_id(&self, user_name: &str) -> String {
        if user_name.starts_with('@') {
            return user_name.to_string();
        }
        let host = self.base_url.host_str().unwrap_or(&self.server_domain);
        format!("@{user_name}:{host}")
    }

    async fn put_message(
        &self,
        room: &str,
        txn_id: &str,
        request: &MessageRequest,
    ) -> Result<Response> {
        let path = format!(
            "rooms/{}/send/m.room.message/{}",
            encode_segment(room),
            encode_segment(txn_id)
        );
        self.send(self.request(Method::PUT, &path, true)?.json(request))
            .await
    }

    fn request(&self, method: Method, path: &str, authorized: bool) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|source| MatrixError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                source,
            })?;
        let builder = self.http.request(method, url);
        Ok(match (&self.access_token, authorized) {
            (Some(token), true) => builder.bearer_auth(token),
            _ => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder.send().await.map_err(MatrixError::Unreachable)
    }
}

/// Accepts a bare domain (`matrix.org`) or a full base url (`http://127.0.0.1:8008`).
fn client_api_url(server: &str) -> Result<Url> {
    let server = server.trim().trim_end_matches('/');
    let raw = if server.contains("://") {
        format!("{server}/{CLIENT_API_PATH}")
    } else {
        format!("https://{server}/{CLIENT_API_PATH}")
    };
    Url::parse(&raw).map_err(|source| MatrixError::InvalidUrl { url: raw, source })
}

fn encode_segment(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(%status, "homeserver rejected credentials");
            Err(MatrixError::Unauthorized(ApiError::from_body(&body).error))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(MatrixError::RateLimited),
        _ => {
            error!(%status, body = %body, "unexpected homeserver response");
            Err(MatrixError::Server { status, body })
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response.json().await.map_err(MatrixError::Decode)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
