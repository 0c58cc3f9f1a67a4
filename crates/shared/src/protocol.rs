//! Request and response bodies of the Matrix client-server API used for dispatch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
}

impl Identifier {
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            kind: "m.id.user".into(),
            user: user.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: Identifier,
    pub password: String,
    #[serde(default)]
    pub refresh_token: bool,
}

impl LoginRequest {
    pub fn password(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            kind: "m.login.password".into(),
            identifier: Identifier::user(user_id),
            password: password.into(),
            refresh_token: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub msgtype: String,
    pub body: String,
}

impl MessageRequest {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.text".into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEventResponse {
    pub event_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedRoomsResponse {
    pub joined_rooms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub invite: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub join: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub rooms: Option<SyncRooms>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub visibility: String,
    #[serde(default)]
    pub is_direct: bool,
    #[serde(default)]
    pub invite: Vec<String>,
}

impl CreateRoomRequest {
    /// Named room inviting `user_id`; private rooms are left out of the room directory.
    pub fn room(name: Option<String>, private: bool, user_id: impl Into<String>) -> Self {
        Self {
            name,
            visibility: if private { "private" } else { "public" }.into(),
            is_direct: false,
            invite: vec![user_id.into()],
        }
    }

    /// Unnamed private room flagged as a direct chat with `user_id`.
    pub fn direct(user_id: impl Into<String>) -> Self {
        Self {
            name: None,
            visibility: "private".into(),
            is_direct: true,
            invite: vec![user_id.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}
