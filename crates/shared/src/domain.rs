use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform key code for volume up.
pub const ANDROID_KEYCODE_VOLUME_UP: i32 = 24;
/// Platform key code for volume down.
pub const ANDROID_KEYCODE_VOLUME_DOWN: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    VolumeUp,
    VolumeDown,
}

impl KeyCode {
    pub fn from_android_code(code: i32) -> Option<Self> {
        match code {
            ANDROID_KEYCODE_VOLUME_UP => Some(Self::VolumeUp),
            ANDROID_KEYCODE_VOLUME_DOWN => Some(Self::VolumeDown),
            _ => None,
        }
    }

    pub fn android_code(self) -> i32 {
        match self {
            Self::VolumeUp => ANDROID_KEYCODE_VOLUME_UP,
            Self::VolumeDown => ANDROID_KEYCODE_VOLUME_DOWN,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VolumeUp => "Volume Up",
            Self::VolumeDown => "Volume Down",
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown key '{0}'")]
pub struct UnknownKey(pub String);

impl FromStr for KeyCode {
    type Err = UnknownKey;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "volume_up" | "vol_up" => Ok(Self::VolumeUp),
            "volume_down" | "vol_down" => Ok(Self::VolumeDown),
            other => other
                .parse::<i32>()
                .ok()
                .and_then(Self::from_android_code)
                .ok_or_else(|| UnknownKey(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Down,
    Up,
}

/// A raw key transition as delivered by the key event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub action: KeyAction,
    pub at_ms: u64,
}

impl KeyEvent {
    pub fn down(key: KeyCode, at_ms: u64) -> Self {
        Self {
            key,
            action: KeyAction::Down,
            at_ms,
        }
    }

    pub fn up(key: KeyCode, at_ms: u64) -> Self {
        Self {
            key,
            action: KeyAction::Up,
            at_ms,
        }
    }
}

/// One required step of a gesture: `key` held for at least `min_duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureEntry {
    pub key: KeyCode,
    pub min_duration_ms: u64,
}

impl GestureEntry {
    pub fn new(key: KeyCode, min_duration_ms: u64) -> Self {
        Self {
            key,
            min_duration_ms,
        }
    }

    /// The hold duration is a floor; longer holds always satisfy the step.
    pub fn accepts(&self, key: KeyCode, duration_ms: u64) -> bool {
        self.key == key && duration_ms >= self.min_duration_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gesture {
    pub name: String,
    pub message: String,
    pub entries: Vec<GestureEntry>,
}

impl Gesture {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        entries: Vec<GestureEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            entries,
        }
    }

    pub fn same_pattern(&self, other: &Gesture) -> bool {
        self.entries == other.entries
    }
}

/// A completed key press captured during a recognition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureInput {
    pub key: KeyCode,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixConfig {
    pub server_domain: Option<String>,
    pub user_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub target_room: Option<String>,
}

impl MatrixConfig {
    /// Fields required before a message can be sent. The refresh token is optional.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.server_domain) {
            missing.push("server_domain");
        }
        if is_blank(&self.user_name) {
            missing.push("user_name");
        }
        if is_blank(&self.access_token) {
            missing.push("access_token");
        }
        if is_blank(&self.target_room) {
            missing.push("target_room");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
