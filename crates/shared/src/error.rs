use serde::{Deserialize, Serialize};

/// Error codes the homeserver reports in `errcode`. Unknown codes are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "M_FORBIDDEN")]
    Forbidden,
    #[serde(rename = "M_UNKNOWN_TOKEN")]
    UnknownToken,
    #[serde(rename = "M_MISSING_TOKEN")]
    MissingToken,
    #[serde(rename = "M_LIMIT_EXCEEDED")]
    LimitExceeded,
    #[serde(rename = "M_NOT_FOUND")]
    NotFound,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub errcode: ErrorCode,
    #[serde(default)]
    pub error: String,
}

impl ApiError {
    pub fn new(errcode: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            errcode,
            error: error.into(),
        }
    }

    /// Parses a homeserver error body, falling back to the raw text.
    pub fn from_body(body: &str) -> Self {
        serde_json::from_str(body)
            .unwrap_or_else(|_| Self::new(ErrorCode::Other("M_UNRECOGNIZED".into()), body.trim()))
    }
}
