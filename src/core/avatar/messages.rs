//! Wire types for the streaming avatar API.
//!
//! REST calls (all `POST`, JSON bodies):
//! - /v1/streaming.create_token - exchange the API key for a session token
//! - /v1/streaming.new - create a streaming session
//! - /v1/streaming.start - ask the server to begin streaming
//! - /v1/streaming.task - make the avatar speak
//! - /v1/streaming.keep_alive - reset the idle timer
//! - /v1/streaming.stop - release the session
//!
//! Room data channel: UTF-8 JSON objects with a `type` field.

use serde::{Deserialize, Serialize};

use super::config::{AvatarConfig, STREAMING_API_VERSION};

/// Task type that makes the avatar repeat the text verbatim.
pub const TASK_TYPE_REPEAT: &str = "repeat";

/// Keep-alive response message for a successful ping.
pub const KEEP_ALIVE_SUCCESS: &str = "success";

// =============================================================================
// Requests
// =============================================================================

/// Voice selection inside a session creation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub rate: f32,
}

/// Body of `/v1/streaming.new`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSessionRequest {
    pub quality: String,
    pub version: String,
    pub video_encoding: String,
    pub avatar_id: String,
    pub voice: VoiceSetting,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_idle_timeout: Option<u32>,
}

impl NewSessionRequest {
    pub fn from_config(config: &AvatarConfig) -> Self {
        Self {
            quality: config.quality.as_str().to_string(),
            version: STREAMING_API_VERSION.to_string(),
            video_encoding: config.video_encoding.as_str().to_string(),
            avatar_id: config.avatar_id.clone(),
            voice: VoiceSetting {
                voice_id: config.voice_id.clone(),
                rate: config.voice_rate,
            },
            activity_idle_timeout: config.idle_timeout_secs,
        }
    }
}

/// Body of the calls that only identify the session (start, keep-alive, stop).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRequest<'a> {
    pub session_id: &'a str,
}

/// Body of `/v1/streaming.task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRequest<'a> {
    pub session_id: &'a str,
    pub text: &'a str,
    pub task_type: &'a str,
}

// =============================================================================
// Responses
// =============================================================================

/// Standard `{ "data": ... }` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
}

/// `data` of the token response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenData {
    pub token: String,
}

/// `data` of the session creation response.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSessionData {
    pub session_id: String,
    pub url: String,
    pub access_token: String,
}

/// Keep-alive response body; only `message` is inspected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeepAliveResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned on non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Data Channel
// =============================================================================

/// Inbound room data-channel message. Only `type` is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct DataChannelMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub task_id: Option<String>,
}
