//! REST client for the streaming avatar API.
//!
//! The client is cheap to clone (it shares one `reqwest::Client`) and carries no
//! session state; tokens and session ids are passed in per call.
//!
//! # API Reference
//!
//! - Token: `POST /v1/streaming.create_token` with `X-Api-Key`
//! - Everything else: `POST /v1/streaming.*` with `Authorization: Bearer <token>`

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::base::{AvatarError, AvatarResult, SessionDescriptor, SessionToken};
use super::config::AvatarConfig;
use super::messages::{
    ApiEnvelope, ApiErrorResponse, KeepAliveResponse, NewSessionData, NewSessionRequest,
    SessionRequest, TASK_TYPE_REPEAT, TaskRequest, TokenData,
};

const CREATE_TOKEN_PATH: &str = "/v1/streaming.create_token";
const NEW_SESSION_PATH: &str = "/v1/streaming.new";
const START_SESSION_PATH: &str = "/v1/streaming.start";
const TASK_PATH: &str = "/v1/streaming.task";
const KEEP_ALIVE_PATH: &str = "/v1/streaming.keep_alive";
const STOP_SESSION_PATH: &str = "/v1/streaming.stop";
const EVENT_CHANNEL_PATH: &str = "/v1/ws/streaming.chat";

/// TCP connect timeout; request time is left to the transport's defaults.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a request authenticates.
enum Credential<'a> {
    ApiKey(&'a str),
    Bearer(&'a SessionToken),
}

/// A failed call before it is classified into an `AvatarError`.
struct CallFailure {
    status: Option<StatusCode>,
    message: String,
}

impl CallFailure {
    fn describe(&self, call: &str) -> String {
        match self.status {
            Some(status) => format!("{call} returned {status}: {}", self.message),
            None => format!("{call}: {}", self.message),
        }
    }
}

/// HTTP client for the streaming avatar REST API.
#[derive(Clone)]
pub struct StreamingApiClient {
    http: Client,
    base_url: Url,
}

impl std::fmt::Debug for StreamingApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl StreamingApiClient {
    /// Create a client against `base_url` (for example `https://api.heygen.com`).
    pub fn new(base_url: &str) -> AvatarResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            AvatarError::InvalidConfiguration(format!("Invalid API base URL '{base_url}': {e}"))
        })?;
        if base_url.host_str().is_none() {
            return Err(AvatarError::InvalidConfiguration(format!(
                "API base URL '{base_url}' has no host"
            )));
        }

        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AvatarError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange the long-lived API key for a session token.
    pub async fn create_token(&self, api_key: &str) -> AvatarResult<SessionToken> {
        let body = self
            .post::<()>(CREATE_TOKEN_PATH, Credential::ApiKey(api_key), None)
            .await
            .map_err(|f| AvatarError::AuthenticationFailed(f.describe("create_token")))?;

        let envelope: ApiEnvelope<TokenData> = parse_body(&body)
            .map_err(|e| AvatarError::AuthenticationFailed(format!("create_token: {e}")))?;
        if envelope.data.token.is_empty() {
            return Err(AvatarError::AuthenticationFailed(
                "create_token: response carried an empty token".to_string(),
            ));
        }

        Ok(SessionToken::new(envelope.data.token))
    }

    /// Create a new streaming session and return its room parameters.
    pub async fn new_session(
        &self,
        token: &SessionToken,
        config: &AvatarConfig,
    ) -> AvatarResult<SessionDescriptor> {
        let request = NewSessionRequest::from_config(config);
        let body = self
            .post(NEW_SESSION_PATH, Credential::Bearer(token), Some(&request))
            .await
            .map_err(|f| AvatarError::ProvisioningFailed(f.describe("streaming.new")))?;

        let envelope: ApiEnvelope<NewSessionData> = parse_body(&body)
            .map_err(|e| AvatarError::ProvisioningFailed(format!("streaming.new: {e}")))?;
        let data = envelope.data;

        Ok(SessionDescriptor {
            session_id: data.session_id,
            room_url: data.url,
            room_access_token: data.access_token,
        })
    }

    /// Signal the server to begin streaming into the room.
    pub async fn start_session(&self, token: &SessionToken, session_id: &str) -> AvatarResult<()> {
        self.post(
            START_SESSION_PATH,
            Credential::Bearer(token),
            Some(&SessionRequest { session_id }),
        )
        .await
        .map_err(|f| AvatarError::RequestFailed(f.describe("streaming.start")))?;
        Ok(())
    }

    /// Ask the avatar to repeat `text`.
    pub async fn send_task(
        &self,
        token: &SessionToken,
        session_id: &str,
        text: &str,
    ) -> AvatarResult<()> {
        let request = TaskRequest {
            session_id,
            text,
            task_type: TASK_TYPE_REPEAT,
        };
        self.post(TASK_PATH, Credential::Bearer(token), Some(&request))
            .await
            .map_err(|f| AvatarError::RequestFailed(f.describe("streaming.task")))?;
        Ok(())
    }

    /// Reset the server idle timer. Returns the response `message`, if any.
    pub async fn keep_alive(
        &self,
        token: &SessionToken,
        session_id: &str,
    ) -> AvatarResult<Option<String>> {
        let body = self
            .post(
                KEEP_ALIVE_PATH,
                Credential::Bearer(token),
                Some(&SessionRequest { session_id }),
            )
            .await
            .map_err(|f| AvatarError::RequestFailed(f.describe("streaming.keep_alive")))?;

        let response: KeepAliveResponse = parse_body(&body).unwrap_or_default();
        Ok(response.message)
    }

    /// Release the session server-side.
    pub async fn stop_session(&self, token: &SessionToken, session_id: &str) -> AvatarResult<()> {
        self.post(
            STOP_SESSION_PATH,
            Credential::Bearer(token),
            Some(&SessionRequest { session_id }),
        )
        .await
        .map_err(|f| AvatarError::RequestFailed(f.describe("streaming.stop")))?;
        Ok(())
    }

    /// WebSocket URL of the out-of-band event channel for a session.
    pub fn event_channel_url(&self, token: &SessionToken, session_id: &str) -> AvatarResult<Url> {
        let host = self.base_url.host_str().ok_or_else(|| {
            AvatarError::InvalidConfiguration("API base URL has no host".to_string())
        })?;
        let scheme = if self.base_url.scheme() == "http" {
            "ws"
        } else {
            "wss"
        };
        let mut url = Url::parse(&format!("{scheme}://{host}"))
            .map_err(|e| AvatarError::ChannelError(format!("Invalid channel URL: {e}")))?;
        if let Some(port) = self.base_url.port() {
            let _ = url.set_port(Some(port));
        }
        url.set_path(EVENT_CHANNEL_PATH);
        url.query_pairs_mut()
            .append_pair("session_id", session_id)
            .append_pair("session_token", token.expose());
        Ok(url)
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        credential: Credential<'_>,
        body: Option<&B>,
    ) -> Result<String, CallFailure> {
        let url = self.base_url.join(path).map_err(|e| CallFailure {
            status: None,
            message: format!("invalid URL: {e}"),
        })?;

        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json");
        request = match credential {
            Credential::ApiKey(key) => request.header("X-Api-Key", key),
            Credential::Bearer(token) => {
                request.header("Authorization", format!("Bearer {}", token.expose()))
            }
        };
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("POST {}", path);
        let response = request.send().await.map_err(|e| CallFailure {
            status: None,
            message: format!("request failed: {e}"),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CallFailure {
            status: Some(status),
            message: format!("failed to read response: {e}"),
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(ApiErrorResponse {
                    message: Some(message),
                    code,
                }) => match code {
                    Some(code) => format!("{message} (code {code})"),
                    None => message,
                },
                _ if text.is_empty() => "empty response body".to_string(),
                _ => text,
            };
            return Err(CallFailure {
                status: Some(status),
                message,
            });
        }

        Ok(text)
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|e| format!("malformed response body: {e}"))
}
