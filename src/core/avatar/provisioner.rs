//! Credential exchange and session provisioning.
//!
//! A provisioner allocates at most one remote session at a time. The remote
//! resource stays allocated until [`SessionProvisioner::release`] is called,
//! which is the controller's cue that a stop request has been issued.

use parking_lot::Mutex;
use tracing::info;

use super::api::StreamingApiClient;
use super::base::{AvatarError, AvatarResult, SessionDescriptor, SessionToken};
use super::config::AvatarConfig;

pub struct SessionProvisioner {
    api: StreamingApiClient,
    avatar: AvatarConfig,
    allocated: Mutex<Option<String>>,
}

impl SessionProvisioner {
    pub fn new(api: StreamingApiClient, avatar: AvatarConfig) -> Self {
        Self {
            api,
            avatar,
            allocated: Mutex::new(None),
        }
    }

    pub fn avatar(&self) -> &AvatarConfig {
        &self.avatar
    }

    /// Exchange the API key for a session token. No retries.
    pub async fn fetch_token(&self, api_key: &str) -> AvatarResult<SessionToken> {
        info!("Requesting session token");
        self.api.create_token(api_key).await
    }

    /// Create the remote streaming session.
    ///
    /// Fails with `InvalidState` if a session from this provisioner has not
    /// been released yet.
    pub async fn create_session(&self, token: &SessionToken) -> AvatarResult<SessionDescriptor> {
        if let Some(session_id) = self.allocated.lock().as_ref() {
            return Err(AvatarError::InvalidState(format!(
                "session {session_id} is still allocated; close it before creating another"
            )));
        }

        info!(
            "Creating streaming session (avatar: {}, quality: {})",
            self.avatar.avatar_id, self.avatar.quality
        );
        let descriptor = self.api.new_session(token, &self.avatar).await?;

        let mut allocated = self.allocated.lock();
        if allocated.is_some() {
            return Err(AvatarError::InvalidState(
                "concurrent session creation".to_string(),
            ));
        }
        *allocated = Some(descriptor.session_id.clone());
        info!("Streaming session created: {}", descriptor.session_id);
        Ok(descriptor)
    }

    /// Forget the allocated session so a new one may be created.
    pub fn release(&self) {
        self.allocated.lock().take();
    }

    pub fn allocated_session(&self) -> Option<String> {
        self.allocated.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_new_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/v1/streaming.new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"session_id": "S1", "url": "wss://room", "access_token": "RT"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_second_create_without_release_is_state_error() {
        let server = MockServer::start().await;
        mount_new_session(&server).await;

        let api = StreamingApiClient::new(&server.uri()).unwrap();
        let provisioner = SessionProvisioner::new(api, AvatarConfig::default());
        let token = SessionToken::new("T1");

        provisioner.create_session(&token).await.unwrap();
        assert_eq!(provisioner.allocated_session().as_deref(), Some("S1"));

        assert!(matches!(
            provisioner.create_session(&token).await,
            Err(AvatarError::InvalidState(_))
        ));

        provisioner.release();
        assert!(provisioner.create_session(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_create_allocates_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/streaming.new"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let api = StreamingApiClient::new(&server.uri()).unwrap();
        let provisioner = SessionProvisioner::new(api, AvatarConfig::default());

        assert!(matches!(
            provisioner.create_session(&SessionToken::new("T1")).await,
            Err(AvatarError::ProvisioningFailed(_))
        ));
        assert!(provisioner.allocated_session().is_none());
    }
}
