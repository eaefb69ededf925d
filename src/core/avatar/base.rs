//! Base types for the streaming avatar session.
//!
//! This module defines the error taxonomy, the lifecycle and speaking state
//! enums, the session descriptor returned by provisioning and the callback
//! types used to notify the host application.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while driving an avatar session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AvatarError {
    /// The API key was rejected or the token response was unusable
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The streaming session could not be created
    #[error("Session provisioning failed: {0}")]
    ProvisioningFailed(String),

    /// The media room connection could not be established
    #[error("Room connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation is not valid in the current lifecycle phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The avatar is already speaking an utterance
    #[error("Avatar is already speaking")]
    Busy,

    /// The session is not ready to accept text
    #[error("Session is not ready")]
    NotReady,

    /// An inbound data-channel payload could not be decoded
    #[error("Invalid event payload: {0}")]
    InvalidEvent(String),

    /// A session-scoped REST call failed (start, task, keep-alive, stop)
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The out-of-band event channel failed
    #[error("Event channel error: {0}")]
    ChannelError(String),

    /// The caller supplied an unusable argument
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AvatarError {
    /// Whether this error ends the session when it happens while active.
    ///
    /// Decode failures, rejected dispatches and caller mistakes are local and
    /// leave the lifecycle phase untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AvatarError::Busy
                | AvatarError::NotReady
                | AvatarError::InvalidEvent(_)
                | AvatarError::InvalidRequest(_)
                | AvatarError::InvalidState(_)
        )
    }
}

/// Result type for avatar session operations.
pub type AvatarResult<T> = Result<T, AvatarError>;

// =============================================================================
// Lifecycle State
// =============================================================================

/// Lifecycle phase of an avatar session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecyclePhase {
    /// No session; initial and terminal state
    #[default]
    Disconnected,
    /// Token, session and room are being acquired
    Initializing,
    /// Room connected, text may be dispatched
    Ready,
    /// Teardown in progress
    Closing,
}

impl LifecyclePhase {
    /// Whether a session is held in this phase.
    pub fn is_active(&self) -> bool {
        !matches!(self, LifecyclePhase::Disconnected)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Disconnected => write!(f, "Disconnected"),
            LifecyclePhase::Initializing => write!(f, "Initializing"),
            LifecyclePhase::Ready => write!(f, "Ready"),
            LifecyclePhase::Closing => write!(f, "Closing"),
        }
    }
}

/// Whether the avatar is currently speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeakingState {
    #[default]
    Idle,
    Speaking,
}

impl fmt::Display for SpeakingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakingState::Idle => write!(f, "Idle"),
            SpeakingState::Speaking => write!(f, "Speaking"),
        }
    }
}

// =============================================================================
// Session Data
// =============================================================================

/// Short-lived token authorizing session-scoped API calls.
///
/// The token is wiped from memory when dropped and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Connection parameters for a provisioned streaming session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    /// Server-side session identifier
    pub session_id: String,
    /// Real-time room URL
    pub room_url: String,
    /// Access token for joining the room
    pub room_access_token: String,
}

impl fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("session_id", &self.session_id)
            .field("room_url", &self.room_url)
            .field("room_access_token", &"<redacted>")
            .finish()
    }
}

impl Drop for SessionDescriptor {
    fn drop(&mut self) {
        self.room_access_token.zeroize();
    }
}

// =============================================================================
// Media Tracks
// =============================================================================

/// Kind of an inbound media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// An inbound track subscribed from the room.
///
/// `source` carries the transport's own track object so a render target can
/// downcast it (for the LiveKit transport it is a `livekit::track::RemoteTrack`).
#[derive(Clone)]
pub struct MediaTrack {
    pub sid: String,
    pub kind: TrackKind,
    pub participant: Option<String>,
    pub source: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("sid", &self.sid)
            .field("kind", &self.kind)
            .field("participant", &self.participant)
            .finish()
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for start/stop speaking notifications.
pub type SpeakingCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for session error notifications carrying a human-readable message.
pub type SessionErrorCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for attaching inbound tracks to the host render target.
pub type TrackCallback =
    Arc<dyn Fn(MediaTrack) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
