//! Streaming avatar session module.
//!
//! Drives a remote "talking avatar" service from the client side: obtain a
//! short-lived token, provision a streaming session, join its real-time media
//! room, send text for the avatar to speak and tear everything down again.
//!
//! # Components
//!
//! - `api` - REST client for the streaming API
//! - `provisioner` - token exchange and session creation
//! - `room` - transport-agnostic media room connector
//! - `livekit` - LiveKit room transport
//! - `chat` - out-of-band WebSocket event channel
//! - `events` - data-channel event decoding
//! - `dispatcher` - speaking-state arbitration and utterance dispatch
//! - `liveness` - keep-alive policies
//! - `controller` - the lifecycle state machine tying it together
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waav_avatar::core::avatar::{AvatarSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = AvatarSession::with_livekit(SessionConfig::new(api_key)).unwrap();
//!
//!     session.on_stop_speaking(Arc::new(|| Box::pin(async move {
//!         println!("Idle");
//!     })));
//!
//!     session.start().await.unwrap();
//!     session.speak("Hello").await.unwrap();
//!     session.close().await;
//! }
//! ```

pub mod api;
mod base;
pub mod chat;
pub mod config;
mod controller;
pub mod dispatcher;
pub mod events;
pub mod livekit;
pub mod liveness;
pub mod messages;
pub mod provisioner;
pub mod room;

pub use api::StreamingApiClient;
pub use base::{
    AvatarError, AvatarResult, LifecyclePhase, MediaTrack, SessionDescriptor,
    SessionErrorCallback, SessionToken, SpeakingCallback, SpeakingState, TrackCallback, TrackKind,
};
pub use config::{
    AvatarConfig, DEFAULT_API_URL, DEFAULT_AVATAR_ID, DEFAULT_IDLE_TIMEOUT_SECS,
    DEFAULT_KEEP_ALIVE_INTERVAL, LivenessPolicy, SessionConfig, VideoEncoding, VideoQuality,
};
pub use controller::{AvatarSession, CHANNEL_LOST_MESSAGE};
pub use events::{AvatarEvent, EventRelay};
pub use livekit::LiveKitTransport;
pub use room::{RoomConnector, RoomEvent, RoomEventSender, RoomHandle, RoomTransport};
