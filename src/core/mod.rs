pub mod avatar;

// Re-export commonly used types for convenience
pub use avatar::{
    AvatarConfig, AvatarError, AvatarEvent, AvatarResult, AvatarSession, LifecyclePhase,
    LiveKitTransport, LivenessPolicy, MediaTrack, RoomTransport, SessionConfig, SpeakingState,
    VideoEncoding, VideoQuality,
};
