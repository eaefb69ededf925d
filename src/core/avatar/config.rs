//! Configuration types for the streaming avatar API.
//!
//! This module contains:
//! - Quality tier and video encoding options sent at session creation
//! - The avatar/voice selection (`AvatarConfig`)
//! - The liveness policy used to keep a session from idling out
//! - The complete `SessionConfig` handed to a session controller

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::base::{AvatarError, AvatarResult};

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.heygen.com";

/// Default avatar identity.
pub const DEFAULT_AVATAR_ID: &str = "June_HR_public";

/// API version requested at session creation.
pub const STREAMING_API_VERSION: &str = "v2";

/// Default server-side idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u32 = 300;

/// Default keep-alive interval for the active liveness policy.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

// =============================================================================
// Quality
// =============================================================================

/// Stream quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl VideoQuality {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Self::Low,
            "medium" | "med" => Self::Medium,
            "high" => Self::High,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Video Encoding
// =============================================================================

/// Video codec requested for the avatar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoEncoding {
    #[default]
    #[serde(rename = "H264")]
    H264,
    #[serde(rename = "VP8")]
    Vp8,
}

impl VideoEncoding {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H264 => "H264",
            Self::Vp8 => "VP8",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Self::H264,
            "vp8" => Self::Vp8,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for VideoEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Liveness Policy
// =============================================================================

/// How an open session is kept from hitting the server idle timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPolicy {
    /// Rely on the idle timeout negotiated at session creation.
    Passive,
    /// Send a keep-alive request on a fixed interval while Ready.
    Active { interval: Duration },
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        LivenessPolicy::Active {
            interval: DEFAULT_KEEP_ALIVE_INTERVAL,
        }
    }
}

impl LivenessPolicy {
    /// Build a policy from its configuration name.
    ///
    /// `interval` is only used by the active policy.
    pub fn parse(name: &str, interval: Duration) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "passive" | "idle_timeout" | "idle-timeout" => Some(LivenessPolicy::Passive),
            "active" | "keep_alive" | "keep-alive" | "keepalive" => {
                Some(LivenessPolicy::Active { interval })
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LivenessPolicy::Passive => "passive",
            LivenessPolicy::Active { .. } => "active",
        }
    }
}

// =============================================================================
// Avatar Configuration
// =============================================================================

/// Options sent to the provisioning endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarConfig {
    /// Avatar identity
    pub avatar_id: String,
    /// Voice identity; the avatar's default voice is used when absent
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Voice speaking rate
    #[serde(default = "default_voice_rate")]
    pub voice_rate: f32,
    /// Stream quality tier
    #[serde(default)]
    pub quality: VideoQuality,
    /// Video codec
    #[serde(default)]
    pub video_encoding: VideoEncoding,
    /// Server-side idle timeout in seconds
    #[serde(default)]
    pub idle_timeout_secs: Option<u32>,
}

fn default_voice_rate() -> f32 {
    1.0
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            avatar_id: DEFAULT_AVATAR_ID.to_string(),
            voice_id: None,
            voice_rate: default_voice_rate(),
            quality: VideoQuality::default(),
            video_encoding: VideoEncoding::default(),
            idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl AvatarConfig {
    /// Check the options against the liveness policy they will be used with.
    pub fn validate(&self, policy: &LivenessPolicy) -> AvatarResult<()> {
        if self.avatar_id.trim().is_empty() {
            return Err(AvatarError::InvalidConfiguration(
                "avatar_id must not be empty".to_string(),
            ));
        }
        if !(self.voice_rate > 0.0 && self.voice_rate <= 2.0) {
            return Err(AvatarError::InvalidConfiguration(format!(
                "voice_rate must be in (0, 2], got {}",
                self.voice_rate
            )));
        }
        match policy {
            LivenessPolicy::Passive => {
                if self.idle_timeout_secs.is_none_or(|t| t == 0) {
                    return Err(AvatarError::InvalidConfiguration(
                        "passive liveness requires a non-zero idle timeout".to_string(),
                    ));
                }
            }
            LivenessPolicy::Active { interval } => {
                if interval.is_zero() {
                    return Err(AvatarError::InvalidConfiguration(
                        "keep-alive interval must be greater than zero".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Everything an [`AvatarSession`](super::AvatarSession) needs to run.
#[derive(Clone)]
pub struct SessionConfig {
    /// Long-lived API key; wiped from memory on drop
    pub api_key: Zeroizing<String>,
    /// REST API base URL
    pub api_url: String,
    /// Options sent at session creation
    pub avatar: AvatarConfig,
    /// How the session is kept alive while Ready
    pub liveness: LivenessPolicy,
    /// Open the out-of-band event channel once the room is connected
    pub event_channel: bool,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Zeroizing::new(api_key.into()),
            api_url: DEFAULT_API_URL.to_string(),
            avatar: AvatarConfig::default(),
            liveness: LivenessPolicy::default(),
            event_channel: true,
        }
    }

    pub fn validate(&self) -> AvatarResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(AvatarError::InvalidConfiguration(
                "API key must not be empty".to_string(),
            ));
        }
        self.avatar.validate(&self.liveness)
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("avatar", &self.avatar)
            .field("liveness", &self.liveness)
            .field("event_channel", &self.event_channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_validation() {
        assert!(SessionConfig::new("K").validate().is_ok());
        assert!(matches!(
            SessionConfig::new("  ").validate(),
            Err(AvatarError::InvalidConfiguration(_))
        ));

        let printed = format!("{:?}", SessionConfig::new("secret-key"));
        assert!(!printed.contains("secret-key"));
    }

    #[test]
    fn test_quality_parsing() {
        assert_eq!(VideoQuality::from_str_or_default("LOW"), VideoQuality::Low);
        assert_eq!(VideoQuality::from_str_or_default("med"), VideoQuality::Medium);
        assert_eq!(VideoQuality::from_str_or_default("ultra"), VideoQuality::High);
        assert_eq!(VideoQuality::High.as_str(), "high");
    }

    #[test]
    fn test_encoding_parsing() {
        assert_eq!(VideoEncoding::from_str_or_default("vp8"), VideoEncoding::Vp8);
        assert_eq!(VideoEncoding::from_str_or_default("h264"), VideoEncoding::H264);
        assert_eq!(VideoEncoding::from_str_or_default("av1"), VideoEncoding::H264);
        assert_eq!(serde_json::to_string(&VideoEncoding::H264).unwrap(), "\"H264\"");
    }

    #[test]
    fn test_liveness_parse() {
        let interval = Duration::from_secs(10);
        assert_eq!(
            LivenessPolicy::parse("passive", interval),
            Some(LivenessPolicy::Passive)
        );
        assert_eq!(
            LivenessPolicy::parse("Keep-Alive", interval),
            Some(LivenessPolicy::Active { interval })
        );
        assert_eq!(LivenessPolicy::parse("sometimes", interval), None);
        assert_eq!(
            LivenessPolicy::default(),
            LivenessPolicy::Active {
                interval: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn test_default_avatar_config() {
        let config = AvatarConfig::default();
        assert_eq!(config.avatar_id, "June_HR_public");
        assert_eq!(config.idle_timeout_secs, Some(300));
        assert!(config.validate(&LivenessPolicy::default()).is_ok());
    }

    #[test]
    fn test_passive_requires_idle_timeout() {
        let config = AvatarConfig {
            idle_timeout_secs: None,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(&LivenessPolicy::Passive),
            Err(AvatarError::InvalidConfiguration(_))
        ));
        assert!(config.validate(&LivenessPolicy::default()).is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = AvatarConfig::default();
        let policy = LivenessPolicy::Active {
            interval: Duration::ZERO,
        };
        assert!(config.validate(&policy).is_err());
    }

    #[test]
    fn test_voice_rate_bounds() {
        let config = AvatarConfig {
            voice_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate(&LivenessPolicy::Passive).is_err());
    }
}
