//! Configuration module for the avatar client
//!
//! This module loads the client configuration from .env files, environment
//! variables and YAML files. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable access
//! - `yaml`: YAML configuration file loading
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_avatar::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("avatar.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! println!("Using avatar {}", config.avatar.avatar_id);
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::core::avatar::{
    AvatarConfig, DEFAULT_API_URL, DEFAULT_KEEP_ALIVE_INTERVAL, LivenessPolicy, SessionConfig,
    VideoEncoding, VideoQuality,
};

pub mod env;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Greeting spoken once the session is ready.
pub const DEFAULT_GREETING: &str =
    "Hello, I am an AI interview assistant. When you are ready, type 'next' to begin.";

/// Prompts cycled through by the interactive host.
pub const DEFAULT_PROMPTS: &[&str] = &[
    "Can you walk me through a complex technical project you worked on recently? Describe the problem, the solution you implemented, and any challenges you encountered during the process.",
    "Explain a situation where you had to quickly learn a new technology or framework to complete a task. How did you approach the learning process and what was the outcome?",
    "Describe a time when you identified a performance bottleneck in a system or application. What tools or methods did you use to diagnose the issue, and how did you resolve it?",
    "Have you ever faced a technical disagreement with a teammate or manager? How did you handle the situation, and what was the resolution?",
    "Tell me about a time when you had to refactor or rewrite legacy code. What were the risks involved, and how did you ensure stability and improvement in the codebase?",
];

/// Interactive host settings
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    /// Spoken when the session becomes ready
    pub greeting: String,
    /// Cycled with the `next` command
    pub prompts: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            prompts: DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Client configuration
///
/// The API key is never printed by `Debug` and is zeroized on drop.
#[derive(Clone)]
pub struct ClientConfig {
    /// Long-lived streaming API key
    pub api_key: String,
    /// REST API base URL
    pub api_url: String,
    /// Options sent at session creation
    pub avatar: AvatarConfig,
    /// Keep-alive policy
    pub liveness: LivenessPolicy,
    /// Open the out-of-band event channel
    pub event_channel: bool,
    /// Interactive host settings
    pub host: HostConfig,
}

impl Drop for ClientConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.api_key.zeroize();
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("avatar", &self.avatar)
            .field("liveness", &self.liveness)
            .field("event_channel", &self.event_channel)
            .field("host", &self.host)
            .finish()
    }
}

/// Show only the first four characters of a secret.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}****")
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Note: .env file is loaded in main.rs at application startup.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_session(&self.session_config())
    }

    /// Settings handed to an [`AvatarSession`](crate::core::avatar::AvatarSession).
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            api_key: Zeroizing::new(self.api_key.clone()),
            api_url: self.api_url.clone(),
            avatar: self.avatar.clone(),
            liveness: self.liveness,
            event_channel: self.event_channel,
        }
    }
}

/// Build the configuration from the environment, then apply YAML overrides.
fn merge_config(yaml: Option<YamlConfig>) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let yaml = yaml.unwrap_or_default();
    let api = yaml.api.unwrap_or_default();
    let avatar_yaml = yaml.avatar.unwrap_or_default();
    let liveness_yaml = yaml.liveness.unwrap_or_default();
    let host_yaml = yaml.host.unwrap_or_default();

    let api_key = api.key.or_else(|| env::var(env::ENV_API_KEY)).unwrap_or_default();
    let api_url = api
        .url
        .or_else(|| env::var(env::ENV_API_URL))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let defaults = AvatarConfig::default();

    let avatar_id = avatar_yaml
        .id
        .or_else(|| env::var(env::ENV_AVATAR_ID))
        .unwrap_or(defaults.avatar_id);
    let voice_id = avatar_yaml.voice_id.or_else(|| env::var(env::ENV_VOICE_ID));
    let voice_rate = match avatar_yaml.voice_rate {
        Some(rate) => rate,
        None => env::parse::<f32>(env::ENV_VOICE_RATE)?.unwrap_or(defaults.voice_rate),
    };
    let quality = avatar_yaml
        .quality
        .or_else(|| env::var(env::ENV_QUALITY))
        .map(|q| VideoQuality::from_str_or_default(&q))
        .unwrap_or(defaults.quality);
    let video_encoding = avatar_yaml
        .video_encoding
        .or_else(|| env::var(env::ENV_VIDEO_ENCODING))
        .map(|e| VideoEncoding::from_str_or_default(&e))
        .unwrap_or(defaults.video_encoding);
    let idle_timeout_secs = match avatar_yaml.idle_timeout_secs {
        Some(secs) => secs,
        None => env::parse::<u32>(env::ENV_IDLE_TIMEOUT_SECS)?
            .or(defaults.idle_timeout_secs)
            .unwrap_or(0),
    };

    let interval_secs = match liveness_yaml.interval_secs {
        Some(secs) => Some(secs),
        None => env::parse::<u64>(env::ENV_KEEP_ALIVE_INTERVAL_SECS)?,
    };
    let interval = interval_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_KEEP_ALIVE_INTERVAL);
    let liveness = match liveness_yaml.policy.or_else(|| env::var(env::ENV_LIVENESS)) {
        Some(name) => LivenessPolicy::parse(&name, interval)
            .ok_or_else(|| format!("Unknown liveness policy '{name}' (expected active or passive)"))?,
        None => LivenessPolicy::Active { interval },
    };
    let event_channel = match liveness_yaml.event_channel {
        Some(enabled) => enabled,
        None => env::parse_bool(env::ENV_EVENT_CHANNEL)?.unwrap_or(true),
    };

    let host_defaults = HostConfig::default();
    let host = HostConfig {
        greeting: host_yaml.greeting.unwrap_or(host_defaults.greeting),
        prompts: host_yaml
            .prompts
            .filter(|p| !p.is_empty())
            .unwrap_or(host_defaults.prompts),
    };

    Ok(ClientConfig {
        api_key,
        api_url,
        avatar: AvatarConfig {
            avatar_id,
            voice_id,
            voice_rate,
            quality,
            video_encoding,
            idle_timeout_secs: (idle_timeout_secs > 0).then_some(idle_timeout_secs),
        },
        liveness,
        event_channel,
        host,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for key in env::ALL_VARS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AVATAR_API_KEY", "env-key");
        }

        let config = ClientConfig::from_env().unwrap();

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.api_url, "https://api.heygen.com");
        assert_eq!(config.avatar.avatar_id, "June_HR_public");
        assert_eq!(config.avatar.voice_rate, 1.0);
        assert_eq!(config.avatar.quality, VideoQuality::High);
        assert_eq!(config.avatar.video_encoding, VideoEncoding::H264);
        assert_eq!(config.avatar.idle_timeout_secs, Some(300));
        assert_eq!(
            config.liveness,
            LivenessPolicy::Active {
                interval: Duration::from_secs(15)
            }
        );
        assert!(config.event_channel);
        assert_eq!(config.host.prompts.len(), 5);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_api_key() {
        cleanup_env_vars();

        let result = ClientConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("AVATAR_API_KEY"));
    }

    #[test]
    #[serial]
    fn test_from_env_all_values() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AVATAR_API_KEY", "env-key");
            std::env::set_var("AVATAR_API_URL", "http://127.0.0.1:9000");
            std::env::set_var("AVATAR_ID", "Wayne_20240711");
            std::env::set_var("AVATAR_VOICE_ID", "voice-9");
            std::env::set_var("AVATAR_VOICE_RATE", "1.5");
            std::env::set_var("AVATAR_QUALITY", "low");
            std::env::set_var("AVATAR_VIDEO_ENCODING", "vp8");
            std::env::set_var("AVATAR_IDLE_TIMEOUT_SECS", "60");
            std::env::set_var("AVATAR_LIVENESS", "passive");
            std::env::set_var("AVATAR_EVENT_CHANNEL", "false");
        }

        let config = ClientConfig::from_env().unwrap();

        assert_eq!(config.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.avatar.avatar_id, "Wayne_20240711");
        assert_eq!(config.avatar.voice_id, Some("voice-9".to_string()));
        assert_eq!(config.avatar.voice_rate, 1.5);
        assert_eq!(config.avatar.quality, VideoQuality::Low);
        assert_eq!(config.avatar.video_encoding, VideoEncoding::Vp8);
        assert_eq!(config.avatar.idle_timeout_secs, Some(60));
        assert_eq!(config.liveness, LivenessPolicy::Passive);
        assert!(!config.event_channel);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_values() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AVATAR_API_KEY", "env-key");
            std::env::set_var("AVATAR_LIVENESS", "sometimes");
        }
        assert!(ClientConfig::from_env().is_err());

        unsafe {
            std::env::remove_var("AVATAR_LIVENESS");
            std::env::set_var("AVATAR_VOICE_RATE", "3.0");
        }
        assert!(ClientConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_passive_with_disabled_idle_timeout_is_rejected() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AVATAR_API_KEY", "env-key");
            std::env::set_var("AVATAR_LIVENESS", "passive");
            std::env::set_var("AVATAR_IDLE_TIMEOUT_SECS", "0");
        }

        assert!(ClientConfig::from_env().is_err());

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("avatar.yaml");

        let yaml_content = r#"
avatar:
  id: "yaml-avatar"
  quality: "medium"

liveness:
  policy: "active"
  interval_secs: 5

host:
  greeting: "Welcome"
  prompts:
    - "Only question"
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            std::env::set_var("AVATAR_API_KEY", "env-key");
            std::env::set_var("AVATAR_ID", "env-avatar");
            std::env::set_var("AVATAR_VOICE_ID", "env-voice");
        }

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.avatar.avatar_id, "yaml-avatar");
        assert_eq!(config.avatar.voice_id, Some("env-voice".to_string()));
        assert_eq!(config.avatar.quality, VideoQuality::Medium);
        assert_eq!(
            config.liveness,
            LivenessPolicy::Active {
                interval: Duration::from_secs(5)
            }
        );
        assert_eq!(config.host.greeting, "Welcome");
        assert_eq!(config.host.prompts, vec!["Only question".to_string()]);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_debug_redacts_api_key() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AVATAR_API_KEY", "supersecretkey");
        }

        let config = ClientConfig::from_env().unwrap();
        let printed = format!("{config:?}");
        assert!(!printed.contains("supersecretkey"));
        assert!(printed.contains("supe****"));

        cleanup_env_vars();
    }

    #[test]
    fn test_session_config_carries_settings() {
        let config = ClientConfig {
            api_key: "K".to_string(),
            api_url: "https://api.heygen.com".to_string(),
            avatar: AvatarConfig::default(),
            liveness: LivenessPolicy::Passive,
            event_channel: false,
            host: HostConfig::default(),
        };

        let session = config.session_config();
        assert_eq!(session.api_key.as_str(), "K");
        assert_eq!(session.liveness, LivenessPolicy::Passive);
        assert!(!session.event_channel);
    }

    #[test]
    fn test_redact() {
        assert_eq!(redact(""), "<unset>");
        assert_eq!(redact("abcdefgh"), "abcd****");
    }
}
