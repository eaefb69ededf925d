use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override the environment.
///
/// # Example YAML structure
/// ```yaml
/// api:
///   url: "https://api.heygen.com"
///   key: "your-api-key"
///
/// avatar:
///   id: "June_HR_public"
///   voice_id: "your-voice-id"
///   voice_rate: 1.0
///   quality: "high"
///   video_encoding: "H264"
///   idle_timeout_secs: 300
///
/// liveness:
///   policy: "active"
///   interval_secs: 15
///   event_channel: true
///
/// host:
///   greeting: "Hello, I am an AI interview assistant."
///   prompts:
///     - "Tell me about a project you are proud of."
///     - "How do you approach learning a new technology?"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub api: Option<ApiYaml>,
    pub avatar: Option<AvatarYaml>,
    pub liveness: Option<LivenessYaml>,
    pub host: Option<HostYaml>,
}

/// REST API settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiYaml {
    pub url: Option<String>,
    /// Prefer the AVATAR_API_KEY environment variable over storing the key in a file
    pub key: Option<String>,
}

/// Avatar and voice selection from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AvatarYaml {
    pub id: Option<String>,
    pub voice_id: Option<String>,
    pub voice_rate: Option<f32>,
    pub quality: Option<String>,
    pub video_encoding: Option<String>,
    /// 0 disables the idle timeout parameter
    pub idle_timeout_secs: Option<u32>,
}

/// Session liveness settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LivenessYaml {
    /// "active" or "passive"
    pub policy: Option<String>,
    pub interval_secs: Option<u64>,
    pub event_channel: Option<bool>,
}

/// Interactive host settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HostYaml {
    pub greeting: Option<String>,
    pub prompts: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
