//! Environment variable access for configuration loading.

use std::str::FromStr;

pub const ENV_API_KEY: &str = "AVATAR_API_KEY";
pub const ENV_API_URL: &str = "AVATAR_API_URL";
pub const ENV_AVATAR_ID: &str = "AVATAR_ID";
pub const ENV_VOICE_ID: &str = "AVATAR_VOICE_ID";
pub const ENV_VOICE_RATE: &str = "AVATAR_VOICE_RATE";
pub const ENV_QUALITY: &str = "AVATAR_QUALITY";
pub const ENV_VIDEO_ENCODING: &str = "AVATAR_VIDEO_ENCODING";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "AVATAR_IDLE_TIMEOUT_SECS";
pub const ENV_LIVENESS: &str = "AVATAR_LIVENESS";
pub const ENV_KEEP_ALIVE_INTERVAL_SECS: &str = "AVATAR_KEEP_ALIVE_INTERVAL_SECS";
pub const ENV_EVENT_CHANNEL: &str = "AVATAR_EVENT_CHANNEL";

/// All variables read by the loader.
pub const ALL_VARS: &[&str] = &[
    ENV_API_KEY,
    ENV_API_URL,
    ENV_AVATAR_ID,
    ENV_VOICE_ID,
    ENV_VOICE_RATE,
    ENV_QUALITY,
    ENV_VIDEO_ENCODING,
    ENV_IDLE_TIMEOUT_SECS,
    ENV_LIVENESS,
    ENV_KEEP_ALIVE_INTERVAL_SECS,
    ENV_EVENT_CHANNEL,
];

/// Read a variable, treating empty values as unset.
pub fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse a variable.
pub fn parse<T: FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {key} ('{raw}'): {e}")),
        None => Ok(None),
    }
}

/// Read a boolean variable. Accepts true/false, 1/0, yes/no, on/off.
pub fn parse_bool(key: &str) -> Result<Option<bool>, String> {
    match var(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {key}: '{raw}'")),
        },
        None => Ok(None),
    }
}
