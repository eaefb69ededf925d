use url::Url;

use crate::core::avatar::SessionConfig;

/// Validate that an API key is present.
pub fn validate_api_key(api_key: &str) -> Result<(), Box<dyn std::error::Error>> {
    if api_key.trim().is_empty() {
        return Err(format!(
            "{} is required (set it in the environment or under api.key)",
            super::env::ENV_API_KEY
        )
        .into());
    }
    Ok(())
}

/// Validate the REST API base URL.
pub fn validate_api_url(api_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(api_url).map_err(|e| format!("Invalid API URL '{api_url}': {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(format!("API URL must use http or https, got '{other}'").into());
        }
    }
    if url.host_str().is_none() {
        return Err(format!("API URL '{api_url}' has no host").into());
    }
    Ok(())
}

/// Validate everything a session needs.
pub fn validate_session(config: &SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_api_key(&config.api_key)?;
    validate_api_url(&config.api_url)?;
    config.validate()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::avatar::LivenessPolicy;

    #[test]
    fn test_validate_api_url() {
        assert!(validate_api_url("https://api.heygen.com").is_ok());
        assert!(validate_api_url("http://127.0.0.1:8080").is_ok());
        assert!(validate_api_url("ftp://api.heygen.com").is_err());
        assert!(validate_api_url("api.heygen.com").is_err());
    }

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("K").is_ok());
        let err = validate_api_key("").unwrap_err();
        assert!(err.to_string().contains("AVATAR_API_KEY"));
    }

    #[test]
    fn test_validate_session_passive_without_timeout() {
        let mut config = SessionConfig::new("K");
        config.liveness = LivenessPolicy::Passive;
        config.avatar.idle_timeout_secs = None;
        assert!(validate_session(&config).is_err());
    }
}
