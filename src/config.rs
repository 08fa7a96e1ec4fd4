use crate::error::{RecommendError, Result};

const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/api/token";

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub api_url: String,
    pub auth_url: String,
    pub market: String,
    pub timeout_secs: u64,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();

    let client_id = required_var("SPOTIFY_CLIENT_ID")?;
    let client_secret = required_var("SPOTIFY_CLIENT_SECRET")?;

    let timeout_secs = match std::env::var("HTTP_TIMEOUT_SECS") {
        Ok(raw) => raw.parse().map_err(|_| {
            RecommendError::Configuration(format!(
                "HTTP_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
            ))
        })?,
        Err(_) => 10,
    };

    Ok(Config {
        client_id,
        client_secret,
        api_url: optional_var("SPOTIFY_API_URL", DEFAULT_API_URL),
        auth_url: optional_var("SPOTIFY_AUTH_URL", DEFAULT_AUTH_URL),
        market: optional_var("SPOTIFY_MARKET", "US"),
        timeout_secs,
    })
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(RecommendError::Configuration(format!(
            "{name} is not set (add it to the environment or a .env file)"
        ))),
    }
}

fn optional_var(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
