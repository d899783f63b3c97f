use crate::envelope::WireFormat;
use crate::errors::ConfigError;
use dotenv::dotenv;
use log::debug;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

// API URL constants
pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const OAUTH_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested during the consent flow. Only the mail scope is used by the relay.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/contacts.readonly",
];

// Relay defaults
pub const DEFAULT_UPSTREAM_URL: &str = "ws://localhost:9000";
pub const DEFAULT_MAX_RESULTS: usize = 28;
pub const DEFAULT_PAGE_SIZE: u32 = 1;
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_ANSWER_TIMEOUT_SECS: u64 = 20;
pub const DONE_TOKEN: &str = "Done";
pub const EXIT_TOKEN: &str = "exit";
pub const FINAL_PROMPT: &str = "How is it Going?";

fn load_dotenv() {
    // If DOTENV_PATH is set, use that path, otherwise use default
    if let Ok(path) = std::env::var("DOTENV_PATH") {
        let _ = dotenv::from_path(path);
    } else {
        let _ = dotenv();
    }
}

/// Gmail OAuth credentials and the endpoints they are used against.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub api_base_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Config {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Config {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            access_token: None,
            api_base_url: GMAIL_API_BASE_URL.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
            userinfo_url: OAUTH_USERINFO_URL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        debug!("Loading Gmail OAuth configuration from environment");

        // Get required variables
        let client_id = env::var("GMAIL_CLIENT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_CLIENT_ID".to_string()))?;

        let client_secret = env::var("GMAIL_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_CLIENT_SECRET".to_string()))?;

        let refresh_token = env::var("GMAIL_REFRESH_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_REFRESH_TOKEN".to_string()))?;

        let mut config = Config::new(&client_id, &client_secret, &refresh_token);

        // Optional overrides
        config.access_token = env::var("GMAIL_ACCESS_TOKEN").ok();
        if let Ok(url) = env::var("GMAIL_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = env::var("OAUTH_TOKEN_URL") {
            config.token_url = url;
        }
        if let Ok(url) = env::var("OAUTH_USERINFO_URL") {
            config.userinfo_url = url;
        }

        debug!("OAuth configuration loaded successfully");

        Ok(config)
    }

    /// Client credentials only, for the consent flow where no refresh token exists yet.
    pub fn client_from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        let client_id = env::var("GMAIL_CLIENT_ID")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_CLIENT_ID".to_string()))?;
        let client_secret = env::var("GMAIL_CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("GMAIL_CLIENT_SECRET".to_string()))?;

        let mut config = Config::new(&client_id, &client_secret, "");
        if let Ok(url) = env::var("OAUTH_TOKEN_URL") {
            config.token_url = url;
        }
        Ok(config)
    }
}

/// Everything a relay session needs to know about ports, caps and timeouts.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub browser_addr: SocketAddr,
    pub upstream_url: String,
    /// Stop fetching once this many genuine messages were forwarded.
    pub max_results: usize,
    pub page_size: u32,
    pub ack_timeout: Duration,
    pub done_ack_timeout: Duration,
    pub answer_timeout: Duration,
    pub wire_format: WireFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            browser_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            page_size: DEFAULT_PAGE_SIZE,
            ack_timeout: Duration::from_secs(DEFAULT_ACK_TIMEOUT_SECS),
            done_ack_timeout: Duration::from_secs(DEFAULT_ACK_TIMEOUT_SECS),
            answer_timeout: Duration::from_secs(DEFAULT_ANSWER_TIMEOUT_SECS),
            wire_format: WireFormat::Tagged,
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();

        debug!("Loading relay configuration from environment");

        let defaults = RelayConfig::default();
        let config = RelayConfig {
            browser_addr: env_or("RELAY_BROWSER_ADDR", defaults.browser_addr)?,
            upstream_url: env::var("RELAY_UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            max_results: env_or("RELAY_MAX_RESULTS", defaults.max_results)?,
            page_size: env_or("RELAY_PAGE_SIZE", defaults.page_size)?,
            ack_timeout: Duration::from_secs(env_or(
                "RELAY_ACK_TIMEOUT_SECS",
                defaults.ack_timeout.as_secs(),
            )?),
            done_ack_timeout: Duration::from_secs(env_or(
                "RELAY_DONE_ACK_TIMEOUT_SECS",
                defaults.done_ack_timeout.as_secs(),
            )?),
            answer_timeout: Duration::from_secs(env_or(
                "RELAY_ANSWER_TIMEOUT_SECS",
                defaults.answer_timeout.as_secs(),
            )?),
            wire_format: env_or("RELAY_WIRE_FORMAT", defaults.wire_format)?,
        };

        if config.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RELAY_PAGE_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        debug!(
            "Relay configuration: browser={}, upstream={}, max_results={}, wire={:?}",
            config.browser_addr, config.upstream_url, config.max_results, config.wire_format
        );

        Ok(config)
    }
}

/// Parse an optional environment variable, keeping the default when unset.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

// Configuration utility functions
pub fn get_token_expiry_seconds() -> u64 {
    std::env::var("TOKEN_EXPIRY_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(600) // Default 10 minutes if not configured
}
