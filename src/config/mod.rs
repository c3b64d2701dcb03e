//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;

use crate::util::rate_limit::CHECKOUT_RATE_LIMIT;

/// Stripe's default signature timestamp tolerance
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
/// Stripe keeps retrying a failed delivery for up to three days
const DEFAULT_DEDUP_TTL_SECS: u64 = 72 * 60 * 60;

const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,

    /// Notion API origin
    pub notion_api_url: Url,
    /// Notion integration token
    pub notion_token: Option<String>,
    /// Notion database holding the projects
    pub notion_database_id: Option<String>,

    /// Stripe API origin
    pub stripe_api_url: Url,
    /// Stripe secret API key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret
    pub stripe_webhook_secret: String,
    /// Stripe publishable key handed to the browser
    pub stripe_publishable_key: String,

    /// Maximum allowed skew between the signature timestamp and now
    pub webhook_tolerance: Duration,
    /// How long processed webhook event ids are remembered
    pub dedup_ttl: Duration,
    /// Checkout sessions allowed per second
    pub checkout_rate_limit: u32,

    /// Public base URL used for checkout success/cancel redirects
    pub public_base_url: String,
    /// Allowed client origins for CORS (comma-separated)
    pub client_origin: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_json: optional("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),

            notion_api_url: parse_url("NOTION_API_URL", DEFAULT_NOTION_API_URL)?,
            notion_token: optional("NOTION_TOKEN"),
            notion_database_id: optional("NOTION_DATABASE_ID"),

            stripe_api_url: parse_url("STRIPE_API_URL", DEFAULT_STRIPE_API_URL)?,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY")
                .map_err(|_| ConfigError::Missing("STRIPE_SECRET_KEY"))?,
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
            stripe_publishable_key: optional("PUBLIC_STRIPE_PUBLISHABLE_KEY")
                .unwrap_or_default(),

            webhook_tolerance: Duration::from_secs(parse_or(
                "STRIPE_WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            )?),
            dedup_ttl: Duration::from_secs(parse_or(
                "WEBHOOK_DEDUP_TTL_SECS",
                DEFAULT_DEDUP_TTL_SECS,
            )?),
            checkout_rate_limit: parse_or("CHECKOUT_RATE_LIMIT", CHECKOUT_RATE_LIMIT)?,

            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| public_base_url.clone()),
            public_base_url,
        })
    }

    /// Whether both Notion credentials are present
    pub fn notion_configured(&self) -> bool {
        self.notion_token.is_some() && self.notion_database_id.is_some()
    }
}

/// Read an env var, treating empty values as unset
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

/// Parse an API origin; it must be able to carry path segments
fn parse_url(key: &'static str, default: &str) -> Result<Url, ConfigError> {
    let raw = optional(key).unwrap_or_else(|| default.to_string());
    Url::parse(raw.trim())
        .ok()
        .filter(|url| !url.cannot_be_a_base())
        .ok_or(ConfigError::InvalidUrl(key))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} must be a non-negative integer")]
    InvalidNumber(&'static str),

    #[error("Environment variable {0} must be an http(s) URL")]
    InvalidUrl(&'static str),
}

#[cfg(test)]
impl Config {
    /// Configuration for tests, no environment access
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().expect("valid test address"),
            log_level: "debug".to_string(),
            log_json: false,
            notion_api_url: Url::parse(DEFAULT_NOTION_API_URL).expect("valid Notion URL"),
            notion_token: None,
            notion_database_id: None,
            stripe_api_url: Url::parse(DEFAULT_STRIPE_API_URL).expect("valid Stripe URL"),
            stripe_secret_key: "sk_test_dummy".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
            stripe_publishable_key: "pk_test_dummy".to_string(),
            webhook_tolerance: Duration::from_secs(DEFAULT_WEBHOOK_TOLERANCE_SECS),
            dedup_ttl: Duration::from_secs(DEFAULT_DEDUP_TTL_SECS),
            checkout_rate_limit: CHECKOUT_RATE_LIMIT,
            public_base_url: "http://localhost:8080".to_string(),
            client_origin: "http://localhost:4321".to_string(),
        }
    }
}
