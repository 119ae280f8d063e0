//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset variables fall back to the
//! defaults documented on each field.

use std::net::SocketAddr;
use std::time::Duration;

/// Default Google endpoint serving Firebase ID token signing keys as a JWK set.
pub const DEFAULT_FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// How incoming ID tokens are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Verify Firebase ID tokens against Google's signing keys.
    Firebase,
    /// Accept `uid[:Full Name]` tokens without verification. Local development only.
    Insecure,
}

/// Allowed cross-origin callers, parsed from `CORS_ALLOWED_ORIGINS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin is allowed (empty list or `*`).
    Any,
    /// Only the listed origins are allowed.
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parses a comma-separated origin list. Blank entries and trailing
    /// slashes are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let origins: Vec<String> = raw
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }

    /// Returns `true` if a request with this `Origin` header value may be served.
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(list) => {
                let origin = origin.trim_end_matches('/');
                list.iter().any(|o| o == origin)
            }
        }
    }
}

/// Top-level server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (default `0.0.0.0:8000`).
    /// The port is replaced by `PORT` when that is set.
    pub listen_addr: SocketAddr,

    /// PostgreSQL connection string. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,

    /// Minimum idle connections in the pool.
    pub database_min_connections: u32,

    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Master switch for PostgreSQL persistence.
    pub persistence_enabled: bool,

    /// Origins allowed for CORS and WebSocket upgrades.
    pub cors_allowed_origins: AllowedOrigins,

    /// Token verification mode.
    pub auth_mode: AuthMode,

    /// Firebase project id, the expected token audience.
    pub firebase_project_id: String,

    /// URL of the JWK set used to verify Firebase ID tokens.
    pub firebase_jwks_url: String,

    /// Google Maps Platform API key.
    pub maps_api_key: String,

    /// Google Maps web service base URL.
    pub maps_base_url: String,

    /// Targomo API key.
    pub targomo_api_key: String,

    /// Targomo service base URL.
    pub targomo_base_url: String,

    /// Timeout in seconds for outbound HTTP requests.
    pub http_client_timeout_secs: u64,

    /// Attempts made while a Places next-page token is not yet valid.
    pub next_page_max_attempts: u32,

    /// Delay in milliseconds between those attempts.
    pub next_page_retry_delay_ms: u64,

    /// Capacity of the channel layer broadcast channel.
    pub event_bus_capacity: usize,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` or `PORT` is set but cannot be
    /// parsed, if `AUTH_MODE` is unknown, or if `FIREBASE_PROJECT_ID` is
    /// missing in Firebase mode.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let mut listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()?;
        if let Ok(port) = std::env::var("PORT") {
            listen_addr.set_port(port.trim().parse()?);
        }

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        let database_max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 10);
        let database_min_connections = parse_env("DATABASE_MIN_CONNECTIONS", 2);
        let database_connect_timeout_secs = parse_env("DATABASE_CONNECT_TIMEOUT_SECS", 5);
        let persistence_enabled = parse_env_bool("PERSISTENCE_ENABLED", true);

        let cors_allowed_origins =
            AllowedOrigins::parse(&std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let auth_mode = match std::env::var("AUTH_MODE").ok().as_deref() {
            None | Some("" | "firebase") => AuthMode::Firebase,
            Some("insecure") => AuthMode::Insecure,
            Some(other) => return Err(format!("unknown AUTH_MODE: {other}").into()),
        };
        let firebase_project_id = std::env::var("FIREBASE_PROJECT_ID").unwrap_or_default();
        if auth_mode == AuthMode::Firebase && firebase_project_id.is_empty() {
            return Err("FIREBASE_PROJECT_ID is required unless AUTH_MODE=insecure".into());
        }
        let firebase_jwks_url = std::env::var("FIREBASE_JWKS_URL")
            .unwrap_or_else(|_| DEFAULT_FIREBASE_JWKS_URL.to_string());

        let maps_api_key = std::env::var("MAPS_API_KEY").unwrap_or_default();
        let maps_base_url = std::env::var("MAPS_BASE_URL")
            .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api".to_string());
        let targomo_api_key = std::env::var("TARGOMO_API_KEY").unwrap_or_default();
        let targomo_base_url = std::env::var("TARGOMO_BASE_URL")
            .unwrap_or_else(|_| "https://service.targomo.com".to_string());
        let http_client_timeout_secs = parse_env("HTTP_CLIENT_TIMEOUT_SECS", 15);
        let next_page_max_attempts = parse_env("NEXT_PAGE_MAX_ATTEMPTS", 5);
        let next_page_retry_delay_ms = parse_env("NEXT_PAGE_RETRY_DELAY_MS", 1500);

        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 10_000);
        let log_json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Self {
            listen_addr,
            database_url,
            database_max_connections,
            database_min_connections,
            database_connect_timeout_secs,
            persistence_enabled,
            cors_allowed_origins,
            auth_mode,
            firebase_project_id,
            firebase_jwks_url,
            maps_api_key,
            maps_base_url,
            targomo_api_key,
            targomo_base_url,
            http_client_timeout_secs,
            next_page_max_attempts,
            next_page_retry_delay_ms,
            event_bus_capacity,
            log_json,
        })
    }

    /// Returns the outbound HTTP request timeout.
    #[must_use]
    pub const fn http_client_timeout(&self) -> Duration {
        Duration::from_secs(self.http_client_timeout_secs)
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
