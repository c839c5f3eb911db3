use std::{env, path::PathBuf, time::Duration};

use crate::{error::ConfigError, models::Role};

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and shared
/// through `AppState`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Production refuses the demo identity source.
    pub env: Env,
    // Supabase project URL, e.g. https://abc.supabase.co.
    pub supabase_url: Option<String>,
    // Public anon key sent as the `apikey` header to the REST gateway.
    pub supabase_anon_key: Option<String>,
    // Secret used to validate access tokens handed to `POST /session`.
    pub jwt_secret: String,
    // When set, profiles are read straight from Postgres instead of the REST gateway.
    pub database_url: Option<String>,
    // Where the current session is persisted between restarts.
    pub session_file: PathBuf,
    // Fixture served when the backend is not configured.
    pub demo_identity: DemoIdentity,
    // Upper bound on a single resolution attempt before settling to Unauthenticated.
    pub resolution_timeout: Duration,
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// DemoIdentity
///
/// Which canonical fixture the demo identity source synthesizes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DemoIdentity {
    Customer,
    Admin,
    Anonymous,
}

impl DemoIdentity {
    pub fn role(self) -> Option<Role> {
        match self {
            DemoIdentity::Customer => Some(Role::Customer),
            DemoIdentity::Admin => Some(Role::Admin),
            DemoIdentity::Anonymous => None,
        }
    }

    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(DemoIdentity::Customer),
            "admin" => Ok(DemoIdentity::Admin),
            "none" | "anonymous" => Ok(DemoIdentity::Anonymous),
            _ => Err(ConfigError::Invalid {
                name: "DEMO_IDENTITY",
                value: raw.to_string(),
            }),
        }
    }
}

impl Default for AppConfig {
    /// Local, demo-mode configuration used by tests. No variables need to be set.
    fn default() -> Self {
        Self {
            env: Env::Local,
            supabase_url: None,
            supabase_anon_key: None,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            database_url: None,
            session_file: PathBuf::from(".session.json"),
            demo_identity: DemoIdentity::Customer,
            resolution_timeout: Duration::from_secs(10),
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from environment variables and fails fast when production is
    /// missing something it cannot run without.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()).as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match (env, non_empty("SUPABASE_JWT_SECRET")) {
            (_, Some(secret)) => secret,
            (Env::Production, None) => return Err(ConfigError::Missing("SUPABASE_JWT_SECRET")),
            (Env::Local, None) => LOCAL_JWT_SECRET.to_string(),
        };

        let demo_identity = match non_empty("DEMO_IDENTITY") {
            Some(raw) => DemoIdentity::parse(&raw)?,
            None => DemoIdentity::Customer,
        };

        let resolution_timeout = match non_empty("RESOLUTION_TIMEOUT_SECS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "RESOLUTION_TIMEOUT_SECS",
                        value: raw,
                    });
                }
            },
            None => Duration::from_secs(10),
        };

        let config = Self {
            env,
            supabase_url: non_empty("SUPABASE_URL").map(|url| url.trim_end_matches('/').to_string()),
            supabase_anon_key: non_empty("SUPABASE_ANON_KEY"),
            jwt_secret,
            database_url: non_empty("DATABASE_URL"),
            session_file: non_empty("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".session.json")),
            demo_identity,
            resolution_timeout,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        };

        if config.env == Env::Production && !config.backend_configured() {
            return Err(ConfigError::BackendRequired);
        }

        Ok(config)
    }

    /// backend_configured
    ///
    /// The demo switch. False when the Supabase URL or anon key is absent or still holds
    /// the placeholder values shipped in `.env.example`; the binary then injects the demo
    /// identity source instead of contacting the backend.
    pub fn backend_configured(&self) -> bool {
        let (Some(url), Some(key)) = (&self.supabase_url, &self.supabase_anon_key) else {
            return false;
        };

        let url_ok = (url.starts_with("https://") || url.starts_with("http://"))
            && !url.contains("your-project");
        let key_ok = !key.contains("your-anon-key");

        url_ok && key_ok
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
