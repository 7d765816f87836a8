use std::{env, fmt::Display, str::FromStr};

use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub cors_origin: String,
    pub pokeapi_url: String,
    /// Timeout applied to every outbound HTTP request, in seconds.
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PORT", "8080"),
            database_url: try_load("DATABASE_URL", "quibble.db"),
            jwt_secret: try_load("JWT_SECRET", "dev-secret-change-me"),
            cors_origin: try_load("CORS_ORIGIN", "http://localhost:3000"),
            pokeapi_url: try_load("POKEAPI_URL", "https://pokeapi.co/api/v2"),
            upstream_timeout_secs: try_load("UPSTREAM_TIMEOUT_SECS", "10"),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .unwrap_or_else(|e| panic!("Invalid {key} value {raw:?}: {e}"))
}
