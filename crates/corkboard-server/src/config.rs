use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `CORKBOARD_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("CORKBOARD_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid CORKBOARD_PORT: {raw:?}"))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret: lookup("CORKBOARD_JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.into()),
            db_path: PathBuf::from(lookup("CORKBOARD_DB_PATH").unwrap_or_else(|| "corkboard.db".into())),
            host: lookup("CORKBOARD_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
