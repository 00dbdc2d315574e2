use std::sync::Arc;

use tracing::{info, warn};

use corkboard_db::Database;
use corkboard_server::build_app;
use corkboard_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "corkboard=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("CORKBOARD_JWT_SECRET is unset, using the development secret");
    }

    let db = Database::open(&config.db_path)?;
    info!("Database ready at {}", config.db_path.display());

    let app = build_app(Arc::new(db), config.jwt_secret.clone());

    let addr = config.addr()?;
    info!("Corkboard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
