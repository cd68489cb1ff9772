use dotenvy::dotenv;
use log::{error, info};
use std::sync::Arc;

use schoolserver::config::AppConfig;
use schoolserver::main_module::run_server;
use schoolserver::shared::state::AppState;
use schoolserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env();
    let database_url = config.resolved_database_url();

    let pool = match create_conn(&database_url) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {e}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Database pool error: {e}"),
            ));
        }
    };

    if let Err(e) = run_migrations(&pool) {
        error!("Failed to run migrations: {e}");
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Migration error: {e}"),
        ));
    }
    info!("Database migrations up to date");

    let state = Arc::new(AppState::new(pool, config));
    run_server(state).await
}
