#[derive(Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub server: String,
    pub port: u32,
    pub database: String,
}

impl AppConfig {
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.database.username,
            self.database.password,
            self.database.server,
            self.database.port,
            self.database.database
        )
    }

    /// Read configuration from the environment, falling back to local defaults.
    /// `DATABASE_URL`, when set, wins over the individual `DB_*` variables.
    pub fn from_env() -> Self {
        let server = ServerConfig {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        };
        let database = DatabaseConfig {
            username: std::env::var("DB_USER").unwrap_or_else(|_| "schooluser".to_string()),
            password: std::env::var("DB_PASSWORD").unwrap_or_default(),
            server: std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("DB_NAME").unwrap_or_else(|_| "schoolserver".to_string()),
        };
        Self { server, database }
    }

    pub fn resolved_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database_url())
    }
}
