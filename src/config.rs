use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub request_timeout_secs: u64,
    pub media_dir: String,
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port: u16 = parse_var("SERVER_PORT", "4000")?;

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET must be set".to_string()))?;
        if jwt_secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".to_string()));
        }

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));

        Ok(Config {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://pulse_graph.db".to_string()),
            jwt_secret,
            token_expiry_hours: parse_var("TOKEN_EXPIRY_HOURS", "168")?,
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            db_min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30")?,
            media_dir: std::env::var("MEDIA_DIR").unwrap_or_else(|_| "./media".to_string()),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", "5242880")?,
            server_host,
            server_port,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e)))
}
