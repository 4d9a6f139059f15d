use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use crate::config::Config;
use crate::crypto::TokenService;
use crate::media::MediaStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Sqlite>,
    pub tokens: TokenService,
    pub media: Arc<dyn MediaStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Pool<Sqlite>, media: Arc<dyn MediaStore>, config: Arc<Config>) -> Self {
        Self {
            tokens: TokenService::new(&config.jwt_secret, config.token_expiry_hours),
            db,
            media,
            config,
        }
    }
}
