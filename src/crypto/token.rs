use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_hours: i64,
}

impl TokenService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.expiry_hours * 3600,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Returns the user id the token was issued for.
    pub fn verify(&self, token: &str) -> Result<String, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| AppError::Authentication(format!("Invalid or expired token: {}", e)))?;

        Ok(data.claims.sub)
    }
}
