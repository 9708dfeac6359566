use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::env;

use super::AuthContext;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub name: String,
    pub role: String,
    pub branch_id: Option<String>,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl Claims {
    pub fn into_context(self) -> AuthContext {
        AuthContext {
            user_id: self.sub,
            name: self.name,
            role: self.role,
            branch_id: self.branch_id,
        }
    }
}

#[derive(Debug)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub fn create_jwt(ctx: &AuthContext) -> Result<TokenResponse, jsonwebtoken::errors::Error> {
    let secret = get_jwt_secret();
    let expires_at = Utc::now() + Duration::hours(24);

    let claims = Claims {
        sub: ctx.user_id.clone(),
        name: ctx.name.clone(),
        role: ctx.role.clone(),
        branch_id: ctx.branch_id.clone(),
        exp: expires_at.timestamp(),
        iat: Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(TokenResponse { token, expires_at })
}

pub fn verify_jwt(token: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    let secret = get_jwt_secret();
    let validation = Validation::default();

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
}

fn get_jwt_secret() -> String {
    env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using default (insecure for production)");
        "your-secret-key".to_string()
    })
}
