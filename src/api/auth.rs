//! Bearer-token authentication
//!
//! Tokens are `<user>.<urlsafe-base64(HMAC-SHA256(secret, user))>`. They
//! carry no expiry; rotating the secret invalidates all of them.

use super::handlers::AppError;
use super::AppState;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum user name length accepted at login
pub const MIN_USER_LEN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Bearer required")]
    MissingBearer,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Bad credentials")]
    BadCredentials,
}

pub struct TokenSigner {
    secret: Vec<u8>,
    login_key: String,
}

impl TokenSigner {
    pub fn new(secret: &str, login_key: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            login_key: login_key.to_string(),
        }
    }

    fn mac(&self, user: &str) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.secret).unwrap_or_else(|_| unreachable!());
        mac.update(user.as_bytes());
        mac
    }

    pub fn sign(&self, user: &str) -> String {
        let signature = self.mac(user).finalize().into_bytes();
        format!("{user}.{}", URL_SAFE.encode(signature))
    }

    /// Return the user a token was issued to
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut parts = token.split('.');
        let (Some(user), Some(signature), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AuthError::InvalidToken);
        };
        let signature = URL_SAFE
            .decode(signature)
            .map_err(|_| AuthError::InvalidToken)?;
        self.mac(user)
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;
        Ok(user.to_string())
    }

    /// Issue a token for a user presenting the shared login key
    pub fn login(&self, user: &str, key: &str) -> Result<String, AuthError> {
        if key != self.login_key || user.chars().count() < MIN_USER_LEN || user.contains('.') {
            return Err(AuthError::BadCredentials);
        }
        Ok(self.sign(user))
    }
}

/// Authenticated caller, extracted from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: String,
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingBearer)?;
        let user = state.signer.verify(token.trim())?;
        Ok(Identity { user })
    }
}
