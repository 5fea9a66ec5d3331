use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("reviewer login is not configured")]
    LoginDisabled,
    #[error("wrong password")]
    BadCredentials,
    #[error("invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token could not be issued: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),
    #[error("password hash error: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reviewer,
}

/// Who is making a request. Requests without a token are anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: Option<String>,
    role: Option<Role>,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            subject: None,
            role: None,
        }
    }

    pub fn reviewer(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            role: Some(Role::Reviewer),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or("anonymous")
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[derive(Debug, Serialize, Deserialize)]
struct Claim {
    sub: String,
    role: Role,
    exp: usize,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies HS256 session tokens carrying a role claim.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let secret = secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: chrono::Duration::seconds(ttl_secs as i64),
        }
    }

    pub fn issue(&self, subject: &str, role: Role) -> Result<IssuedToken, AuthError> {
        let expires_at = Utc::now() + self.ttl;
        let claim = Claim {
            sub: subject.to_string(),
            role,
            exp: expires_at.timestamp() as usize,
        };
        let token = encode(&Header::default(), &claim, &self.encoding_key).map_err(AuthError::Issue)?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let claim = decode::<Claim>(token, &self.decoding_key, &Validation::default())
            .map_err(AuthError::InvalidToken)?
            .claims;
        Ok(Principal {
            subject: Some(claim.sub),
            role: Some(claim.role),
        })
    }
}

/// Checks the reviewer password against the configured argon2 hash and
/// hands out a reviewer token.
/// Argon2 verification runs on the blocking pool.
pub async fn login(state: &AppState, password: &str) -> Result<IssuedToken, AuthError> {
    let hash = state
        .config
        .reviewer_password_hash
        .clone()
        .ok_or(AuthError::LoginDisabled)?;
    let password = password.to_string();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Hash(format!("verification task failed: {}", e)))??;
    if !verified {
        tracing::warn!("Rejected reviewer login");
        return Err(AuthError::BadCredentials);
    }
    tracing::info!("Reviewer logged in");
    state.tokens.issue("reviewer", Role::Reviewer)
}

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let (prefix, rest) = value.trim().split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_authorization_bearer);

        match token {
            None => Ok(Principal::anonymous()),
            Some(token) => Ok(state.tokens.verify(token)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
        assert!(verify_password("x", "not a phc string").is_err());
    }

    #[test]
    fn issued_token_verifies_to_reviewer() {
        let issuer = TokenIssuer::new("test-secret", 600);
        let issued = issuer.issue("reviewer", Role::Reviewer).unwrap();
        let principal = issuer.verify(&issued.token).unwrap();
        assert!(principal.has_role(Role::Reviewer));
        assert_eq!(principal.subject(), "reviewer");
        assert!(issued.expires_at > Utc::now());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issued = TokenIssuer::new("one", 600)
            .issue("reviewer", Role::Reviewer)
            .unwrap();
        let result = TokenIssuer::new("two", 600).verify(&issued.token);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn anonymous_has_no_role() {
        let anon = Principal::anonymous();
        assert!(!anon.has_role(Role::Reviewer));
        assert_eq!(anon.subject(), "anonymous");
    }

    #[tokio::test]
    async fn login_checks_the_configured_hash() {
        use crate::config::Config;
        use crate::db::MemoryStore;

        let hash = hash_password("review-board").unwrap();
        let config = Config::for_memory("login-secret", Some(hash));
        let state = AppState::new(Arc::new(config), Arc::new(MemoryStore::new())).unwrap();

        let issued = login(&state, "review-board").await.unwrap();
        assert!(state.tokens.verify(&issued.token).unwrap().has_role(Role::Reviewer));
        assert!(matches!(
            login(&state, "guess").await,
            Err(AuthError::BadCredentials)
        ));

        let disabled = Config::for_memory("login-secret", None);
        let state = AppState::new(Arc::new(disabled), Arc::new(MemoryStore::new())).unwrap();
        assert!(matches!(
            login(&state, "review-board").await,
            Err(AuthError::LoginDisabled)
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(parse_authorization_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_authorization_bearer("bearer   abc "), Some("abc"));
        assert_eq!(parse_authorization_bearer("Basic abc"), None);
        assert_eq!(parse_authorization_bearer("Bearer "), None);
    }
}
