//! Authentication for the admin API
//!
//! Provides:
//! - Login with bcrypt-hashed passwords
//! - JWT access and refresh tokens
//! - Refresh token rotation and server-side revocation
//! - Bootstrap of the first admin account

use anyhow::anyhow;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::db::sqlite_helpers::datetime_to_str;
use crate::db::{CreateUser, Database, UserRecord};

pub const ADMIN_ROLE: &str = "admin";

// ============================================================================
// JWT Claims
// ============================================================================

/// Claims structure for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,
    pub username: String,
    pub role: String,
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
}

/// Claims structure for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub token_type: String,
    /// Unique token ID, so two tokens issued in the same second differ
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

// ============================================================================
// Auth Types
// ============================================================================

/// Token pair returned after successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Always "Bearer"
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub role: String,
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: AuthenticatedUser,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Account is disabled")]
    AccountDisabled,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds (default: 15 minutes)
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds (default: 7 days)
    pub refresh_token_lifetime: i64,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Lifetimes and cost from `config`, signing with `jwt_secret`
    pub fn from_config(config: &Config, jwt_secret: String) -> Self {
        Self {
            jwt_secret,
            access_token_lifetime: config.access_token_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
            bcrypt_cost: config.bcrypt_cost,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_lifetime: 15 * 60,
            refresh_token_lifetime: 7 * 24 * 60 * 60,
            bcrypt_cost: DEFAULT_COST,
        }
    }
}

// ============================================================================
// Auth Service
// ============================================================================

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(db: Database, config: AuthConfig) -> Self {
        Self { db, config }
    }

    /// Login with username and password
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError> {
        let users = self.db.users();

        let user = users
            .get_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let tokens = self.issue_tokens(&user).await?;
        users.update_last_login(&user.id).await?;

        info!(user_id = %user.id, username = %user.username, "User logged in");
        Ok(LoginResult {
            user: user_to_authenticated(&user),
            tokens,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let claims = self.decode_refresh_token(refresh_token)?;
        let users = self.db.users();

        let stored = users
            .get_refresh_token_by_hash(&hash_token(refresh_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let user = users
            .get_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        users.delete_refresh_token(&stored.id).await?;
        Ok(self.issue_tokens(&user).await?)
    }

    /// Validate an access token and return the user it was issued to
    pub fn validate_access_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.decode_access_token(token)?;

        Ok(AuthenticatedUser {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
            display_name: None,
        })
    }

    /// Revoke one refresh token. Returns whether it was still stored.
    pub async fn logout(&self, refresh_token: &str) -> anyhow::Result<bool> {
        self.db
            .users()
            .delete_refresh_token_by_hash(&hash_token(refresh_token))
            .await
    }

    /// Revoke every refresh token of a user
    pub async fn logout_all(&self, user_id: &str) -> anyhow::Result<u64> {
        self.db.users().delete_user_refresh_tokens(user_id).await
    }

    pub async fn current_user(&self, user_id: &str) -> anyhow::Result<Option<AuthenticatedUser>> {
        Ok(self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .map(|user| user_to_authenticated(&user)))
    }

    /// Create an admin account when no user exists yet
    pub async fn ensure_admin(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<UserRecord>> {
        let users = self.db.users();
        if users.count().await? > 0 {
            return Ok(None);
        }

        let user = users
            .create(CreateUser {
                username: username.trim().to_string(),
                password_hash: self.hash_password(password)?,
                role: ADMIN_ROLE.to_string(),
                display_name: None,
            })
            .await?;

        info!(username = %user.username, "Created initial admin user");
        Ok(Some(user))
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        hash(password, self.config.bcrypt_cost).map_err(|e| anyhow!("Failed to hash password: {}", e))
    }

    fn verify_password(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        verify(password, hash).map_err(|e| anyhow!("Failed to verify password: {}", e))
    }

    /// Sign a new token pair and persist the refresh token hash before returning it
    async fn issue_tokens(&self, user: &UserRecord) -> anyhow::Result<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.config.access_token_lifetime);
        let refresh_exp = now + Duration::seconds(self.config.refresh_token_lifetime);
        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());

        let access_claims = AccessTokenClaims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
            token_type: "access".to_string(),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
            .map_err(|e| anyhow!("Failed to create access token: {}", e))?;

        let refresh_claims = RefreshTokenClaims {
            sub: user.id.clone(),
            token_type: "refresh".to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: refresh_exp.timestamp(),
            iat: now.timestamp(),
        };
        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
            .map_err(|e| anyhow!("Failed to create refresh token: {}", e))?;

        self.db
            .users()
            .create_refresh_token(
                &user.id,
                &hash_token(&refresh_token),
                &datetime_to_str(refresh_exp),
            )
            .await?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            expires_in: self.config.access_token_lifetime,
            token_type: "Bearer".to_string(),
        })
    }

    fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims = decode::<AccessTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

        if claims.token_type != "access" {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let claims = decode::<RefreshTokenClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AuthError::InvalidToken)?
        .claims;

        if claims.token_type != "refresh" {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

/// Hash a token for storage (SHA-256, hex)
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn user_to_authenticated(user: &UserRecord) -> AuthenticatedUser {
    AuthenticatedUser {
        id: user.id.clone(),
        username: user.username.clone(),
        role: user.role.clone(),
        display_name: user.display_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;
    use assert_matches::assert_matches;

    async fn service() -> AuthService {
        let db = test_db().await;
        let auth = AuthService::new(
            db,
            AuthConfig {
                jwt_secret: "test-secret".to_string(),
                bcrypt_cost: 4,
                ..Default::default()
            },
        );
        auth.ensure_admin("admin", "hunter22").await.unwrap();
        auth
    }

    #[tokio::test]
    async fn test_bootstrap_only_when_no_users() {
        let auth = service().await;
        assert!(auth.ensure_admin("other", "pw").await.unwrap().is_none());
        assert_matches!(
            auth.login("other", "pw").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_login_and_validate() {
        let auth = service().await;

        let result = auth.login("admin", "hunter22").await.unwrap();
        assert_eq!(result.tokens.token_type, "Bearer");
        assert!(result.user.is_admin());

        let user = auth.validate_access_token(&result.tokens.access_token).unwrap();
        assert_eq!(user.username, "admin");
        assert_eq!(user.role, ADMIN_ROLE);

        // a refresh token is not an access token
        assert_matches!(
            auth.validate_access_token(&result.tokens.refresh_token),
            Err(AuthError::InvalidToken)
        );
        assert_matches!(
            auth.login("admin", "wrong").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_token() {
        let auth = service().await;
        let first = auth.login("admin", "hunter22").await.unwrap().tokens;

        let second = auth.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        assert_matches!(
            auth.refresh(&first.refresh_token).await,
            Err(AuthError::InvalidToken)
        );
        assert!(auth.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let auth = service().await;
        let tokens = auth.login("admin", "hunter22").await.unwrap().tokens;

        assert!(auth.logout(&tokens.refresh_token).await.unwrap());
        assert!(!auth.logout(&tokens.refresh_token).await.unwrap());
        assert_matches!(
            auth.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let auth = service().await;
        let tokens = auth.login("admin", "hunter22").await.unwrap().tokens;

        let other = AuthService::new(
            test_db().await,
            AuthConfig {
                jwt_secret: "another".to_string(),
                ..Default::default()
            },
        );
        assert_matches!(
            other.validate_access_token(&tokens.access_token),
            Err(AuthError::InvalidToken)
        );
    }
}
