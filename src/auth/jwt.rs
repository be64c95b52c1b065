//! JWT token issuance and decoding
//! Bearer tokens are stateless: validity is signature + expiry + subject match.

use crate::{config::SecurityConfig, error::AppError, models::user::Identity};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token type claim carried by tokens accepted on API requests
pub const ACCESS_TOKEN_TYPE: &str = "access";

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,

    /// Token type ("access" for API use)
    pub token_type: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

/// Failure to decode a bearer token
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            _ => TokenError::Malformed(e.to_string()),
        }
    }
}

/// Decoding side of the bearer token codec, as consumed by the authentication middleware.
///
/// Every operation fails with [`TokenError`] on malformed, mis-signed or expired input.
pub trait TokenCodec: Send + Sync {
    fn decode_token_type(&self, token: &str) -> Result<String, TokenError>;

    fn decode_subject(&self, token: &str) -> Result<String, TokenError>;

    /// Cross-check a token against a freshly loaded identity
    fn is_valid(&self, token: &str, identity: &Identity) -> Result<bool, TokenError>;
}

/// Issued access token
#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// JWT service (HS256)
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_exp_secs: u64,
}

impl JwtService {
    /// Create JWT service from config
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        let secret = config.jwt_secret.expose_secret();

        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_token_exp_secs: config.access_token_exp_secs,
        })
    }

    /// Generate an access token for `username`
    pub fn issue_access_token(&self, username: &str) -> Result<IssuedToken, AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(self.access_token_exp_secs as i64);

        let claims = Claims {
            sub: username.to_string(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(IssuedToken {
            access_token: self.encode_claims(&claims)?,
            expires_in: self.access_token_exp_secs,
        })
    }

    /// Sign arbitrary claims with the service key
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode token: {:?}", e);
            AppError::Internal(format!("Failed to encode token: {}", e))
        })
    }

    /// Validate signature and expiry, returning the claims
    pub fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!("Token validation failed: {:?}", e);
            TokenError::from(e)
        })?;

        Ok(data.claims)
    }
}

impl TokenCodec for JwtService {
    fn decode_token_type(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.decode_claims(token)?.token_type)
    }

    fn decode_subject(&self, token: &str) -> Result<String, TokenError> {
        Ok(self.decode_claims(token)?.sub)
    }

    fn is_valid(&self, token: &str, identity: &Identity) -> Result<bool, TokenError> {
        let claims = self.decode_claims(token)?;
        Ok(claims.sub == identity.username && claims.exp > Utc::now().timestamp())
    }
}
