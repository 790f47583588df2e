//! Signed-token authentication.
//!
//! The importer signs a short-lived HS256 JWT with a key shared with the server and sends it
//! in the [`TOKEN_HEADER`] metadata entry of every call. The server checks signature, expiry
//! and issuer before any handler runs.
//!
//! Both halves are provided as tonic interceptors: [`TokenInterceptor`] for clients and
//! [`AuthInterceptor`] for servers.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Request metadata key carrying the token.
pub const TOKEN_HEADER: &str = "ark-token";

/// Issuer every valid token must carry.
pub const TOKEN_ISSUER: &str = "ark-client";

/// How long an issued token stays valid.
pub const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("signing key must not be empty")]
    EmptyKey,
    #[error("no token provided")]
    Missing,
    #[error("token is not valid ASCII")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("invalid issuer")]
    WrongIssuer,
    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

impl From<AuthError> for Status {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmptyKey | AuthError::Signing(_) => Status::internal(err.to_string()),
            _ => Status::unauthenticated(err.to_string()),
        }
    }
}

/// Registered claims carried by an Ark token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs tokens on the client side.
#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::EmptyKey);
        }
        Ok(Self {
            key: EncodingKey::from_secret(secret),
        })
    }

    /// Issues a token valid for [`TOKEN_LIFETIME_HOURS`] from now.
    pub fn issue(&self) -> AuthResult<String> {
        self.issue_at(Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, now: DateTime<Utc>) -> AuthResult<String> {
        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_LIFETIME_HOURS)).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)
            .map_err(AuthError::Signing)
    }
}

/// Checks tokens on the server side.
#[derive(Clone)]
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(secret: &[u8]) -> AuthResult<Self> {
        if secret.is_empty() {
            return Err(AuthError::EmptyKey);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Ok(Self {
            key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn validate(&self, token: &str) -> AuthResult<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidIssuer => AuthError::WrongIssuer,
                _ => AuthError::Invalid(e),
            })
    }

    /// Validates the token carried in a request's metadata.
    pub fn validate_request<T>(&self, req: &Request<T>) -> AuthResult<Claims> {
        let token = req
            .metadata()
            .get(TOKEN_HEADER)
            .ok_or(AuthError::Missing)?
            .to_str()
            .map_err(|_| AuthError::Malformed)?;
        self.validate(token)
    }
}

/// Server interceptor rejecting calls without a valid token.
#[derive(Clone)]
pub struct AuthInterceptor {
    validator: Arc<TokenValidator>,
}

impl AuthInterceptor {
    pub fn new(validator: TokenValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, req: Request<()>) -> Result<Request<()>, Status> {
        self.validator.validate_request(&req)?;
        Ok(req)
    }
}

/// Client interceptor attaching a pre-issued token to every call.
#[derive(Clone)]
pub struct TokenInterceptor {
    token: MetadataValue<Ascii>,
}

impl TokenInterceptor {
    pub fn new(issuer: &TokenIssuer) -> AuthResult<Self> {
        let token = issuer.issue()?;
        let token = token.parse().map_err(|_| AuthError::Malformed)?;
        Ok(Self { token })
    }
}

impl Interceptor for TokenInterceptor {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        req.metadata_mut().insert(TOKEN_HEADER, self.token.clone());
        Ok(req)
    }
}
