//! identity.rs
//!
//! Bearer-token verification against the external identity provider
//! (Firebase Authentication).
//!
//! Firebase ID tokens are RS256 JWTs. The provider publishes its signing keys
//! as a JWK set; the token's `kid` header selects the key. Besides the
//! signature we check `aud` (project id), `iss`
//! (`https://securetoken.google.com/<project id>`), `exp` and `sub`, and we
//! require an `email` claim because roles are stored per email.
//!
//! The key set is fetched on every verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::IdentityConfig;

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token carries no email claim")]
    MissingEmail,
    #[error("signing key {0} is not published by the provider")]
    UnknownKey(String),
    #[error("could not reach the identity provider: {0}")]
    Network(String),
    #[error("identity provider answered with status {0}")]
    HttpStatus(u16),
    #[error("identity provider returned an unreadable key set: {0}")]
    MalformedKeySet(String),
}

impl IdentityError {
    /// Provider-side failures, as opposed to a bad token.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            IdentityError::Network(_) | IdentityError::HttpStatus(_) | IdentityError::MalformedKeySet(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        IdentityError::Invalid(err.to_string())
    }
}

/// Who the token says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub uid: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct FirebaseVerifier {
    http: reqwest::Client,
    jwks_url: String,
    project_id: String,
    issuer: String,
}

impl FirebaseVerifier {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        Ok(Self {
            http,
            jwks_url: config.jwks_url.clone(),
            project_id: config.project_id.clone(),
            issuer: format!("{}{}", ISSUER_PREFIX, config.project_id),
        })
    }

    async fn fetch_keys(&self) -> Result<JwkSet, IdentityError> {
        let response = self
            .http
            .get(&self.jwks_url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to fetch signing keys from {}: {}", self.jwks_url, e);
                IdentityError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            warn!("Signing key endpoint {} answered {}", self.jwks_url, response.status());
            return Err(IdentityError::HttpStatus(response.status().as_u16()));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| IdentityError::MalformedKeySet(e.to_string()))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Invalid(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Invalid("missing kid header".to_string()))?;

        let keys = self.fetch_keys().await?;
        let jwk = keys.find(&kid).ok_or_else(|| IdentityError::UnknownKey(kid.clone()))?;
        let key = DecodingKey::from_jwk(jwk)?;

        let claims = decode::<FirebaseClaims>(token, &key, &self.validation())?.claims;
        if claims.sub.is_empty() {
            return Err(IdentityError::Invalid("empty subject".to_string()));
        }
        let email = claims
            .email
            .filter(|email| !email.is_empty())
            .ok_or(IdentityError::MissingEmail)?;

        debug!("Verified token for {}", email);
        Ok(VerifiedIdentity {
            uid: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}
