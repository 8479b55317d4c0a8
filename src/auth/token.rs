//! Token issuing and verification
//!
//! Access and refresh tokens are HS256 JWTs sharing one claim shape and
//! differing in `kind` and lifetime. Verification is pure computation;
//! persisting refresh tokens is the caller's job.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::models::{Identity, TokenClaims, TokenKind, TokenPair};

/// Random bytes in a token id
const JTI_BYTES: usize = 16;

/// Configuration for the token issuer
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Shared HMAC secret
    pub secret: String,

    /// Value of the `iss` claim
    pub issuer: String,

    /// Access token lifetime
    pub access_ttl: Duration,

    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "authgate".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Mints and verifies signed tokens
pub struct TokenIssuer {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create an issuer using the system clock
    pub fn new(config: TokenConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an issuer that checks expiry against `clock`
    pub fn with_clock(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is compared against the injected clock in verify()
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue an access token and a refresh token for `identity`
    pub fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(identity, TokenKind::Access)?,
            refresh_token: self.issue(identity, TokenKind::Refresh)?,
        })
    }

    /// Issue a single access token
    pub fn issue_access(&self, identity: &Identity) -> Result<String, AuthError> {
        self.issue(identity, TokenKind::Access)
    }

    /// Issue a token of the given kind
    pub fn issue(&self, identity: &Identity, kind: TokenKind) -> Result<String, AuthError> {
        let claims = self.claims_for(identity, kind);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))
    }

    /// Verify signature, issuer, expiry and kind
    ///
    /// Every failure is `TokenInvalid`; expired and malformed tokens are not
    /// distinguished.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, AuthError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                AuthError::TokenInvalid
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            debug!(sub = %claims.sub, kind = %claims.kind, "Token expired");
            return Err(AuthError::TokenInvalid);
        }

        if claims.kind != expected {
            debug!(sub = %claims.sub, kind = %claims.kind, expected = %expected, "Wrong token kind");
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }

    fn claims_for(&self, identity: &Identity, kind: TokenKind) -> TokenClaims {
        let ttl = match kind {
            TokenKind::Access => self.config.access_ttl,
            TokenKind::Refresh => self.config.refresh_ttl,
        };
        let iat = self.clock.now().timestamp();

        TokenClaims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            roles: identity.roles.clone(),
            iat,
            exp: iat.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            iss: self.config.issuer.clone(),
            jti: generate_jti(),
            kind,
        }
    }
}

/// Random URL-safe token id
fn generate_jti() -> String {
    let mut bytes = [0u8; JTI_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
