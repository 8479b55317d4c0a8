//! Authentication orchestrator
//!
//! Composes the attempt limiter, credential check, token issuer and refresh
//! token records into the login, refresh and logout operations.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::directory::UserDirectory;
use crate::error::AuthError;
use crate::models::{AccessToken, Identity, TokenClaims, TokenKind, TokenPair};
use crate::store::KeyValueStore;

use super::limiter::{AttemptLimitConfig, AttemptLimiter};
use super::password::{Argon2Hasher, PasswordHasher, DUMMY_HASH};
use super::refresh::RefreshTokenStore;
use super::token::{TokenConfig, TokenIssuer};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Token signing and lifetimes
    pub token: TokenConfig,

    /// Failed-login limits
    pub rate_limit: AttemptLimitConfig,
}

impl AuthConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: TokenConfig::new(secret),
            rate_limit: AttemptLimitConfig::default(),
        }
    }
}

/// Login, refresh and logout over injected collaborators
pub struct AuthOrchestrator<U: UserDirectory> {
    directory: Arc<U>,
    hasher: Arc<dyn PasswordHasher>,
    limiter: AttemptLimiter,
    issuer: TokenIssuer,
    refresh_tokens: RefreshTokenStore,
}

impl<U: UserDirectory> AuthOrchestrator<U> {
    /// Create an orchestrator using the system clock and Argon2 hashing
    pub fn new(directory: Arc<U>, store: Arc<dyn KeyValueStore>, config: AuthConfig) -> Self {
        Self::with_clock(directory, store, config, Arc::new(SystemClock))
    }

    /// Create an orchestrator whose token expiry follows `clock`
    pub fn with_clock(
        directory: Arc<U>,
        store: Arc<dyn KeyValueStore>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            hasher: Arc::new(Argon2Hasher::new()),
            limiter: AttemptLimiter::new(store.clone(), config.rate_limit),
            issuer: TokenIssuer::with_clock(config.token, clock),
            refresh_tokens: RefreshTokenStore::new(store),
        }
    }

    /// Replace the password hasher
    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn limiter(&self) -> &AttemptLimiter {
        &self.limiter
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Verify credentials and issue a fresh token pair
    ///
    /// Every attempt is counted before the directory is consulted, and a
    /// rate-limited email is rejected at that point. Unknown email and wrong
    /// password both fail with `InvalidCredentials` and leave the attempt
    /// counted; success clears the counter.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let attempts = self.limiter.reserve(&email).await?;

        let user = self.directory.find_by_email(&email).await?;

        let verified = match &user {
            Some(user) => self.hasher.verify(password, &user.password_hash),
            None => {
                // Keep timing comparable with the wrong-password path
                let _ = self.hasher.verify(password, DUMMY_HASH);
                false
            }
        };

        let user = match user {
            Some(user) if verified => user,
            _ => {
                warn!(email = %email, attempts, "Login failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.limiter.reset(&email).await?;

        let identity = Identity::from(&user);
        let pair = self.issuer.issue_pair(&identity)?;

        self.refresh_tokens
            .put(
                &identity.id,
                &pair.refresh_token,
                self.issuer.config().refresh_ttl,
            )
            .await?;

        info!(email = %email, user_id = %identity.id, "User logged in");

        Ok(pair)
    }

    /// Exchange the currently registered refresh token for a new access token
    ///
    /// The refresh token itself is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AuthError> {
        let claims = self.issuer.verify(refresh_token, TokenKind::Refresh)?;

        match self.refresh_tokens.get(&claims.sub).await? {
            Some(current) if current == refresh_token => {}
            Some(_) => {
                warn!(user_id = %claims.sub, "Superseded refresh token presented");
                return Err(AuthError::TokenRevoked);
            }
            None => {
                warn!(user_id = %claims.sub, "Refresh token not registered");
                return Err(AuthError::TokenRevoked);
            }
        }

        let access_token = self.issuer.issue_access(&claims.identity())?;

        info!(user_id = %claims.sub, "Access token refreshed");

        Ok(AccessToken { access_token })
    }

    /// Revoke the refresh record of `user_id`; idempotent
    pub async fn logout(&self, user_id: &str) -> Result<(), AuthError> {
        self.refresh_tokens.revoke(user_id).await?;
        info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Verify an access token presented as a bearer credential
    pub fn authenticate(&self, access_token: &str) -> Result<TokenClaims, AuthError> {
        self.issuer.verify(access_token, TokenKind::Access)
    }
}

/// Trimmed, lowercased email used for lookup and counter keys
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::MockUserDirectory;
    use crate::error::{DirectoryError, StoreError};
    use crate::models::UserRecord;
    use crate::store::{MemoryStore, MockKeyValueStore};
    use mockall::predicate::eq;

    /// Compares plaintext, keeps tests fast
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> Result<String, AuthError> {
            Ok(format!("plain:{}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> bool {
            hash.strip_prefix("plain:") == Some(password)
        }
    }

    fn alice() -> UserRecord {
        UserRecord::new("u1", "a@x.com", "plain:correct").with_roles(vec!["user".to_string()])
    }

    fn create_test_orchestrator(
        directory: MockUserDirectory,
    ) -> (
        AuthOrchestrator<MockUserDirectory>,
        Arc<MemoryStore>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let orchestrator = AuthOrchestrator::with_clock(
            Arc::new(directory),
            store.clone(),
            AuthConfig::new("test-secret"),
            clock.clone(),
        )
        .with_hasher(Arc::new(PlainHasher));
        (orchestrator, store, clock)
    }

    fn directory_with_alice() -> MockUserDirectory {
        let mut directory = MockUserDirectory::new();
        directory
            .expect_find_by_email()
            .with(eq("a@x.com"))
            .returning(|_| Ok(Some(alice())));
        directory
    }

    // Test 1: Successful login issues a pair and registers the refresh token
    #[tokio::test]
    async fn test_login_success() {
        let (orchestrator, store, _) = create_test_orchestrator(directory_with_alice());

        let pair = orchestrator.login("a@x.com", "correct").await.unwrap();

        let stored = store.get("refresh_token:u1").await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), pair.refresh_token.as_bytes());

        let claims = orchestrator.authenticate(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.roles, vec!["user"]);
    }

    // Test 2: Wrong password records a failure
    #[tokio::test]
    async fn test_login_wrong_password() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        let err = orchestrator.login("a@x.com", "wrong").await.unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(orchestrator.limiter().attempts("a@x.com").await.unwrap(), 1);
    }

    // Test 3: Unknown email is indistinguishable from a wrong password
    #[tokio::test]
    async fn test_login_unknown_email() {
        let mut directory = MockUserDirectory::new();
        directory.expect_find_by_email().returning(|_| Ok(None));
        let (orchestrator, _, _) = create_test_orchestrator(directory);

        let err = orchestrator.login("nobody@x.com", "correct").await.unwrap_err();

        assert_eq!(err, AuthError::InvalidCredentials);
        assert_eq!(
            orchestrator.limiter().attempts("nobody@x.com").await.unwrap(),
            1
        );
    }

    // Test 4: Rate limited login never consults the directory
    #[tokio::test]
    async fn test_rate_limited_skips_directory() {
        let mut directory = MockUserDirectory::new();
        directory.expect_find_by_email().times(0);
        let (orchestrator, _, _) = create_test_orchestrator(directory);

        for _ in 0..5 {
            orchestrator.limiter().record_failure("a@x.com").await.unwrap();
        }

        let err = orchestrator.login("a@x.com", "correct").await.unwrap_err();
        assert_eq!(err, AuthError::RateLimited);
    }

    // Test 5: Success resets the counter
    #[tokio::test]
    async fn test_success_resets_counter() {
        let (orchestrator, store, _) = create_test_orchestrator(directory_with_alice());

        for _ in 0..3 {
            let _ = orchestrator.login("a@x.com", "wrong").await;
        }
        orchestrator.login("a@x.com", "correct").await.unwrap();

        assert!(store.get("login_attempts:a@x.com").await.unwrap().is_none());
    }

    // Test 6: Email is normalized before lookup and counting
    #[tokio::test]
    async fn test_email_normalized() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        orchestrator.login("  A@X.com ", "correct").await.unwrap();
        let _ = orchestrator.login("A@x.COM", "wrong").await;

        assert_eq!(orchestrator.limiter().attempts("a@x.com").await.unwrap(), 1);
    }

    // Test 7: Refresh returns a new access token for the current refresh token
    #[tokio::test]
    async fn test_refresh_success() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        let pair = orchestrator.login("a@x.com", "correct").await.unwrap();
        let access = orchestrator.refresh(&pair.refresh_token).await.unwrap();

        let claims = orchestrator.authenticate(&access.access_token).unwrap();
        assert_eq!(claims.email, "a@x.com");

        // Refresh token is not rotated
        assert!(orchestrator.refresh(&pair.refresh_token).await.is_ok());
    }

    // Test 8: Superseded refresh token is revoked
    #[tokio::test]
    async fn test_refresh_superseded() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        let first = orchestrator.login("a@x.com", "correct").await.unwrap();
        let second = orchestrator.login("a@x.com", "correct").await.unwrap();

        assert_eq!(
            orchestrator.refresh(&first.refresh_token).await.unwrap_err(),
            AuthError::TokenRevoked
        );
        assert!(orchestrator.refresh(&second.refresh_token).await.is_ok());
    }

    // Test 9: Never-registered refresh token is revoked
    #[tokio::test]
    async fn test_refresh_never_issued() {
        let (orchestrator, _, _) = create_test_orchestrator(MockUserDirectory::new());

        let identity = Identity::from(&alice());
        let token = orchestrator
            .issuer()
            .issue(&identity, TokenKind::Refresh)
            .unwrap();

        assert_eq!(
            orchestrator.refresh(&token).await.unwrap_err(),
            AuthError::TokenRevoked
        );
    }

    // Test 10: Access token cannot be used to refresh
    #[tokio::test]
    async fn test_refresh_with_access_token() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        let pair = orchestrator.login("a@x.com", "correct").await.unwrap();

        assert_eq!(
            orchestrator.refresh(&pair.access_token).await.unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    // Test 11: Logout revokes; repeated logout is fine
    #[tokio::test]
    async fn test_logout_revokes() {
        let (orchestrator, _, _) = create_test_orchestrator(directory_with_alice());

        let pair = orchestrator.login("a@x.com", "correct").await.unwrap();
        orchestrator.logout("u1").await.unwrap();
        orchestrator.logout("u1").await.unwrap();

        assert_eq!(
            orchestrator.refresh(&pair.refresh_token).await.unwrap_err(),
            AuthError::TokenRevoked
        );
    }

    // Test 12: Expired refresh token is invalid
    #[tokio::test]
    async fn test_refresh_expired() {
        let (orchestrator, _, clock) = create_test_orchestrator(directory_with_alice());

        let pair = orchestrator.login("a@x.com", "correct").await.unwrap();
        clock.advance(chrono::Duration::days(7));

        assert_eq!(
            orchestrator.refresh(&pair.refresh_token).await.unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    // Test 13: Directory outage is ServiceUnavailable, not InvalidCredentials
    #[tokio::test]
    async fn test_directory_failure() {
        let mut directory = MockUserDirectory::new();
        directory
            .expect_find_by_email()
            .returning(|_| Err(DirectoryError::Serialization("corrupt".to_string())));
        let (orchestrator, _, _) = create_test_orchestrator(directory);

        let err = orchestrator.login("a@x.com", "correct").await.unwrap_err();
        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
    }

    // Test 14: Store timeout during refresh lookup is ServiceUnavailable
    #[tokio::test]
    async fn test_store_timeout_on_refresh() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut store = MockKeyValueStore::new();
        store
            .expect_get()
            .withf(|key| key == "refresh_token:u1")
            .returning(|_| Err(StoreError::Timeout));

        let orchestrator = AuthOrchestrator::with_clock(
            Arc::new(MockUserDirectory::new()),
            Arc::new(store),
            AuthConfig::new("test-secret"),
            clock,
        );
        let token = orchestrator
            .issuer()
            .issue(&Identity::from(&alice()), TokenKind::Refresh)
            .unwrap();

        let err = orchestrator.refresh(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::ServiceUnavailable(_)));
    }

    // Test 15: A burst of guesses gets at most max_attempts password checks
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_guesses_bounded() {
        let mut directory = MockUserDirectory::new();
        directory
            .expect_find_by_email()
            .times(0..=5)
            .returning(|_| Ok(Some(alice())));
        let (orchestrator, _, _) = create_test_orchestrator(directory);
        let orchestrator = Arc::new(orchestrator);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let orchestrator = Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    orchestrator
                        .login("a@x.com", &format!("guess-{}", i))
                        .await
                })
            })
            .collect();

        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap_err() {
                AuthError::InvalidCredentials => invalid += 1,
                AuthError::RateLimited => {}
                other => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(invalid, 5);
    }

    // Test 16: Directory outage still counts the attempt
    #[tokio::test]
    async fn test_directory_failure_counts_attempt() {
        let mut directory = MockUserDirectory::new();
        directory
            .expect_find_by_email()
            .returning(|_| Err(DirectoryError::Serialization("corrupt".to_string())));
        let (orchestrator, _, _) = create_test_orchestrator(directory);

        let _ = orchestrator.login("a@x.com", "correct").await;
        assert_eq!(orchestrator.limiter().attempts("a@x.com").await.unwrap(), 1);
    }

    // Test 17: normalize_email
    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Alice@Example.COM\n"), "alice@example.com");
    }
}
