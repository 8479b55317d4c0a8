//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use authgate::auth::{Argon2Hasher, AuthConfig, AuthOrchestrator, PasswordHasher};
use authgate::clock::{Clock, ManualClock};
use authgate::directory::{SqliteUserDirectory, UserDirectory};
use authgate::error::DirectoryError;
use authgate::models::UserRecord;
use authgate::server::AppState;
use authgate::store::{KeyValueStore, MemoryStore};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_EMAIL: &str = "a@x.com";
pub const TEST_PASSWORD: &str = "correct-horse";

/// Directory wrapper that counts lookups
pub struct CountingDirectory {
    inner: SqliteUserDirectory,
    lookups: AtomicUsize,
}

impl CountingDirectory {
    pub fn new(inner: SqliteUserDirectory) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &SqliteUserDirectory {
        &self.inner
    }
}

#[async_trait]
impl UserDirectory for CountingDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_email(email).await
    }
}

/// Everything a flow test needs, sharing one manual clock
pub struct TestContext {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<CountingDirectory>,
    pub orchestrator: Arc<AuthOrchestrator<CountingDirectory>>,
}

impl TestContext {
    pub fn state(&self) -> AppState<CountingDirectory> {
        let store: Arc<dyn KeyValueStore> = self.store.clone();
        AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            store,
            metrics: None,
        }
    }
}

/// Create an in-memory directory for testing
pub async fn create_test_directory() -> SqliteUserDirectory {
    SqliteUserDirectory::in_memory()
        .await
        .expect("Failed to create test directory")
}

/// Insert a user whose password is hashed with Argon2
pub async fn insert_user(
    directory: &SqliteUserDirectory,
    id: &str,
    email: &str,
    password: &str,
    roles: &[&str],
) -> UserRecord {
    let hash = Argon2Hasher::new()
        .hash(password)
        .expect("Failed to hash password");
    let user = UserRecord::new(id, email, hash)
        .with_roles(roles.iter().map(|r| r.to_string()).collect());
    directory
        .insert_user(&user)
        .await
        .expect("Failed to insert user");
    user
}

/// Orchestrator over an in-memory store and directory with one user,
/// `TEST_EMAIL` / `TEST_PASSWORD`, holding the `user` role
pub async fn create_test_context() -> TestContext {
    create_test_context_with_roles(&["user"]).await
}

pub async fn create_test_context_with_roles(roles: &[&str]) -> TestContext {
    let clock = Arc::new(ManualClock::starting_now());
    let store = Arc::new(MemoryStore::with_clock(clock.clone() as Arc<dyn Clock>));

    let sqlite = create_test_directory().await;
    insert_user(&sqlite, "u1", TEST_EMAIL, TEST_PASSWORD, roles).await;
    let directory = Arc::new(CountingDirectory::new(sqlite));

    let shared: Arc<dyn KeyValueStore> = store.clone();
    let orchestrator = AuthOrchestrator::with_clock(
        Arc::clone(&directory),
        shared,
        AuthConfig::new(TEST_SECRET),
        clock.clone(),
    );

    TestContext {
        clock,
        store,
        directory,
        orchestrator: Arc::new(orchestrator),
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server<U: UserDirectory + 'static>(
    state: AppState<U>,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = authgate::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
