use chrono::{Duration, Utc};
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, Weak,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{
        refresh::RefreshCoordinator,
        token::{self, TokenPair},
        validation::{self, Registration},
    },
    config::Config,
    errors::{ClientError, Result, SESSION_EXPIRED_MESSAGE},
    models::{AuthResponse, LoginRequest, ProfileUpdate, User},
    services::auth_api::AuthApi,
    storage::TokenStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Checking,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<User>,
    pub is_loading: bool,
    pub auth_error: Option<String>,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            state: SessionState::Uninitialized,
            user: None,
            is_loading: true,
            auth_error: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }
}

struct SessionInner {
    api: Arc<dyn AuthApi>,
    store: Arc<dyn TokenStore>,
    refresh: RefreshCoordinator,
    state: watch::Sender<SessionSnapshot>,
    timer: Mutex<Option<CancellationToken>>,
    // Bumped whenever the stored session is replaced or cleared, so an
    // in-flight refresh cannot write tokens back into a newer session.
    generation: AtomicU64,
    refresh_margin: Duration,
}

impl SessionInner {
    fn stop_timer(&self) {
        let token = self
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(token) = token {
            token.cancel();
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

/// Owns the signed-in state: persisted tokens, the current user, the
/// proactive refresh timer and the single-flight refresh.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<dyn TokenStore>, config: &Config) -> Self {
        let margin = Duration::from_std(config.refresh_margin()).unwrap_or(Duration::minutes(5));
        let (state, _) = watch::channel(SessionSnapshot::initial());

        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                refresh: RefreshCoordinator::new(),
                state,
                timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                refresh_margin: margin,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        match self.inner.store.load().await {
            Ok(tokens) => tokens.map(|t| t.access),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored tokens");
                None
            }
        }
    }

    pub fn clear_auth_error(&self) {
        self.inner.state.send_if_modified(|s| s.auth_error.take().is_some());
    }

    /// Whether a proactive refresh is currently scheduled.
    pub fn has_refresh_timer(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(|cancel| !cancel.is_cancelled())
            .unwrap_or(false)
    }

    /// Resolves the stored session at startup. Never fails: problems end in
    /// `Unauthenticated`, with `auth_error` set when the user should be told.
    pub async fn check_auth_status(&self) -> SessionSnapshot {
        tracing::info!("Checking auth status");
        self.inner.state.send_modify(|s| {
            s.state = SessionState::Checking;
            s.is_loading = true;
        });

        let stored = match self.inner.store.load().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored tokens");
                None
            }
        };

        let tokens = match stored {
            Some(tokens) if token::is_fresh(&tokens.access, self.inner.refresh_margin) => tokens,
            Some(_) => {
                tracing::info!("Stored access token is expired or close to expiry");
                self.end_session(None).await;
                return self.snapshot();
            }
            None => {
                tracing::info!("No stored tokens");
                self.end_session(None).await;
                return self.snapshot();
            }
        };

        match self.inner.api.profile(&tokens.access).await {
            Ok(user) => self.start_session(user, &tokens.access),
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Profile rejected, attempting one refresh");
                // A failed refresh has already expired the session.
                if let Ok(fresh) = self.refresh_tokens().await {
                    match self.inner.api.profile(&fresh.access).await {
                        Ok(user) => self.start_session(user, &fresh.access),
                        Err(e) => {
                            tracing::error!(error = %e, "Profile retry failed after refresh");
                            self.end_session(Some(SESSION_EXPIRED_MESSAGE.to_string()))
                                .await;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Auth check failed");
                self.end_session(Some(e.user_message())).await;
            }
        }

        self.snapshot()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        validation::validate_login(&request)?;

        self.begin_attempt();
        let result = self.inner.api.login(&request).await;
        match result {
            Ok(response) => match self.accept_auth_response(response).await? {
                Some(user) => {
                    tracing::info!(email = %user.email, "Login successful");
                    Ok(user)
                }
                None => {
                    let err = ClientError::Auth("Login response did not include a session".into());
                    self.fail_attempt(&err);
                    Err(err)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                self.fail_attempt(&e);
                Err(e)
            }
        }
    }

    /// A response without tokens still succeeds but leaves the session signed out.
    pub async fn register(&self, form: &Registration) -> Result<AuthResponse> {
        let request = validation::validate_registration(form)?;

        self.begin_attempt();
        match self.inner.api.register(&request).await {
            Ok(response) => {
                let user = self.accept_auth_response(response.clone()).await?;
                if user.is_none() {
                    tracing::info!(email = %request.email, "Registered without auto-login");
                    self.inner.state.send_modify(|s| {
                        s.is_loading = false;
                        s.state = SessionState::Unauthenticated;
                    });
                } else {
                    tracing::info!(email = %request.email, "Registration successful with auto-login");
                }
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Registration failed");
                self.fail_attempt(&e);
                Err(e)
            }
        }
    }

    /// Server-side invalidation is best effort; local state is always cleared.
    pub async fn logout(&self) {
        self.inner.state.send_modify(|s| s.is_loading = true);

        if let Ok(Some(tokens)) = self.inner.store.load().await {
            if let Err(e) = self.inner.api.logout(&tokens.access, &tokens.refresh).await {
                tracing::warn!(error = %e, "Logout request failed");
            }
        }

        self.end_session(None).await;
        tracing::info!("Logged out");
    }

    /// Exchanges the refresh token for a new access token. Concurrent callers
    /// share one network call. A failure expires the session, unless the
    /// session was replaced or cleared while the refresh was in flight; that
    /// case yields [`ClientError::SessionChanged`] and leaves the newer
    /// session untouched.
    pub async fn refresh_tokens(&self) -> Result<TokenPair> {
        let inner = &self.inner;
        let started = inner.generation.load(Ordering::Acquire);
        let result = inner
            .refresh
            .run(|| async {
                let generation = inner.generation.load(Ordering::Acquire);
                let current = inner
                    .store
                    .load()
                    .await?
                    .ok_or(ClientError::SessionExpired)?;

                let response = inner.api.refresh(&current.refresh).await?;
                let tokens = TokenPair {
                    access: response.access,
                    refresh: response.refresh.unwrap_or(current.refresh),
                };

                if inner.generation.load(Ordering::Acquire) != generation {
                    tracing::debug!("Session changed during refresh, discarding new tokens");
                    return Err(ClientError::SessionChanged);
                }
                inner.store.save(&tokens).await?;
                tracing::info!("Access token refreshed");
                Ok(tokens)
            })
            .await;

        match result {
            Err(ClientError::SessionChanged) => Err(ClientError::SessionChanged),
            Err(_) if inner.generation.load(Ordering::Acquire) != started => {
                tracing::debug!("Refresh failed for a session that no longer exists");
                Err(ClientError::SessionChanged)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.end_session(Some(SESSION_EXPIRED_MESSAGE.to_string()))
                    .await;
                Err(e)
            }
            Ok(tokens) => Ok(tokens),
        }
    }

    /// Runs an authenticated call. On 401 the tokens are refreshed once and
    /// the call retried once; a failed refresh yields `SessionExpired`.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self
            .access_token()
            .await
            .ok_or(ClientError::SessionExpired)?;

        match call(token).await {
            Err(e) if e.is_unauthorized() => {
                let fresh = self
                    .refresh_tokens()
                    .await
                    .map_err(|_| ClientError::SessionExpired)?;
                // Keep the proactive refresh aimed at the new expiry.
                if self.is_authenticated() {
                    self.arm_refresh_timer(fresh.access.clone());
                }
                call(fresh.access).await
            }
            other => other,
        }
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<()> {
        let request = validation::validate_password_change(current, new)?;
        let api = self.inner.api.clone();
        self.authorized(|token| {
            let api = api.clone();
            let request = request.clone();
            async move { api.change_password(&token, &request).await }
        })
        .await?;

        tracing::info!("Password changed");
        Ok(())
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User> {
        let api = self.inner.api.clone();
        let user = self
            .authorized(|token| {
                let api = api.clone();
                let update = update.clone();
                async move { api.update_profile(&token, &update).await }
            })
            .await?;

        self.inner
            .state
            .send_modify(|s| s.user = Some(user.clone()));
        Ok(user)
    }

    /// Stops the refresh timer without touching stored tokens.
    pub fn shutdown(&self) {
        self.inner.stop_timer();
    }

    fn begin_attempt(&self) {
        self.inner.state.send_modify(|s| {
            s.is_loading = true;
            s.auth_error = None;
        });
    }

    fn fail_attempt(&self, err: &ClientError) {
        let message = err.user_message();
        self.inner.state.send_modify(|s| {
            s.is_loading = false;
            s.auth_error = Some(message);
            if s.state != SessionState::Authenticated {
                s.state = SessionState::Unauthenticated;
            }
        });
    }

    async fn accept_auth_response(&self, response: AuthResponse) -> Result<Option<User>> {
        let (access, refresh, user) = match (response.access, response.refresh, response.user) {
            (Some(access), Some(refresh), Some(user)) => (access, refresh, user),
            _ => return Ok(None),
        };

        let tokens = TokenPair::new(access, refresh);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.inner.store.save(&tokens).await {
            self.fail_attempt(&e);
            return Err(e);
        }
        self.start_session(user.clone(), &tokens.access);
        Ok(Some(user))
    }

    fn start_session(&self, user: User, access: &str) {
        self.inner.state.send_modify(|s| {
            s.state = SessionState::Authenticated;
            s.user = Some(user);
            s.is_loading = false;
            s.auth_error = None;
        });
        self.arm_refresh_timer(access.to_string());
    }

    async fn end_session(&self, auth_error: Option<String>) {
        self.inner.stop_timer();
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = self.inner.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }

        self.inner.state.send_modify(|s| {
            s.state = SessionState::Unauthenticated;
            s.user = None;
            s.is_loading = false;
            if auth_error.is_some() {
                s.auth_error = auth_error;
            }
        });
    }

    fn arm_refresh_timer(&self, access: String) {
        self.inner.stop_timer();

        let Some(delay) = token::refresh_delay_at(&access, self.inner.refresh_margin, Utc::now())
        else {
            tracing::debug!("Access token inside refresh margin, no timer armed");
            return;
        };

        let cancel = CancellationToken::new();
        *self
            .inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(cancel.clone());

        tracing::debug!(delay_secs = delay.as_secs(), "Scheduled proactive token refresh");
        tokio::spawn(run_refresh_timer(Arc::downgrade(&self.inner), cancel, delay));
    }
}

async fn run_refresh_timer(
    session: Weak<SessionInner>,
    cancel: CancellationToken,
    mut delay: std::time::Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(inner) = session.upgrade() else {
            return;
        };
        let session_handle = AuthSession { inner };

        // Failures are settled inside `refresh_tokens`.
        let tokens = match session_handle.refresh_tokens().await {
            Ok(tokens) => tokens,
            Err(ClientError::SessionChanged) => {
                tracing::debug!("Session changed during scheduled refresh, timer stopped");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Automatic token refresh failed, session ended");
                return;
            }
        };
        if cancel.is_cancelled() {
            return;
        }

        match token::refresh_delay_at(
            &tokens.access,
            session_handle.inner.refresh_margin,
            Utc::now(),
        ) {
            Some(next) => delay = next,
            None => {
                tracing::debug!("Refreshed token inside refresh margin, timer stopped");
                cancel.cancel();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_support::token_expiring_in;
    use crate::models::{RefreshResponse, UserId};
    use crate::services::auth_api::MockAuthApi;
    use crate::storage::memory::MemoryTokenStore;
    use reqwest::StatusCode;

    fn user() -> User {
        User {
            id: UserId::Int(1),
            email: "ada@example.com".to_string(),
            username: Some("ada".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            full_name: None,
            storage_used: None,
            max_storage: None,
            storage_percentage: None,
            is_verified: true,
        }
    }

    fn unauthorized() -> ClientError {
        ClientError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"detail":"Given token not valid for any token type"}"#,
        )
    }

    fn session(api: MockAuthApi, store: Arc<MemoryTokenStore>) -> AuthSession {
        AuthSession::new(Arc::new(api), store, &Config::default())
    }

    #[tokio::test]
    async fn test_check_without_tokens_makes_no_calls() {
        let api = MockAuthApi::new();
        let session = session(api, Arc::new(MemoryTokenStore::default()));

        let snapshot = session.check_auth_status().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(!snapshot.is_loading);
        assert!(snapshot.auth_error.is_none());
    }

    #[tokio::test]
    async fn test_check_with_near_expiry_token_clears_without_calls() {
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(
            token_expiring_in(120),
            "refresh",
        )));
        let session = session(MockAuthApi::new(), store.clone());

        let snapshot = session.check_auth_status().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_check_with_fresh_token_loads_profile_and_arms_timer() {
        let mut api = MockAuthApi::new();
        api.expect_profile().times(1).returning(|_| Ok(user()));

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(
            token_expiring_in(3600),
            "refresh",
        )));
        let session = session(api, store);

        let snapshot = session.check_auth_status().await;
        assert!(snapshot.is_authenticated());
        assert_eq!(snapshot.user.unwrap().email, "ada@example.com");
        assert!(session.has_refresh_timer());

        session.shutdown();
        assert!(!session.has_refresh_timer());
    }

    #[tokio::test]
    async fn test_check_refreshes_once_on_unauthorized() {
        let mut api = MockAuthApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(unauthorized()));
        api.expect_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(RefreshResponse {
                    access: token_expiring_in(3600),
                    refresh: None,
                })
            });
        api.expect_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(user()));

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(
            token_expiring_in(3600),
            "refresh-1",
        )));
        let session = session(api, store.clone());

        assert!(session.check_auth_status().await.is_authenticated());
        assert_eq!(store.load().await.unwrap().unwrap().refresh, "refresh-1");
    }

    #[tokio::test]
    async fn test_check_expires_session_when_refresh_fails() {
        let mut api = MockAuthApi::new();
        api.expect_profile().times(1).returning(|_| Err(unauthorized()));
        api.expect_refresh().times(1).returning(|_| Err(unauthorized()));

        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(
            token_expiring_in(3600),
            "refresh",
        )));
        let session = session(api, store.clone());

        let snapshot = session.check_auth_status().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert_eq!(snapshot.auth_error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_validation_blocks_network() {
        let session = session(MockAuthApi::new(), Arc::new(MemoryTokenStore::default()));
        let err = session.login("not-an-email", "pw").await.unwrap_err();
        assert_eq!(err.user_message(), "Email is invalid");
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_persists_tokens() {
        let mut api = MockAuthApi::new();
        api.expect_login().times(1).returning(|_| {
            Ok(AuthResponse {
                access: Some(token_expiring_in(3600)),
                refresh: Some("refresh".to_string()),
                user: Some(user()),
                message: None,
            })
        });
        let store = Arc::new(MemoryTokenStore::default());
        let session = session(api, store.clone());

        session.login("ada@example.com", "Analytical1").await.unwrap();
        assert!(session.is_authenticated());
        assert_eq!(store.load().await.unwrap().unwrap().refresh, "refresh");
        session.shutdown();
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let mut api = MockAuthApi::new();
        api.expect_logout()
            .times(1)
            .returning(|_, _| Err(ClientError::Auth("boom".to_string())));
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("a", "r")));
        let session = session(api, store.clone());

        session.logout().await;
        assert_eq!(session.snapshot().state, SessionState::Unauthenticated);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authorized_retries_once_after_refresh() {
        let mut api = MockAuthApi::new();
        api.expect_refresh().times(1).returning(|_| {
            Ok(RefreshResponse {
                access: "second".to_string(),
                refresh: Some("rotated".to_string()),
            })
        });
        let store = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new("first", "r")));
        let session = session(api, store.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let result = session
            .authorized(|token| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(token.clone());
                    if token == "first" {
                        Err(unauthorized())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(*seen.lock().unwrap(), vec!["first".to_string(), "second".to_string()]);
        assert_eq!(store.load().await.unwrap().unwrap().refresh, "rotated");
    }

    #[tokio::test]
    async fn test_clear_auth_error() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .returning(|_| Err(ClientError::from_response(StatusCode::UNAUTHORIZED, r#"{"detail":"bad"}"#)));
        let session = session(api, Arc::new(MemoryTokenStore::default()));

        assert!(session.login("a@b.co", "x").await.is_err());
        assert_eq!(session.snapshot().auth_error.as_deref(), Some("bad"));

        session.clear_auth_error();
        assert!(session.snapshot().auth_error.is_none());
    }
}
