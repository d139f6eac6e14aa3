use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::auth::TokenPair;
use crate::errors::{ClientError, Result};

/// Collapses concurrent refresh attempts into one network call.
///
/// A caller records the completed-refresh epoch before queueing on the lock.
/// If another refresh finished while it waited, it takes that outcome instead
/// of starting a new one.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    epoch: AtomicU64,
    last: Mutex<Option<std::result::Result<TokenPair, String>>>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refreshes that have completed, successfully or not.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub async fn run<F, Fut>(&self, perform: F) -> Result<TokenPair>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenPair>>,
    {
        let observed = self.epoch();
        let mut last = self.last.lock().await;

        if self.epoch() != observed {
            if let Some(outcome) = last.as_ref() {
                tracing::debug!("Joining refresh completed by another caller");
                return outcome.clone().map_err(ClientError::Auth);
            }
        }

        let outcome = perform().await;
        *last = Some(match &outcome {
            Ok(tokens) => Ok(tokens.clone()),
            Err(e) => Err(e.user_message()),
        });
        self.epoch.fetch_add(1, Ordering::AcqRel);

        outcome
    }
}
