use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::TokenPair;
use crate::config::Config;
use crate::errors::Result;

pub mod file;
pub mod memory;

/// Persistence for the session's access/refresh pair.
///
/// Writes only happen through login, registration, refresh and logout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<TokenPair>>;

    async fn save(&self, tokens: &TokenPair) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

pub fn create_token_store(config: &Config) -> Arc<dyn TokenStore> {
    match config.token_store_path.as_deref() {
        Some(path) if !path.is_empty() => Arc::new(file::FileTokenStore::new(path)),
        _ => Arc::new(memory::MemoryTokenStore::default()),
    }
}
