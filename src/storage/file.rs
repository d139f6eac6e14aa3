use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::{
    auth::TokenPair,
    errors::{ClientError, Result},
    storage::TokenStore,
};

/// Persists the token pair as a small JSON document so a session survives restarts.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<TokenPair>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ClientError::Io(e)),
        };

        match serde_json::from_slice::<TokenPair>(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                // A corrupt file is treated like no session at all.
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable token file");
                Ok(None)
            }
        }
    }

    async fn save(&self, tokens: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = serde_json::to_vec(tokens)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Io(e)),
        }
    }
}
