use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    errors::{ClientError, Result},
    models::{CandidateFile, FileMetadata, UploadResult},
    services::{
        files_api::{TransferProgress, UploadApi},
        pricing,
    },
};

/// Progress reserved for preparation and entry creation.
pub const TRANSFER_START: u8 = 30;
/// Progress at which the transfer hands over to finalization.
pub const TRANSFER_END: u8 = 90;
const METADATA_READY: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Preparing,
    CreatingEntries,
    Transferring,
    Finalizing,
    Completed,
    Error,
}

impl UploadState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            UploadState::Preparing
                | UploadState::CreatingEntries
                | UploadState::Transferring
                | UploadState::Finalizing
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadSnapshot {
    pub state: UploadState,
    /// Overall percentage, 0..=100.
    pub progress: u8,
    pub result: Option<UploadResult>,
    pub error: Option<String>,
}

impl Default for UploadSnapshot {
    fn default() -> Self {
        Self {
            state: UploadState::Idle,
            progress: 0,
            result: None,
            error: None,
        }
    }
}

/// Maps raw transfer progress into the 30..=90 band.
pub fn scale_transfer_progress(progress: &TransferProgress) -> u8 {
    let band = f64::from(TRANSFER_END - TRANSFER_START);
    TRANSFER_START + (progress.fraction() * band).floor() as u8
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives one batch through create-entries, transfer and finalize, and
/// publishes every step as an [`UploadSnapshot`].
///
/// Each run is tagged with a generation. Reset and cancel bump it, so a run
/// that is still winding down can no longer publish.
pub struct UploadManager {
    api: Arc<dyn UploadApi>,
    app_origin: String,
    max_files: usize,
    upload_timeout: Duration,
    state: Arc<watch::Sender<UploadSnapshot>>,
    generation: Arc<AtomicU64>,
    cancel: Mutex<Option<(u64, CancellationToken)>>,
}

impl UploadManager {
    pub fn new(api: Arc<dyn UploadApi>, config: &Config) -> Self {
        let (state, _) = watch::channel(UploadSnapshot::default());
        Self {
            api,
            app_origin: config.app_origin.trim_end_matches('/').to_string(),
            max_files: config.max_files,
            upload_timeout: config.upload_timeout(),
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(None),
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        self.state.borrow().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.state.borrow().state.is_active()
    }

    /// Uploads the batch and returns the share link and password.
    ///
    /// Input problems are rejected before any network call. Every call creates
    /// a new backend record; nothing is retried automatically.
    pub async fn start_upload(&self, files: &[CandidateFile], token: &str) -> Result<UploadResult> {
        if files.is_empty() {
            return Err(ClientError::validation("files", "No files selected"));
        }
        if token.trim().is_empty() {
            return Err(ClientError::validation("token", "Authentication required"));
        }
        pricing::validate_files(files, self.max_files)?;
        if let Some(file) = files.iter().find(|f| !f.has_content()) {
            return Err(ClientError::validation(
                "files",
                format!("File \"{}\" has no content to upload", file.name),
            ));
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();
        *self.cancel_slot() = Some((generation, cancel.clone()));

        self.publish(generation, |s| {
            *s = UploadSnapshot {
                state: UploadState::Preparing,
                ..UploadSnapshot::default()
            };
        });
        tracing::info!(files = files.len(), "Upload started");

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            run = tokio::time::timeout(self.upload_timeout, self.run(generation, files, token)) => {
                match run {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::UploadTimeout(self.upload_timeout)),
                }
            }
        };

        match &outcome {
            Ok(result) => {
                tracing::info!(upload_id = %result.upload_id, archive = result.is_archive, "Upload completed");
                let result = result.clone();
                self.publish(generation, |s| {
                    s.state = UploadState::Completed;
                    s.progress = 100;
                    s.result = Some(result);
                    s.error = None;
                });
            }
            Err(ClientError::Cancelled) => {
                tracing::info!("Upload cancelled");
            }
            Err(e) => {
                tracing::error!(error = %e, "Upload failed");
                let message = e.user_message();
                self.publish(generation, |s| {
                    s.state = UploadState::Error;
                    s.error = Some(message);
                });
            }
        }

        let mut slot = self.cancel_slot();
        if matches!(slot.as_ref(), Some((owner, _)) if *owner == generation) {
            *slot = None;
        }

        outcome
    }

    /// Back to a pristine idle snapshot. Safe at any time.
    pub fn reset_upload(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state.send_replace(UploadSnapshot::default());
        tracing::debug!("Upload state reset");
    }

    /// Aborts the in-flight transfer and returns to idle. The pending
    /// `start_upload` resolves with [`ClientError::Cancelled`].
    /// Returns whether there was anything to cancel.
    pub fn cancel_upload(&self) -> bool {
        let token = self.cancel_slot().take();
        let cancelled = match token {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        };
        self.reset_upload();
        cancelled
    }

    async fn run(
        &self,
        generation: u64,
        files: &[CandidateFile],
        token: &str,
    ) -> Result<UploadResult> {
        // Build per-file metadata
        let metadata: Vec<FileMetadata> = files.iter().map(CandidateFile::metadata).collect();
        self.publish(generation, |s| {
            s.state = UploadState::CreatingEntries;
            s.progress = METADATA_READY;
        });

        // One record for the whole batch, even when it will be archived
        let created = self.api.create_entries(token, &metadata).await?;
        let upload_id = created.upload.id;
        tracing::info!(%upload_id, archive = created.is_zip, "Upload entry created");

        self.publish(generation, |s| {
            s.state = UploadState::Transferring;
            s.progress = TRANSFER_START;
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = AbortOnDrop(tokio::spawn(forward_progress(
            self.state.clone(),
            self.generation.clone(),
            generation,
            rx,
        )));
        let transferred = self
            .api
            .transfer_content(token, upload_id, files, tx)
            .await?;
        drop(forwarder);

        self.publish(generation, |s| {
            s.state = UploadState::Finalizing;
            s.progress = TRANSFER_END;
        });

        let record = transferred.upload;
        let password = record
            .download_password
            .clone()
            .or(created.upload.download_password)
            .ok_or_else(|| {
                ClientError::Upload("Upload response did not include a download password".into())
            })?;

        let contained_files = if created.contained_files.is_empty() {
            files.iter().map(|f| f.name.clone()).collect()
        } else {
            created.contained_files
        };
        let total_size = created
            .total_size
            .unwrap_or_else(|| files.iter().map(|f| f.size).sum());

        Ok(UploadResult {
            upload_id: record.id,
            download_token: record.download_token,
            password,
            filename: record.original_filename,
            is_archive: transferred.is_zip || created.is_zip,
            contained_files,
            total_size,
            status: record.status,
            download_link: format!("{}/download/{}", self.app_origin, record.download_token),
        })
    }

    fn publish(&self, generation: u64, update: impl FnOnce(&mut UploadSnapshot)) {
        let current = &self.generation;
        self.state.send_if_modified(|s| {
            if current.load(Ordering::Acquire) != generation {
                return false;
            }
            update(s);
            true
        });
    }

    fn cancel_slot(&self) -> std::sync::MutexGuard<'_, Option<(u64, CancellationToken)>> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn forward_progress(
    state: Arc<watch::Sender<UploadSnapshot>>,
    current: Arc<AtomicU64>,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<TransferProgress>,
) {
    while let Some(mut update) = rx.recv().await {
        // Only the latest position matters.
        while let Ok(next) = rx.try_recv() {
            update = next;
        }

        let progress = scale_transfer_progress(&update);
        tracing::debug!(sent = update.sent, total = update.total, progress, "Transfer progress");
        state.send_if_modified(|s| {
            if current.load(Ordering::Acquire) != generation
                || s.state != UploadState::Transferring
                || progress <= s.progress
            {
                return false;
            }
            s.progress = progress;
            true
        });
    }
}
