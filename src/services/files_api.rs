use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::{
    multipart::{Form, Part},
    Body, Method, StatusCode,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{io::AsyncWriteExt, sync::mpsc};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    errors::{ClientError, DownloadError, Result},
    models::{
        CandidateFile, CreateEntriesRequest, CreateEntriesResponse, DownloadInfo,
        DownloadRequest, FileMetadata, FileSource, ShareLink, TransferHistory, TransferResponse,
        UploadRecord,
    },
    services::http::ApiClient,
};

const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

/// Bytes handed to the transport so far, across all parts of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub sent: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Fraction in `0.0..=1.0`; an empty body counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.sent as f64 / self.total as f64).min(1.0)
        }
    }
}

pub type ProgressSender = mpsc::UnboundedSender<TransferProgress>;

/// The two upload calls the upload manager drives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Registers one upload record for the whole batch.
    async fn create_entries(
        &self,
        token: &str,
        files: &[FileMetadata],
    ) -> Result<CreateEntriesResponse>;

    /// Sends every file as `file_0..file_N` alongside `upload_id` in one multipart request.
    async fn transfer_content(
        &self,
        token: &str,
        upload_id: Uuid,
        files: &[CandidateFile],
        progress: ProgressSender,
    ) -> Result<TransferResponse>;
}

#[derive(Clone, Debug)]
pub struct HttpFilesApi {
    api: ApiClient,
}

impl HttpFilesApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list_uploads(&self, token: &str) -> Result<Vec<UploadRecord>> {
        self.api.get("files/", Some(token)).await
    }

    pub async fn upload_detail(&self, token: &str, upload_id: Uuid) -> Result<UploadRecord> {
        self.api
            .get(&format!("files/{}/", upload_id), Some(token))
            .await
    }

    pub async fn delete_upload(&self, token: &str, upload_id: Uuid) -> Result<()> {
        tracing::info!(%upload_id, "Deleting upload");
        self.api
            .delete(&format!("files/{}/", upload_id), Some(token))
            .await
    }

    pub async fn share_link(&self, token: &str, upload_id: Uuid) -> Result<ShareLink> {
        self.api
            .get(&format!("files/{}/share-link/", upload_id), Some(token))
            .await
    }

    pub async fn transfer_history(&self, token: &str) -> Result<TransferHistory> {
        self.api.get("files/history/", Some(token)).await
    }

    /// Public metadata for the download page. No account required.
    pub async fn download_info(&self, download_token: Uuid) -> Result<DownloadInfo> {
        self.api
            .get(&format!("files/download/{}/", download_token), None)
            .await
            .map_err(map_download_error)
    }

    /// Downloads the whole file into memory after password verification.
    pub async fn download_file(&self, download_token: Uuid, password: &str) -> Result<Bytes> {
        let response = self.download_response(download_token, password).await?;
        Ok(response.bytes().await?)
    }

    /// Streams the file to `dest`, returning the number of bytes written.
    /// A download that fails partway leaves no file behind.
    pub async fn download_to_path(
        &self,
        download_token: Uuid,
        password: &str,
        dest: impl AsRef<Path>,
    ) -> Result<u64> {
        let response = self.download_response(download_token, password).await?;
        let written = save_stream(response.bytes_stream(), dest.as_ref()).await?;

        tracing::info!(%download_token, bytes = written, "Download saved");
        Ok(written)
    }

    async fn download_response(
        &self,
        download_token: Uuid,
        password: &str,
    ) -> Result<reqwest::Response> {
        let request = self
            .api
            .request(
                Method::POST,
                &format!("files/download/{}/file/", download_token),
                None,
            )
            .json(&DownloadRequest { password })
            .timeout(self.api.transfer_timeout());

        self.api.send(request).await.map_err(map_download_error)
    }
}

async fn save_stream<S, E>(stream: S, dest: &Path) -> Result<u64>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    ClientError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut file = tokio::fs::File::create(dest).await?;
    let outcome = async {
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, ClientError>(written)
    }
    .await;

    if outcome.is_err() {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(dest).await {
            tracing::warn!(error = %e, path = %dest.display(), "Failed to remove partial download");
        }
    }
    outcome
}

fn map_download_error(err: ClientError) -> ClientError {
    match err.status() {
        Some(StatusCode::FORBIDDEN) => DownloadError::WrongPassword.into(),
        Some(StatusCode::GONE) => DownloadError::Expired.into(),
        Some(StatusCode::NOT_FOUND) => DownloadError::NotFound.into(),
        _ => err,
    }
}

async fn file_part(
    file: &CandidateFile,
    sent: Arc<AtomicU64>,
    total: u64,
    progress: ProgressSender,
) -> Result<Part> {
    let report = move |chunk: &Bytes| {
        let sent = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        // Receiver gone means nobody is watching; the transfer itself continues.
        let _ = progress.send(TransferProgress { sent, total });
    };

    let body = match &file.source {
        FileSource::Memory(data) => {
            let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
                .step_by(MEMORY_CHUNK_SIZE)
                .map(|start| {
                    let end = (start + MEMORY_CHUNK_SIZE).min(data.len());
                    Ok(data.slice(start..end))
                })
                .collect();
            Body::wrap_stream(futures::stream::iter(chunks).inspect_ok(report))
        }
        FileSource::Disk(path) => {
            let handle = tokio::fs::File::open(path).await?;
            Body::wrap_stream(ReaderStream::new(handle).inspect_ok(report))
        }
    };

    let part = Part::stream_with_length(body, file.size)
        .file_name(file.name.clone())
        .mime_str(&file.metadata().mime_type)?;
    Ok(part)
}

#[async_trait]
impl UploadApi for HttpFilesApi {
    async fn create_entries(
        &self,
        token: &str,
        files: &[FileMetadata],
    ) -> Result<CreateEntriesResponse> {
        self.api
            .post_json("files/bulk/create/", &CreateEntriesRequest { files }, Some(token))
            .await
    }

    async fn transfer_content(
        &self,
        token: &str,
        upload_id: Uuid,
        files: &[CandidateFile],
        progress: ProgressSender,
    ) -> Result<TransferResponse> {
        let total: u64 = files.iter().map(|f| f.size).sum();
        let sent = Arc::new(AtomicU64::new(0));

        let mut form = Form::new().text("upload_id", upload_id.to_string());
        for (index, file) in files.iter().enumerate() {
            let part = file_part(file, sent.clone(), total, progress.clone()).await?;
            form = form.part(format!("file_{}", index), part);
        }

        tracing::info!(%upload_id, files = files.len(), bytes = total, "Transferring upload content");
        self.api
            .post_multipart("files/bulk/upload/", form, Some(token))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn files_api(server: &MockServer) -> HttpFilesApi {
        HttpFilesApi::new(ApiClient::new(format!("{}/api", server.uri()), Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(TransferProgress { sent: 0, total: 0 }.fraction(), 1.0);
        assert_eq!(TransferProgress { sent: 50, total: 200 }.fraction(), 0.25);
        assert_eq!(TransferProgress { sent: 300, total: 200 }.fraction(), 1.0);
    }

    #[tokio::test]
    async fn test_download_status_mapping() {
        let server = MockServer::start().await;
        let wrong = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let missing = Uuid::new_v4();

        for (token, status) in [(wrong, 403), (gone, 410), (missing, 404)] {
            Mock::given(method("POST"))
                .and(path(format!("/api/files/download/{}/file/", token)))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"error": "x"})))
                .mount(&server)
                .await;
        }

        let api = files_api(&server);
        let err = api.download_file(wrong, "nope").await.unwrap_err();
        assert!(matches!(err, ClientError::Download(DownloadError::WrongPassword)));
        assert!(err.is_retryable());

        let err = api.download_file(gone, "pw").await.unwrap_err();
        assert!(matches!(err, ClientError::Download(DownloadError::Expired)));
        assert!(!err.is_retryable());

        let err = api.download_file(missing, "pw").await.unwrap_err();
        assert!(matches!(err, ClientError::Download(DownloadError::NotFound)));
    }

    #[tokio::test]
    async fn test_download_to_path_writes_body() {
        let server = MockServer::start().await;
        let token = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/api/files/download/{}/file/", token)))
            .and(body_json(json!({"password": "s3cret"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let written = files_api(&server)
            .download_to_path(token, "s3cret", &dest)
            .await
            .unwrap();

        assert_eq!(written, 4096);
        assert_eq!(tokio::fs::read(&dest).await.unwrap().len(), 4096);
    }

    #[tokio::test]
    async fn test_download_outlives_request_timeout() {
        let server = MockServer::start().await;
        let token = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/api/files/download/{}/file/", token)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 1024])
                    .set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let api = ApiClient::new(format!("{}/api", server.uri()), Duration::from_secs(1))
            .unwrap()
            .with_transfer_timeout(Duration::from_secs(10));
        let body = HttpFilesApi::new(api).download_file(token, "pw").await.unwrap();

        assert_eq!(body.len(), 1024);
    }

    #[tokio::test]
    async fn test_rejected_download_creates_no_file() {
        let server = MockServer::start().await;
        let token = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/api/files/download/{}/file/", token)))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "Invalid password"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        let err = files_api(&server)
            .download_to_path(token, "wrong", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Download(DownloadError::WrongPassword)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_interrupted_save_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("partial.bin");
        let chunks = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"first chunk")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
        ]);

        let err = save_stream(chunks, &dest).await.unwrap_err();

        assert!(matches!(err, ClientError::Io(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_transfer_reports_full_progress() {
        let server = MockServer::start().await;
        let upload_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/api/files/bulk/upload/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "upload": {
                    "id": upload_id,
                    "original_filename": "2_files_ab12cd34.zip",
                    "file_size": 200000,
                    "download_token": Uuid::new_v4(),
                    "status": "completed"
                },
                "is_zip": true,
                "files_in_archive": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let files = vec![
            CandidateFile::from_bytes("a.txt", vec![1u8; 100_000]),
            CandidateFile::from_bytes("b.txt", vec![2u8; 100_000]),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();

        let response = files_api(&server)
            .transfer_content("token", upload_id, &files, tx)
            .await
            .unwrap();

        assert!(response.is_zip);
        assert_eq!(response.files_in_archive, Some(2));

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        assert_eq!(last, Some(TransferProgress { sent: 200_000, total: 200_000 }));
    }
}
