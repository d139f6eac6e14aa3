#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use secureshare_client::{
    errors::{ClientError, Result},
    models::{
        AuthResponse, CandidateFile, ChangePasswordRequest, CreateEntriesResponse, FileMetadata,
        LoginRequest, ProfileUpdate, RefreshResponse, RegisterRequest, TransferResponse,
        UploadRecord, UploadStatus, User, UserId,
    },
    services::{AuthApi, ProgressSender, TransferProgress, UploadApi},
};
use serde_json::json;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};
use std::time::Duration;
use uuid::Uuid;

pub fn jwt_expiring_in(secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = json!({ "exp": now + secs, "iat": now, "token_type": "access" });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"integration-secret"),
    )
    .unwrap()
}

pub fn test_user() -> User {
    User {
        id: UserId::Int(7),
        email: "grace@example.com".to_string(),
        username: Some("grace".to_string()),
        first_name: Some("Grace".to_string()),
        last_name: Some("Hopper".to_string()),
        full_name: Some("Grace Hopper".to_string()),
        storage_used: Some(0),
        max_storage: None,
        storage_percentage: None,
        is_verified: true,
    }
}

pub fn unauthorized() -> ClientError {
    ClientError::from_response(
        StatusCode::UNAUTHORIZED,
        r#"{"detail":"Given token not valid for any token type","code":"token_not_valid"}"#,
    )
}

pub fn upload_record(id: Uuid, download_token: Uuid, filename: &str) -> UploadRecord {
    serde_json::from_value(json!({
        "id": id,
        "original_filename": filename,
        "file_size": 0,
        "download_password": "Kq9#vT2m",
        "download_token": download_token,
        "status": "completed"
    }))
    .unwrap()
}

/// Account backend double that counts every call.
#[derive(Default)]
pub struct FakeAuthApi {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    /// Refreshes beyond this many fail.
    pub successful_refreshes: Option<usize>,
    pub refresh_delay: Duration,
    /// Lifetime of the access token handed out by login; an hour when unset.
    pub login_token_ttl: Option<i64>,
    pub reject_login_with: Option<String>,
    pub reject_profile: AtomicBool,
    pub last_password_change: Mutex<Option<ChangePasswordRequest>>,
}

impl FakeAuthApi {
    pub fn total_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.profile_calls.load(Ordering::SeqCst)
            + self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn login(&self, _request: &LoginRequest) -> Result<AuthResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = &self.reject_login_with {
            let body = json!({ "detail": detail }).to_string();
            return Err(ClientError::from_response(StatusCode::UNAUTHORIZED, &body));
        }
        Ok(AuthResponse {
            access: Some(jwt_expiring_in(self.login_token_ttl.unwrap_or(3600))),
            refresh: Some("refresh-0".to_string()),
            user: Some(test_user()),
            message: None,
        })
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<AuthResponse> {
        Ok(AuthResponse {
            access: None,
            refresh: None,
            user: Some(test_user()),
            message: Some("User registered successfully".to_string()),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshResponse> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if matches!(self.successful_refreshes, Some(limit) if n > limit) {
            return Err(unauthorized());
        }
        Ok(RefreshResponse {
            access: jwt_expiring_in(3600),
            refresh: Some(format!("refresh-{}", n)),
        })
    }

    async fn logout(&self, _access_token: &str, _refresh_token: &str) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn profile(&self, _access_token: &str) -> Result<User> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_profile.swap(false, Ordering::SeqCst) {
            return Err(unauthorized());
        }
        Ok(test_user())
    }

    async fn update_profile(&self, _access_token: &str, update: &ProfileUpdate) -> Result<User> {
        let mut user = test_user();
        user.first_name = update.first_name.clone().or(user.first_name);
        user.last_name = update.last_name.clone().or(user.last_name);
        Ok(user)
    }

    async fn change_password(
        &self,
        _access_token: &str,
        request: &ChangePasswordRequest,
    ) -> Result<()> {
        *self.last_password_change.lock().unwrap() = Some(request.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferBehavior {
    Succeed,
    FailOnce,
    Hang,
}

/// Upload backend double. Every create call mints a new upload id.
pub struct FakeUploadApi {
    pub create_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    pub created_ids: Mutex<Vec<Uuid>>,
    pub behavior: TransferBehavior,
    failed: AtomicBool,
}

impl FakeUploadApi {
    pub fn new(behavior: TransferBehavior) -> Self {
        Self {
            create_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            created_ids: Mutex::new(Vec::new()),
            behavior,
            failed: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.transfer_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadApi for FakeUploadApi {
    async fn create_entries(
        &self,
        _token: &str,
        files: &[FileMetadata],
    ) -> Result<CreateEntriesResponse> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = Uuid::new_v4();
        self.created_ids.lock().unwrap().push(id);

        let is_zip = files.len() > 1;
        let filename = if is_zip {
            format!("{}_files_{}.zip", files.len(), &id.simple().to_string()[..8])
        } else {
            files[0].filename.clone()
        };
        let total_size: u64 = files.iter().map(|f| f.file_size).sum();

        let mut upload = upload_record(id, Uuid::new_v4(), &filename);
        upload.status = UploadStatus::Processing;
        Ok(CreateEntriesResponse {
            upload,
            is_zip,
            contained_files: files.iter().map(|f| f.filename.clone()).collect(),
            total_files: Some(files.len()),
            total_size: Some(total_size),
            pricing_tier: Some("free".to_string()),
            pricing_amount: Some(0),
            requires_payment: false,
        })
    }

    async fn transfer_content(
        &self,
        _token: &str,
        upload_id: Uuid,
        files: &[CandidateFile],
        progress: ProgressSender,
    ) -> Result<TransferResponse> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            TransferBehavior::Hang => std::future::pending::<()>().await,
            TransferBehavior::FailOnce if !self.failed.swap(true, Ordering::SeqCst) => {
                return Err(ClientError::from_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"error":"Failed to create archive: disk full"}"#,
                ));
            }
            _ => {}
        }

        let total: u64 = files.iter().map(|f| f.size).sum();
        for step in 1..=4u64 {
            let _ = progress.send(TransferProgress {
                sent: total * step / 4,
                total,
            });
            tokio::task::yield_now().await;
        }

        let name = if files.len() > 1 {
            format!("{}_files.zip", files.len())
        } else {
            files[0].name.clone()
        };
        Ok(TransferResponse {
            success: true,
            upload: upload_record(upload_id, Uuid::new_v4(), &name),
            is_zip: files.len() > 1,
            files_in_archive: Some(files.len()),
        })
    }
}
