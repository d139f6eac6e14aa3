use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Where the bytes of a candidate file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

/// A file the user has picked but not yet uploaded.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub source: FileSource,
}

impl CandidateFile {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            mime_type: guess_mime_type(&name),
            size: data.len() as u64,
            name,
            source: FileSource::Memory(data),
        }
    }

    /// Reads size metadata from disk; the content is streamed later during transfer.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file.bin")
            .to_string();

        Ok(Self {
            mime_type: guess_mime_type(&name),
            size: metadata.len(),
            name,
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    /// Size-only placeholder for pricing previews. It carries no content, so
    /// the upload manager refuses it.
    pub fn sized(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        Self {
            mime_type: guess_mime_type(&name),
            size,
            name,
            source: FileSource::Memory(Bytes::new()),
        }
    }

    /// Whether the source can supply `size` bytes. Disk sources are checked
    /// when the transfer opens them.
    pub fn has_content(&self) -> bool {
        match &self.source {
            FileSource::Memory(data) => data.len() as u64 == self.size,
            FileSource::Disk(_) => true,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            filename: self.name.clone(),
            file_size: self.size,
            mime_type: if self.mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_string()
            } else {
                self.mime_type.clone()
            },
        }
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.name).extension().and_then(|e| e.to_str())
    }
}

pub fn guess_mime_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

/// Per-file metadata sent when registering an upload intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub file_size: u64,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_guesses_mime() {
        let file = CandidateFile::from_bytes("report.pdf", vec![1u8, 2, 3]);
        assert_eq!(file.size, 3);
        assert_eq!(file.mime_type, "application/pdf");
        assert_eq!(file.extension(), Some("pdf"));
    }

    #[test]
    fn test_unknown_extension_defaults() {
        let file = CandidateFile::sized("blob", 10);
        assert_eq!(file.metadata().mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_empty_mime_is_replaced_in_metadata() {
        let file = CandidateFile::sized("a.txt", 10).with_mime_type("");
        assert_eq!(file.metadata().mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_placeholder_has_no_content() {
        assert!(!CandidateFile::sized("a.txt", 10).has_content());
        assert!(CandidateFile::sized("empty.txt", 0).has_content());
        assert!(CandidateFile::from_bytes("a.txt", &b"hello"[..]).has_content());
    }

    #[tokio::test]
    async fn test_from_path_reads_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        tokio::fs::write(&path, vec![0u8; 2048]).await.unwrap();

        let file = CandidateFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "photo.png");
        assert_eq!(file.size, 2048);
        assert_eq!(file.mime_type, "image/png");
        assert!(matches!(file.source, FileSource::Disk(_)));
    }
}
