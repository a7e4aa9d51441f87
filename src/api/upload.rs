// Client-side checks on statement files before they are uploaded. Parsing
// happens on the server; here we only enforce size, type and batch limits.

use crate::connection::ClientConfig;
use crate::core::{ApiError, Result};
use std::path::Path;

const RESOURCE: &str = "statement";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// Generic spreadsheet import.
    Generic,
    /// Bank-specific export format; also accepts plain-text statements.
    BankSpecific,
}

impl ImportKind {
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            ImportKind::Generic => &["csv", "xls", "xlsx"],
            ImportKind::BankSpecific => &["csv", "xls", "xlsx", "txt"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
    pub max_files: usize,
}

impl From<&ClientConfig> for UploadLimits {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_bytes: config.max_upload_bytes,
            max_files: config.max_batch_files,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl StatementFile {
    pub fn new(file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.to_string(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ApiError::invalid_input(RESOURCE, "path has no file name"))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::invalid_input(RESOURCE, format!("{}: {}", file_name, e)))?;
        Ok(Self { file_name, bytes })
    }

    /// Lower-cased extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn content_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("csv") => "text/csv",
            Some("xls") => "application/vnd.ms-excel",
            Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Some("txt") => "text/plain",
            _ => "application/octet-stream",
        }
    }

    pub fn validate(&self, kind: ImportKind, limits: &UploadLimits) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(ApiError::invalid_input(
                RESOURCE,
                format!("{} is empty", self.file_name),
            ));
        }
        if self.bytes.len() > limits.max_bytes {
            return Err(ApiError::invalid_input(
                RESOURCE,
                format!(
                    "{} is {} bytes; the limit is {} bytes",
                    self.file_name,
                    self.bytes.len(),
                    limits.max_bytes
                ),
            ));
        }
        let allowed = kind.allowed_extensions();
        match self.extension() {
            Some(ext) if allowed.contains(&ext.as_str()) => Ok(()),
            _ => Err(ApiError::invalid_input(
                RESOURCE,
                format!(
                    "{} must be one of: {}",
                    self.file_name,
                    allowed.join(", ")
                ),
            )),
        }
    }
}

/// Check a whole batch: the file count, then every file.
pub fn validate_batch(files: &[StatementFile], kind: ImportKind, limits: &UploadLimits) -> Result<()> {
    if files.is_empty() {
        return Err(ApiError::invalid_input(RESOURCE, "no files selected"));
    }
    if files.len() > limits.max_files {
        return Err(ApiError::invalid_input(
            RESOURCE,
            format!("at most {} files per import", limits.max_files),
        ));
    }
    files.iter().try_for_each(|file| file.validate(kind, limits))
}
