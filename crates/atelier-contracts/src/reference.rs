use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

pub const MAX_REFERENCE_BYTES: u64 = 10 * 1024 * 1024;
pub const ALLOWED_REFERENCE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceImageError {
    #[error("reference image not found: {0}")]
    NotFound(String),
    #[error("reference image is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("reference image extension '{0}' is not allowed")]
    DisallowedExtension(String),
    #[error("reference image unreadable: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub path: PathBuf,
    pub byte_size: u64,
    pub extension: String,
}

impl ReferenceImage {
    pub fn inspect(path: &Path) -> Result<Self, ReferenceImageError> {
        let metadata = fs::metadata(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ReferenceImageError::NotFound(path.display().to_string()),
            _ => ReferenceImageError::Io(err.to_string()),
        })?;
        if !metadata.is_file() {
            return Err(ReferenceImageError::NotFound(path.display().to_string()));
        }
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ALLOWED_REFERENCE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ReferenceImageError::DisallowedExtension(extension));
        }
        let byte_size = metadata.len();
        if byte_size > MAX_REFERENCE_BYTES {
            return Err(ReferenceImageError::TooLarge {
                size: byte_size,
                limit: MAX_REFERENCE_BYTES,
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            byte_size,
            extension,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        mime_for_extension(&self.extension)
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("reference.png")
            .to_string()
    }
}

/// Checks existence, size, and extension. Failures are logged, never raised.
pub fn validate(path: &Path) -> bool {
    match ReferenceImage::inspect(path) {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "reference image rejected");
            false
        }
    }
}

pub fn encode_base64(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(BASE64.encode(bytes)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "reference image unreadable");
            None
        }
    }
}

pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "image/png",
    }
}
