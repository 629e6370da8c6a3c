//! The full single-file upload:
//! token → upload session → byte transfer → enable.
//!
//! ```no_run
//! use std::path::Path;
//! use gphotos_api::{ClientConfig, CookieCredentials, Upload, UploadOptions};
//!
//! let credentials = CookieCredentials::from_file(Path::new("auth.json"), ClientConfig::default())?;
//! let options = UploadOptions::from_path(Path::new("cat.jpg"))?;
//! let image = Upload::new(options, &credentials).run()?;
//! println!("uploaded: {}", image.url);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::auth::{CookieCredentials, Validity};
use crate::enable::{EnableOptions, EnabledImage};
use crate::error::{PipelineError, Result, UploadError, UploadState};
use crate::session::UploadDescriptor;

/// Everything needed to upload one file.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub file_name: String,
    pub content: Vec<u8>,
    pub content_type: String,
    pub timestamp: DateTime<Utc>,
}

impl UploadOptions {
    /// Read a file from disk. The timestamp is the file's modification time
    /// (or now, if the platform can't report one).
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| UploadError::Other(format!("not a file: {}", path.display())))?;
        let content = fs::read(path)?;
        let timestamp = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        Ok(Self {
            content_type: content_type_for(&file_name).to_owned(),
            file_name,
            content,
            timestamp,
        })
    }

    /// Options for in-memory content, timestamped now.
    pub fn from_bytes(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        let file_name = file_name.into();
        Self {
            content_type: content_type_for(&file_name).to_owned(),
            file_name,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn descriptor(&self) -> UploadDescriptor {
        UploadDescriptor {
            field_name: "file".to_owned(),
            file_name: self.file_name.clone(),
            size: self.content.len() as u64,
            content_type: self.content_type.clone(),
            timestamp_ms: self.timestamp.timestamp_millis(),
        }
    }

    pub fn enable_options(&self) -> EnableOptions {
        EnableOptions {
            file_name: self.file_name.clone(),
            timestamp_secs: self.timestamp.timestamp(),
        }
    }
}

/// MIME type guessed from the file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// A single-use upload of one file with one set of credentials.
pub struct Upload<'c> {
    options: UploadOptions,
    credentials: &'c CookieCredentials,
    state: UploadState,
}

impl<'c> Upload<'c> {
    /// The credentials are assumed already validated, so the upload starts
    /// in [`UploadState::Authenticated`].
    pub fn new(options: UploadOptions, credentials: &'c CookieCredentials) -> Self {
        Self {
            options,
            credentials,
            state: UploadState::Authenticated,
        }
    }

    /// The last state reached.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Run every remaining step. Consumes the upload: sessions and upload
    /// tokens are never reused.
    pub fn run(mut self) -> std::result::Result<EnabledImage, PipelineError> {
        let span = tracing::info_span!("upload", file = %self.options.file_name);
        let _enter = span.enter();

        let token = self.step(|u| u.credentials.token_for_upload())?;
        self.advance(UploadState::TokenAcquired);

        let descriptor = self.options.descriptor();
        let session = self.step(|u| u.credentials.create_session(&descriptor, &token))?;
        self.advance(UploadState::SessionCreated);

        let content = std::mem::take(&mut self.options.content);
        let upload_token = self.step(|u| {
            u.credentials
                .upload_bytes(&session.upload_url, content, &descriptor.content_type)
        })?;
        self.advance(UploadState::BytesUploaded);

        let enable = self.options.enable_options();
        let image = self.step(|u| u.credentials.enable(&upload_token, &enable, &token))?;
        self.advance(UploadState::Enabled);

        tracing::info!(id = %image.id, url = %image.url, "upload enabled");
        Ok(image)
    }

    fn step<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> std::result::Result<T, PipelineError> {
        f(self).map_err(|source| {
            tracing::warn!(state = ?self.state, error = %source, "{} failed", self.state.next_step());
            PipelineError {
                state: self.state,
                source,
            }
        })
    }

    fn advance(&mut self, state: UploadState) {
        tracing::debug!(from = ?self.state, to = ?state, "upload state");
        self.state = state;
    }
}

/// Validate `credentials`, then upload. Starts from
/// [`UploadState::Unauthenticated`].
pub fn validate_and_upload(
    options: UploadOptions,
    credentials: &CookieCredentials,
) -> std::result::Result<EnabledImage, PipelineError> {
    match credentials.validate() {
        Validity::Valid => {}
        Validity::Unauthenticated(landed) => {
            return Err(PipelineError {
                state: UploadState::Unauthenticated,
                source: UploadError::Auth(format!("login page led to {landed}")),
            });
        }
        Validity::Inconclusive(err) => {
            tracing::warn!(error = %err, "could not validate credentials, uploading anyway");
        }
    }
    Upload::new(options, credentials).run()
}
