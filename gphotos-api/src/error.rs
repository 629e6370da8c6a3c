//! Error types for the Google Photos upload client.
//!
//! The taxonomy separates "the service rejected us" from "the service
//! answered in a shape we no longer understand". The latter is always a
//! [`MalformedResponse`], so operators can tell a private format change apart
//! from an expired session or a flaky network.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while authenticating or uploading.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Credentials are missing or the service no longer accepts them.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The anti-forgery token could not be obtained from the homepage.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The response parsed fine but did not contain what the step needs
    /// (e.g. a session without any upload URL).
    #[error("protocol error during {step}: {message}")]
    Protocol {
        /// Pipeline step that received the response.
        step: &'static str,
        /// What was missing or unexpected.
        message: String,
    },

    /// A response did not have the nested shape the decoder expected.
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    /// The service could not be reached, or did not answer before the
    /// configured timeout.
    #[error("network error talking to the photo service: {0}")]
    Network(#[from] reqwest::Error),

    /// The byte transfer was answered with a non-success status.
    #[error("upload failed with status {status}: {excerpt}")]
    UploadFailed {
        /// HTTP status code returned by the upload URL.
        status: u16,
        /// First bytes of the response body, for diagnostics.
        excerpt: String,
    },

    /// Reading the photo from disk, or reading/writing the auth file, failed.
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    /// A response body or auth file was not valid JSON at all.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local setup problems, such as having no config directory to hold the
    /// default auth file.
    #[error("{0}")]
    Other(String),
}

impl UploadError {
    /// Whether retrying the same operation may succeed.
    ///
    /// Network failures and 5xx byte-transfer failures are transient.
    /// Authentication problems and format mismatches will not fix themselves.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::UploadFailed { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failures while scraping the at-token from the homepage.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The homepage had no `<script>` element at all.
    #[error("can't find the script tag with the token in the homepage")]
    TokenNotFound,

    /// A script was found but its payload could not be decoded. This usually
    /// means the homepage markup changed.
    #[error("can't parse the object that contains the at token: {0}")]
    TokenParseError(String),
}

/// A shape mismatch found while descending into an untyped response tree.
///
/// `path` is the JSONPath-like route taken from the root of the response up
/// to the failing node, e.g. `$[0][1]["137530650"][0]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {context} at {path}: expected {expected}, found {found}")]
pub struct MalformedResponse {
    /// Which response was being decoded.
    pub context: String,
    /// Descent path up to the failing node.
    pub path: String,
    /// Number of descent steps taken before the failure.
    pub depth: usize,
    /// What the decoder wanted at this node.
    pub expected: String,
    /// What it actually found.
    pub found: String,
}

/// The state an upload pipeline had reached when a step failed.
///
/// The pipeline moves strictly forward:
/// `Unauthenticated → Authenticated → TokenAcquired → SessionCreated →
/// BytesUploaded → Enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Unauthenticated,
    Authenticated,
    TokenAcquired,
    SessionCreated,
    BytesUploaded,
    Enabled,
}

impl UploadState {
    /// Name of the step that leaves this state.
    pub fn next_step(self) -> &'static str {
        match self {
            Self::Unauthenticated => "validate credentials",
            Self::Authenticated => "scrape at token",
            Self::TokenAcquired => "create upload session",
            Self::SessionCreated => "upload bytes",
            Self::BytesUploaded => "enable image",
            Self::Enabled => "done",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.next_step())
    }
}

/// An [`UploadError`] tagged with the pipeline state it interrupted.
#[derive(Debug, Error)]
#[error("{state} failed: {source}")]
pub struct PipelineError {
    /// Last state successfully reached.
    pub state: UploadState,
    /// Underlying error, unchanged in kind.
    #[source]
    pub source: UploadError,
}

/// Convenience alias for `Result<T, UploadError>`.
pub type Result<T> = std::result::Result<T, UploadError>;
