//! Client configuration: service endpoints, timeouts and token policy.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, UploadError};

pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const SERVICE_BASE: &str = "https://photos.google.com";

/// URLs of every endpoint the upload protocol touches.
///
/// | Field            | Default                                               |
/// |------------------|-------------------------------------------------------|
/// | `home`           | `https://photos.google.com/`                          |
/// | `login`          | `https://photos.google.com/login`                     |
/// | `upload_session` | `.../_/upload/uploadmedia/rupio_interactive?authuser=0` |
/// | `enable`         | `.../_/PhotosUi/mutate`                               |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Canonical homepage. Validation succeeds only when the login page
    /// redirects to exactly this URL.
    pub home: String,
    pub login: String,
    pub upload_session: String,
    pub enable: String,
}

impl ServiceEndpoints {
    /// Every endpoint rebased on `base` (scheme + host, no trailing slash).
    /// Used to point the client at a fixture server.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            home: format!("{base}/"),
            login: format!("{base}/login"),
            upload_session: format!("{base}/_/upload/uploadmedia/rupio_interactive?authuser=0"),
            enable: format!("{base}/_/PhotosUi/mutate"),
        }
    }
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self::with_base(SERVICE_BASE)
    }
}

/// When the at-token is scraped from the homepage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenPolicy {
    /// Scrape on first use, then reuse for the lifetime of the credentials.
    #[default]
    Cached,
    /// Scrape again at the start of every upload.
    PerUpload,
}

/// Settings for the HTTP client owned by the credentials.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: ServiceEndpoints,
    pub user_agent: String,
    /// Applied to every request, including byte transfers.
    pub timeout: Duration,
    pub token_policy: TokenPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: ServiceEndpoints::default(),
            user_agent: USER_AGENT.to_owned(),
            timeout: Duration::from_secs(60),
            token_policy: TokenPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at a fixture server.
    pub fn for_base(base: &str) -> Self {
        Self {
            endpoints: ServiceEndpoints::with_base(base),
            ..Self::default()
        }
    }
}

/// Default auth file location: `~/.config/gphotos-uploader/auth.json`.
pub fn default_auth_path() -> Result<PathBuf> {
    let config = dirs::config_dir()
        .ok_or_else(|| UploadError::Other("cannot determine config directory".into()))?;
    Ok(config.join("gphotos-uploader").join("auth.json"))
}
