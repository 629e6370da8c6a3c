//! Cookie credentials: the cookie jar, the persistent user id and the
//! runtime at-token.
//!
//! Credentials are persisted as a JSON auth file:
//!
//! ```json
//! {
//!   "cookies": [ { "Name": "SID", "Value": "...", "Domain": ".google.com", "Path": "/", "Secure": true, "HttpOnly": false } ],
//!   "persistantParameters": { "userId": "1234567890" }
//! }
//! ```
//!
//! The at-token is never written to the file: it is only meaningful together
//! with the cookie session that produced it and is scraped again after a
//! reload (see [`CookieCredentials::refresh_token`]).

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ServiceEndpoints};
use crate::cookie::{Cookie, CookieJar};
use crate::error::{Result, UploadError};

/// Parameters tied to the account rather than to the cookie session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentParameters {
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

/// On-disk representation of [`CookieCredentials`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFile {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(rename = "persistantParameters", default)]
    pub persistent_parameters: PersistentParameters,
}

impl AuthFile {
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Outcome of [`CookieCredentials::validate`].
#[derive(Debug)]
pub enum Validity {
    /// The login page redirected to the homepage.
    Valid,
    /// The login page did not redirect to the homepage: the cookies are
    /// definitely not accepted. Carries the URL we ended up on.
    Unauthenticated(String),
    /// The check itself failed (network, TLS, ...). Says nothing about the
    /// cookies.
    Inconclusive(UploadError),
}

impl Validity {
    /// `true` only when the cookies are known to be bad.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }
}

/// Cookie-based credentials plus the HTTP client bound to their jar.
///
/// The runtime token is guarded by its own lock. Refreshes are serialized by
/// a second mutex held for the whole fetch-and-parse, so readers only ever
/// observe a complete token from a single refresh.
pub struct CookieCredentials {
    http: Client,
    jar: Arc<CookieJar>,
    config: ClientConfig,
    persistent: PersistentParameters,
    pub(crate) token: RwLock<Option<String>>,
    pub(crate) refresh: Mutex<()>,
}

impl CookieCredentials {
    /// Build credentials from cookies and persistent parameters. Does not
    /// touch the network.
    pub fn new(
        cookies: Vec<Cookie>,
        persistent: PersistentParameters,
        config: ClientConfig,
    ) -> Result<Self> {
        let jar = Arc::new(CookieJar::new(cookies));
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            http,
            jar,
            config,
            persistent,
            token: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Build credentials from a parsed auth file. Does not touch the network.
    pub fn from_auth_file(file: AuthFile, config: ClientConfig) -> Result<Self> {
        Self::new(file.cookies, file.persistent_parameters, config)
    }

    /// Restore credentials from JSON and check them against the service.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Json`] if the input is not an auth file
    /// - [`UploadError::Auth`] if the service definitely rejects the cookies
    ///
    /// An inconclusive validation is logged and does not fail the load.
    pub fn from_reader(reader: impl Read, config: ClientConfig) -> Result<Self> {
        let file = AuthFile::from_reader(reader)?;
        if file.cookies.is_empty() {
            return Err(UploadError::Auth("auth file contains no cookies".into()));
        }
        let credentials = Self::from_auth_file(file, config)?;
        match credentials.validate() {
            Validity::Valid => {}
            Validity::Unauthenticated(landed) => {
                return Err(UploadError::Auth(format!(
                    "invalid cookie credentials: login page led to {landed}"
                )));
            }
            Validity::Inconclusive(err) => {
                tracing::warn!(error = %err, "could not validate credentials, continuing");
            }
        }
        Ok(credentials)
    }

    /// Restore credentials from an auth file on disk.
    pub fn from_file(path: &Path, config: ClientConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            UploadError::Auth(format!("can't open auth file {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file), config)
    }

    /// The HTTP client that sends this credential's cookies.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.config.endpoints
    }

    pub fn persistent(&self) -> &PersistentParameters {
        &self.persistent
    }

    pub fn user_id(&self) -> &str {
        &self.persistent.user_id
    }

    /// The current at-token, if one has been scraped.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Check whether the service still accepts the cookies.
    ///
    /// Requests the login page; a logged-in session is redirected to the
    /// homepage. Landing anywhere else means the cookies are not accepted.
    /// Transport failures are [`Validity::Inconclusive`], never invalid.
    pub fn validate(&self) -> Validity {
        let endpoints = self.endpoints();
        tracing::debug!(url = %endpoints.login, "validating credentials");
        let resp = match self.http.get(&endpoints.login).send() {
            Ok(resp) => resp,
            Err(e) => return Validity::Inconclusive(e.into()),
        };
        let landed = resp.url().as_str();
        if landed == endpoints.home {
            Validity::Valid
        } else {
            tracing::info!(landed, "login page did not redirect to the homepage");
            Validity::Unauthenticated(landed.to_owned())
        }
    }

    /// Snapshot of the credentials in their persisted form, cookies
    /// normalized.
    ///
    /// Waits for any in-flight token refresh so the snapshot includes cookies
    /// that refresh may have received.
    pub fn to_auth_file(&self) -> AuthFile {
        let _refresh = self.refresh.lock();
        AuthFile {
            cookies: self.jar.all().iter().map(Cookie::normalized).collect(),
            persistent_parameters: self.persistent.clone(),
        }
    }

    /// Write the credentials as JSON.
    pub fn serialize(&self, out: impl Write) -> Result<()> {
        serde_json::to_writer(out, &self.to_auth_file())?;
        Ok(())
    }

    /// Write the credentials to `path`, creating parent directories.
    pub fn serialize_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        self.serialize(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

impl fmt::Debug for CookieCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCredentials")
            .field("cookies", &self.jar.len())
            .field("user_id", &self.persistent.user_id)
            .field("has_token", &self.token.read().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTH_JSON: &str = r#"{
        "cookies": [
            {"Name":"SID","Value":"s1","Path":"/u","Domain":"photos.google.com","Expires":"0001-01-01T00:00:00Z","MaxAge":0,"Secure":true,"HttpOnly":false,"Raw":""},
            {"Name":"OTZ","Value":"o1","Path":"","Domain":".google.com","Secure":false,"HttpOnly":true}
        ],
        "persistantParameters": {"userId": "42"}
    }"#;

    fn credentials() -> CookieCredentials {
        let file = AuthFile::from_reader(AUTH_JSON.as_bytes()).unwrap();
        CookieCredentials::from_auth_file(file, ClientConfig::default()).unwrap()
    }

    #[test]
    fn parses_legacy_auth_file() {
        let file = AuthFile::from_reader(AUTH_JSON.as_bytes()).unwrap();
        assert_eq!(file.cookies.len(), 2);
        assert_eq!(file.persistent_parameters.user_id, "42");
        assert!(file.cookies[1].http_only);
    }

    #[test]
    fn serialize_normalizes_cookies() {
        let file = credentials().to_auth_file();
        assert_eq!(file.cookies[0].domain, ".google.com");
        assert_eq!(file.cookies[0].path, "/");
        assert_eq!(file.cookies[1].domain, "photos.google.com");
        assert_eq!(file.cookies[1].path, "/");
    }

    #[test]
    fn serialize_roundtrip_is_stable() {
        let mut first = Vec::new();
        credentials().serialize(&mut first).unwrap();

        let reloaded = CookieCredentials::from_auth_file(
            AuthFile::from_reader(first.as_slice()).unwrap(),
            ClientConfig::default(),
        )
        .unwrap();
        let mut second = Vec::new();
        reloaded.serialize(&mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn token_is_never_serialized() {
        let creds = credentials();
        *creds.token.write() = Some("secret-token".into());
        let mut out = Vec::new();
        creds.serialize(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("secret-token"));
        assert!(text.contains("persistantParameters"));
    }

    #[test]
    fn debug_hides_cookie_values() {
        let text = format!("{:?}", credentials());
        assert!(!text.contains("s1"));
        assert!(text.contains("cookies: 2"));
    }
}
