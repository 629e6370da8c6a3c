//! Where credentials come from when none are stored.
//!
//! Harvesting cookies (driving a browser, asking the user) is a
//! human-in-the-loop flow that lives outside this crate. It plugs in through
//! [`CredentialProvider`]. [`login`] always asks the provider and replaces the
//! stored auth file; [`authenticate`] only falls back to it when the stored
//! file is missing or rejected.

use std::path::Path;

use crate::auth::{CookieCredentials, PersistentParameters, Validity};
use crate::config::ClientConfig;
use crate::cookie::{Cookie, parse_cookie_header};
use crate::error::{Result, UploadError};

/// Cookies and user id harvested from a logged-in browser session.
#[derive(Debug, Clone, Default)]
pub struct ProvidedCredentials {
    pub cookies: Vec<Cookie>,
    pub user_id: String,
}

/// Produces fresh credentials, e.g. by walking the user through a browser
/// login.
pub trait CredentialProvider {
    fn provide(&self) -> Result<ProvidedCredentials>;
}

impl<F> CredentialProvider for F
where
    F: Fn() -> Result<ProvidedCredentials>,
{
    fn provide(&self) -> Result<ProvidedCredentials> {
        self()
    }
}

/// Builds credentials from a `Cookie:` header copied out of the browser's
/// developer tools, plus the account's user id.
#[derive(Debug, Clone)]
pub struct CookieHeaderProvider {
    pub cookie_header: String,
    pub user_id: String,
}

impl CredentialProvider for CookieHeaderProvider {
    fn provide(&self) -> Result<ProvidedCredentials> {
        let cookies = parse_cookie_header(&self.cookie_header);
        if cookies.is_empty() {
            return Err(UploadError::Auth("cookie header contains no cookies".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(UploadError::Auth("user id is required".into()));
        }
        Ok(ProvidedCredentials {
            cookies,
            user_id: self.user_id.trim().to_owned(),
        })
    }
}

/// Load credentials from `auth_path`, falling back to `provider`.
///
/// Credentials obtained from the provider go through [`login`], so the next
/// run can skip the provider.
pub fn authenticate(
    auth_path: &Path,
    config: &ClientConfig,
    provider: &dyn CredentialProvider,
) -> Result<CookieCredentials> {
    match CookieCredentials::from_file(auth_path, config.clone()) {
        Ok(credentials) => return Ok(credentials),
        Err(e) => {
            tracing::info!(path = %auth_path.display(), error = %e, "stored credentials unusable");
        }
    }
    login(auth_path, config, provider)
}

/// Ask `provider` for fresh credentials, validate them and save them to
/// `auth_path`, replacing whatever is stored there.
///
/// Cookies the service definitely rejects are not saved. An inconclusive
/// validation is logged and the credentials are saved anyway.
pub fn login(
    auth_path: &Path,
    config: &ClientConfig,
    provider: &dyn CredentialProvider,
) -> Result<CookieCredentials> {
    let provided = provider.provide()?;
    let credentials = CookieCredentials::new(
        provided.cookies,
        PersistentParameters {
            user_id: provided.user_id,
        },
        config.clone(),
    )?;
    match credentials.validate() {
        Validity::Valid => {}
        Validity::Unauthenticated(landed) => {
            return Err(UploadError::Auth(format!(
                "provided cookies are not accepted: login page led to {landed}"
            )));
        }
        Validity::Inconclusive(e) => {
            tracing::warn!(error = %e, "could not validate provided cookies, saving anyway");
        }
    }
    credentials.serialize_to_file(auth_path)?;
    tracing::info!(path = %auth_path.display(), "credentials saved");
    Ok(credentials)
}
