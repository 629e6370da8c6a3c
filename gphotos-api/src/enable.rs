//! Enabling an uploaded blob as a photo.
//!
//! Endpoint: `POST /_/PhotosUi/mutate`, form body `f.req=<json>&at=<token>&`.
//!
//! The request and response are positional trees keyed by the
//! "enable as photo" capability key [`ENABLE_PHOTO_KEY`]:
//!
//! ```text
//! request:  ["af.maf", [["af.add", 137530650, {"137530650": [[[<upload token>, <file name>, <timestamp>]]]}]]]
//! response: [["af.mdr", {"137530650": [[[<image id>, [<url>, ...], ...]]]}]]
//! ```
//!
//! There is no schema behind either shape; every descent step is checked and
//! a mismatch surfaces as [`UploadError::Malformed`] tagged with the key.

use serde_json::{Map, Value, json};

use crate::auth::CookieCredentials;
use crate::client::{decode_json, excerpt};
use crate::error::{Result, UploadError};
use crate::nested::Node;

/// Capability key of the "enable as photo" operation.
pub const ENABLE_PHOTO_KEY: u64 = 137_530_650;

/// Where and how the uploaded blob should appear in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableOptions {
    /// Name shown for the photo.
    pub file_name: String,
    /// Photo timestamp in seconds since the epoch.
    pub timestamp_secs: i64,
}

/// A photo that is visible in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledImage {
    pub id: String,
    /// Publicly resolvable URL of the image.
    pub url: String,
}

/// Build the `f.req` tree for enabling `upload_token`.
pub fn enable_request(upload_token: &str, options: &EnableOptions) -> Value {
    let mut items = Map::new();
    items.insert(
        ENABLE_PHOTO_KEY.to_string(),
        json!([[[upload_token, options.file_name, options.timestamp_secs]]]),
    );
    json!(["af.maf", [["af.add", ENABLE_PHOTO_KEY, items]]])
}

/// Decode the enable response into the image id and URL.
pub fn parse_enable_response(body: &Value) -> Result<EnabledImage> {
    let context = format!("enable response (capability {ENABLE_PHOTO_KEY})");
    let key = ENABLE_PHOTO_KEY.to_string();

    let enabled = Node::root(body, &context)
        .index(0)?
        .min_len(2)?
        .index(1)?
        .field(&key)?
        .index(0)?
        .index(0)?
        .min_len(2)?;
    let id = enabled.index(0)?.as_str()?.to_owned();
    let url = enabled.index(1)?.index(0)?.as_str()?.to_owned();
    Ok(EnabledImage { id, url })
}

impl CookieCredentials {
    /// Activate an uploaded blob as a photo.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Protocol`] if the service answers with a non-success status
    /// - [`UploadError::Malformed`] if the response tree does not have the
    ///   expected shape
    pub fn enable(
        &self,
        upload_token: &str,
        options: &EnableOptions,
        token: &str,
    ) -> Result<EnabledImage> {
        let request = enable_request(upload_token, options);
        let url = &self.endpoints().enable;
        tracing::debug!(%url, file = %options.file_name, "enabling uploaded image");

        let body = format!(
            "f.req={}&at={}&",
            urlencoding::encode(&request.to_string()),
            urlencoding::encode(token),
        );
        let resp = self
            .http()
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded;charset=UTF-8")
            .body(body)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(UploadError::Protocol {
                step: "enable image",
                message: format!("HTTP {status}: {}", excerpt(&text)),
            });
        }
        parse_enable_response(&decode_json(&text)?)
    }
}
