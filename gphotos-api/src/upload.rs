//! Byte transfer to the session's upload URL.
//!
//! Request: `PUT <putInfo.url>` with the raw file bytes.
//!
//! Response:
//! ```json
//! {
//!   "sessionStatus": {
//!     "additionalInfo": {
//!       "uploader_service.GoogleRupioAdditionalInfo": {
//!         "completionInfo": { "customerSpecificInfo": { "upload_token_base64": "CAIS..." } }
//!       }
//!     }
//!   }
//! }
//! ```

use serde_json::Value;

use crate::auth::CookieCredentials;
use crate::client::{decode_json, excerpt};
use crate::error::{Result, UploadError};
use crate::nested::Node;

/// Key of the completion-info container inside `additionalInfo`.
pub const COMPLETION_KEY: &str = "uploader_service.GoogleRupioAdditionalInfo";

/// Extract the opaque upload token from a byte-transfer response.
pub fn parse_upload_response(body: &Value) -> Result<String> {
    let token = Node::root(body, "upload response")
        .field("sessionStatus")?
        .field("additionalInfo")?
        .field(COMPLETION_KEY)?
        .field("completionInfo")?
        .field("customerSpecificInfo")?
        .field("upload_token_base64")?
        .as_str()?
        .to_owned();
    Ok(token)
}

impl CookieCredentials {
    /// Send `content` to `upload_url` and return the upload token.
    ///
    /// # Errors
    ///
    /// - [`UploadError::UploadFailed`] on a non-success status
    /// - [`UploadError::Malformed`] if the response lacks the upload token
    pub fn upload_bytes(
        &self,
        upload_url: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        tracing::debug!(url = %upload_url, bytes = content.len(), "uploading bytes");
        let resp = self
            .http()
            .put(upload_url)
            .header("X-GUploader-No-308", "yes")
            .header("Content-Type", content_type)
            .body(content)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(UploadError::UploadFailed {
                status: status.as_u16(),
                excerpt: excerpt(&text),
            });
        }
        parse_upload_response(&decode_json(&text)?)
    }
}
