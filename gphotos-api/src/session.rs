//! Upload session creation.
//!
//! Endpoint: `POST /_/upload/uploadmedia/rupio_interactive?authuser=0&at=<token>`
//!
//! Request:
//! ```json
//! {
//!   "protocolVersion": "0.8",
//!   "createSessionRequest": {
//!     "fields": [
//!       { "external": { "name": "file", "filename": "cat.jpg", "size": 1234 } },
//!       { "inlined": { "name": "effective_id", "content": "<user id>", "contentType": "text/plain" } }
//!     ]
//!   }
//! }
//! ```
//!
//! Response:
//! ```json
//! { "sessionStatus": { "externalFieldTransfers": [ { "name": "file", "putInfo": { "url": "https://..." } } ] } }
//! ```

use serde::Serialize;
use serde_json::Value;

use crate::auth::CookieCredentials;
use crate::error::{Result, UploadError};
use crate::nested::Node;

pub const PROTOCOL_VERSION: &str = "0.8";
const CLIENT_INFO: &str = "mechanism=scotty xhr resumable; clientVersion=82480166";
const STEP: &str = "create upload session";
/// Announces the content type the byte upload will carry.
const CONTENT_TYPE_HEADER: &str = "X-Goog-Upload-Header-Content-Type";

/// Describes the file to the session-creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDescriptor {
    /// Form field the bytes will be attached to (always `"file"` for photos).
    pub field_name: String,
    pub file_name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// MIME type announced to the session call and sent with the bytes.
    pub content_type: String,
    /// Capture/modification time in milliseconds since the epoch.
    pub timestamp_ms: i64,
}

/// The one-time destination returned by the session call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Field name echoed back by the service.
    pub field_name: String,
    /// Where the bytes must be sent.
    pub upload_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    protocol_version: &'a str,
    create_session_request: CreateSessionRequest<'a>,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    fields: Vec<Field<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Field<'a> {
    External {
        name: &'a str,
        filename: &'a str,
        size: u64,
    },
    Inlined {
        name: &'a str,
        content: String,
        #[serde(rename = "contentType")]
        content_type: &'a str,
    },
}

fn inlined(name: &str, content: impl Into<String>) -> Field<'_> {
    Field::Inlined {
        name,
        content: content.into(),
        content_type: "text/plain",
    }
}

/// Build the session-creation body for `descriptor` on behalf of `user_id`.
pub fn session_request(descriptor: &UploadDescriptor, user_id: &str) -> Result<Value> {
    let body = CreateSessionBody {
        protocol_version: PROTOCOL_VERSION,
        create_session_request: CreateSessionRequest {
            fields: vec![
                Field::External {
                    name: &descriptor.field_name,
                    filename: &descriptor.file_name,
                    size: descriptor.size,
                },
                inlined("auto_create_album", "camera_sync.active"),
                inlined("auto_downsize", "true"),
                inlined("storage_policy", "use_manual_setting"),
                inlined("disable_asbe_notification", "true"),
                inlined("client", "photosweb"),
                inlined("effective_id", user_id),
                inlined("owner_name", user_id),
                inlined("timestamp_ms", descriptor.timestamp_ms.to_string()),
            ],
        },
    };
    Ok(serde_json::to_value(body)?)
}

/// Extract the upload destination from a session-creation response.
///
/// # Errors
///
/// - [`UploadError::Protocol`] if the transfer list is missing or empty
/// - [`UploadError::Malformed`] if it is not an array, or its first entry
///   lacks a string `putInfo.url`
pub fn parse_session_response(body: &Value) -> Result<UploadSession> {
    let root = Node::root(body, "upload session response");
    let status = root.field("sessionStatus")?;
    let transfers = match status.as_map()?.get("externalFieldTransfers") {
        None | Some(Value::Null) => return Err(no_upload_url()),
        Some(_) => status.field("externalFieldTransfers")?,
    };
    if transfers.as_array()?.is_empty() {
        return Err(no_upload_url());
    }
    let first = transfers.index(0)?;
    let upload_url = first.field("putInfo")?.field("url")?.as_str()?.to_owned();
    let field_name = first
        .field("name")
        .and_then(|n| n.as_str().map(str::to_owned))
        .unwrap_or_default();
    Ok(UploadSession {
        field_name,
        upload_url,
    })
}

fn no_upload_url() -> UploadError {
    UploadError::Protocol {
        step: STEP,
        message: "no upload URL".into(),
    }
}

impl CookieCredentials {
    /// Ask the service for a one-time URL to upload `descriptor`'s bytes to.
    pub fn create_session(&self, descriptor: &UploadDescriptor, token: &str) -> Result<UploadSession> {
        let body = session_request(descriptor, self.user_id())?;
        let url = &self.endpoints().upload_session;
        tracing::debug!(%url, file = %descriptor.file_name, size = descriptor.size, "creating upload session");

        let resp = self
            .http()
            .post(url)
            .query(&[("at", token)])
            .header("X-GUploader-Client-Info", CLIENT_INFO)
            .header(CONTENT_TYPE_HEADER, &descriptor.content_type)
            .header("Content-Type", "application/x-www-form-urlencoded;charset=utf-8")
            .body(body.to_string())
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        if !status.is_success() {
            return Err(UploadError::Protocol {
                step: STEP,
                message: format!("HTTP {status}: {}", crate::client::excerpt(&text)),
            });
        }
        let json = crate::client::decode_json(&text)?;
        parse_session_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> UploadDescriptor {
        UploadDescriptor {
            field_name: "file".into(),
            file_name: "cat.jpg".into(),
            size: 1234,
            content_type: "image/jpeg".into(),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn request_shape() {
        let body = session_request(&descriptor(), "uid-1").unwrap();
        assert_eq!(body["protocolVersion"], "0.8");
        let fields = body["createSessionRequest"]["fields"].as_array().unwrap();
        assert_eq!(
            fields[0],
            json!({"external": {"name": "file", "filename": "cat.jpg", "size": 1234}})
        );
        assert!(fields.contains(&json!({
            "inlined": {"name": "effective_id", "content": "uid-1", "contentType": "text/plain"}
        })));
        assert!(fields.contains(&json!({
            "inlined": {"name": "timestamp_ms", "content": "1700000000000", "contentType": "text/plain"}
        })));
    }

    #[test]
    fn picks_first_transfer_url() {
        let body = json!({"sessionStatus":{"externalFieldTransfers":[{"name":"f","putInfo":{"url":"http://x"}}]}});
        let session = parse_session_response(&body).unwrap();
        assert_eq!(session.upload_url, "http://x");
        assert_eq!(session.field_name, "f");
    }

    #[test]
    fn empty_transfers_is_protocol_error() {
        let body = json!({"sessionStatus":{"externalFieldTransfers":[]}});
        let err = parse_session_response(&body).unwrap_err();
        assert!(matches!(err, UploadError::Protocol { ref message, .. } if message == "no upload URL"));
    }

    #[test]
    fn missing_transfers_is_protocol_error() {
        let body = json!({"sessionStatus":{}});
        assert!(matches!(
            parse_session_response(&body),
            Err(UploadError::Protocol { .. })
        ));
    }

    #[test]
    fn transfers_of_wrong_type_is_malformed() {
        let body = json!({"sessionStatus":{"externalFieldTransfers":{"name":"f"}}});
        let err = parse_session_response(&body).unwrap_err();
        let UploadError::Malformed(m) = err else {
            panic!("expected malformed, got {err:?}");
        };
        assert_eq!(m.path, r#"$["sessionStatus"]["externalFieldTransfers"]"#);
        assert_eq!(m.expected, "array");
    }

    #[test]
    fn url_of_wrong_type_is_malformed() {
        let body = json!({"sessionStatus":{"externalFieldTransfers":[{"putInfo":{"url":5}}]}});
        assert!(matches!(
            parse_session_response(&body),
            Err(UploadError::Malformed(_))
        ));
    }
}
