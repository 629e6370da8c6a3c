//! Google Photos private upload client.
//!
//! Uploads photos through the browser-facing upload protocol, authenticated
//! with session cookies instead of an API key.
//!
//! # Authentication
//!
//! All calls go through [`CookieCredentials`]: a cookie jar harvested from a
//! logged-in browser plus the account's user id, persisted as a JSON auth
//! file. Private calls also need a short-lived at-token scraped from the
//! homepage with those cookies.
//!
//! ```no_run
//! use std::path::Path;
//! use gphotos_api::{ClientConfig, CookieCredentials, UploadOptions};
//!
//! let credentials = CookieCredentials::from_file(Path::new("auth.json"), ClientConfig::default())?;
//! let image = gphotos_api::Upload::new(UploadOptions::from_path(Path::new("cat.jpg"))?, &credentials).run()?;
//! println!("{} -> {}", image.id, image.url);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Protocol steps
//!
//! | Method                                    | Endpoint                                   | Result           |
//! |-------------------------------------------|--------------------------------------------|------------------|
//! | [`CookieCredentials::validate`]           | `GET /login` (expects redirect to `/`)     | [`Validity`]     |
//! | [`CookieCredentials::refresh_token`]      | `GET /`                                    | at-token         |
//! | [`CookieCredentials::create_session`]     | `POST /_/upload/uploadmedia/rupio_interactive` | [`UploadSession`] |
//! | [`CookieCredentials::upload_bytes`]       | `PUT <session upload URL>`                 | upload token     |
//! | [`CookieCredentials::enable`]             | `POST /_/PhotosUi/mutate`                  | [`EnabledImage`] |
//!
//! Every response is decoded through [`nested::Node`], so a change in the
//! private wire format surfaces as [`error::MalformedResponse`] rather than a
//! panic.
//!
//! # Concurrency
//!
//! All calls block. One [`CookieCredentials`] may be shared between threads
//! running independent uploads; token refreshes are serialized internally.

pub mod auth;
pub mod client;
pub mod config;
pub mod cookie;
mod enable;
pub mod error;
pub mod nested;
mod pipeline;
pub mod provider;
mod session;
pub mod token;
mod upload;

pub use auth::{AuthFile, CookieCredentials, PersistentParameters, Validity};
pub use config::{ClientConfig, ServiceEndpoints, TokenPolicy};
pub use enable::{ENABLE_PHOTO_KEY, EnableOptions, EnabledImage, enable_request, parse_enable_response};
pub use error::{MalformedResponse, PipelineError, Result, TokenError, UploadError, UploadState};
pub use pipeline::{Upload, UploadOptions, content_type_for, validate_and_upload};
pub use session::{UploadDescriptor, UploadSession, parse_session_response, session_request};
pub use upload::parse_upload_response;
