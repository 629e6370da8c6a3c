//! At-token scraping.
//!
//! The homepage's first `<script>` element assigns a JSON object to a global:
//!
//! ```text
//! <script>window.WIZ_global_data = {"SNlM0e":"AF1_QpN...","...":...};</script>
//! ```
//!
//! Everything up to the first `=` is dropped, as is a trailing `;`, and the
//! rest is decoded as JSON. The token is the `SNlM0e` member of an object, or
//! the first element when the payload is an array.

use html5ever::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use serde_json::Value;

use crate::auth::CookieCredentials;
use crate::config::TokenPolicy;
use crate::error::{Result, TokenError};

/// Key of the at-token inside the homepage's global data object.
pub const TOKEN_KEY: &str = "SNlM0e";

impl CookieCredentials {
    /// Scrape a fresh at-token from the homepage and store it.
    ///
    /// Concurrent refreshes on the same credentials run one after another;
    /// the stored token always comes from exactly one complete scrape. On
    /// failure the previously stored token is left untouched.
    pub fn refresh_token(&self) -> Result<String> {
        let _refresh = self.refresh.lock();
        self.scrape_and_store()
    }

    /// The stored at-token, scraping one first if none is stored yet.
    pub fn ensure_token(&self) -> Result<String> {
        if let Some(token) = self.token() {
            return Ok(token);
        }
        let _refresh = self.refresh.lock();
        // Another thread may have finished a refresh while we waited.
        if let Some(token) = self.token() {
            return Ok(token);
        }
        self.scrape_and_store()
    }

    /// Token for a new upload, according to the configured [`TokenPolicy`].
    pub fn token_for_upload(&self) -> Result<String> {
        match self.config().token_policy {
            TokenPolicy::Cached => self.ensure_token(),
            TokenPolicy::PerUpload => self.refresh_token(),
        }
    }

    fn scrape_and_store(&self) -> Result<String> {
        let home = &self.endpoints().home;
        tracing::debug!(url = %home, "fetching homepage for at token");
        let html = self.http().get(home).send()?.error_for_status()?.text()?;
        let token = extract_token(&html)?;
        *self.token.write() = Some(token.clone());
        tracing::info!("at token acquired");
        Ok(token)
    }
}

/// Extract the at-token from homepage HTML.
///
/// # Errors
///
/// - [`TokenError::TokenNotFound`] when the document has no `<script>`
/// - [`TokenError::TokenParseError`] when the first script is not a
///   JSON assignment carrying a token
pub fn extract_token(html: &str) -> std::result::Result<String, TokenError> {
    let script = first_script_text(html).ok_or(TokenError::TokenNotFound)?;
    parse_assignment(&script)
}

fn first_script_text(html: &str) -> Option<String> {
    let dom = parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .ok()?;
    find_script(&dom.document)
}

/// Pre-order walk: the first script element in document order.
fn find_script(handle: &Handle) -> Option<String> {
    if let NodeData::Element { ref name, .. } = handle.data {
        if &*name.local == "script" {
            let mut text = String::new();
            for child in handle.children.borrow().iter() {
                if let NodeData::Text { ref contents } = child.data {
                    text.push_str(&contents.borrow());
                }
            }
            return Some(text);
        }
    }
    handle.children.borrow().iter().find_map(find_script)
}

fn parse_assignment(script: &str) -> std::result::Result<String, TokenError> {
    let (_, rhs) = script
        .split_once('=')
        .ok_or_else(|| TokenError::TokenParseError("script is not an assignment".into()))?;
    let rhs = rhs.trim();
    let rhs = rhs.strip_suffix(';').unwrap_or(rhs);

    let value: Value =
        serde_json::from_str(rhs).map_err(|e| TokenError::TokenParseError(e.to_string()))?;
    let token = match &value {
        Value::Object(map) => map.get(TOKEN_KEY),
        Value::Array(items) => items.first(),
        _ => None,
    };
    token
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TokenError::TokenParseError(format!("no {TOKEN_KEY} string in payload")))
}
