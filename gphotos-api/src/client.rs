//! Response helpers shared by the protocol steps.
//!
//! The private endpoints prefix JSON bodies with the anti-hijacking guard
//! `)]}'` followed by a newline. [`decode_json`] strips it when present so
//! the same decoder handles both guarded and plain bodies.

use serde_json::Value;

use crate::error::Result;

const XSSI_PREFIX: &str = ")]}'";
const EXCERPT_LEN: usize = 512;

/// Parse a response body as JSON, dropping the `)]}'` guard line if present.
pub fn decode_json(body: &str) -> Result<Value> {
    let body = body.trim_start();
    let body = body.strip_prefix(XSSI_PREFIX).unwrap_or(body);
    Ok(serde_json::from_str(body)?)
}

/// The first bytes of a response body, cut on a character boundary.
pub fn excerpt(body: &str) -> String {
    if body.len() <= EXCERPT_LEN {
        return body.to_owned();
    }
    let mut end = EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
