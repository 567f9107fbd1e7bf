//! Opaque pagination cursor: URL-safe base64 of `{"updated_at", "id"}`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Position in the descending `(updated_at, id)` order: the last entry the
/// previous page included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub updated_at: String,
    pub id: String,
}

impl Cursor {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor serialization is infallible");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode and validate a cursor from its wire form. Both fields must be
    /// present and strings; anything else is a request error, not a filter
    /// error.
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim().as_bytes())
            .map_err(|_| CoreError::InvalidRequest("cursor is not valid base64url".to_string()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|_| CoreError::InvalidRequest("cursor is not valid JSON".to_string()))?;

        let updated_at = value
            .get("updated_at")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                CoreError::InvalidRequest("cursor is missing string field 'updated_at'".to_string())
            })?;
        let id = value.get("id").and_then(serde_json::Value::as_str).ok_or_else(|| {
            CoreError::InvalidRequest("cursor is missing string field 'id'".to_string())
        })?;

        Ok(Cursor {
            updated_at: updated_at.to_string(),
            id: id.to_string(),
        })
    }

    /// Whether a doc sorts strictly after this cursor in the descending
    /// order, i.e. belongs to a later page.
    pub fn admits(&self, updated_at: &str, id: &str) -> bool {
        updated_at < self.updated_at.as_str()
            || (updated_at == self.updated_at && id < self.id.as_str())
    }
}
