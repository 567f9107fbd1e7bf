//! Wire shapes for the HTTP surface, and the error-body adapter.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::entry::Hit;
use crate::error::CoreError;
use crate::index::IndexStats;

/// Projection selected by the `view` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Card,
    Full,
    Ids,
}

impl View {
    /// Parse the `view` parameter; `ids` is only meaningful for search.
    pub fn parse(raw: Option<&str>, allow_ids: bool) -> Result<Self, CoreError> {
        match raw {
            None | Some("card") => Ok(View::Card),
            Some("full") => Ok(View::Full),
            Some("ids") if allow_ids => Ok(View::Ids),
            Some(other) => Err(CoreError::InvalidRequest(format!(
                "unsupported view '{other}'"
            ))),
        }
    }

    /// Render one hit under this view. `Ids` never reaches here; search
    /// short-circuits to the id list.
    pub fn render(self, hit: &Hit) -> serde_json::Value {
        match self {
            View::Card | View::Ids => serde_json::to_value(&hit.card).unwrap_or_default(),
            View::Full => serde_json::to_value(&hit.entry).unwrap_or_default(),
        }
    }
}

/// Raw query parameters of `GET /core/search`; validation happens in the
/// handler so every rejection carries the core's error shape.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub filter: Option<String>,
    pub q: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
    pub sort: Option<String>,
    pub view: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub ok: bool,
    pub docs: u64,
    pub last_seq: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    #[serde(flatten)]
    pub index: IndexStats,
    pub poll_ms: u64,
    pub uptime_secs: u64,
    pub queries_served: u64,
}

#[derive(Debug, Serialize)]
pub struct SearchBody {
    pub items: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchIdsBody {
    pub ids: Vec<String>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ItemBody {
    pub item: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct BatchGetRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchGetBody {
    pub items: Vec<serde_json::Value>,
    pub omitted: usize,
}

/// Core error as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidRequest(_) | CoreError::InvalidFilter { .. } => {
                StatusCode::BAD_REQUEST
            }
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::Forbidden => StatusCode::FORBIDDEN,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut error = json!({
            "code": self.0.code(),
            "message": self.0.to_string(),
        });
        if let CoreError::InvalidFilter { pos, .. } = &self.0 {
            error["details"] = json!({ "position": pos });
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
