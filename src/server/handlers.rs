//! HTTP handlers for the five core routes.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::CoreError;
use crate::search::{self, Cursor, SearchOptions, SortOrder, LIMIT_DEFAULT, LIMIT_MAX};
use crate::server::auth::requester_from_headers;
use crate::server::dto::{
    ApiError, ApiResult, BatchGetBody, BatchGetRequest, HealthBody, ItemBody, SearchBody,
    SearchIdsBody, SearchParams, StatsBody, View, ViewParams,
};
use crate::server::AppState;

/// Maximum ids accepted by one batchGet call.
const BATCH_GET_MAX_IDS: usize = 200;

pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        ok: true,
        docs: state.index.read().doc_count(),
        last_seq: state.index.last_seq(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsBody> {
    Json(StatsBody {
        index: state.index.stats(),
        poll_ms: state.poll_ms,
        uptime_secs: state.stats.uptime_secs(),
        queries_served: state.stats.queries_served(),
    })
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> ApiResult<Response> {
    let requester = requester_from_headers(&headers, state.trusted_headers);
    let view = View::parse(params.view.as_deref(), true)?;
    let sort = parse_sort(params.sort.as_deref())?;
    let limit = parse_limit(params.limit.as_deref())?;
    let cursor = match params.cursor.as_deref() {
        Some(raw) => Some(Cursor::decode(raw)?),
        None => None,
    };

    let ast = match params.filter.as_deref() {
        Some(raw) => Some(state.filters.parse(raw)?),
        None => None,
    };

    let opts = SearchOptions {
        limit,
        cursor,
        query: params.q.clone(),
        sort,
    };

    let page = {
        let snapshot = state.index.read();
        search::execute(&snapshot, ast.as_deref(), &opts, &requester)?
    };
    state.stats.record_query();

    let next_cursor = page.next_cursor.as_ref().map(Cursor::encode);
    let body = match view {
        View::Ids => Json(SearchIdsBody {
            ids: page.items.into_iter().map(|hit| hit.entry.id).collect(),
            next_cursor,
        })
        .into_response(),
        view => Json(SearchBody {
            items: page.items.iter().map(|hit| view.render(hit)).collect(),
            next_cursor,
        })
        .into_response(),
    };
    Ok(body)
}

pub async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<ViewParams>,
) -> ApiResult<Json<ItemBody>> {
    let requester = requester_from_headers(&headers, state.trusted_headers);
    let view = View::parse(params.view.as_deref(), false)?;

    let hit = state
        .index
        .read()
        .read(&id, &requester)
        .ok_or(ApiError(CoreError::NotFound))?;
    Ok(Json(ItemBody { item: view.render(&hit) }))
}

pub async fn batch_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<BatchGetBody>> {
    let requester = requester_from_headers(&headers, state.trusted_headers);
    let request: BatchGetRequest = serde_json::from_slice(&body)
        .map_err(|e| CoreError::InvalidRequest(format!("invalid batchGet body: {e}")))?;
    let view = View::parse(request.view.as_deref(), false)?;

    if request.ids.is_empty() || request.ids.len() > BATCH_GET_MAX_IDS {
        return Err(ApiError(CoreError::InvalidRequest(format!(
            "ids must contain between 1 and {BATCH_GET_MAX_IDS} entries"
        ))));
    }

    let result = state.index.read().batch_get(&request.ids, &requester);
    Ok(Json(BatchGetBody {
        items: result.items.iter().map(|hit| view.render(hit)).collect(),
        omitted: result.omitted,
    }))
}

fn parse_sort(raw: Option<&str>) -> Result<SortOrder, CoreError> {
    match raw {
        None | Some("updated_at_desc") => Ok(SortOrder::UpdatedAtDesc),
        Some("none") => Ok(SortOrder::None),
        Some(other) => Err(CoreError::InvalidRequest(format!("unsupported sort '{other}'"))),
    }
}

fn parse_limit(raw: Option<&str>) -> Result<usize, CoreError> {
    let Some(raw) = raw else {
        return Ok(LIMIT_DEFAULT);
    };
    let limit: usize = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidRequest("limit must be an integer".to_string()))?;
    if !(1..=LIMIT_MAX).contains(&limit) {
        return Err(CoreError::InvalidRequest(format!(
            "limit must be between 1 and {LIMIT_MAX}"
        )));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit_bounds() {
        assert_eq!(parse_limit(None).unwrap(), 20);
        assert_eq!(parse_limit(Some("1")).unwrap(), 1);
        assert_eq!(parse_limit(Some("200")).unwrap(), 200);
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("201")).is_err());
        assert!(parse_limit(Some("abc")).is_err());
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(parse_sort(None).unwrap(), SortOrder::UpdatedAtDesc);
        assert_eq!(parse_sort(Some("updated_at_desc")).unwrap(), SortOrder::UpdatedAtDesc);
        assert_eq!(parse_sort(Some("none")).unwrap(), SortOrder::None);
        assert!(parse_sort(Some("score")).is_err());
    }
}
