//! Requester resolution from trusted headers.
//!
//! The daemon sits behind a gateway that authenticates callers and forwards
//! identity in headers. With `TRUSTED_HEADERS` off every request is
//! anonymous; with it on, an `authorization` or `x-subject` header implies
//! an authenticated caller and `x-groups` carries a comma-separated group
//! list.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

use crate::entry::Requester;

const SUBJECT_HEADER: &str = "x-subject";
const GROUPS_HEADER: &str = "x-groups";

pub fn requester_from_headers(headers: &HeaderMap, trusted: bool) -> Requester {
    if !trusted {
        return Requester::anonymous();
    }

    let subject = header_str(headers, SUBJECT_HEADER)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let is_authenticated = headers.contains_key(AUTHORIZATION) || subject.is_some();
    let groups = header_str(headers, GROUPS_HEADER).map(parse_groups).unwrap_or_default();

    Requester {
        is_authenticated,
        subject,
        groups,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Comma-separated list, trimmed and de-duplicated, first occurrence wins.
fn parse_groups(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for group in raw.split(',') {
        let group = group.trim();
        if group.is_empty() || out.iter().any(|seen| seen == group) {
            continue;
        }
        out.push(group.to_string());
    }
    out
}
