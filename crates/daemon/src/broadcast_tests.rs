// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::HeaderValue;
use yare::parameterized;

#[parameterized(
    plain = { Some("42"), Some(42) },
    padded = { Some(" 7 "), Some(7) },
    garbage = { Some("abc"), None },
    negative = { Some("-1"), None },
    absent = { None, None },
)]
fn last_event_id_header(value: Option<&'static str>, expected: Option<u64>) {
    let mut headers = HeaderMap::new();
    if let Some(value) = value {
        headers.insert("last-event-id", HeaderValue::from_static(value));
    }
    assert_eq!(last_event_id(&headers), expected);
}
