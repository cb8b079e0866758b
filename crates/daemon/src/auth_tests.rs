// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::http::HeaderValue;
use yare::parameterized;

#[parameterized(
    exact = { "s3cret", true },
    wrong = { "s3cre7", false },
    prefix = { "s3c", false },
    empty = { "", false },
)]
fn secret_matching(candidate: &str, expected: bool) {
    assert_eq!(SharedSecret::new("s3cret").matches(candidate), expected);
}

#[test]
fn bearer_header_is_preferred_over_query() {
    let secret = SharedSecret::new("s3cret");
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_static("Bearer s3cret"),
    );
    assert!(secret.allows(&headers, Some("wrong")));

    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
    assert!(!secret.allows(&headers, Some("s3cret")));
}

#[test]
fn query_token_is_used_without_header() {
    let secret = SharedSecret::new("s3cret");
    let headers = HeaderMap::new();
    assert!(secret.allows(&headers, Some("s3cret")));
    assert!(!secret.allows(&headers, None));
}

#[test]
fn non_bearer_schemes_are_ignored() {
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
    assert_eq!(bearer_token(&headers), None);
}

#[test]
fn debug_output_hides_the_secret() {
    assert_eq!(format!("{:?}", SharedSecret::new("s3cret")), "SharedSecret(..)");
}
