// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-secret checks for every network surface

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};

/// The configured shared secret, kept only as a digest.
///
/// Candidates are hashed before comparison so the time taken does not
/// depend on how much of the secret was guessed right.
#[derive(Clone)]
pub struct SharedSecret {
    digest: [u8; 32],
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        digest
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Accept a bearer token, falling back to a query-string token.
    pub fn allows(&self, headers: &HeaderMap, query_token: Option<&str>) -> bool {
        bearer_token(headers)
            .or(query_token)
            .is_some_and(|token| self.matches(token))
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
