//! Bearer authentication for the subscription backend

use reqwest::header::{HeaderValue, AUTHORIZATION};

use crate::common::errors::{HedgeError, Result};

/// Bearer token attached to every backend request
#[derive(Clone)]
pub struct BearerAuth {
    header: HeaderValue,
}

impl BearerAuth {
    /// Build the authorization header for a session token
    ///
    /// Accepts the raw token or an already prefixed `Bearer ...` value.
    pub fn new(token: &str) -> Result<Self> {
        let trimmed = token.trim();
        let token = match trimmed.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            _ if trimmed.eq_ignore_ascii_case("bearer") => "",
            _ => trimmed,
        };
        if token.is_empty() {
            return Err(HedgeError::AuthRequired);
        }

        let mut header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| HedgeError::Configuration(format!("Invalid auth token: {}", e)))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }

    /// Add the authorization header to a reqwest RequestBuilder
    pub fn apply_to_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(AUTHORIZATION, self.header.clone())
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").field("header", &"<redacted>").finish()
    }
}
