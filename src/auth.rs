//! Bearer credential handling
//!
//! Token acquisition and renewal belong to an external identity provider;
//! this module only defines how an already-issued credential is attached to
//! outgoing requests. The header format stays behind a trait so deployments
//! with nonstandard schemes can swap it out.

use reqwest::RequestBuilder;
use zeroize::Zeroize;

/// Attaches the caller's credential to an outgoing request.
pub trait CredentialProvider: Send + Sync {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder;
}

/// An opaque bearer token sent as `Authorization: Bearer <token>`.
///
/// The token is cleared from memory when the provider is dropped.
pub struct StaticBearer {
    token: String,
}

impl StaticBearer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from an environment variable, if set and non-empty.
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var)
            .ok()
            .filter(|t| !t.is_empty())
            .map(Self::new)
    }
}

impl CredentialProvider for StaticBearer {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

impl Drop for StaticBearer {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}
