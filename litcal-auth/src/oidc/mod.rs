//! OpenID Connect authorization code flow against Zitadel

pub mod client;
pub mod jwks;
pub mod models;
pub mod pkce;
pub mod verify;

pub use client::OidcClient;
pub use models::{AuthorizeParams, CodeExchange, TokenSet};
pub use verify::{VerifiedClaims, VerifyError};

use crate::session::SessionError;
use thiserror::Error;

/// Errors of the authorization code, refresh and logout flows
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("OIDC is not configured")]
    NotConfigured,
    #[error("State mismatch or missing login session")]
    StateMismatch,
    #[error("Token response did not contain an access token")]
    MissingAccessToken,
    #[error("Request to the identity provider failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Identity provider returned {status}: {error}{}", describe(.description))]
    Provider {
        status: u16,
        error: String,
        description: Option<String>,
        invalid_grant: bool,
    },
    #[error("Invalid response from the identity provider: {0}")]
    InvalidResponse(String),
    #[error("Session store error: {0}")]
    Session(#[from] SessionError),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|description| format!(" ({description})"))
        .unwrap_or_default()
}

impl OidcError {
    /// Whether the provider rejected the grant itself, so only a new login helps
    pub fn is_invalid_grant(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                invalid_grant: true,
                ..
            }
        )
    }

    /// Whether the provider (or the way to it) failed, as opposed to a local fault
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Provider { .. } | Self::InvalidResponse(_)
        )
    }
}
