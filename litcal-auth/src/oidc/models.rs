use super::OidcError;
use serde::Deserialize;

/// Raw token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Error body of a failed token request (RFC 6749 section 5.2)
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Tokens issued by the identity provider
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Access token lifetime in seconds, as reported by the provider
    pub expires_in: Option<u64>,
}

impl TryFrom<TokenResponse> for TokenSet {
    type Error = OidcError;

    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());

        let access_token = non_empty(response.access_token).ok_or(OidcError::MissingAccessToken)?;
        Ok(Self {
            access_token,
            refresh_token: non_empty(response.refresh_token),
            id_token: non_empty(response.id_token),
            expires_in: response.expires_in.filter(|secs| *secs > 0),
        })
    }
}

/// Optional parameters forwarded to the authorize endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizeParams {
    pub prompt: Option<String>,
    pub login_hint: Option<String>,
    pub ui_locales: Option<String>,
}

impl AuthorizeParams {
    pub(crate) fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("prompt", self.prompt.as_deref()),
            ("login_hint", self.login_hint.as_deref()),
            ("ui_locales", self.ui_locales.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|value| (name, value))
        })
    }
}

/// Result of a successful code exchange
#[derive(Debug, Clone)]
pub struct CodeExchange {
    pub tokens: TokenSet,
    /// Return-to URL stored with the login session, not yet re-validated
    pub return_to: Option<String>,
}
