use crate::oidc::{AuthorizeParams, VerifiedClaims};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters of `/auth/login`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct LoginQuery {
    /// Same-origin URL to return to after login
    pub return_to: Option<String>,
    /// Forwarded to the provider, e.g. `login` or `create`
    pub prompt: Option<String>,
    /// Forwarded to the provider to prefill the login name
    pub login_hint: Option<String>,
    /// Forwarded to the provider to pick the UI language
    pub ui_locales: Option<String>,
}

impl LoginQuery {
    pub fn authorize_params(&self) -> AuthorizeParams {
        AuthorizeParams {
            prompt: self.prompt.clone(),
            login_hint: self.login_hint.clone(),
            ui_locales: self.ui_locales.clone(),
        }
    }
}

/// Query parameters the provider sends back to `/auth/callback`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Query parameters of `/auth/logout`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct LogoutQuery {
    /// Same-origin URL to return to, ignored when the provider session is ended
    pub return_to: Option<String>,
    /// Also end the provider session (default: true)
    pub zitadel: Option<String>,
}

impl LogoutQuery {
    pub fn end_provider_session(&self) -> bool {
        !matches!(
            self.zitadel.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("false" | "0" | "no" | "off")
        )
    }
}

/// Successful refresh
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub(crate) struct RefreshResponse {
    pub success: bool,
    /// Lifetime of the new access token in seconds
    pub expires_in: u64,
    /// Unix timestamp at which the new access token expires
    pub expires_at: i64,
}

/// Identity of the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub(crate) struct UserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub preferred_username: Option<String>,
}

impl From<&VerifiedClaims> for UserInfo {
    fn from(claims: &VerifiedClaims) -> Self {
        Self {
            sub: claims.sub.clone(),
            email: claims.email.clone(),
            name: claims.name.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            preferred_username: claims.preferred_username.clone(),
        }
    }
}

/// Answer of `/auth/me`
#[derive(Debug, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub(crate) struct MeResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_refresh: Option<bool>,
}

impl MeResponse {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn should_refresh() -> Self {
        Self {
            should_refresh: Some(true),
            ..Self::default()
        }
    }

    pub fn authenticated(claims: &VerifiedClaims, roles: Vec<String>, now: i64) -> Self {
        Self {
            authenticated: true,
            user: Some(UserInfo::from(claims)),
            roles: Some(roles),
            expires_at: Some(claims.exp),
            token_remaining: Some(claims.exp - now),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_logout_query_flag() {
        let query = |value: Option<&str>| LogoutQuery {
            return_to: None,
            zitadel: value.map(str::to_string),
        };
        assert!(query(None).end_provider_session());
        assert!(query(Some("true")).end_provider_session());
        assert!(query(Some("1")).end_provider_session());
        assert!(!query(Some("false")).end_provider_session());
        assert!(!query(Some("FALSE")).end_provider_session());
        assert!(!query(Some("0")).end_provider_session());
    }

    #[test]
    fn test_me_response_shapes() {
        assert_eq!(
            serde_json::to_value(MeResponse::anonymous()).unwrap(),
            json!({"authenticated": false})
        );
        assert_eq!(
            serde_json::to_value(MeResponse::should_refresh()).unwrap(),
            json!({"authenticated": false, "should_refresh": true})
        );
        assert_eq!(
            serde_json::to_value(MeResponse::error("Invalid token")).unwrap(),
            json!({"authenticated": false, "error": "Invalid token"})
        );
    }
}
