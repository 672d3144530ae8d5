//! HttpOnly cookies carrying the provider tokens

use crate::config::Settings;
use crate::oidc::TokenSet;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::response::{IntoResponseParts, ResponseParts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use http::request::Parts;
use log::warn;
use std::convert::Infallible;
use time::OffsetDateTime;

pub const ACCESS_TOKEN_COOKIE: &str = "litcal_access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "litcal_refresh_token";
pub const ID_TOKEN_COOKIE: &str = "litcal_id_token";

const TOKEN_COOKIES: [&str; 3] = [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, ID_TOKEN_COOKIE];

/// Attributes shared by every cookie this service sets
#[derive(Debug, Clone, PartialEq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub domain: Option<String>,
}

impl CookiePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            secure: !settings.is_development(),
            domain: settings
                .cookie_domain
                .clone()
                .filter(|domain| !domain.trim().is_empty()),
        }
    }
}

/// Absolute expiry (unix seconds) of each token cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenExpiries {
    pub access: i64,
    pub refresh: i64,
    pub id: i64,
}

impl TokenExpiries {
    /// Access expiry from `expires_in` (or the fallback lifetime), refresh
    /// expiry from the configured lifetime, ID expiry from the verified ID
    /// token `exp` or else the access expiry
    pub fn compute(
        tokens: &TokenSet,
        now: i64,
        access_fallback_lifetime: u64,
        refresh_lifetime: u64,
        id_token_exp: Option<i64>,
    ) -> Self {
        let access_lifetime = tokens.expires_in.unwrap_or(access_fallback_lifetime);
        let access = now.saturating_add(clamp_secs(access_lifetime));
        Self {
            access,
            refresh: now.saturating_add(clamp_secs(refresh_lifetime)),
            id: id_token_exp.unwrap_or(access),
        }
    }
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Per-request cookie context: the incoming cookies plus the `Set-Cookie`
/// changes accumulated while handling the request
#[derive(Debug, Clone)]
pub struct AuthCookies {
    jar: CookieJar,
    policy: CookiePolicy,
}

impl AuthCookies {
    pub fn new(jar: CookieJar, policy: CookiePolicy) -> Self {
        Self { jar, policy }
    }

    /// Current value of a cookie; cleared cookies read as absent
    pub fn get(&self, name: &str) -> Option<&str> {
        self.jar
            .get(name)
            .map(|cookie| cookie.value())
            .filter(|value| !value.is_empty())
    }

    /// Sets a cookie that expires at `expires_at` (unix seconds)
    pub fn set_auth_cookie(&mut self, name: &str, value: impl Into<String>, expires_at: i64) {
        let expires = OffsetDateTime::from_unix_timestamp(expires_at).unwrap_or_else(|e| {
            warn!("Cookie {} has an out of range expiry: {}", name, e);
            OffsetDateTime::UNIX_EPOCH
        });
        let mut cookie = self.cookie(name, value.into());
        cookie.set_expires(expires);
        self.add(cookie);
    }

    /// Overwrites a cookie with an empty, already expired one
    pub fn clear_auth_cookie(&mut self, name: &str) {
        let mut cookie = self.cookie(name, String::new());
        cookie.set_max_age(time::Duration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        self.add(cookie);
    }

    /// Sets one cookie per token present in `tokens`
    pub fn set_token_cookies(&mut self, tokens: &TokenSet, expiries: &TokenExpiries) {
        self.set_auth_cookie(ACCESS_TOKEN_COOKIE, tokens.access_token.as_str(), expiries.access);
        if let Some(refresh_token) = &tokens.refresh_token {
            self.set_auth_cookie(REFRESH_TOKEN_COOKIE, refresh_token.as_str(), expiries.refresh);
        }
        if let Some(id_token) = &tokens.id_token {
            self.set_auth_cookie(ID_TOKEN_COOKIE, id_token.as_str(), expiries.id);
        }
    }

    /// Clears the access, refresh and ID token cookies
    pub fn clear_token_cookies(&mut self) {
        for name in TOKEN_COOKIES {
            self.clear_auth_cookie(name);
        }
    }

    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    fn cookie(&self, name: &str, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::new(name.to_string(), value);
        cookie.set_http_only(true);
        cookie.set_secure(self.policy.secure);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_path("/");
        if let Some(domain) = &self.policy.domain {
            cookie.set_domain(domain.clone());
        }
        cookie
    }

    fn add(&mut self, cookie: Cookie<'static>) {
        let jar = std::mem::replace(&mut self.jar, CookieJar::new());
        self.jar = jar.add(cookie);
    }
}

impl FromRequestParts<AppState> for AuthCookies {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(Self::new(jar, state.cookie_policy.clone()))
    }
}

impl IntoResponseParts for AuthCookies {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.into_jar().into_response_parts(res)
    }
}
