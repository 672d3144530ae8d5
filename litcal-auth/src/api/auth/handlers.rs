use super::models::{CallbackQuery, LoginQuery, LogoutQuery, MeResponse, RefreshResponse};
use crate::cookies::{
    AuthCookies, TokenExpiries, ACCESS_TOKEN_COOKIE, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::errors::ApiError;
use crate::oidc::{CodeExchange, OidcError, TokenSet, VerifyError};
use crate::openapi::AUTH_TAG;
use crate::redirect::{return_to_or_frontend, safe_return_to};
use crate::session::SessionHandle;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use http::header::{ALLOW, CONTENT_TYPE, LOCATION};
use log::{debug, error, info, warn};
use url::Url;

const MAX_ERROR_LEN: usize = 64;
const MAX_ERROR_DESCRIPTION_LEN: usize = 200;

/// 302 Found; axum's `Redirect` only produces 303, 307 and 308
fn found(cookies: AuthCookies, location: &Url) -> Response {
    (
        StatusCode::FOUND,
        cookies,
        [(LOCATION, location.as_str().to_string())],
    )
        .into_response()
}

/// `{frontend}/?auth_error=..&error_description=..`, setting no cookies
fn auth_error_redirect(frontend: &Url, error: &str, description: &str) -> Response {
    let mut location = frontend.clone();
    let path = format!("{}/", frontend.path().trim_end_matches('/'));
    location.set_path(&path);
    location.set_fragment(None);
    location
        .query_pairs_mut()
        .clear()
        .append_pair("auth_error", &truncate(error, MAX_ERROR_LEN))
        .append_pair(
            "error_description",
            &truncate(description, MAX_ERROR_DESCRIPTION_LEN),
        );
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Cookie expiries for a fresh token set
async fn token_expiries(state: &AppState, tokens: &TokenSet) -> TokenExpiries {
    let config = state.oidc.config();
    let mut expiries = TokenExpiries::compute(
        tokens,
        Utc::now().timestamp(),
        config.access_token_lifetime,
        config.refresh_token_lifetime,
        None,
    );
    if let Some(id_token) = &tokens.id_token {
        expiries.id = state.oidc.id_token_expiry(id_token, expiries.access).await;
    }
    expiries
}

/// Error message followed by its chain of sources
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        report.push_str("\nCaused by: ");
        report.push_str(&cause.to_string());
        source = cause.source();
    }
    report
}

/// Start the authorization code flow
#[utoipa::path(
    get,
    path = "/auth/login",
    tag = AUTH_TAG,
    params(LoginQuery),
    responses(
        (status = 302, description = "Redirect to the identity provider"),
        (status = 500, description = "Login could not be started"),
        (status = 503, description = "Authentication not configured")
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    mut cookies: AuthCookies,
    Query(query): Query<LoginQuery>,
) -> Response {
    if !state.oidc.is_configured() {
        return ApiError::not_configured().into_response();
    }

    let cookie_name = state.settings.session.cookie_name.as_str();
    let session = SessionHandle::from_cookie(cookies.get(cookie_name));
    if session.is_new {
        debug!("Starting a new login session");
    }
    let return_to = query
        .return_to
        .as_deref()
        .and_then(|candidate| safe_return_to(candidate, &state.frontend));

    match state
        .oidc
        .authorization_url(
            &state.sessions,
            &session.id,
            &query.authorize_params(),
            return_to.as_ref(),
        )
        .await
    {
        Ok(url) => {
            let ttl = i64::try_from(state.settings.session.ttl).unwrap_or(i64::MAX);
            cookies.set_auth_cookie(
                cookie_name,
                session.id,
                Utc::now().timestamp().saturating_add(ttl),
            );
            info!("Redirecting to the identity provider for login");
            found(cookies, &url)
        }
        Err(e) => {
            error!("Failed to start login: {}", e);
            ApiError::internal("Failed to start login")
                .with_message("Please try again later")
                .into_response()
        }
    }
}

/// Redirect target of the identity provider
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = AUTH_TAG,
    params(CallbackQuery),
    responses(
        (status = 302, description = "Logged in, or redirected to the frontend with auth_error"),
        (status = 500, description = "Internal error, development mode only"),
        (status = 503, description = "Authentication not configured")
    )
)]
pub(crate) async fn callback(
    State(state): State<AppState>,
    cookies: AuthCookies,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if !state.oidc.is_configured() {
        return ApiError::not_configured().into_response();
    }

    if let Some(error) = non_empty(&query.error) {
        warn!("Identity provider returned an error: {}", error);
        let description = query.error_description.as_deref().unwrap_or_default();
        return auth_error_redirect(&state.frontend, error, description);
    }

    let (Some(code), Some(returned_state)) = (non_empty(&query.code), non_empty(&query.state))
    else {
        warn!("Callback without code or state");
        return auth_error_redirect(
            &state.frontend,
            "invalid_request",
            "Missing authorization code or state",
        );
    };

    let cookie_name = state.settings.session.cookie_name.clone();
    let Some(session_id) = cookies.get(&cookie_name).map(str::to_string) else {
        warn!("Callback without a session cookie");
        return auth_error_redirect(&state.frontend, "invalid_state", "Login session not found");
    };

    match state
        .oidc
        .exchange_code(&state.sessions, &session_id, code, returned_state)
        .await
    {
        Ok(exchange) => complete_login(&state, cookies, &session_id, exchange).await,
        Err(OidcError::StateMismatch) => auth_error_redirect(
            &state.frontend,
            "invalid_state",
            "State mismatch, please try logging in again",
        ),
        Err(OidcError::MissingAccessToken) => {
            error!("Token response did not contain an access token");
            auth_error_redirect(&state.frontend, "token_error", "No access token received")
        }
        Err(e) if e.is_upstream() => {
            error!("Token exchange failed: {}", e);
            auth_error_redirect(
                &state.frontend,
                "token_exchange_failed",
                "Could not complete login with the identity provider",
            )
        }
        Err(e) => {
            error!("Callback failed: {}", error_chain(&e));
            if state.settings.is_development() {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                    error_chain(&e),
                )
                    .into_response()
            } else {
                auth_error_redirect(
                    &state.frontend,
                    "callback_error",
                    "Login could not be completed",
                )
            }
        }
    }
}

async fn complete_login(
    state: &AppState,
    mut cookies: AuthCookies,
    session_id: &str,
    exchange: CodeExchange,
) -> Response {
    let expiries = token_expiries(state, &exchange.tokens).await;
    cookies.set_token_cookies(&exchange.tokens, &expiries);

    // the stored value was validated at login, the frontend origin may have changed since
    let target = return_to_or_frontend(exchange.return_to.as_deref(), &state.frontend);

    if let Err(e) = state.sessions.destroy(session_id).await {
        warn!("Failed to destroy login session: {}", e);
    }
    cookies.clear_auth_cookie(&state.settings.session.cookie_name);

    info!("Login completed");
    found(cookies, &target)
}

/// Exchange the refresh token cookie for new tokens
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = AUTH_TAG,
    responses(
        (status = 200, description = "Tokens refreshed", body = RefreshResponse),
        (status = 401, description = "No refresh token, or the refresh failed"),
        (status = 405, description = "Method not allowed"),
        (status = 503, description = "Authentication not configured")
    )
)]
pub(crate) async fn refresh(State(state): State<AppState>, mut cookies: AuthCookies) -> Response {
    let Some(refresh_token) = cookies.get(REFRESH_TOKEN_COOKIE).map(str::to_string) else {
        return ApiError::unauthorized("No refresh token").into_response();
    };
    if !state.oidc.is_configured() {
        return ApiError::not_configured().into_response();
    }

    match state.oidc.refresh_token(&refresh_token).await {
        Ok(tokens) => {
            let expiries = token_expiries(&state, &tokens).await;
            cookies.set_token_cookies(&tokens, &expiries);
            let body = RefreshResponse {
                success: true,
                expires_in: tokens
                    .expires_in
                    .unwrap_or(state.oidc.config().access_token_lifetime),
                expires_at: expiries.access,
            };
            info!("Tokens refreshed");
            (cookies, Json(body)).into_response()
        }
        Err(e) => {
            if e.is_invalid_grant() {
                info!("Refresh token rejected by the identity provider: {}", e);
            } else {
                error!("Token refresh failed: {}", e);
            }
            cookies.clear_token_cookies();
            (cookies, ApiError::unauthorized("Token refresh failed")).into_response()
        }
    }
}

/// Any method other than POST on `/auth/refresh`
pub(crate) async fn refresh_method_not_allowed() -> Response {
    (
        [(ALLOW, "POST")],
        ApiError::method_not_allowed("Use POST"),
    )
        .into_response()
}

/// Identity of the caller, from the access token cookie
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = AUTH_TAG,
    responses(
        (status = 200, description = "Authentication status of the caller", body = MeResponse),
        (status = 503, description = "Authentication not configured", body = MeResponse)
    )
)]
pub(crate) async fn me(State(state): State<AppState>, cookies: AuthCookies) -> Response {
    let Some(token) = cookies.get(ACCESS_TOKEN_COOKIE) else {
        return Json(MeResponse::anonymous()).into_response();
    };
    let verifier = match state.oidc.verifier() {
        Ok(verifier) if state.oidc.is_configured() => verifier,
        _ => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(MeResponse::error("Authentication not configured")),
            )
                .into_response()
        }
    };

    let now = Utc::now().timestamp();
    let body = match verifier.verify_at(token, now).await {
        Ok(claims) => {
            let roles = claims.roles(&state.oidc.config().roles_claim);
            MeResponse::authenticated(&claims, roles, now)
        }
        Err(VerifyError::Expired) => MeResponse::should_refresh(),
        Err(e @ VerifyError::Jwks(_)) => {
            error!("Token validation failed: {}", e);
            MeResponse::error(e.client_message())
        }
        Err(e) => {
            warn!("Rejected access token: {}", e);
            MeResponse::error(e.client_message())
        }
    };
    Json(body).into_response()
}

/// Clear the auth cookies and optionally end the provider session
#[utoipa::path(
    get,
    path = "/auth/logout",
    tag = AUTH_TAG,
    params(LogoutQuery),
    responses(
        (status = 302, description = "Redirect to the frontend or the provider end-session endpoint")
    )
)]
pub(crate) async fn logout(
    State(state): State<AppState>,
    mut cookies: AuthCookies,
    Query(query): Query<LogoutQuery>,
) -> Response {
    // read before clearing
    let id_token_hint = cookies.get(ID_TOKEN_COOKIE).map(str::to_string);
    cookies.clear_token_cookies();

    let cookie_name = state.settings.session.cookie_name.clone();
    if let Some(session_id) = cookies.get(&cookie_name).map(str::to_string) {
        if let Err(e) = state.sessions.destroy(&session_id).await {
            error!("Failed to destroy session on logout: {}", e);
        }
    }
    cookies.clear_auth_cookie(&cookie_name);

    if query.end_provider_session() && state.oidc.is_configured() {
        // the provider only accepts the registered post-logout URI
        match state
            .oidc
            .logout_url(id_token_hint.as_deref(), &state.settings.frontend_url)
        {
            Ok(url) => {
                info!("Logged out, ending the provider session");
                return found(cookies, &url);
            }
            Err(e) => error!("Failed to build end-session URL: {}", e),
        }
    }

    let target = return_to_or_frontend(query.return_to.as_deref(), &state.frontend);
    info!("Logged out locally");
    found(cookies, &target)
}
