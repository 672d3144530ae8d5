use crate::api::auth::{handlers, models};
use crate::api::health;
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTH_TAG: &str = "Authentication API";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::ready_check,
        handlers::login,
        handlers::callback,
        handlers::refresh,
        handlers::me,
        handlers::logout,
    ),
    components(schemas(
        health::Health,
        models::RefreshResponse,
        models::MeResponse,
        models::UserInfo,
    )),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = AUTH_TAG, description = "OIDC login, token refresh and logout for the calendar frontend"),
    ),
    info(
        title = "Liturgical Calendar Auth API",
        description = "Cookie based OIDC authentication for the Liturgical Calendar frontend",
        version = "1.0.0"
    )
)]
pub(crate) struct ApiDoc;
