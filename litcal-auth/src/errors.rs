use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use serde_json::json;

/// Message returned alongside every "log in again" failure
pub const RELOGIN_MESSAGE: &str = "Please log in again";

#[derive(Debug, Clone)]
pub struct ApiError {
    pub error: String,
    pub message: Option<String>,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with an error label and status code
    pub fn new<S: ToString>(error: S, status_code: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            message: None,
            status_code,
        }
    }

    /// Attach a human readable message
    pub fn with_message<S: ToString>(mut self, message: S) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Create new Internal Server Error (500) with an error label
    pub fn internal<S: ToString>(error: S) -> Self {
        Self::new(error, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Unauthorized (401) asking the caller to log in again
    pub fn unauthorized<S: ToString>(error: S) -> Self {
        Self::new(error, StatusCode::UNAUTHORIZED).with_message(RELOGIN_MESSAGE)
    }

    /// 503 returned by every auth endpoint while OIDC settings are incomplete
    pub fn not_configured() -> Self {
        Self::new("Authentication not configured", StatusCode::SERVICE_UNAVAILABLE)
            .with_message("The identity provider settings are incomplete")
    }

    /// Create new Method Not Allowed (405)
    pub fn method_not_allowed<S: ToString>(message: S) -> Self {
        Self::new("Method not allowed", StatusCode::METHOD_NOT_ALLOWED).with_message(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = match self.message {
            Some(message) => json!({
                "error": self.error,
                "message": message,
            }),
            None => json!({
                "error": self.error,
            }),
        };
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let (status, body) = body_json(ApiError::unauthorized("No refresh token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"error": "No refresh token", "message": "Please log in again"})
        );
    }

    #[tokio::test]
    async fn test_error_without_message() {
        let (status, body) = body_json(ApiError::internal("Failed to start login")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to start login"}));
    }
}
