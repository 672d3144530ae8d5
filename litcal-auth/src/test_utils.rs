use crate::config::Settings;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use axum_extra::extract::cookie::Cookie;
use http::header::{COOKIE, LOCATION, SET_COOKIE};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;

/// Client id of the test settings, also the expected token audience
pub const TEST_CLIENT_ID: &str = "litcal-frontend";

const TEST_KEY_ID: &str = "test-key";
const TEST_PRIVATE_KEY: &str = include_str!("../fixtures/test-keys/rsa-private.pem");
const TEST_JWKS: &str = include_str!("../fixtures/test-keys/jwks.json");

/// Test fixture for setting up a complete test environment with a mocked
/// identity provider.
///
/// The provider mock serves the signing keys at `/oauth/v2/keys` from the
/// start; token endpoint responses are mounted per test.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     fixture
///         .mount_token_response(200, json!({"access_token": "at", "expires_in": 300}))
///         .await;
///
///     let response = fixture
///         .post_with_cookies("/auth/refresh", &[("litcal_refresh_token", "rt")])
///         .await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub settings: Settings,
    /// Shared state, for inspecting the session store
    pub state: AppState,
    /// Mock server standing in for the identity provider
    pub provider_mock: MockServer,
}

impl TestFixture {
    /// Creates a new test fixture with fully configured OIDC settings
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    /// Creates a test fixture after letting `modify` adjust the settings
    pub async fn with_settings(modify: impl FnOnce(&mut Settings)) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let provider_mock = MockServer::start().await;
        mount_jwks(&provider_mock).await;

        let mut settings = Settings::for_test_with_provider(&provider_mock);
        modify(&mut settings);

        let state = AppState::for_testing(&settings);
        let app = create_app(state.clone()).await;

        Self {
            app,
            settings,
            state,
            provider_mock,
        }
    }

    /// Initializes the test logger with customized settings.
    ///
    /// Called by the constructors with `Debug`, repeated calls are ignored.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder carrying the given cookies
    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        cookies: &[(&str, &str)],
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(COOKIE, header);
        }
        builder
    }

    /// Sends a GET request without cookies
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_with_cookies(uri, &[]).await
    }

    /// Sends a GET request with the given cookies
    pub async fn get_with_cookies(
        &self,
        uri: impl AsRef<str>,
        cookies: &[(&str, &str)],
    ) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, cookies)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with an empty body and the given cookies
    pub async fn post_with_cookies(
        &self,
        uri: impl AsRef<str>,
        cookies: &[(&str, &str)],
    ) -> TestResponse {
        let request = self
            .request_builder(Method::POST, uri, cookies)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    ///
    /// The body is kept as text, and parsed as JSON when possible.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };
        let text = String::from_utf8_lossy(&body).into_owned();

        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }

    /// Mounts a response for the provider token endpoint.
    ///
    /// Each call adds another mock; wiremock answers with the first one mounted.
    pub async fn mount_token_response(&self, status_code: u16, body: impl Serialize) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(body))
            .mount(&self.provider_mock)
            .await;
    }

    /// Token endpoint mock that must be called exactly `expected_calls` times
    pub async fn expect_token_requests(
        &self,
        status_code: u16,
        body: impl Serialize,
        expected_calls: u64,
    ) {
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/oauth/v2/token"))
            .respond_with(ResponseTemplate::new(status_code).set_body_json(body))
            .expect(expected_calls)
            .mount(&self.provider_mock)
            .await;
    }

    /// Issuer the fixture's tokens must carry
    pub fn issuer(&self) -> String {
        self.provider_mock.uri()
    }
}

/// Response from a test request that provides convenient access to status,
/// headers and body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
    /// Raw response body
    pub text: String,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {} with body: {}",
            expected, self.status, self.text
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Asserts a 302 and returns the parsed `Location`
    pub fn assert_redirect(&self) -> Url {
        self.assert_status(StatusCode::FOUND);
        let location = self
            .headers
            .get(LOCATION)
            .expect("Redirect without Location header")
            .to_str()
            .expect("Location is not valid UTF-8");
        Url::parse(location).expect("Location is not an absolute URL")
    }

    /// Every `Set-Cookie` of the response, parsed
    pub fn set_cookies(&self) -> Vec<Cookie<'static>> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| {
                let value = value.to_str().expect("Set-Cookie is not valid UTF-8");
                Cookie::parse(value.to_string()).expect("Invalid Set-Cookie header")
            })
            .collect()
    }

    /// The `Set-Cookie` for `name`, if any
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.set_cookies()
            .into_iter()
            .find(|cookie| cookie.name() == name)
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}

/// Serves the test signing keys at `/oauth/v2/keys`
pub async fn mount_jwks(provider: &MockServer) {
    let jwks: Value = serde_json::from_str(TEST_JWKS).expect("Invalid test JWKS");
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/oauth/v2/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
        .mount(provider)
        .await;
}

/// Claims of a typical calendar editor, as the provider would issue them
pub fn test_claims(issuer: &str, exp: i64) -> Value {
    json!({
        "sub": "user-123",
        "email": "jane@example.org",
        "name": "Jane Doe",
        "given_name": "Jane",
        "family_name": "Doe",
        "preferred_username": "jane",
        "iss": issuer,
        "aud": [TEST_CLIENT_ID],
        "iat": exp - 3600,
        "exp": exp,
        "urn:zitadel:iam:org:project:roles": {
            "calendar_editor": {"org-1": "example.org"},
            "admin": {"org-1": "example.org"}
        }
    })
}

/// RS256 token signed with the key published by [`mount_jwks`]
pub fn sign_token(claims: &Value) -> String {
    sign_token_with_key(claims, TEST_PRIVATE_KEY)
}

/// RS256 token claiming the test key id, signed with `private_key_pem`
pub fn sign_token_with_key(claims: &Value, private_key_pem: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KEY_ID.to_string());
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).expect("Invalid test key");
    encode(&header, claims, &key).expect("Failed to sign test token")
}
