use super::jwks::JwksCache;
use super::models::{
    AuthorizeParams, CodeExchange, ProviderErrorBody, TokenResponse, TokenSet,
};
use super::pkce;
use super::verify::{TokenVerifier, VerifiedClaims, VerifyError};
use super::OidcError;
use crate::config::OidcConfig;
use crate::session::{LoginSession, SessionStore};
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use url::Url;

const AUTHORIZE_PATH: &str = "/oauth/v2/authorize";
const TOKEN_PATH: &str = "/oauth/v2/token";
const JWKS_PATH: &str = "/oauth/v2/keys";
const END_SESSION_PATH: &str = "/oidc/v1/end_session";

/// Client for the Zitadel endpoints used by the front end
#[derive(Clone)]
pub struct OidcClient {
    config: OidcConfig,
    http: Client,
    verifier: Option<TokenVerifier>,
}

impl OidcClient {
    pub fn new(config: OidcConfig, http: Client) -> Self {
        let verifier = match (config.endpoint(JWKS_PATH), &config.issuer, &config.client_id) {
            (Some(jwks_uri), Some(issuer), Some(client_id)) => Some(TokenVerifier::new(
                JwksCache::new(http.clone(), config.jwks_cache_ttl),
                jwks_uri,
                issuer.clone(),
                client_id.clone(),
            )),
            _ => None,
        };

        Self {
            config,
            http,
            verifier,
        }
    }

    /// Whether issuer, client id, client secret and redirect URI are all set
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url, OidcError> {
        let endpoint = self.config.endpoint(path).ok_or(OidcError::NotConfigured)?;
        Ok(Url::parse(&endpoint)?)
    }

    fn client_id(&self) -> Result<&str, OidcError> {
        self.config.client_id.as_deref().ok_or(OidcError::NotConfigured)
    }

    fn redirect_uri(&self) -> Result<&str, OidcError> {
        self.config
            .redirect_uri
            .as_deref()
            .ok_or(OidcError::NotConfigured)
    }

    /// Builds the authorize URL and records the login attempt in the session.
    ///
    /// `return_to` must already be validated against the frontend origin.
    pub async fn authorization_url(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        params: &AuthorizeParams,
        return_to: Option<&Url>,
    ) -> Result<Url, OidcError> {
        if !self.is_configured() {
            return Err(OidcError::NotConfigured);
        }

        let state = pkce::generate_state();
        let code_verifier = self.config.use_pkce.then(pkce::code_verifier);

        let mut url = self.endpoint(AUTHORIZE_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", self.client_id()?)
                .append_pair("redirect_uri", self.redirect_uri()?)
                .append_pair("scope", &self.config.get_scopes().join(" "))
                .append_pair("state", &state);
            if let Some(verifier) = &code_verifier {
                query
                    .append_pair("code_challenge", &pkce::code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }
            for (name, value) in params.pairs() {
                query.append_pair(name, value);
            }
        }

        let session = LoginSession {
            state,
            code_verifier,
            return_to: return_to.map(Url::to_string),
            created_at: Utc::now().timestamp(),
        };
        sessions.save_login(session_id, &session).await?;

        debug!("Prepared authorization request");
        Ok(url)
    }

    /// Exchanges an authorization code after checking `state` against the
    /// login session. The stored state is consumed either way.
    pub async fn exchange_code(
        &self,
        sessions: &SessionStore,
        session_id: &str,
        code: &str,
        state: &str,
    ) -> Result<CodeExchange, OidcError> {
        if !self.is_configured() {
            return Err(OidcError::NotConfigured);
        }

        let Some(session) = sessions.load_login(session_id).await? else {
            warn!("Callback without a pending login session");
            return Err(OidcError::StateMismatch);
        };
        sessions.destroy(session_id).await?;

        if session.state != state {
            warn!("Callback state does not match the login session");
            return Err(OidcError::StateMismatch);
        }

        let redirect_uri = self.redirect_uri()?;
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(verifier) = session.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }

        // authorization codes are single-use, never retry this request
        let tokens = self.token_request(&form).await?;
        info!("Authorization code exchanged");
        Ok(CodeExchange {
            tokens,
            return_to: session.return_to,
        })
    }

    /// Uses a refresh token to obtain a new token set
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, OidcError> {
        if !self.is_configured() {
            return Err(OidcError::NotConfigured);
        }

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&form).await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, OidcError> {
        let response = self
            .http
            .post(self.endpoint(TOKEN_PATH)?)
            .basic_auth(self.client_id()?, self.config.client_secret.as_deref())
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let parsed: ProviderErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let error = parsed.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(OidcError::Provider {
                status: status.as_u16(),
                invalid_grant: error == "invalid_grant",
                error,
                description: parsed.error_description,
            });
        }

        let raw: TokenResponse =
            serde_json::from_str(&body).map_err(|e| OidcError::InvalidResponse(e.to_string()))?;
        TokenSet::try_from(raw)
    }

    /// Builds the end-session URL.
    ///
    /// `post_logout_redirect_uri` is sent verbatim; the provider compares it
    /// with the registered URI as a string.
    pub fn logout_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Result<Url, OidcError> {
        let mut url = self.endpoint(END_SESSION_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", self.client_id()?);
            if let Some(hint) = id_token_hint.filter(|hint| !hint.is_empty()) {
                query.append_pair("id_token_hint", hint);
            }
            query.append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        }
        Ok(url)
    }

    /// Verifier for access and ID tokens
    pub fn verifier(&self) -> Result<&TokenVerifier, OidcError> {
        self.verifier.as_ref().ok_or(OidcError::NotConfigured)
    }

    /// Verifies an access token
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedClaims, VerifyError> {
        match &self.verifier {
            Some(verifier) => verifier.verify(token).await,
            None => Err(VerifyError::KeyNotFound),
        }
    }

    /// `exp` of a verified ID token, `fallback` when it cannot be verified
    pub async fn id_token_expiry(&self, id_token: &str, fallback: i64) -> i64 {
        match self.verify_token(id_token).await {
            Ok(claims) => claims.exp,
            Err(e) => {
                warn!("Could not verify ID token, using fallback expiry: {}", e);
                fallback
            }
        }
    }
}
