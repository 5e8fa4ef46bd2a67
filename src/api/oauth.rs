//! OAuth2 endpoint operations against the TIDAL authorization server
//!
//! Defines the narrow collaborator interface ([`TidalOAuth`]) consumed by the
//! authorization flow, the refresh scheduler, and the coordinator, plus the
//! production implementation [`TidalOAuthClient`] that speaks to TIDAL's real
//! endpoints over reqwest.
//!
//! Only the authorization-code and refresh-token grants are implemented;
//! this is not a general-purpose OAuth2 client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use url::Url;

use crate::auth::credentials::Credentials;
use crate::error::{Result, TidalSessionError};

/// Default base for the user-facing login/authorize page.
pub const DEFAULT_LOGIN_BASE: &str = "https://login.tidal.com";
/// Default base for the token endpoint.
pub const DEFAULT_AUTH_BASE: &str = "https://auth.tidal.com/v1/oauth2";
/// Default base for the resource API.
pub const DEFAULT_API_BASE: &str = "https://openapi.tidal.com/v2";

// ---------------------------------------------------------------------------
// TidalOAuth trait
// ---------------------------------------------------------------------------

/// Narrow interface to the vendor's authorization server and profile
/// endpoint.
///
/// Implementations must not retain per-call state; every operation is
/// self-contained so callers can serialize or interleave them freely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TidalOAuth: Send + Sync {
    /// Builds the login URL the user must visit to authorize the
    /// application. `scope` is the space-delimited scope list as it appears
    /// on the wire.
    async fn build_login_url(
        &self,
        redirect_uri: &str,
        scope: &str,
        state: &str,
    ) -> Result<Url>;

    /// Exchanges an authorization code for a credential triple.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credentials>;

    /// Exchanges a refresh token for a new credential triple.
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials>;

    /// Fetches the profile of the user the access token belongs to.
    async fn current_user(&self, access_token: &str) -> Result<UserProfile>;
}

// ---------------------------------------------------------------------------
// UserProfile
// ---------------------------------------------------------------------------

/// The authenticated user's profile as returned by `GET /users/me`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable user identifier.
    pub id: String,

    /// Display username, when the account has one.
    pub username: Option<String>,

    /// Account email address.
    pub email: Option<String>,

    /// ISO 3166-1 country code of the account.
    pub country: Option<String>,
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON response from the token endpoint.
///
/// Used only inside [`TidalOAuthClient`] to deserialize the response before
/// converting it into the canonical [`Credentials`].
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

impl TokenResponse {
    /// Converts the raw response into [`Credentials`].
    ///
    /// `expires_in` seconds become an absolute epoch-second `expires_at`.
    /// A response that omits `refresh_token` (common on refresh grants)
    /// falls back to `previous_refresh_token`.
    fn into_credentials(self, previous_refresh_token: Option<&str>) -> Result<Credentials> {
        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string))
            .ok_or_else(|| {
                TidalSessionError::TokenExchange(
                    "token response contained no refresh token".to_string(),
                )
            })?;

        Ok(Credentials {
            access_token: self.access_token,
            refresh_token,
            expires_at: Utc::now().timestamp() + self.expires_in,
        })
    }
}

// ---------------------------------------------------------------------------
// JSON:API profile document (raw deserialization)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserDocument {
    data: UserResource,
}

#[derive(Debug, Deserialize)]
struct UserResource {
    id: String,
    #[serde(default)]
    attributes: UserAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct UserAttributes {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

// ---------------------------------------------------------------------------
// TidalOAuthClient
// ---------------------------------------------------------------------------

/// Production [`TidalOAuth`] implementation over reqwest.
///
/// Client authentication uses HTTP basic auth on the token endpoint, as
/// TIDAL requires for confidential clients. The endpoint bases are
/// constructor parameters so tests and local mocks can redirect them.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tidal_session::api::oauth::TidalOAuthClient;
///
/// let client = TidalOAuthClient::new(
///     Arc::new(reqwest::Client::new()),
///     "client-id",
///     "client-secret",
/// );
/// ```
pub struct TidalOAuthClient {
    http: Arc<reqwest::Client>,
    client_id: String,
    client_secret: String,
    login_base: Url,
    auth_base: Url,
    api_base: Url,
}

impl std::fmt::Debug for TidalOAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TidalOAuthClient")
            .field("client_id", &self.client_id)
            .field("login_base", &self.login_base)
            .field("auth_base", &self.auth_base)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TidalOAuthClient {
    /// Creates a client against TIDAL's production endpoints.
    pub fn new(
        http: Arc<reqwest::Client>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            login_base: Url::parse(DEFAULT_LOGIN_BASE).expect("default login base parses"),
            auth_base: Url::parse(DEFAULT_AUTH_BASE).expect("default auth base parses"),
            api_base: Url::parse(DEFAULT_API_BASE).expect("default api base parses"),
        }
    }

    /// Overrides the login page base URL. Useful for tests and local mocks.
    pub fn with_login_base(mut self, base: Url) -> Self {
        self.login_base = base;
        self
    }

    /// Overrides the token endpoint base URL. Useful for tests and local
    /// mocks.
    pub fn with_auth_base(mut self, base: Url) -> Self {
        self.auth_base = base;
        self
    }

    /// Overrides the resource API base URL. Useful for tests and local
    /// mocks.
    pub fn with_api_base(mut self, base: Url) -> Self {
        self.api_base = base;
        self
    }

    fn token_endpoint(&self) -> Result<Url> {
        join_path(&self.auth_base, "token")
    }

    /// POSTs `params` to the token endpoint and parses the response.
    ///
    /// `kind` selects the error variant for non-success statuses so exchange
    /// and refresh failures stay distinguishable to callers.
    async fn token_request(
        &self,
        params: &HashMap<&str, &str>,
        previous_refresh_token: Option<&str>,
        kind: TokenErrorKind,
    ) -> Result<Credentials> {
        let resp = self
            .http
            .post(self.token_endpoint()?)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| kind.error(format!("token endpoint request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(kind.error(format!("token endpoint returned {status}: {body}")).into());
        }

        let raw: TokenResponse = resp
            .json()
            .await
            .map_err(|e| kind.error(format!("failed to parse token response: {e}")))?;

        raw.into_credentials(previous_refresh_token)
    }
}

/// Which error variant a token-endpoint failure maps to.
#[derive(Clone, Copy)]
enum TokenErrorKind {
    Exchange,
    Refresh,
}

impl TokenErrorKind {
    fn error(self, message: String) -> TidalSessionError {
        match self {
            TokenErrorKind::Exchange => TidalSessionError::TokenExchange(message),
            TokenErrorKind::Refresh => TidalSessionError::Refresh(message),
        }
    }
}

#[async_trait]
impl TidalOAuth for TidalOAuthClient {
    async fn build_login_url(
        &self,
        redirect_uri: &str,
        scope: &str,
        state: &str,
    ) -> Result<Url> {
        let mut url = join_path(&self.login_base, "authorize")?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", scope);
            query.append_pair("state", state);
        }

        Ok(url)
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Credentials> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("client_id", &self.client_id);

        self.token_request(&params, None, TokenErrorKind::Exchange)
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credentials> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);

        self.token_request(&params, Some(refresh_token), TokenErrorKind::Refresh)
            .await
    }

    async fn current_user(&self, access_token: &str) -> Result<UserProfile> {
        let url = join_path(&self.api_base, "users/me")?;

        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.api+json")
            .send()
            .await?
            .error_for_status()?;

        let doc: UserDocument = resp.json().await?;
        Ok(UserProfile {
            id: doc.data.id,
            username: doc.data.attributes.username,
            email: doc.data.attributes.email,
            country: doc.data.attributes.country,
        })
    }
}

/// Joins `segment` onto `base`, preserving any path already on the base.
fn join_path(base: &Url, segment: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| TidalSessionError::Config(format!("base URL {base} cannot be a base")))?;
        path.pop_if_empty();
        for part in segment.split('/') {
            path.push(part);
        }
    }
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
