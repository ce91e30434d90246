//! Supabase HTTP client with API-key and bearer-token authentication

use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Response,
};
use rewards_core::{Error, Result, Session, UserAchievement};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, instrument};
use url::Url;

const REST_PATH: &str = "rest/v1";
const AUTH_PATH: &str = "auth/v1";
const REALTIME_PATH: &str = "realtime/v1/websocket";
const REALTIME_VSN: &str = "1.0.0";

/// Project URL and public API key of the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// e.g. `https://abcd.supabase.co`
    pub url: String,
    /// Public anon key, sent as `apikey` on every request
    pub anon_key: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    fn base(&self) -> Result<Url> {
        let mut base = Url::parse(&self.url)
            .map_err(|e| Error::ConfigError(format!("invalid backend url {}: {}", self.url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    /// URL of a REST resource, e.g. `rest_url("community_rewards")`
    pub fn rest_url(&self, resource: &str) -> Result<Url> {
        self.base()?
            .join(&format!("{}/{}", REST_PATH, resource))
            .map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// URL of an auth endpoint, e.g. `auth_url("user")`
    pub fn auth_url(&self, endpoint: &str) -> Result<Url> {
        self.base()?
            .join(&format!("{}/{}", AUTH_PATH, endpoint))
            .map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Websocket URL of the realtime service (`ws`/`wss` matching the project scheme)
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self
            .base()?
            .join(REALTIME_PATH)
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::ConfigError(format!(
                    "unsupported url scheme for realtime: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::ConfigError("cannot set websocket scheme".to_string()))?;

        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", REALTIME_VSN);
        Ok(url)
    }
}

/// The authenticated user as reported by `GET /auth/v1/user`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// HTTP client for the rewards tables and RPCs.
///
/// Every request carries the project `apikey`. When an access token is set it
/// is sent as the bearer token so row-level security applies to the user;
/// otherwise the anon key is used.
#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    config: BackendConfig,
    access_token: Option<String>,
}

impl SupabaseClient {
    /// Create a new client for the given backend
    pub fn new(config: BackendConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::NetworkError(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            access_token: None,
        })
    }

    /// Use the given user JWT for authenticated requests
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Client authenticating as `session`. A session without a token keeps
    /// this client's token.
    pub fn for_session(&self, session: &Session) -> Self {
        match &session.access_token {
            Some(token) => self.clone().with_access_token(token.clone()),
            None => self.clone(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Default headers for requests
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let apikey = HeaderValue::from_str(&self.config.anon_key)
            .map_err(|e| Error::ConfigError(format!("invalid api key: {}", e)))?;
        headers.insert("apikey", apikey);

        let bearer = self
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        let auth = HeaderValue::from_str(&format!("Bearer {}", bearer))
            .map_err(|e| Error::ConfigError(format!("invalid access token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        Ok(headers)
    }

    /// Check if response indicates authentication failure
    fn check_auth_error(response: &Response) -> Option<Error> {
        match response.status().as_u16() {
            401 => Some(Error::NotAuthenticated),
            403 => Some(Error::AuthenticationError("Access forbidden".to_string())),
            _ => None,
        }
    }

    async fn parse<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        if let Some(err) = Self::check_auth_error(&response) {
            return Err(err);
        }

        let response = response.error_for_status().map_err(|e| {
            error!("{} request failed: {}", what, e);
            Error::ApiError(e.to_string())
        })?;

        response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", what, e);
            Error::InvalidData(e.to_string())
        })
    }

    /// Get the user the current access token belongs to
    #[instrument(skip(self))]
    pub async fn get_user(&self) -> Result<AuthUser> {
        if self.access_token.is_none() {
            return Err(Error::NotAuthenticated);
        }

        let url = self.config.auth_url("user")?;
        let response = self
            .http
            .get(url)
            .headers(self.default_headers()?)
            .send()
            .await?;

        let user: AuthUser = Self::parse(response, "auth user").await?;
        debug!("Authenticated as user {}", user.id);
        Ok(user)
    }

    /// Latest validated reward rows for a user, newest first.
    ///
    /// Rows are returned undecoded; callers validate them.
    #[instrument(skip(self))]
    pub async fn select_recent_rewards(&self, user_id: &str, limit: usize) -> Result<Vec<Value>> {
        let url = self.config.rest_url("community_rewards")?;
        let filter = format!("eq.{}", user_id);
        let limit = limit.to_string();

        let response = self
            .http
            .get(url)
            .headers(self.default_headers()?)
            .query(&[
                ("select", "*"),
                ("user_id", filter.as_str()),
                ("is_validated", "eq.true"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let rows: Vec<Value> = Self::parse(response, "recent rewards").await?;
        debug!("Fetched {} reward rows for {}", rows.len(), user_id);
        Ok(rows)
    }

    /// Achievement rows for a user, newest first
    #[instrument(skip(self))]
    pub async fn select_achievements(&self, user_id: &str) -> Result<Vec<UserAchievement>> {
        let url = self.config.rest_url("user_achievements")?;
        let filter = format!("eq.{}", user_id);

        let response = self
            .http
            .get(url)
            .headers(self.default_headers()?)
            .query(&[
                ("select", "*"),
                ("user_id", filter.as_str()),
                ("order", "created_at.desc"),
            ])
            .send()
            .await?;

        let achievements: Vec<UserAchievement> = Self::parse(response, "achievements").await?;
        debug!("Fetched {} achievements for {}", achievements.len(), user_id);
        Ok(achievements)
    }

    /// Call a database function via `POST /rest/v1/rpc/{name}`
    #[instrument(skip(self, args))]
    pub async fn rpc<T: DeserializeOwned>(&self, name: &str, args: &Value) -> Result<T> {
        let url = self.config.rest_url(&format!("rpc/{}", name))?;

        let response = self
            .http
            .post(url)
            .headers(self.default_headers()?)
            .json(args)
            .send()
            .await?;

        Self::parse(response, name).await
    }
}
