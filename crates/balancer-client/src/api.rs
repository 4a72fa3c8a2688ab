//! Typed HTTP wrappers over the Balancer backend.
//!
//! Every authenticated call carries the bearer credential held by
//! [`BalancerApi`]. Non-2xx responses carry `{ "error": string }`, which is
//! decoded into [`ApiError`](balancer_types::ApiError) via
//! [`ClientError::server`].
//!
//! The `*Source` types adapt the API to the orchestrator source traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use balancer_types::{
    ApiErrorRecord, AppEssentials, BlacklistedIp, DatabaseSummary, ServerSummary, Trade,
};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::RevalidatingCache;
use crate::config::ClientConfig;
use crate::constants::REQUEST_TIMEOUT;
use crate::error::ClientError;
use crate::fetch::{ListSource, PageQuery, ResourceSource};

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    #[serde(rename = "otpToken", skip_serializing_if = "Option::is_none")]
    pub otp_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct RegisterIpRequest<'a> {
    ip: &'a str,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct PageParams {
    limit: usize,
    #[serde(rename = "startAtID", skip_serializing_if = "Option::is_none")]
    start_at_id: Option<u64>,
}

impl From<&PageQuery<u64>> for PageParams {
    fn from(query: &PageQuery<u64>) -> Self {
        Self { limit: query.limit, start_at_id: query.start_at_id }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// The error string out of a failure body; the raw body if it has no
/// `error` field.
pub fn error_text(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(body) => body.error,
        Err(_) => body.trim().to_string(),
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct BalancerApi {
    http: reqwest::Client,
    base_url: String,
    credential: RwLock<Option<String>>,
}

impl BalancerApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, credential: RwLock::new(None) })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let api = Self::new(&config.api_url)?;
        api.set_credential(config.token.clone());
        Ok(api)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn set_credential(&self, token: Option<String>) {
        *self.credential.write() = token;
    }

    pub fn credential(&self) -> Option<String> {
        self.credential.read().clone()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.credential().ok_or(ClientError::NotAuthenticated)?;
        Ok(self.request(method, path).bearer_auth(token))
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let text = error_text(&body);
        let text = if text.is_empty() { status.to_string() } else { text };
        debug!(status = status.as_u16(), "request failed: {text}");
        Err(ClientError::server(status.as_u16(), &text))
    }

    async fn send_json<R: DeserializeOwned>(request: RequestBuilder) -> Result<R, ClientError> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn send_empty(request: RequestBuilder) -> Result<(), ClientError> {
        Self::check(request.send().await?).await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Auth
    // ------------------------------------------------------------------------

    /// Sign in and keep the returned access token as the credential.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, ClientError> {
        let session: Session =
            Self::send_json(self.request(Method::POST, "auth/sign-in").json(credentials)).await?;
        self.set_credential(Some(session.access_token.clone()));
        info!("signed in as {}", credentials.email);
        Ok(session)
    }

    /// Invalidate the session server-side; the local credential is cleared
    /// even if the call fails.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let result = match self.authed(Method::POST, "auth/sign-out") {
            Ok(request) => Self::send_empty(request).await,
            Err(e) => Err(e),
        };
        self.set_credential(None);
        result
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ClientError> {
        let session: Session = Self::send_json(
            self.request(Method::POST, "auth/refresh").json(&RefreshRequest { refresh_token }),
        )
        .await?;
        self.set_credential(Some(session.access_token.clone()));
        Ok(session)
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub async fn list_api_errors(&self, query: &PageQuery<u64>) -> Result<Vec<ApiErrorRecord>, ClientError> {
        let request = self.authed(Method::GET, "api-errors")?.query(&PageParams::from(query));
        Self::send_json(request).await
    }

    pub async fn delete_api_error(&self, id: u64) -> Result<(), ClientError> {
        Self::send_empty(self.authed(Method::DELETE, &format!("api-errors/{id}"))?).await
    }

    pub async fn list_ip_blacklist(&self) -> Result<Vec<BlacklistedIp>, ClientError> {
        Self::send_json(self.authed(Method::GET, "ip-blacklist")?).await
    }

    pub async fn register_ip(&self, ip: &str) -> Result<BlacklistedIp, ClientError> {
        let request = self.authed(Method::POST, "ip-blacklist")?.json(&RegisterIpRequest { ip });
        Self::send_json(request).await
    }

    pub async fn unregister_ip(&self, id: u64) -> Result<(), ClientError> {
        Self::send_empty(self.authed(Method::DELETE, &format!("ip-blacklist/{id}"))?).await
    }

    pub async fn list_trades(&self, query: &PageQuery<u64>) -> Result<Vec<Trade>, ClientError> {
        let request = self.authed(Method::GET, "trades")?.query(&PageParams::from(query));
        Self::send_json(request).await
    }

    pub async fn database_summary(&self) -> Result<DatabaseSummary, ClientError> {
        Self::send_json(self.authed(Method::GET, "database/summary")?).await
    }

    pub async fn server_summary(&self) -> Result<ServerSummary, ClientError> {
        Self::send_json(self.authed(Method::GET, "server/summary")?).await
    }

    pub async fn app_essentials(&self) -> Result<AppEssentials, ClientError> {
        Self::send_json(self.authed(Method::GET, "app-essentials")?).await
    }
}

// ============================================================================
// Orchestrator sources
// ============================================================================

pub struct ApiErrorsSource(pub Arc<BalancerApi>);

#[async_trait]
impl ListSource<ApiErrorRecord> for ApiErrorsSource {
    async fn fetch_page(&self, query: PageQuery<u64>) -> Result<Vec<ApiErrorRecord>, ClientError> {
        self.0.list_api_errors(&query).await
    }
}

pub struct TradesSource(pub Arc<BalancerApi>);

#[async_trait]
impl ListSource<Trade> for TradesSource {
    async fn fetch_page(&self, query: PageQuery<u64>) -> Result<Vec<Trade>, ClientError> {
        self.0.list_trades(&query).await
    }
}

/// The blacklist endpoint is not paginated: the first page is the whole
/// list and any continuation is empty.
pub struct BlacklistSource(pub Arc<BalancerApi>);

#[async_trait]
impl ListSource<BlacklistedIp> for BlacklistSource {
    async fn fetch_page(&self, query: PageQuery<u64>) -> Result<Vec<BlacklistedIp>, ClientError> {
        if query.start_at_id.is_some() {
            return Ok(Vec::new());
        }
        self.0.list_ip_blacklist().await
    }
}

pub struct ServerSummarySource(pub Arc<BalancerApi>);

#[async_trait]
impl ResourceSource<ServerSummary> for ServerSummarySource {
    async fn fetch(&self) -> Result<ServerSummary, ClientError> {
        self.0.server_summary().await
    }
}

pub struct EssentialsSource(pub Arc<BalancerApi>);

#[async_trait]
impl ResourceSource<AppEssentials> for EssentialsSource {
    async fn fetch(&self) -> Result<AppEssentials, ClientError> {
        self.0.app_essentials().await
    }
}

/// Database summary behind a [`RevalidatingCache`].
pub struct DatabaseSummarySource {
    api: Arc<BalancerApi>,
    cache: RevalidatingCache<DatabaseSummary>,
}

impl DatabaseSummarySource {
    pub fn new(api: Arc<BalancerApi>, max_age: Duration) -> Self {
        Self { api, cache: RevalidatingCache::new(max_age) }
    }
}

#[async_trait]
impl ResourceSource<DatabaseSummary> for DatabaseSummarySource {
    async fn fetch(&self) -> Result<DatabaseSummary, ClientError> {
        self.cache.get_or_fetch(|| self.api.database_summary()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = BalancerApi::new("http://localhost:5075/").unwrap();
        assert_eq!(api.url("/trades"), "http://localhost:5075/trades");
        assert_eq!(api.url("ip-blacklist/4"), "http://localhost:5075/ip-blacklist/4");
    }

    #[test]
    fn test_error_text_unwraps_error_field() {
        assert_eq!(error_text(r#"{"error":"IP already listed"}"#), "IP already listed");
        assert_eq!(error_text("  gateway timeout\n"), "gateway timeout");
    }

    #[test]
    fn test_error_text_feeds_structured_decode() {
        let body = r#"{"error":"{\"message\":\"Session expired\",\"code\":\"auth_03\"}"}"#;
        let err = ClientError::server(401, &error_text(body));
        let decoded = err.api_error();
        assert_eq!(decoded.message, "Session expired");
        assert_eq!(decoded.code.as_deref(), Some("auth_03"));
    }

    #[test]
    fn test_page_params_query_shape() {
        let first = PageParams::from(&PageQuery { limit: 25, start_at_id: None });
        assert_eq!(serde_json::to_value(&first).unwrap(), serde_json::json!({ "limit": 25 }));

        let next = PageParams::from(&PageQuery { limit: 25, start_at_id: Some(41) });
        assert_eq!(
            serde_json::to_value(&next).unwrap(),
            serde_json::json!({ "limit": 25, "startAtID": 41 })
        );
    }

    #[tokio::test]
    async fn test_authed_call_without_credential() {
        let api = BalancerApi::new("http://127.0.0.1:9").unwrap();
        let err = api.server_summary().await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_sign_out_clears_credential_even_on_failure() {
        let api = BalancerApi::new("http://127.0.0.1:9").unwrap();
        api.set_credential(Some("token".into()));
        assert!(api.sign_out().await.is_err());
        assert_eq!(api.credential(), None);
    }

    #[tokio::test]
    async fn test_blacklist_continuation_is_empty() {
        let api = Arc::new(BalancerApi::new("http://127.0.0.1:9").unwrap());
        let source = BlacklistSource(api);
        let page = source.fetch_page(PageQuery { limit: 25, start_at_id: Some(3) }).await.unwrap();
        assert!(page.is_empty());
    }
}
