//! HTTP transport for the trade server
//!
//! Every authenticated call goes through [`ApiClient::authorize`], the one
//! place the session identity is attached to outgoing requests.

use crate::error::ApiError;
use crate::session::Session;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// REST client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Common path prefix of all endpoints
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Also send the username as a `username` query parameter, which the
    /// reference server reads instead of the bearer token
    pub legacy_username_query: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_string(),
            request_timeout: Duration::from_secs(5),
            legacy_username_query: true,
        }
    }
}

/// Error body the server sends with non-2xx replies
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(default)]
    msg: String,
}

/// Typed client for the trade server REST API
#[derive(Clone)]
pub struct ApiClient {
    inner: Client,
    base: Url,
    session: Session,
    config: ApiConfig,
}

impl ApiClient {
    /// Build a client bound to `session`
    pub fn new(config: ApiConfig, session: Session) -> Result<Self, ApiError> {
        let base = Self::normalize_base(&config.base_url)?;
        let inner = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            inner,
            base,
            session,
            config,
        })
    }

    // Url::join drops the last path segment unless the base ends in '/'.
    fn normalize_base(base_url: &str) -> Result<Url, ApiError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    /// Attach the current identity, failing before anything is sent when
    /// the session has none
    pub(crate) fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let identity = self
            .session
            .current_identity()
            .ok_or(ApiError::Unauthenticated)?;

        let mut request = request.bearer_auth(&identity.token);
        if self.config.legacy_username_query {
            request = request.query(&[("username", identity.username.as_str())]);
        }
        Ok(request)
    }

    /// Authenticated GET returning a decoded body
    pub(crate) async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, ApiError> {
        let request = self.inner.get(self.endpoint(path)?).query(query);
        let response = self.send(self.authorize(request)?, true).await?;
        Self::decode(response).await
    }

    /// POST with a JSON body, authenticated or not
    pub(crate) async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        authenticated: bool,
    ) -> Result<R, ApiError> {
        let mut request = self.inner.post(self.endpoint(path)?).json(body);
        if authenticated {
            request = self.authorize(request)?;
        }
        let response = self.send(request, authenticated).await?;
        Self::decode(response).await
    }

    /// Send and map non-2xx replies; 401/403 only mean a rejected identity
    /// when one was attached
    async fn send(&self, request: RequestBuilder, authenticated: bool) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(ApiError::from_transport)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let identity_rejected =
            status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN;
        if authenticated && identity_rejected {
            tracing::debug!("Server rejected identity: HTTP {}", status);
            return Err(ApiError::Auth(status));
        }

        let body = response.bytes().await.map_err(ApiError::from_transport)?;
        let message = serde_json::from_slice::<ServerMessage>(&body)
            .map(|m| m.msg)
            .unwrap_or_default();
        Err(ApiError::Rejected { status, message })
    }

    async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, ApiError> {
        let body = response.bytes().await.map_err(ApiError::from_transport)?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_under_prefix() {
        let client = ApiClient::new(ApiConfig::default(), Session::in_memory()).unwrap();
        assert_eq!(
            client.endpoint("/account/balance").unwrap().as_str(),
            "http://127.0.0.1:5000/api/account/balance"
        );
        assert_eq!(
            client.endpoint("pbft/result").unwrap().as_str(),
            "http://127.0.0.1:5000/api/pbft/result"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let config = ApiConfig {
            base_url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            ApiClient::new(config, Session::in_memory()),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_authorize_without_identity() {
        let client = ApiClient::new(ApiConfig::default(), Session::in_memory()).unwrap();
        let request = client.inner.get(client.endpoint("account/balance").unwrap());
        assert!(matches!(
            client.authorize(request),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn test_authorize_injects_identity() {
        let session = Session::in_memory();
        session.set_identity("tok-1", "alice");
        let client = ApiClient::new(ApiConfig::default(), session).unwrap();

        let request = client.inner.get(client.endpoint("trade/history").unwrap());
        let request = client.authorize(request).unwrap().build().unwrap();

        assert_eq!(request.url().query(), Some("username=alice"));
        assert_eq!(
            request.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer tok-1"
        );
    }
}
