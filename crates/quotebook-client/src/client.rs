//! The authenticated request client
//!
//! `ApiClient` owns the pieces a request needs: the HTTP connection pool,
//! the backend base URL, the token store, and the shared refresh
//! coordinator. Clones share all of them, so any number of concurrent
//! callers coordinate on one refresh cycle.
//!
//! Request lifecycle:
//! 1. Attach the stored access token as a bearer header
//! 2. On 401, join the single-flight refresh cycle
//! 3. If the cycle produced a new token, replay the request once
//! 4. Classify whatever response the request settled with

use std::sync::Arc;
use std::time::Instant;

use quotebook_auth::{self as auth, MemoryTokenStore, TokenPair, TokenStore, join_url};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::classify::error_from_response;
use crate::coordinator::{RefreshCoordinator, RefreshOutcome};
use crate::error::{ApiError, Result};
use crate::metrics;
use crate::request::ApiRequest;
use crate::session::{NullSession, SessionEvents};

/// Request client for the Quotebook backend.
///
/// Cheap to clone; clones share the connection pool, the token store, and
/// the refresh coordinator.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: Arc<dyn SessionEvents>,
    coordinator: RefreshCoordinator,
}

/// Builder for [`ApiClient`]. Only the base URL is required; the store
/// defaults to in-memory and session events go nowhere.
pub struct ApiClientBuilder {
    base_url: String,
    http: Option<reqwest::Client>,
    store: Option<Arc<dyn TokenStore>>,
    session: Option<Arc<dyn SessionEvents>>,
}

impl ApiClientBuilder {
    /// Use a preconfigured HTTP client (timeouts, proxies, TLS settings).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Where the token pair lives between requests.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Who to tell when the session is lost.
    pub fn session_events(mut self, session: Arc<dyn SessionEvents>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> Result<ApiClient> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ApiError::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        Ok(ApiClient {
            http: self.http.unwrap_or_default(),
            base_url: self.base_url,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryTokenStore::new())),
            session: self.session.unwrap_or_else(|| Arc::new(NullSession)),
            coordinator: RefreshCoordinator::new(),
        })
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            http: None,
            store: None,
            session: None,
        }
    }

    /// Establish a session with the user's credentials.
    ///
    /// On success the returned pair replaces whatever the store held. A
    /// rejected login leaves the stored session untouched and surfaces as
    /// [`ApiError::Status`] with the endpoint's status and raw body. Wire
    /// faults, including a success response whose body does not parse as a
    /// token pair, surface as [`ApiError::Transport`] with no status.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let token = auth::login(&self.http, &self.base_url, username, password)
            .await
            .map_err(login_error)?;
        let pair = TokenPair {
            access: token.access_token,
            refresh: token.refresh_token,
        };
        if let Err(e) = self.store.set(pair).await {
            warn!(error = %e, "failed to persist session after login");
        }
        info!("logged in");
        Ok(())
    }

    /// Drop the stored session. A deliberate logout is not a lost session,
    /// so no session event fires.
    pub async fn logout(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear stored session");
        }
        info!("logged out");
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(ApiRequest::post(path).json(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(ApiRequest::put(path).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        self.execute(ApiRequest::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Send a request, transparently refreshing an expired session once.
    pub async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.dispatch(request, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.path()))]
    async fn dispatch(&self, request: ApiRequest, request_id: String) -> Result<Value> {
        let started = Instant::now();

        let bearer = if request.requires_auth() {
            self.store.current().await.map(|pair| pair.access)
        } else {
            None
        };

        let response = self.send(&request, bearer.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !request.requires_auth() {
            return self.settle(&request, response, started).await;
        }

        // 401 on an authenticated request. Re-read the store before joining
        // a refresh cycle: another task may have dropped the session since
        // the bearer was read, and without a refresh token there is nothing
        // to exchange.
        if self.store.current().await.is_none() {
            debug!("401 with no stored session, surfacing as-is");
            return self.settle(&request, response, started).await;
        }

        let exchange = run_refresh(
            self.http.clone(),
            self.base_url.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.session),
        );
        match self.coordinator.await_refresh(exchange).await {
            RefreshOutcome::Refreshed { access } => {
                debug!("replaying request with refreshed token");
                let retry = self.send(&request, Some(&access)).await?;
                // A second 401 settles as an ordinary error, never another
                // refresh
                self.settle(&request, retry, started).await
            }
            RefreshOutcome::SessionLost => {
                metrics::record_session_expired(
                    request.method().as_str(),
                    started.elapsed().as_secs_f64(),
                );
                Err(ApiError::SessionExpired)
            }
        }
    }

    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<reqwest::Response> {
        let url = join_url(&self.base_url, request.path());
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .headers(request.headers().clone());
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            let error_type = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection"
            } else {
                "other"
            };
            metrics::record_transport_error(error_type);
            warn!(error = %e, error_type, "request failed before a response arrived");
            ApiError::Transport(format!("request to {} failed: {e}", request.path()))
        })
    }

    /// Turn the response a request settled with into the caller-facing
    /// result.
    async fn settle(
        &self,
        request: &ApiRequest,
        response: reqwest::Response,
        started: Instant,
    ) -> Result<Value> {
        let status = response.status();
        metrics::record_request(
            status.as_u16(),
            request.method().as_str(),
            started.elapsed().as_secs_f64(),
        );

        // 204 carries no body by definition
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| ApiError::Transport(format!("failed to read response body: {e}")))?;
            if body.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&body).map_err(|e| ApiError::Status {
                status: status.as_u16(),
                message: format!("invalid JSON in response body: {e}"),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        warn!(status = status.as_u16(), "request settled with an error status");
        Err(error_from_response(
            status.as_u16(),
            content_type.as_deref(),
            &body,
        ))
    }
}

/// The refresh exchange run by the cycle that wins the single-flight race.
///
/// Reads the refresh token at exchange time rather than at 401 time: the
/// session may have changed while this caller waited. An already-empty
/// store fails the cycle without firing the session-lost signal, because
/// whoever emptied the store already handled that.
async fn run_refresh(
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    session: Arc<dyn SessionEvents>,
) -> RefreshOutcome {
    let pair = match store.current().await {
        Some(pair) => pair,
        None => {
            warn!("no stored session to refresh");
            metrics::record_refresh("skipped");
            return RefreshOutcome::SessionLost;
        }
    };

    match auth::refresh(&http, &base_url, &pair.refresh).await {
        Ok(token) => {
            let access = token.access_token.clone();
            let next = TokenPair {
                access: token.access_token,
                refresh: token.refresh_token,
            };
            // A persistence failure leaves the new pair usable in memory
            if let Err(e) = store.set(next).await {
                warn!(error = %e, "failed to persist refreshed tokens");
            }
            info!("token refresh succeeded");
            metrics::record_refresh("success");
            RefreshOutcome::Refreshed { access }
        }
        Err(e) => {
            warn!(error = %e, "token refresh failed, dropping session");
            if let Err(e) = store.clear().await {
                warn!(error = %e, "failed to clear stored session");
            }
            session.session_lost();
            metrics::record_refresh("failure");
            RefreshOutcome::SessionLost
        }
    }
}

fn login_error(error: auth::Error) -> ApiError {
    match error {
        auth::Error::LoginRejected { status, body } => ApiError::Status {
            status,
            message: body,
        },
        auth::Error::Http(message) => ApiError::Transport(message),
        other => ApiError::Transport(other.to_string()),
    }
}
