// REST implementation of the moderation collaborator
//
// Requests are rate limited with a direct governor limiter and carry the
// session's bearer token. Nothing is retried: a failed transition goes back to
// the executor exactly once.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::api::errors::{from_transport, ApiError};
use crate::api::traits::ModerationApi;
use crate::api::types::{ApiResponse, ListPage, ListQuery};
use crate::config::ApiConfig;
use crate::moderation::types::{Action, EntityKey, EntityKind, ModerableEntity, TransitionRequest};
use crate::session::SessionContext;

pub struct RestModerationApi {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    session: Arc<dyn SessionContext>,
}

impl std::fmt::Debug for RestModerationApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestModerationApi")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Method and path (relative to the base URL) for a transition
pub fn endpoint(action: Action, id: u64) -> (Method, String) {
    match action {
        Action::Approve | Action::Reject | Action::Hide | Action::Unhide | Action::Archive => {
            (Method::POST, format!("/novels/{id}/{}", action.as_str()))
        }
        Action::ToggleStatus => (Method::PATCH, format!("/categories/{id}/toggle-status")),
        Action::SoftDelete => (Method::DELETE, format!("/categories/{id}")),
        Action::HardDelete => (Method::DELETE, format!("/categories/{id}/permanent")),
    }
}

/// Reduce an error body to the server's message: `message`, `error`,
/// `errors[0].message`, then the raw text
pub fn extract_server_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            json.get("message"),
            json.get("error"),
            json.get("errors")
                .and_then(|errors| errors.get(0))
                .and_then(|first| first.get("message")),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str().filter(|text| !text.trim().is_empty()) {
                return text.to_string();
            }
        }
    }
    body.trim().to_string()
}

impl RestModerationApi {
    pub fn new(config: &ApiConfig, session: Arc<dyn SessionContext>) -> Result<Self, ApiError> {
        let timeout = Duration::from_secs(config.timeout_seconds.max(1));
        let per_second =
            NonZeroU32::new(config.rate_limit.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.rate_limit.burst_capacity).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("modconsole/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match self.session.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Wait for the limiter, send, and turn non-2xx into `ApiError::Http`
    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response, ApiError> {
        self.rate_limiter.until_ready().await;
        debug!(operation, "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| from_transport(e, operation, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_server_message(&body);
        let message = if message.is_empty() {
            status.canonical_reason().unwrap_or("Request failed").to_string()
        } else {
            message
        };
        Err(ApiError::http(status.as_u16(), message))
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        operation: &str,
    ) -> Result<Option<T>, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|e| from_transport(e, operation, self.timeout))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ApiError::Decode(format!("{operation}: {e}")))
    }
}

#[async_trait]
impl ModerationApi for RestModerationApi {
    async fn transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<ApiResponse<ModerableEntity>, ApiError> {
        let operation = format!("{} {}", request.action, request.entity);
        let (method, path) = endpoint(request.action, request.entity.id);

        let mut builder = self.request(method, &path);
        if matches!(request.action, Action::Approve | Action::Reject) {
            builder = builder.json(&serde_json::json!({ "notes": request.notes }));
        }

        let response = self.send(builder, &operation).await?;
        // 204 and empty bodies count as success with no entity
        Ok(self
            .read_json(response, &operation)
            .await?
            .unwrap_or_else(|| ApiResponse::ok(None)))
    }

    async fn fetch_page(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<ListPage<ModerableEntity>, ApiError> {
        let operation = format!("list {}", kind.collection());
        let builder = self
            .request(Method::GET, &format!("/{}", kind.collection()))
            .query(&query.to_params());

        let response = self.send(builder, &operation).await?;
        self.read_json(response, &operation)
            .await?
            .ok_or_else(|| ApiError::Decode(format!("{operation}: empty body")))
    }

    async fn fetch_entity(&self, entity: EntityKey) -> Result<ModerableEntity, ApiError> {
        let operation = format!("fetch {entity}");
        let path = format!("/{}/{}", entity.kind.collection(), entity.id);
        let builder = self.request(Method::GET, &path);

        let response = self.send(builder, &operation).await?;
        self.read_json(response, &operation)
            .await?
            .ok_or_else(|| ApiError::Decode(format!("{operation}: empty body")))
    }
}
