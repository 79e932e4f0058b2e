// In-memory collaborator for tests - behaves like the backend, records every call

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::errors::ApiError;
use crate::api::traits::ModerationApi;
use crate::api::types::{ApiResponse, ListPage, ListQuery};
use crate::moderation::registry::TransitionRegistry;
use crate::moderation::types::*;

/// Scripted answer for the next transition on an entity
#[derive(Debug, Clone)]
enum ScriptedFailure {
    /// `{success: false}` with no message
    Envelope,
    Error(ApiError),
}

#[derive(Debug, Default)]
pub struct MockModerationApi {
    entities: Mutex<BTreeMap<EntityKey, ModerableEntity>>,
    failures: Mutex<HashMap<EntityKey, ScriptedFailure>>,
    list_failure: Mutex<Option<ApiError>>,
    transition_calls: Mutex<Vec<TransitionRequest>>,
    list_calls: Mutex<Vec<ListQuery>>,
    hold: Mutex<Option<Arc<Notify>>>,
    list_hold: Mutex<Option<Arc<Notify>>>,
}

impl MockModerationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity: ModerableEntity) {
        self.entities.lock().unwrap().insert(entity.key(), entity);
    }

    pub fn entity(&self, key: EntityKey) -> Option<ModerableEntity> {
        self.entities.lock().unwrap().get(&key).cloned()
    }

    /// Change server-side state behind the console's back
    pub fn set_status(&self, key: EntityKey, status: EntityStatus) {
        if let Some(entity) = self.entities.lock().unwrap().get_mut(&key) {
            entity.status = status;
        }
    }

    /// Make the next transition on `key` fail; `None` answers `{success: false}`
    pub fn fail_next_transition(&self, key: EntityKey, error: Option<ApiError>) {
        let failure = match error {
            Some(err) => ScriptedFailure::Error(err),
            None => ScriptedFailure::Envelope,
        };
        self.failures.lock().unwrap().insert(key, failure);
    }

    pub fn fail_next_list(&self, error: ApiError) {
        *self.list_failure.lock().unwrap() = Some(error);
    }

    /// Park transition calls until the returned notifier fires
    pub fn hold_transitions(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    /// Let parked calls finish; later calls are no longer held
    pub fn release_hold(&self) {
        if let Some(notify) = self.hold.lock().unwrap().take() {
            notify.notify_waiters();
            notify.notify_one();
        }
    }

    /// Park the next list call after it has read the rows, until the notifier fires
    pub fn hold_next_list(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.list_hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn transition_calls(&self) -> Vec<TransitionRequest> {
        self.transition_calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> Vec<ListQuery> {
        self.list_calls.lock().unwrap().clone()
    }

    fn apply(&self, request: &TransitionRequest) -> Result<ApiResponse<ModerableEntity>, ApiError> {
        if let Some(failure) = self.failures.lock().unwrap().remove(&request.entity) {
            return match failure {
                ScriptedFailure::Envelope => Ok(ApiResponse {
                    success: false,
                    message: None,
                    data: None,
                }),
                ScriptedFailure::Error(err) => Err(err),
            };
        }

        let mut entities = self.entities.lock().unwrap();
        let current = entities
            .get(&request.entity)
            .cloned()
            .ok_or_else(|| ApiError::http(404, format!("{} not found", request.entity)))?;

        if request.action == Action::HardDelete && current.dependent_resource_count > 0 {
            return Err(ApiError::http(
                500,
                "SQLSTATE[23000]: Integrity constraint violation: 1451 Cannot delete or update a parent row: a foreign key constraint fails",
            ));
        }

        match TransitionRegistry::apply(&current, request.action) {
            Ok(Some(next)) => {
                entities.insert(request.entity, next.clone());
                Ok(ApiResponse::ok(Some(next)))
            }
            Ok(None) => {
                entities.remove(&request.entity);
                Ok(ApiResponse::ok(None))
            }
            Err(illegal) => Ok(ApiResponse::failed(illegal.to_string())),
        }
    }
}

fn matches_filters(entity: &ModerableEntity, query: &ListQuery) -> bool {
    query.filters.iter().all(|(key, value)| match key.as_str() {
        "status" => entity.status.as_str().eq_ignore_ascii_case(value),
        "hidden" => entity.hidden.to_string() == value.to_ascii_lowercase(),
        _ => true,
    })
}

#[async_trait]
impl ModerationApi for MockModerationApi {
    async fn transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<ApiResponse<ModerableEntity>, ApiError> {
        self.transition_calls.lock().unwrap().push(request.clone());
        let hold = self.hold.lock().unwrap().clone();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.apply(request)
    }

    async fn fetch_page(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<ListPage<ModerableEntity>, ApiError> {
        self.list_calls.lock().unwrap().push(query.clone());
        if let Some(err) = self.list_failure.lock().unwrap().take() {
            return Err(err);
        }

        let matching: Vec<ModerableEntity> = self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.kind == kind && matches_filters(e, query))
            .cloned()
            .collect();

        let skip = ((query.page.max(1) - 1) * query.page_size) as usize;
        let page = ListPage {
            total: matching.len() as u64,
            data: matching
                .into_iter()
                .skip(skip)
                .take(query.page_size as usize)
                .collect(),
            page: query.page,
            page_size: query.page_size,
        };

        let hold = self.list_hold.lock().unwrap().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        Ok(page)
    }

    async fn fetch_entity(&self, key: EntityKey) -> Result<ModerableEntity, ApiError> {
        self.entity(key)
            .ok_or_else(|| ApiError::http(404, format!("{} not found", key)))
    }
}
