// Shared helpers for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use moderation_console::api::{ApiError, ApiResponse, ListPage, ListQuery, ModerationApi};
use moderation_console::moderation::{
    ConfirmationPrompt, Confirmer, EntityKey, EntityKind, ModerableEntity, TransitionRegistry,
    TransitionRequest,
};

/// Backend that applies legal transitions and counts every call
#[derive(Debug, Default)]
pub struct CountingApi {
    entities: Mutex<HashMap<EntityKey, ModerableEntity>>,
    transitions: Mutex<Vec<TransitionRequest>>,
    lists: Mutex<usize>,
}

impl CountingApi {
    pub fn with(entities: impl IntoIterator<Item = ModerableEntity>) -> Arc<Self> {
        let api = Self::default();
        for entity in entities {
            api.entities.lock().unwrap().insert(entity.key(), entity);
        }
        Arc::new(api)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.lock().unwrap().len()
    }

    pub fn list_count(&self) -> usize {
        *self.lists.lock().unwrap()
    }
}

#[async_trait]
impl ModerationApi for CountingApi {
    async fn transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<ApiResponse<ModerableEntity>, ApiError> {
        self.transitions.lock().unwrap().push(request.clone());
        let mut entities = self.entities.lock().unwrap();
        let current = entities
            .get(&request.entity)
            .cloned()
            .ok_or_else(|| ApiError::http(404, "not found"))?;
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

    async fn fetch_page(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<ListPage<ModerableEntity>, ApiError> {
        *self.lists.lock().unwrap() += 1;
        let data: Vec<ModerableEntity> = self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        Ok(ListPage {
            total: data.len() as u64,
            data,
            page: query.page,
            page_size: query.page_size,
        })
    }

    async fn fetch_entity(&self, entity: EntityKey) -> Result<ModerableEntity, ApiError> {
        self.entities
            .lock()
            .unwrap()
            .get(&entity)
            .cloned()
            .ok_or_else(|| ApiError::http(404, "not found"))
    }
}

/// Gives the same answer to every prompt
pub struct FixedConfirmer(pub bool);

#[async_trait]
impl Confirmer for FixedConfirmer {
    async fn confirm(&self, _prompt: &ConfirmationPrompt) -> bool {
        self.0
    }
}
