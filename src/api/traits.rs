// Collaborator interface - the REST backend as seen by the moderation core

use async_trait::async_trait;

use crate::api::errors::ApiError;
use crate::api::types::{ApiResponse, ListPage, ListQuery};
use crate::moderation::types::{EntityKey, EntityKind, ModerableEntity, TransitionRequest};

/// Transition, list and lookup endpoints of the content backend
#[async_trait]
pub trait ModerationApi: Send + Sync {
    /// Call the endpoint for `request.action` on `request.entity`
    async fn transition(
        &self,
        request: &TransitionRequest,
    ) -> Result<ApiResponse<ModerableEntity>, ApiError>;

    /// Fetch one page of `kind` using the view's paging, sort and filters
    async fn fetch_page(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<ListPage<ModerableEntity>, ApiError>;

    /// Fetch a single entity's current state
    async fn fetch_entity(&self, entity: EntityKey) -> Result<ModerableEntity, ApiError>;
}
