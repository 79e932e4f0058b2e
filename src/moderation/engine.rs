// View-facing facade over the moderation core

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info};

use crate::api::traits::ModerationApi;
use crate::api::types::ListQuery;
use crate::moderation::classifier::{ClassifiedError, ErrorClassifier};
use crate::moderation::confirmation::{ConfirmationGate, Confirmer, GateDecision};
use crate::moderation::coordinator::ListConsistencyCoordinator;
use crate::moderation::executor::{ActionExecutor, TransitionOutcome};
use crate::moderation::guard::ConcurrencyGuard;
use crate::moderation::registry::TransitionRegistry;
use crate::moderation::types::*;
use crate::observability::TransitionMetrics;
use crate::session::SessionContext;

/// One action button as the view should render it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAffordance {
    pub action: Action,
    pub enabled: bool,
    pub irreversible: bool,
    /// Action holding the entity, when disabled because something is in flight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Action>,
}

/// Everything the rendering layer needs from the moderation core
pub struct ModerationEngine {
    api: Arc<dyn ModerationApi>,
    guard: ConcurrencyGuard,
    executor: ActionExecutor,
    confirmer: Arc<dyn Confirmer>,
    metrics: Arc<TransitionMetrics>,
    errors: Mutex<HashMap<EntityKey, ClassifiedError>>,
    views: Mutex<HashMap<EntityKind, Arc<ListConsistencyCoordinator>>>,
}

impl ModerationEngine {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        session: Arc<dyn SessionContext>,
        classifier: ErrorClassifier,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        let guard = ConcurrencyGuard::new();
        let metrics = Arc::new(TransitionMetrics::new());
        let executor = ActionExecutor::new(
            api.clone(),
            guard.clone(),
            Arc::new(classifier),
            session,
            metrics.clone(),
        );
        Self {
            api,
            guard,
            executor,
            confirmer,
            metrics,
            errors: Mutex::new(HashMap::new()),
            views: Mutex::new(HashMap::new()),
        }
    }

    fn errors(&self) -> MutexGuard<'_, HashMap<EntityKey, ClassifiedError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn views(&self) -> MutexGuard<'_, HashMap<EntityKind, Arc<ListConsistencyCoordinator>>> {
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn legal_actions(&self, entity: &ModerableEntity) -> BTreeSet<Action> {
        TransitionRegistry::legal_actions_for(entity)
    }

    /// Legal actions, disabled while any action is in flight for the same entity
    pub fn affordances(&self, entity: &ModerableEntity) -> Vec<ActionAffordance> {
        let held = self.guard.current_action(entity.key());
        self.legal_actions(entity)
            .into_iter()
            .map(|action| ActionAffordance {
                action,
                enabled: held.is_none(),
                irreversible: TransitionRegistry::is_irreversible(action),
                blocked_by: held,
            })
            .collect()
    }

    pub fn is_busy(&self, entity: EntityKey) -> bool {
        self.guard.is_busy(entity)
    }

    pub fn current_action(&self, entity: EntityKey) -> Option<Action> {
        self.guard.current_action(entity)
    }

    /// Last failure shown on this row, until dismissed or a later attempt succeeds
    pub fn current_error(&self, entity: EntityKey) -> Option<ClassifiedError> {
        self.errors().get(&entity).cloned()
    }

    pub fn dismiss_error(&self, entity: EntityKey) {
        self.errors().remove(&entity);
    }

    pub fn metrics(&self) -> &TransitionMetrics {
        &self.metrics
    }

    /// Open (or replace) the list view for `kind`. Call `load` on it to fetch rows.
    pub fn open_view(&self, kind: EntityKind, query: ListQuery) -> Arc<ListConsistencyCoordinator> {
        let view = Arc::new(ListConsistencyCoordinator::new(kind, self.api.clone(), query));
        if let Some(previous) = self.views().insert(kind, view.clone()) {
            previous.tear_down();
        }
        debug!(kind = %kind, "List view opened");
        view
    }

    pub fn view(&self, kind: EntityKind) -> Option<Arc<ListConsistencyCoordinator>> {
        self.views().get(&kind).cloned()
    }

    /// Close the view for `kind`; in-flight refetches for it are discarded
    pub fn close_view(&self, kind: EntityKind) {
        if let Some(view) = self.views().remove(&kind) {
            view.tear_down();
        }
    }

    pub async fn request_transition(
        &self,
        entity: &ModerableEntity,
        action: Action,
    ) -> TransitionOutcome {
        self.request_transition_with_notes(entity, action, None).await
    }

    /// Legality check, confirmation, then execution
    pub async fn request_transition_with_notes(
        &self,
        entity: &ModerableEntity,
        action: Action,
        notes: Option<String>,
    ) -> TransitionOutcome {
        self.metrics.record_requested();
        let key = entity.key();

        if let Err(reason) = TransitionRegistry::ensure_legal(entity, action) {
            self.metrics.record_rejected_locally();
            info!(entity = %key, action = %action, "Transition not offered for observed state");
            return TransitionOutcome::Rejected { reason };
        }

        // Busy rows have their actions disabled; don't prompt for something that can't run
        if let Some(held) = self.guard.current_action(key) {
            self.metrics.record_busy();
            return TransitionOutcome::Busy {
                entity: key,
                requested: action,
                held,
            };
        }

        if let GateDecision::Cancelled { stage } =
            ConfirmationGate::run(entity, action, self.confirmer.as_ref()).await
        {
            self.metrics.record_cancelled();
            return TransitionOutcome::Cancelled {
                entity: key,
                action,
                stage,
            };
        }

        let request = TransitionRegistry::request(entity, action).with_notes(notes);
        let view = self.view(entity.kind);
        let outcome = self.executor.execute(request, view.as_deref()).await;

        match &outcome {
            TransitionOutcome::Applied { .. } => self.dismiss_error(key),
            // Session teardown owns the screen; no row error for auth failures
            TransitionOutcome::Failed { error, .. } if error.requires_session_teardown() => {
                self.dismiss_error(key)
            }
            TransitionOutcome::Failed { error, .. } => {
                self.errors().insert(key, error.clone());
            }
            _ => {}
        }

        outcome
    }
}
