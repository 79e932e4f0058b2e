// Executes one transition: lock, call, classify, release
//
// Transitions are not idempotent (notifications, counters), so a failure is
// surfaced once and never retried here.

use std::sync::Arc;

use tracing::{error, info, warn, Instrument};

use crate::api::errors::ApiError;
use crate::api::traits::ModerationApi;
use crate::moderation::classifier::{ClassifiedError, ErrorClassifier};
use crate::moderation::confirmation::ConfirmationStage;
use crate::moderation::coordinator::{ListConsistencyCoordinator, RefetchOutcome};
use crate::moderation::guard::ConcurrencyGuard;
use crate::moderation::registry::IllegalTransition;
use crate::moderation::types::{Action, EntityKey, ModerableEntity, TransitionRequest};
use crate::observability::TransitionMetrics;
use crate::session::SessionContext;
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// Result of requesting a transition
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The server applied the transition. `entity` is the server's copy, `None`
    /// when it was removed or the server returned no body.
    Applied {
        request: TransitionRequest,
        entity: Option<ModerableEntity>,
        refetch: RefetchOutcome,
    },
    /// Another action is in flight for this entity; nothing was sent
    Busy {
        entity: EntityKey,
        requested: Action,
        held: Action,
    },
    /// Not offered for the observed state; nothing was sent
    Rejected { reason: IllegalTransition },
    /// The operator declined a confirmation; nothing was sent
    Cancelled {
        entity: EntityKey,
        action: Action,
        stage: ConfirmationStage,
    },
    /// The server refused or the call failed
    Failed {
        request: TransitionRequest,
        error: ClassifiedError,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, TransitionOutcome::Busy { .. })
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            TransitionOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

pub struct ActionExecutor {
    api: Arc<dyn ModerationApi>,
    guard: ConcurrencyGuard,
    classifier: Arc<ErrorClassifier>,
    session: Arc<dyn SessionContext>,
    metrics: Arc<TransitionMetrics>,
}

impl ActionExecutor {
    pub fn new(
        api: Arc<dyn ModerationApi>,
        guard: ConcurrencyGuard,
        classifier: Arc<ErrorClassifier>,
        session: Arc<dyn SessionContext>,
        metrics: Arc<TransitionMetrics>,
    ) -> Self {
        Self {
            api,
            guard,
            classifier,
            session,
            metrics,
        }
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    /// Run `request` against the collaborator.
    ///
    /// The lock is taken synchronously before the first await, so a second call
    /// for the same entity made before this one settles returns `Busy` without
    /// touching the network. The lock is held until the view has been refetched
    /// and is released on every path, including when this future is dropped.
    pub async fn execute(
        &self,
        request: TransitionRequest,
        view: Option<&ListConsistencyCoordinator>,
    ) -> TransitionOutcome {
        let ticket = view.map(|v| v.ticket());

        let lease = match self.guard.lease(request.entity, request.action) {
            Ok(lease) => lease,
            Err(held) => {
                self.metrics.record_busy();
                info!(
                    entity = %request.entity,
                    requested = %request.action,
                    held = %held,
                    "Transition refused, entity busy"
                );
                return TransitionOutcome::Busy {
                    entity: request.entity,
                    requested: request.action,
                    held,
                };
            }
        };

        let correlation_id = generate_correlation_id();
        let span = create_transition_span(request.entity, request.action, &correlation_id);

        let outcome = async {
            info!("Sending transition to server");
            let result = match self.api.transition(&request).await {
                Ok(response) if response.success => Ok(response.data),
                Ok(response) => Err(ApiError::rejected(response.message.unwrap_or_else(|| {
                    "Server reported failure without a message".to_string()
                }))),
                Err(err) => Err(err),
            };

            match result {
                Ok(entity) => {
                    self.metrics.record_succeeded();
                    info!("Transition applied");
                    let refetch = match (view, &ticket) {
                        (Some(view), Some(ticket)) => view.refetch(ticket, request.entity).await,
                        _ => RefetchOutcome::NoActiveView,
                    };
                    if matches!(refetch, RefetchOutcome::Failed { .. }) {
                        self.metrics.record_refetch_failure();
                    }
                    TransitionOutcome::Applied {
                        request: request.clone(),
                        entity,
                        refetch,
                    }
                }
                Err(failure) => {
                    let classified = self.classifier.classify(&failure, Some(request.action));
                    self.metrics.record_failed(classified.class);
                    if classified.requires_session_teardown() {
                        error!(
                            error = %classified.raw_message,
                            "Authentication failure, tearing down session"
                        );
                        self.session.teardown(&classified.raw_message).await;
                    } else {
                        warn!(
                            class = %classified.class,
                            error = %classified.raw_message,
                            "Transition failed"
                        );
                    }
                    TransitionOutcome::Failed {
                        request: request.clone(),
                        error: classified,
                    }
                }
            }
        }
        .instrument(span)
        .await;

        lease.release();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mocks::MockModerationApi;
    use crate::api::types::ListQuery;
    use crate::moderation::classifier::ErrorClass;
    use crate::moderation::registry::TransitionRegistry;
    use crate::moderation::types::{CategoryStatus, EntityKind, EntityStatus, NovelStatus};
    use crate::session::CredentialSession;

    struct Harness {
        api: Arc<MockModerationApi>,
        session: Arc<CredentialSession>,
        executor: ActionExecutor,
    }

    fn harness() -> Harness {
        let api = Arc::new(MockModerationApi::new());
        let session = Arc::new(CredentialSession::with_token("token").unwrap());
        let executor = ActionExecutor::new(
            api.clone(),
            ConcurrencyGuard::new(),
            Arc::new(ErrorClassifier::default()),
            session.clone(),
            Arc::new(TransitionMetrics::new()),
        );
        Harness {
            api,
            session,
            executor,
        }
    }

    #[tokio::test]
    async fn test_success_releases_lock_and_refetches() {
        let h = harness();
        let novel = ModerableEntity::novel(1, NovelStatus::UnderReview);
        h.api.insert(novel.clone());
        let view =
            ListConsistencyCoordinator::new(EntityKind::Novel, h.api.clone(), ListQuery::default());

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&novel, Action::Approve), Some(&view))
            .await;

        match outcome {
            TransitionOutcome::Applied { entity, refetch, .. } => {
                assert_eq!(entity.unwrap().status, EntityStatus::Novel(NovelStatus::Published));
                assert_eq!(refetch, RefetchOutcome::Refreshed { total: 1, present: true });
            }
            other => panic!("expected Applied, got {other:?}"),
        }
        assert!(!h.executor.guard().is_busy(novel.key()));
        assert_eq!(
            view.row(novel.key()).unwrap().status,
            EntityStatus::Novel(NovelStatus::Published)
        );
    }

    #[tokio::test]
    async fn test_busy_entity_sends_nothing() {
        let h = harness();
        let novel = ModerableEntity::novel(1, NovelStatus::Published);
        h.api.insert(novel.clone());
        assert!(h.executor.guard().try_acquire(novel.key(), Action::Archive));

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&novel, Action::Hide), None)
            .await;

        assert_eq!(
            outcome,
            TransitionOutcome::Busy {
                entity: novel.key(),
                requested: Action::Hide,
                held: Action::Archive
            }
        );
        assert!(h.api.transition_calls().is_empty());
        // The original holder keeps its lock
        assert_eq!(h.executor.guard().current_action(novel.key()), Some(Action::Archive));
    }

    #[tokio::test]
    async fn test_failure_is_classified_and_lock_released() {
        let h = harness();
        let category = ModerableEntity::category(4, CategoryStatus::Active).with_dependents(2);
        h.api.insert(category.clone());

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&category, Action::HardDelete), None)
            .await;

        let error = outcome.error().unwrap();
        assert_eq!(error.class, ErrorClass::ReferentialIntegrityError);
        assert!(error.recovery_hint.contains("soft delete"));
        assert!(!h.executor.guard().is_busy(category.key()));
        assert!(h.api.entity(category.key()).is_some());
    }

    #[tokio::test]
    async fn test_success_false_envelope_is_a_failure() {
        let h = harness();
        let novel = ModerableEntity::novel(2, NovelStatus::UnderReview);
        h.api.insert(novel.clone());
        h.api.fail_next_transition(novel.key(), None);

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&novel, Action::Reject), None)
            .await;

        let error = outcome.error().unwrap();
        assert_eq!(error.class, ErrorClass::UnknownError);
        assert_eq!(error.raw_message, "Server reported failure without a message");
    }

    #[tokio::test]
    async fn test_auth_failure_tears_down_session() {
        let h = harness();
        let novel = ModerableEntity::novel(3, NovelStatus::Published);
        h.api.insert(novel.clone());
        h.api.fail_next_transition(novel.key(), Some(ApiError::http(401, "Unauthorized")));

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&novel, Action::Hide), None)
            .await;

        assert_eq!(outcome.error().unwrap().class, ErrorClass::AuthError);
        assert!(h.session.bearer_token().is_none());
        assert!(!h.executor.guard().is_busy(novel.key()));
    }

    #[tokio::test]
    async fn test_stale_state_rejected_by_server() {
        let h = harness();
        let observed = ModerableEntity::novel(5, NovelStatus::UnderReview);
        // Another moderator already approved it
        h.api.insert(ModerableEntity::novel(5, NovelStatus::Published));

        let outcome = h
            .executor
            .execute(TransitionRegistry::request(&observed, Action::Approve), None)
            .await;

        let error = outcome.error().unwrap();
        assert_eq!(error.class, ErrorClass::UnknownError);
        assert!(error.raw_message.contains("approve"));
        assert_eq!(h.api.transition_calls().len(), 1);
    }
}
