// Moderation Console Library - admin-side content moderation core
// This exposes the core components for the CLI, testing and integration

pub mod api;
pub mod config;
pub mod moderation;
pub mod observability;
pub mod session;
pub mod telemetry;

// Re-export key types for easy access
pub use api::{
    ApiError, ApiResponse, ListPage, ListQuery, ModerationApi, RestModerationApi, SortOrder,
};
pub use config::ConsoleConfig;
pub use moderation::{
    Action,
    ActionAffordance,
    ClassifiedError,
    ConcurrencyGuard,
    ConfirmationGate,
    Confirmer,
    EntityKey,
    EntityKind,
    EntityStatus,
    ErrorClass,
    ErrorClassifier,
    ListConsistencyCoordinator,
    ModerableEntity,
    ModerationEngine,
    TransitionOutcome,
    TransitionRegistry,
};
pub use observability::{TransitionMetrics, TransitionStats};
pub use session::{CredentialSession, SessionContext, SessionState};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};
