// Moderation core: legal transitions, per-entity locking, confirmation,
// execution, failure classification and list resynchronization

pub mod classifier;
pub mod confirmation;
pub mod coordinator;
pub mod engine;
pub mod executor;
pub mod guard;
pub mod registry;
pub mod types;


pub use classifier::{
    ClassificationRule, ClassifiedError, ErrorClass, ErrorClassifier, FailureMatcher,
};
pub use confirmation::{
    AutoConfirm, ConfirmationGate, ConfirmationPrompt, ConfirmationStage, Confirmer, GateDecision,
};
pub use coordinator::{ListConsistencyCoordinator, RefetchOutcome, ViewTicket};
pub use engine::{ActionAffordance, ModerationEngine};
pub use executor::{ActionExecutor, TransitionOutcome};
pub use guard::{ActionLease, ConcurrencyGuard};
pub use registry::{ConfirmationTier, IllegalTransition, TransitionEffect, TransitionRegistry};
pub use types::*;
