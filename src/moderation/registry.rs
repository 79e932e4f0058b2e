// Legal lifecycle transitions per entity kind
//
// The server enforces legality authoritatively. This table only anticipates it so
// the console never offers (or sends) an action that cannot succeed.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::moderation::types::*;

/// An action that has no edge from the entity's observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("'{action}' is not available for {entity} in status {status}")]
pub struct IllegalTransition {
    pub entity: EntityKey,
    pub status: EntityStatus,
    pub action: Action,
}

/// Expected result of a legal transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    Status(EntityStatus),
    Hidden(bool),
    /// Physical removal (category hard delete)
    Removed,
}

/// How many confirmations an action needs before it may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfirmationTier {
    /// One confirmation describing the effect
    Standard,
    /// The standard confirmation followed by a second, separate one
    Escalated,
}

const NOVEL_EDGES: &[(NovelStatus, Action, NovelStatus)] = &[
    (NovelStatus::UnderReview, Action::Approve, NovelStatus::Published),
    (NovelStatus::UnderReview, Action::Reject, NovelStatus::Draft),
    (NovelStatus::Draft, Action::Archive, NovelStatus::Archived),
    (NovelStatus::UnderReview, Action::Archive, NovelStatus::Archived),
    (NovelStatus::Published, Action::Archive, NovelStatus::Archived),
];

const CATEGORY_EDGES: &[(CategoryStatus, Action, Option<CategoryStatus>)] = &[
    (CategoryStatus::Active, Action::ToggleStatus, Some(CategoryStatus::Inactive)),
    (CategoryStatus::Inactive, Action::ToggleStatus, Some(CategoryStatus::Active)),
    (CategoryStatus::Active, Action::SoftDelete, Some(CategoryStatus::Deleted)),
    (CategoryStatus::Inactive, Action::SoftDelete, Some(CategoryStatus::Deleted)),
    (CategoryStatus::Active, Action::HardDelete, None),
    (CategoryStatus::Inactive, Action::HardDelete, None),
];

/// Pure lookup of the lifecycle graph
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionRegistry;

impl TransitionRegistry {
    /// Effect of `action` from the given observed state, or `None` if there is no such edge
    pub fn effect(
        kind: EntityKind,
        status: EntityStatus,
        hidden: bool,
        action: Action,
    ) -> Option<TransitionEffect> {
        if status.kind() != kind || action.kind() != kind {
            return None;
        }

        match status {
            EntityStatus::Novel(NovelStatus::Archived) => None,
            EntityStatus::Novel(current) => match action {
                Action::Hide if !hidden => Some(TransitionEffect::Hidden(true)),
                Action::Unhide if hidden => Some(TransitionEffect::Hidden(false)),
                Action::Hide | Action::Unhide => None,
                _ => NOVEL_EDGES
                    .iter()
                    .find(|(from, edge, _)| *from == current && *edge == action)
                    .map(|(_, _, to)| TransitionEffect::Status((*to).into())),
            },
            EntityStatus::Category(current) => CATEGORY_EDGES
                .iter()
                .find(|(from, edge, _)| *from == current && *edge == action)
                .map(|(_, _, to)| match to {
                    Some(next) => TransitionEffect::Status((*next).into()),
                    None => TransitionEffect::Removed,
                }),
        }
    }

    /// Every action the console may offer for the observed state
    pub fn legal_actions(kind: EntityKind, status: EntityStatus, hidden: bool) -> BTreeSet<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| Self::effect(kind, status, hidden, *action).is_some())
            .collect()
    }

    pub fn legal_actions_for(entity: &ModerableEntity) -> BTreeSet<Action> {
        Self::legal_actions(entity.kind, entity.status, entity.hidden)
    }

    pub fn is_legal(entity: &ModerableEntity, action: Action) -> bool {
        Self::effect(entity.kind, entity.status, entity.hidden, action).is_some()
    }

    pub fn effect_on(entity: &ModerableEntity, action: Action) -> Option<TransitionEffect> {
        Self::effect(entity.kind, entity.status, entity.hidden, action)
    }

    pub fn is_irreversible(action: Action) -> bool {
        matches!(action, Action::Archive | Action::HardDelete)
    }

    /// Every action changes state, so every action is confirmed
    pub fn requires_confirmation(action: Action) -> bool {
        match action {
            Action::Approve
            | Action::Reject
            | Action::Hide
            | Action::Unhide
            | Action::Archive
            | Action::ToggleStatus
            | Action::SoftDelete
            | Action::HardDelete => true,
        }
    }

    pub fn confirmation_tier(action: Action) -> ConfirmationTier {
        if Self::is_irreversible(action) {
            ConfirmationTier::Escalated
        } else {
            ConfirmationTier::Standard
        }
    }

    /// Build the request the executor runs for `action` on `entity`
    pub fn request(entity: &ModerableEntity, action: Action) -> TransitionRequest {
        TransitionRequest {
            entity: entity.key(),
            action,
            requires_confirmation: Self::requires_confirmation(action),
            irreversible: Self::is_irreversible(action),
            notes: None,
        }
    }

    /// Fail with `IllegalTransition` unless `action` is offered for `entity`
    pub fn ensure_legal(
        entity: &ModerableEntity,
        action: Action,
    ) -> Result<TransitionEffect, IllegalTransition> {
        Self::effect_on(entity, action).ok_or(IllegalTransition {
            entity: entity.key(),
            status: entity.status,
            action,
        })
    }

    /// Apply a legal transition to a local copy; `Ok(None)` means the entity was removed
    pub fn apply(
        entity: &ModerableEntity,
        action: Action,
    ) -> Result<Option<ModerableEntity>, IllegalTransition> {
        let effect = Self::ensure_legal(entity, action)?;
        let mut next = entity.clone();
        match effect {
            TransitionEffect::Status(status) => next.status = status,
            TransitionEffect::Hidden(hidden) => next.hidden = hidden,
            TransitionEffect::Removed => return Ok(None),
        }
        Ok(Some(next))
    }
}
