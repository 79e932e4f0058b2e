// Tiered confirmation before any collaborator call
//
// The gate is a fixed pipeline of prompts. Each stage must be affirmed; the first
// refusal ends the pipeline, and nothing downstream (lock, network) is touched.

use async_trait::async_trait;
use tracing::info;

use crate::moderation::registry::{ConfirmationTier, TransitionRegistry};
use crate::moderation::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationStage {
    /// Plain-language description of the effect
    Primary,
    /// Second, separate confirmation for irreversible actions
    Escalation,
}

/// What the view shows the operator at one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub stage: ConfirmationStage,
    pub entity: EntityKey,
    pub action: Action,
    pub title: String,
    pub body: String,
    /// Contextual warning, e.g. dependent records that will block a hard delete
    pub warning: Option<String>,
    pub confirm_label: String,
}

/// Asks the operator. Implemented by whatever renders the console.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// `true` only on an explicit affirmative answer
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool;
}

/// Affirms every prompt. Used for `--yes` on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        info!(
            entity = %prompt.entity,
            action = %prompt.action,
            stage = ?prompt.stage,
            "Auto-confirmed"
        );
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Confirmed,
    Cancelled { stage: ConfirmationStage },
}

impl GateDecision {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, GateDecision::Confirmed)
    }
}

pub struct ConfirmationGate;

impl ConfirmationGate {
    /// Ordered prompts for `action` on `entity`: one for standard actions, two for escalated ones
    pub fn prompts(entity: &ModerableEntity, action: Action) -> Vec<ConfirmationPrompt> {
        let mut prompts = vec![ConfirmationPrompt {
            stage: ConfirmationStage::Primary,
            entity: entity.key(),
            action,
            title: format!("Confirm {}", action),
            body: describe_effect(entity, action),
            warning: None,
            confirm_label: confirm_label(action).to_string(),
        }];

        if TransitionRegistry::confirmation_tier(action) == ConfirmationTier::Escalated {
            prompts.push(ConfirmationPrompt {
                stage: ConfirmationStage::Escalation,
                entity: entity.key(),
                action,
                title: format!("This cannot be undone: {}", action),
                body: format!(
                    "You are about to {} {}. There is no way to reverse this from the console. Are you absolutely sure?",
                    action,
                    entity.label()
                ),
                warning: dependents_warning(entity, action),
                confirm_label: format!("Yes, {}", action),
            });
        }

        prompts
    }

    /// Walk the pipeline, stopping at the first refusal
    pub async fn run(
        entity: &ModerableEntity,
        action: Action,
        confirmer: &dyn Confirmer,
    ) -> GateDecision {
        for prompt in Self::prompts(entity, action) {
            if !confirmer.confirm(&prompt).await {
                info!(
                    entity = %prompt.entity,
                    action = %action,
                    stage = ?prompt.stage,
                    "Transition cancelled by operator"
                );
                return GateDecision::Cancelled {
                    stage: prompt.stage,
                };
            }
        }
        GateDecision::Confirmed
    }
}

fn describe_effect(entity: &ModerableEntity, action: Action) -> String {
    let label = entity.label();
    match action {
        Action::Approve => format!("Approve {label}. It will be published and visible to readers."),
        Action::Reject => {
            format!("Reject {label}. It will return to draft and leave the review queue.")
        }
        Action::Hide => format!("Hide {label} from readers. Its status stays {}.", entity.status),
        Action::Unhide => format!("Make {label} visible to readers again."),
        Action::Archive => format!("Archive {label}. Archived novels accept no further actions."),
        Action::ToggleStatus => match entity.status {
            EntityStatus::Category(CategoryStatus::Active) => {
                format!("Deactivate {label}. New novels can no longer be filed under it.")
            }
            _ => format!("Activate {label}. It becomes available for new novels."),
        },
        Action::SoftDelete => {
            format!("Delete {label}. It is removed from the console but kept in the database.")
        }
        Action::HardDelete => format!("Permanently delete {label} from the database."),
    }
}

fn confirm_label(action: Action) -> &'static str {
    match action {
        Action::Approve => "Approve",
        Action::Reject => "Reject",
        Action::Hide => "Hide",
        Action::Unhide => "Unhide",
        Action::Archive => "Archive",
        Action::ToggleStatus => "Toggle status",
        Action::SoftDelete => "Delete",
        Action::HardDelete => "Delete permanently",
    }
}

fn dependents_warning(entity: &ModerableEntity, action: Action) -> Option<String> {
    let count = entity.dependent_resource_count;
    if count == 0 {
        return None;
    }
    let records = if count == 1 { "record" } else { "records" };
    let warning = match action {
        Action::HardDelete => format!(
            "{} still has {count} dependent {records}. Permanent deletion will fail while they exist; use soft delete, or remove the dependent {records} first.",
            entity.label()
        ),
        _ => format!(
            "{} has {count} dependent {records}. They stay attached to it after this action.",
            entity.label()
        ),
    };
    Some(warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers prompts from a script and records what it was asked
    struct ScriptedConfirmer {
        answers: Mutex<Vec<bool>>,
        seen: Mutex<Vec<ConfirmationPrompt>>,
    }

    impl ScriptedConfirmer {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().rev().copied().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<ConfirmationPrompt> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Confirmer for ScriptedConfirmer {
        async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
            self.seen.lock().unwrap().push(prompt.clone());
            self.answers.lock().unwrap().pop().unwrap_or(false)
        }
    }

    #[test]
    fn test_standard_action_has_one_prompt() {
        let novel =
            ModerableEntity::novel(1, NovelStatus::UnderReview).with_title("Moonlit Harbor");
        let prompts = ConfirmationGate::prompts(&novel, Action::Approve);

        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].stage, ConfirmationStage::Primary);
        assert!(prompts[0].body.contains("Moonlit Harbor"));
        assert!(prompts[0].warning.is_none());
    }

    #[test]
    fn test_hard_delete_escalates_with_dependents_warning() {
        let category = ModerableEntity::category(7, CategoryStatus::Active).with_dependents(3);
        let prompts = ConfirmationGate::prompts(&category, Action::HardDelete);

        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1].stage, ConfirmationStage::Escalation);
        let warning = prompts[1].warning.as_deref().unwrap();
        assert!(warning.contains("3 dependent records"));
        assert!(warning.contains("will fail"));
        assert!(warning.contains("soft delete"));
    }

    #[test]
    fn test_no_warning_without_dependents() {
        let category = ModerableEntity::category(7, CategoryStatus::Inactive);
        let prompts = ConfirmationGate::prompts(&category, Action::HardDelete);
        assert!(prompts.iter().all(|p| p.warning.is_none()));
    }

    #[test]
    fn test_archive_escalates() {
        let novel = ModerableEntity::novel(2, NovelStatus::Published).with_dependents(12);
        let prompts = ConfirmationGate::prompts(&novel, Action::Archive);
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].warning.as_deref().unwrap().contains("12 dependent records"));
    }

    #[test]
    fn test_cancel_at_second_tier() {
        let category = ModerableEntity::category(7, CategoryStatus::Active).with_dependents(3);
        let confirmer = ScriptedConfirmer::new(&[true, false]);

        let decision = tokio_test::block_on(ConfirmationGate::run(
            &category,
            Action::HardDelete,
            &confirmer,
        ));

        assert_eq!(
            decision,
            GateDecision::Cancelled {
                stage: ConfirmationStage::Escalation
            }
        );
        assert_eq!(confirmer.seen().len(), 2);
    }

    #[test]
    fn test_cancel_at_first_tier_skips_second() {
        let novel = ModerableEntity::novel(2, NovelStatus::Published);
        let confirmer = ScriptedConfirmer::new(&[false]);

        let decision =
            tokio_test::block_on(ConfirmationGate::run(&novel, Action::Archive, &confirmer));

        assert_eq!(
            decision,
            GateDecision::Cancelled {
                stage: ConfirmationStage::Primary
            }
        );
        assert_eq!(confirmer.seen().len(), 1);
    }

    #[test]
    fn test_auto_confirm_passes_both_tiers() {
        let novel = ModerableEntity::novel(2, NovelStatus::Draft);
        let decision =
            tokio_test::block_on(ConfirmationGate::run(&novel, Action::Archive, &AutoConfirm));
        assert!(decision.is_confirmed());
    }
}
