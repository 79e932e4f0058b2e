// Core types for the moderation lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kinds of content the console can moderate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Novel,
    Category,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Novel => "novel",
            EntityKind::Category => "category",
        }
    }

    /// REST collection segment for this kind
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Novel => "novels",
            EntityKind::Category => "categories",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing kinds, statuses or actions from operator input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: '{input}'")]
pub struct ParseError {
    pub what: &'static str,
    pub input: String,
}

impl ParseError {
    fn new(what: &'static str, input: &str) -> Self {
        Self {
            what,
            input: input.to_string(),
        }
    }
}

/// Normalize operator input so `under-review`, `UNDER_REVIEW` and `Under Review` all match
fn normalize(input: &str) -> String {
    input
        .trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

impl FromStr for EntityKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "novel" | "novels" => Ok(EntityKind::Novel),
            "category" | "categories" => Ok(EntityKind::Category),
            _ => Err(ParseError::new("entity kind", s)),
        }
    }
}

/// Administrative states of a novel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NovelStatus {
    Draft,
    UnderReview,
    Published,
    /// Terminal: nothing is offered once a novel is archived
    Archived,
}

/// Administrative states of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
    Active,
    Inactive,
    /// Soft-deleted. Recoverable at the data layer, terminal for this console.
    Deleted,
}

/// Kind-specific status carried by a moderable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityStatus {
    Novel(NovelStatus),
    Category(CategoryStatus),
}

impl EntityStatus {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityStatus::Novel(_) => EntityKind::Novel,
            EntityStatus::Category(_) => EntityKind::Category,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Novel(NovelStatus::Draft) => "DRAFT",
            EntityStatus::Novel(NovelStatus::UnderReview) => "UNDER_REVIEW",
            EntityStatus::Novel(NovelStatus::Published) => "PUBLISHED",
            EntityStatus::Novel(NovelStatus::Archived) => "ARCHIVED",
            EntityStatus::Category(CategoryStatus::Active) => "ACTIVE",
            EntityStatus::Category(CategoryStatus::Inactive) => "INACTIVE",
            EntityStatus::Category(CategoryStatus::Deleted) => "DELETED",
        }
    }

    /// Parse a status for a known kind
    pub fn parse(kind: EntityKind, input: &str) -> Result<Self, ParseError> {
        let status = match (kind, normalize(input).as_str()) {
            (EntityKind::Novel, "draft") => EntityStatus::Novel(NovelStatus::Draft),
            (EntityKind::Novel, "under_review") => EntityStatus::Novel(NovelStatus::UnderReview),
            (EntityKind::Novel, "published") => EntityStatus::Novel(NovelStatus::Published),
            (EntityKind::Novel, "archived") => EntityStatus::Novel(NovelStatus::Archived),
            (EntityKind::Category, "active") => EntityStatus::Category(CategoryStatus::Active),
            (EntityKind::Category, "inactive") => EntityStatus::Category(CategoryStatus::Inactive),
            (EntityKind::Category, "deleted") => EntityStatus::Category(CategoryStatus::Deleted),
            _ => return Err(ParseError::new("status", input)),
        };
        Ok(status)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NovelStatus> for EntityStatus {
    fn from(status: NovelStatus) -> Self {
        EntityStatus::Novel(status)
    }
}

impl From<CategoryStatus> for EntityStatus {
    fn from(status: CategoryStatus) -> Self {
        EntityStatus::Category(status)
    }
}

/// Identity of an entity across kinds (novel 5 and category 5 are different rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn novel(id: u64) -> Self {
        Self::new(EntityKind::Novel, id)
    }

    pub fn category(id: u64) -> Self {
        Self::new(EntityKind::Category, id)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// A record the console can move between administrative states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerableEntity {
    pub id: u64,
    pub kind: EntityKind,
    pub status: EntityStatus,
    /// Only meaningful for novels
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub dependent_resource_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ModerableEntity {
    pub fn novel(id: u64, status: NovelStatus) -> Self {
        Self {
            id,
            kind: EntityKind::Novel,
            status: status.into(),
            hidden: false,
            dependent_resource_count: 0,
            title: None,
        }
    }

    pub fn category(id: u64, status: CategoryStatus) -> Self {
        Self {
            id,
            kind: EntityKind::Category,
            status: status.into(),
            hidden: false,
            dependent_resource_count: 0,
            title: None,
        }
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_dependents(mut self, count: u32) -> Self {
        self.dependent_resource_count = count;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id)
    }

    /// Status and kind agree (a novel never carries a category status)
    pub fn is_consistent(&self) -> bool {
        self.status.kind() == self.kind
    }

    /// Short operator-facing label, e.g. `novel #42 "Moonlit Harbor"`
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => format!("{} #{} \"{}\"", self.kind, self.id, title),
            None => format!("{} #{}", self.kind, self.id),
        }
    }
}

/// Operator-triggered transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Approve,
    Reject,
    Hide,
    Unhide,
    Archive,
    ToggleStatus,
    SoftDelete,
    HardDelete,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Approve,
        Action::Reject,
        Action::Hide,
        Action::Unhide,
        Action::Archive,
        Action::ToggleStatus,
        Action::SoftDelete,
        Action::HardDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Hide => "hide",
            Action::Unhide => "unhide",
            Action::Archive => "archive",
            Action::ToggleStatus => "toggle-status",
            Action::SoftDelete => "soft-delete",
            Action::HardDelete => "hard-delete",
        }
    }

    /// Which entity kind exposes this action
    pub fn kind(&self) -> EntityKind {
        match self {
            Action::Approve | Action::Reject | Action::Hide | Action::Unhide | Action::Archive => {
                EntityKind::Novel
            }
            Action::ToggleStatus | Action::SoftDelete | Action::HardDelete => EntityKind::Category,
        }
    }

    /// Present participle shown while the action is in flight
    pub fn progress_label(&self) -> &'static str {
        match self {
            Action::Approve => "approving",
            Action::Reject => "rejecting",
            Action::Hide => "hiding",
            Action::Unhide => "unhiding",
            Action::Archive => "archiving",
            Action::ToggleStatus => "toggling status",
            Action::SoftDelete => "deleting",
            Action::HardDelete => "permanently deleting",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Action::ALL
            .into_iter()
            .find(|action| action.as_str().replace('-', "_") == wanted)
            .ok_or_else(|| ParseError::new("action", s))
    }
}

/// A single requested transition, as handed to the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub entity: EntityKey,
    pub action: Action,
    pub requires_confirmation: bool,
    pub irreversible: bool,
    /// Operator notes for resolve-style endpoints (approve / reject)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TransitionRequest {
    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes.filter(|n| !n.trim().is_empty());
        self
    }
}
