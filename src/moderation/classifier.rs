// Failure classification
//
// Server text is not a versioned contract. Rules are an ordered table evaluated
// top-down; anything unmatched or ambiguous becomes `UnknownError` and keeps the
// raw message intact.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::api::errors::ApiError;
use crate::config::ClassifierConfig;
use crate::moderation::types::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    ValidationError,
    ReferentialIntegrityError,
    AuthError,
    TransientError,
    UnknownError,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ValidationError => "ValidationError",
            ErrorClass::ReferentialIntegrityError => "ReferentialIntegrityError",
            ErrorClass::AuthError => "AuthError",
            ErrorClass::TransientError => "TransientError",
            ErrorClass::UnknownError => "UnknownError",
        }
    }

    /// Recovery hint when no rule supplies a more specific one
    pub fn default_hint(&self, action: Option<Action>) -> &'static str {
        match (self, action) {
            (ErrorClass::ReferentialIntegrityError, Some(Action::HardDelete)) => {
                "Other records still reference this category. Use soft delete, or remove dependent records first."
            }
            (ErrorClass::ReferentialIntegrityError, _) => {
                "Other records still reference this entity. Remove or reassign dependent records first."
            }
            (ErrorClass::ValidationError, _) => {
                "The server rejected the request as invalid. Correct the input and try again."
            }
            (ErrorClass::AuthError, _) => "Your session has expired. Sign in again to continue.",
            (ErrorClass::TransientError, _) => {
                "Temporary failure reaching the server. Retry the action when the connection recovers."
            }
            (ErrorClass::UnknownError, _) => {
                "The server reported an unrecognized failure. Review the message above before retrying."
            }
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure after classification, ready to render on its row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub raw_message: String,
    pub recovery_hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Name of the rule that matched; `None` for the fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ClassifiedError {
    /// Auth failures tear down the whole session, not just the row
    pub fn requires_session_teardown(&self) -> bool {
        self.class == ErrorClass::AuthError
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.class, self.raw_message, self.recovery_hint)
    }
}

/// Predicate half of a classification rule
#[derive(Debug, Clone)]
pub enum FailureMatcher {
    StatusCode(u16),
    /// Inclusive range, e.g. 500..=599
    StatusRange(u16, u16),
    /// Case-insensitive substrings of the server message; any one matches
    MessageContains(Vec<String>),
    MessagePattern(Regex),
    Network,
    Timeout,
}

impl FailureMatcher {
    pub fn message_contains<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FailureMatcher::MessageContains(
            markers
                .into_iter()
                .map(|m| m.into().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    fn matches(&self, failure: &ApiError, lowered_message: &str) -> bool {
        match self {
            FailureMatcher::StatusCode(code) => failure.status_code() == Some(*code),
            FailureMatcher::StatusRange(low, high) => failure
                .status_code()
                .map(|code| (*low..=*high).contains(&code))
                .unwrap_or(false),
            FailureMatcher::MessageContains(markers) => {
                markers.iter().any(|marker| lowered_message.contains(marker.as_str()))
            }
            FailureMatcher::MessagePattern(pattern) => pattern.is_match(lowered_message),
            FailureMatcher::Network => failure.is_network(),
            FailureMatcher::Timeout => failure.is_timeout(),
        }
    }

    fn is_message_based(&self) -> bool {
        matches!(
            self,
            FailureMatcher::MessageContains(_) | FailureMatcher::MessagePattern(_)
        )
    }
}

/// One `(predicate, class)` row of the table
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: String,
    pub matcher: FailureMatcher,
    pub class: ErrorClass,
    pub hint: Option<String>,
}

impl ClassificationRule {
    pub fn new(name: impl Into<String>, matcher: FailureMatcher, class: ErrorClass) -> Self {
        Self {
            name: name.into(),
            matcher,
            class,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ClassifierConfigError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub const REFERENTIAL_INTEGRITY_MARKERS: &[&str] = &[
    "foreign key constraint",
    "violates foreign key",
    "still referenced",
    "is referenced by",
    "category_id_fkey",
    "integrity constraint violation: 1451",
];

pub const AUTH_MARKERS: &[&str] = &["jwt expired", "token expired", "session expired"];

pub const VALIDATION_MARKERS: &[&str] = &["validation failed", "validation error"];

/// Ordered rule table mapping raw failures to `ErrorClass`
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl ErrorClassifier {
    /// A classifier with no rules: everything is `UnknownError`
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_default_rules() -> Self {
        Self::empty()
            .with_rule(ClassificationRule::new(
                "http-401",
                FailureMatcher::StatusCode(401),
                ErrorClass::AuthError,
            ))
            .with_rule(ClassificationRule::new(
                "expired-session",
                FailureMatcher::message_contains(AUTH_MARKERS.iter().copied()),
                ErrorClass::AuthError,
            ))
            .with_rule(ClassificationRule::new(
                "referential-integrity",
                FailureMatcher::message_contains(REFERENTIAL_INTEGRITY_MARKERS.iter().copied()),
                ErrorClass::ReferentialIntegrityError,
            ))
            .with_rule(ClassificationRule::new(
                "validation-marker",
                FailureMatcher::message_contains(VALIDATION_MARKERS.iter().copied()),
                ErrorClass::ValidationError,
            ))
            .with_rule(ClassificationRule::new(
                "http-400",
                FailureMatcher::StatusCode(400),
                ErrorClass::ValidationError,
            ))
            .with_rule(ClassificationRule::new(
                "http-422",
                FailureMatcher::StatusCode(422),
                ErrorClass::ValidationError,
            ))
            .with_rule(ClassificationRule::new(
                "network",
                FailureMatcher::Network,
                ErrorClass::TransientError,
            ))
            .with_rule(
                ClassificationRule::new(
                    "timeout",
                    FailureMatcher::Timeout,
                    ErrorClass::TransientError,
                )
                .with_hint(
                    "The server did not answer in time. The action may or may not have been \
                     applied; refresh before retrying.",
                ),
            )
            .with_rule(ClassificationRule::new(
                "http-5xx",
                FailureMatcher::StatusRange(500, 599),
                ErrorClass::TransientError,
            ))
    }

    /// Default rules extended with markers and patterns from configuration
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierConfigError> {
        let mut classifier = Self::with_default_rules();

        if !config.auth_markers.is_empty() {
            classifier = classifier.with_rule_before(
                "referential-integrity",
                ClassificationRule::new(
                    "configured-auth-markers",
                    FailureMatcher::message_contains(config.auth_markers.iter().cloned()),
                    ErrorClass::AuthError,
                ),
            );
        }

        if !config.referential_integrity_markers.is_empty() {
            classifier = classifier.with_rule_before(
                "validation-marker",
                ClassificationRule::new(
                    "configured-referential-integrity-markers",
                    FailureMatcher::message_contains(
                        config.referential_integrity_markers.iter().cloned(),
                    ),
                    ErrorClass::ReferentialIntegrityError,
                ),
            );
        }

        for (index, pattern) in config.referential_integrity_patterns.iter().enumerate() {
            let regex = Regex::new(&format!("(?i){pattern}")).map_err(|source| {
                ClassifierConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            classifier = classifier.with_rule_before(
                "validation-marker",
                ClassificationRule::new(
                    format!("configured-referential-integrity-pattern-{index}"),
                    FailureMatcher::MessagePattern(regex),
                    ErrorClass::ReferentialIntegrityError,
                ),
            );
        }

        Ok(classifier)
    }

    /// Append a rule at the lowest precedence
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Insert a rule just ahead of the named one (appended if the name is unknown)
    pub fn with_rule_before(mut self, name: &str, rule: ClassificationRule) -> Self {
        match self.rules.iter().position(|r| r.name == name) {
            Some(index) => self.rules.insert(index, rule),
            None => self.rules.push(rule),
        }
        self
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn classify(&self, failure: &ApiError, action: Option<Action>) -> ClassifiedError {
        let raw_message = failure.raw_message();
        let lowered = raw_message.to_lowercase();

        let matched = self
            .rules
            .iter()
            .find(|rule| rule.matcher.matches(failure, &lowered))
            .filter(|rule| !self.is_ambiguous(rule, failure, &lowered));

        let (class, hint, rule_name) = match matched {
            Some(rule) => (
                rule.class,
                rule.hint
                    .clone()
                    .unwrap_or_else(|| rule.class.default_hint(action).to_string()),
                Some(rule.name.clone()),
            ),
            None => (
                ErrorClass::UnknownError,
                ErrorClass::UnknownError.default_hint(action).to_string(),
                None,
            ),
        };

        debug!(
            class = %class,
            rule = ?rule_name,
            status = ?failure.status_code(),
            "Classified collaborator failure"
        );

        ClassifiedError {
            class,
            raw_message: if raw_message.trim().is_empty() {
                failure.to_string()
            } else {
                raw_message
            },
            recovery_hint: hint,
            status_code: failure.status_code(),
            action,
            rule: rule_name,
            occurred_at: Utc::now(),
        }
    }

    /// A message-based winner is ambiguous when message markers of another class match too
    fn is_ambiguous(&self, winner: &ClassificationRule, failure: &ApiError, lowered: &str) -> bool {
        if !winner.matcher.is_message_based() {
            return false;
        }
        let conflicting = self.rules.iter().find(|rule| {
            rule.class != winner.class
                && rule.matcher.is_message_based()
                && rule.matcher.matches(failure, lowered)
        });
        if let Some(rule) = conflicting {
            debug!(
                winner = %winner.name,
                conflicting = %rule.name,
                "Ambiguous failure message, falling back to UnknownError"
            );
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn classify(err: ApiError) -> ClassifiedError {
        ErrorClassifier::with_default_rules().classify(&err, None)
    }

    #[test]
    fn test_foreign_key_message_is_referential_integrity() {
        let err = ApiError::http(
            500,
            "update or delete on table \"categories\" violates foreign key constraint \"novels_category_id_fkey\"",
        );
        let classified = ErrorClassifier::default().classify(&err, Some(Action::HardDelete));

        assert_eq!(classified.class, ErrorClass::ReferentialIntegrityError);
        assert!(classified.recovery_hint.contains("Use soft delete"));
        assert_eq!(classified.raw_message, err.raw_message());
        assert_eq!(classified.rule.as_deref(), Some("referential-integrity"));
    }

    #[test]
    fn test_rejected_envelope_with_marker() {
        let classified = classify(ApiError::rejected("Category is still referenced by 3 novels"));
        assert_eq!(classified.class, ErrorClass::ReferentialIntegrityError);
    }

    #[test]
    fn test_401_is_auth_error() {
        let classified = classify(ApiError::http(401, "Unauthorized"));
        assert_eq!(classified.class, ErrorClass::AuthError);
        assert!(classified.requires_session_teardown());
    }

    #[test]
    fn test_expired_token_message_is_auth_error() {
        let classified = classify(ApiError::http(403, "JWT expired at 2026-10-01T00:00:00Z"));
        assert_eq!(classified.class, ErrorClass::AuthError);
    }

    #[test]
    fn test_transient_failures() {
        assert_eq!(
            classify(ApiError::Network("connection refused".into())).class,
            ErrorClass::TransientError
        );
        assert_eq!(
            classify(ApiError::timeout("hide novel#1", Duration::from_secs(5))).class,
            ErrorClass::TransientError
        );
        assert_eq!(
            classify(ApiError::http(503, "Service Unavailable")).class,
            ErrorClass::TransientError
        );
    }

    #[test]
    fn test_validation_failures() {
        assert_eq!(
            classify(ApiError::http(422, "title is required")).class,
            ErrorClass::ValidationError
        );
        assert_eq!(
            classify(ApiError::rejected("Validation failed: notes too long")).class,
            ErrorClass::ValidationError
        );
    }

    #[test]
    fn test_unmatched_failure_is_unknown_and_verbatim() {
        let classified = classify(ApiError::http(409, "Novel was modified by another moderator"));
        assert_eq!(classified.class, ErrorClass::UnknownError);
        assert_eq!(classified.raw_message, "Novel was modified by another moderator");
        assert!(classified.rule.is_none());
    }

    #[test]
    fn test_conflicting_markers_fail_closed() {
        let classified = classify(ApiError::rejected(
            "Validation failed: foreign key constraint on category_id",
        ));
        assert_eq!(classified.class, ErrorClass::UnknownError);
        assert!(classified.raw_message.contains("foreign key constraint"));
    }

    #[test]
    fn test_referential_marker_beats_5xx_status() {
        let classified = classify(ApiError::http(500, "Cannot delete: still referenced"));
        assert_eq!(classified.class, ErrorClass::ReferentialIntegrityError);
    }

    #[test]
    fn test_empty_classifier_always_unknown() {
        let classified =
            ErrorClassifier::empty().classify(&ApiError::http(401, "Unauthorized"), None);
        assert_eq!(classified.class, ErrorClass::UnknownError);
    }

    #[test]
    fn test_configured_markers_are_additive() {
        let config = ClassifierConfig {
            referential_integrity_markers: vec!["has chapters attached".to_string()],
            referential_integrity_patterns: vec![r"fk_\w+_category".to_string()],
            auth_markers: vec!["login required".to_string()],
        };
        let classifier = ErrorClassifier::from_config(&config).unwrap();

        let chapters =
            classifier.classify(&ApiError::rejected("Category has chapters attached"), None);
        assert_eq!(chapters.class, ErrorClass::ReferentialIntegrityError);

        let pattern = classifier.classify(
            &ApiError::http(500, "constraint FK_NOVEL_CATEGORY failed"),
            None,
        );
        assert_eq!(pattern.class, ErrorClass::ReferentialIntegrityError);

        let auth = classifier.classify(&ApiError::http(403, "Login required"), None);
        assert_eq!(auth.class, ErrorClass::AuthError);

        // Defaults survive
        let fk = classifier.classify(&ApiError::http(500, "violates foreign key constraint"), None);
        assert_eq!(fk.class, ErrorClass::ReferentialIntegrityError);
    }

    #[test]
    fn test_invalid_configured_pattern_is_reported() {
        let config = ClassifierConfig {
            referential_integrity_patterns: vec!["(unclosed".to_string()],
            ..ClassifierConfig::default()
        };
        assert!(matches!(
            ErrorClassifier::from_config(&config),
            Err(ClassifierConfigError::InvalidPattern { .. })
        ));
    }
}
