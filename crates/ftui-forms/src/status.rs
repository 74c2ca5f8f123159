#![forbid(unsafe_code)]

//! Control status and update-strategy enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation status of a control.
///
/// Status is always derived: it is recomputed from the control's own errors,
/// its own in-flight async validation and the status of its enabled children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlStatus {
    /// All validators passed.
    #[default]
    Valid,
    /// The control or an enabled descendant failed validation.
    Invalid,
    /// An async validation on the control or an enabled descendant is in flight.
    Pending,
    /// The control is exempt from validation and from its parent's aggregates.
    Disabled,
}

impl ControlStatus {
    /// Stable upper-case name, as published on status channels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Pending => "PENDING",
            Self::Disabled => "DISABLED",
        }
    }

    /// `true` unless the status is [`ControlStatus::Disabled`].
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The view event on which staged values and touches are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOn {
    /// Commit on every input event.
    #[default]
    Change,
    /// Commit when the view loses focus.
    Blur,
    /// Commit only when the owning form is submitted.
    Submit,
}

impl UpdateOn {
    /// Lower-case hook name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Blur => "blur",
            Self::Submit => "submit",
        }
    }
}

impl fmt::Display for UpdateOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_is_upper_case() {
        assert_eq!(ControlStatus::Valid.to_string(), "VALID");
        assert_eq!(ControlStatus::Invalid.to_string(), "INVALID");
        assert_eq!(ControlStatus::Pending.to_string(), "PENDING");
        assert_eq!(ControlStatus::Disabled.to_string(), "DISABLED");
    }

    #[test]
    fn only_disabled_is_not_enabled() {
        assert!(ControlStatus::Valid.is_enabled());
        assert!(ControlStatus::Invalid.is_enabled());
        assert!(ControlStatus::Pending.is_enabled());
        assert!(!ControlStatus::Disabled.is_enabled());
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&ControlStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let hook: UpdateOn = serde_json::from_str("\"blur\"").unwrap();
        assert_eq!(hook, UpdateOn::Blur);
    }

    #[test]
    fn update_on_defaults_to_change() {
        assert_eq!(UpdateOn::default(), UpdateOn::Change);
    }
}
