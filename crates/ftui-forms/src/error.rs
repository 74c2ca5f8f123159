#![forbid(unsafe_code)]

//! Structural errors raised by control-tree operations.
//!
//! Validation failures are never reported here: they live in a control's
//! `errors` map and drive its status. A [`FormError`] means the caller used
//! the tree in a way its shape does not allow, and the call was aborted.

use std::fmt;

use crate::control::ControlId;

/// Result alias used across the crate.
pub type Result<T, E = FormError> = std::result::Result<T, E>;

/// The composite flavour involved in a structural error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeKind {
    /// A keyed group.
    Group,
    /// A keyed record of homogeneous children.
    Record,
    /// An ordered array.
    Array,
}

impl CompositeKind {
    fn noun(self) -> &'static str {
        match self {
            Self::Group => "form group",
            Self::Record => "form record",
            Self::Array => "form array",
        }
    }

    fn key_noun(self) -> &'static str {
        match self {
            Self::Group | Self::Record => "name",
            Self::Array => "index",
        }
    }
}

/// Fatal misuse of a control tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// A strict `set_value` addressed a composite without children.
    NoControls { kind: CompositeKind },
    /// A strict `set_value` named a child that does not exist.
    MissingControl { kind: CompositeKind, key: String },
    /// A strict `set_value` omitted the value for an existing child.
    MissingControlValue { kind: CompositeKind, key: String },
    /// A control name was required but absent or empty.
    MissingControlName,
    /// The id does not refer to a live control.
    UnknownControl { id: ControlId },
    /// The operation requires a different control variant.
    WrongKind { id: ControlId, expected: &'static str },
    /// The control already has a parent and must be detached first.
    ControlAlreadyAttached { id: ControlId, parent: ControlId },
    /// Attaching would make a control its own ancestor.
    CycleDetected {
        ancestor: ControlId,
        descendant: ControlId,
    },
    /// Only detached roots can be released.
    ReleaseAttached { id: ControlId, parent: ControlId },
    /// An async validator returned something other than a deferred value or a stream.
    AsyncValidatorMisuse { id: ControlId, message: String },
    /// A pattern validator was given an expression that does not compile.
    InvalidPattern { pattern: String, message: String },
    /// An equality validator needs at least two keys to compare.
    TooFewEqualityKeys { count: usize },
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoControls { kind } => write!(
                f,
                "there are no controls registered with this {} yet",
                kind.noun()
            ),
            Self::MissingControl { kind, key } => write!(
                f,
                "cannot find {} control with {} '{key}'",
                kind.noun(),
                kind.key_noun()
            ),
            Self::MissingControlValue { kind, key } => write!(
                f,
                "must supply a value for {} control with {} '{key}'",
                kind.noun(),
                kind.key_noun()
            ),
            Self::MissingControlName => f.write_str("control name must be a non-empty string"),
            Self::UnknownControl { id } => write!(f, "control {id} does not exist"),
            Self::WrongKind { id, expected } => {
                write!(f, "control {id} is not a {expected}")
            }
            Self::ControlAlreadyAttached { id, parent } => {
                write!(f, "control {id} is already attached to {parent}")
            }
            Self::CycleDetected {
                ancestor,
                descendant,
            } => write!(
                f,
                "operation would create cycle: control {ancestor} is an ancestor of {descendant}"
            ),
            Self::ReleaseAttached { id, parent } => write!(
                f,
                "control {id} is still attached to {parent} and cannot be released"
            ),
            Self::AsyncValidatorMisuse { id, message } => {
                write!(f, "control {id}: {message}")
            }
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid pattern '{pattern}': {message}")
            }
            Self::TooFewEqualityKeys { count } => {
                write!(f, "equality needs at least two keys, got {count}")
            }
        }
    }
}

impl std::error::Error for FormError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_messages_name_the_key() {
        let err = FormError::MissingControl {
            kind: CompositeKind::Group,
            key: "email".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot find form group control with name 'email'"
        );

        let err = FormError::MissingControlValue {
            kind: CompositeKind::Array,
            key: "2".into(),
        };
        assert_eq!(
            err.to_string(),
            "must supply a value for form array control with index '2'"
        );
    }

    #[test]
    fn no_controls_message() {
        let err = FormError::NoControls {
            kind: CompositeKind::Array,
        };
        assert!(err.to_string().contains("form array"));
    }

    #[test]
    fn unknown_control_uses_id_display() {
        let err = FormError::UnknownControl {
            id: ControlId::from_raw(7),
        };
        assert_eq!(err.to_string(), "control #7 does not exist");
    }
}
