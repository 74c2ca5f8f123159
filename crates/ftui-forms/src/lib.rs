#![forbid(unsafe_code)]

//! Reactive form-control trees.
//!
//! This crate provides the state engine a form view binds to:
//!
//! - [`control`] - the [`ControlTree`] arena with leaves, groups, records and arrays
//! - [`validation`] - sync validators, composition, and cancellable async validation
//! - [`builder`] - declarative construction from a [`ControlSpec`]
//! - [`status`] - [`ControlStatus`] and the [`UpdateOn`] strategies
//!
//! Every control tracks a value, a status, an error map and the
//! pristine/touched flags. A mutation recomputes the control, notifies its
//! observers, then walks up to its ancestors.
//!
//! ```rust
//! use ftui_forms::control::{ControlOptions, ControlTree, FormState, UpdateOptions};
//! use ftui_forms::validation::required;
//! use ftui_forms::ControlStatus;
//! use serde_json::json;
//!
//! let mut tree = ControlTree::new();
//! let username = tree.new_control(FormState::new(json!("foo")), ControlOptions::default()).unwrap();
//! let password = tree
//!     .new_control(FormState::new(json!("")), ControlOptions::default().validator(required()))
//!     .unwrap();
//! let form = tree
//!     .new_group([("username", username), ("password", password)], ControlOptions::default())
//!     .unwrap();
//! assert_eq!(tree.control(form).unwrap().status(), ControlStatus::Invalid);
//!
//! tree.disable(password, UpdateOptions::default()).unwrap();
//! let control = tree.control(form).unwrap();
//! assert_eq!(control.status(), ControlStatus::Valid);
//! assert_eq!(control.value(), &json!({"username": "foo"}));
//! assert_eq!(control.raw_value(), json!({"username": "foo", "password": ""}));
//! ```

pub mod builder;
pub mod control;
pub mod error;
pub mod status;
pub mod validation;
pub mod value;

pub use builder::{ControlSpec, FormBuilder};
pub use control::{
    ControlId, ControlKind, ControlOptions, ControlPath, ControlRef, ControlTree, EmitOptions,
    FormState, MarkOptions, SetValueOptions, Subscription, UpdateOptions,
};
pub use error::{CompositeKind, FormError, Result};
pub use status::{ControlStatus, UpdateOn};
pub use validation::{
    AsyncValidation, AsyncValidatorFn, ValidationErrors, Validator, ValidatorFn,
};
