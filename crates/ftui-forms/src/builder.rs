#![forbid(unsafe_code)]

//! Declarative construction of control trees.
//!
//! A [`ControlSpec`] describes a tree as plain data; [`FormBuilder::build`]
//! allocates it in a [`ControlTree`] children first and returns the root.
//!
//! # Example
//!
//! ```rust
//! use ftui_forms::builder::{ControlSpec, FormBuilder};
//! use ftui_forms::control::ControlTree;
//! use ftui_forms::validation::{email, required};
//! use serde_json::json;
//!
//! let spec = ControlSpec::group([
//!     ("name", ControlSpec::control(json!("Ada")).with_validators(vec![required()])),
//!     ("email", ControlSpec::control(json!("ada@example.com")).with_validators(vec![email()])),
//!     ("tags", ControlSpec::array([ControlSpec::control(json!("math"))])),
//! ]);
//!
//! let mut tree = ControlTree::new();
//! let form = FormBuilder::new().build(&mut tree, spec).unwrap();
//! let control = tree.control(form).unwrap();
//! assert!(control.valid());
//! assert_eq!(control.value()["tags"], json!(["math"]));
//! ```

use serde_json::Value;

use crate::control::{ControlId, ControlOptions, ControlTree, FormState, UpdateOptions};
use crate::error::{FormError, Result};
use crate::status::UpdateOn;
use crate::validation::{AsyncValidatorFn, ValidatorFn};

/// Shape of one control and, for composites, its children.
#[derive(Debug, Clone)]
pub enum ControlSpec {
    Control {
        state: FormState,
        options: ControlOptions,
    },
    Group {
        controls: Vec<(String, ControlSpec)>,
        options: ControlOptions,
        disabled: bool,
    },
    Record {
        controls: Vec<(String, ControlSpec)>,
        options: ControlOptions,
        disabled: bool,
    },
    Array {
        controls: Vec<ControlSpec>,
        options: ControlOptions,
        disabled: bool,
    },
}

impl ControlSpec {
    /// A leaf. Boxed `{"value", "disabled"}` objects are read as [`FormState`].
    #[must_use]
    pub fn control(state: impl Into<FormState>) -> Self {
        Self::Control {
            state: state.into(),
            options: ControlOptions::default(),
        }
    }

    #[must_use]
    pub fn group<I, K>(controls: I) -> Self
    where
        I: IntoIterator<Item = (K, ControlSpec)>,
        K: Into<String>,
    {
        Self::Group {
            controls: collect_keyed(controls),
            options: ControlOptions::default(),
            disabled: false,
        }
    }

    #[must_use]
    pub fn record<I, K>(controls: I) -> Self
    where
        I: IntoIterator<Item = (K, ControlSpec)>,
        K: Into<String>,
    {
        Self::Record {
            controls: collect_keyed(controls),
            options: ControlOptions::default(),
            disabled: false,
        }
    }

    #[must_use]
    pub fn array(controls: impl IntoIterator<Item = ControlSpec>) -> Self {
        Self::Array {
            controls: controls.into_iter().collect(),
            options: ControlOptions::default(),
            disabled: false,
        }
    }

    /// Replace the synchronous validators.
    #[must_use]
    pub fn with_validators(mut self, validators: Vec<ValidatorFn>) -> Self {
        self.options_mut().validators = validators;
        self
    }

    /// Replace the async validators.
    #[must_use]
    pub fn with_async_validators(mut self, validators: Vec<AsyncValidatorFn>) -> Self {
        self.options_mut().async_validators = validators;
        self
    }

    /// Set the update strategy.
    #[must_use]
    pub fn update_on(mut self, update_on: UpdateOn) -> Self {
        self.options_mut().update_on = Some(update_on);
        self
    }

    /// Start disabled.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        match &mut self {
            Self::Control { state, .. } => state.disabled = disabled,
            Self::Group { disabled: flag, .. }
            | Self::Record { disabled: flag, .. }
            | Self::Array { disabled: flag, .. } => *flag = disabled,
        }
        self
    }

    fn options_mut(&mut self) -> &mut ControlOptions {
        match self {
            Self::Control { options, .. }
            | Self::Group { options, .. }
            | Self::Record { options, .. }
            | Self::Array { options, .. } => options,
        }
    }
}

impl From<Value> for ControlSpec {
    fn from(value: Value) -> Self {
        Self::control(value)
    }
}

impl From<FormState> for ControlSpec {
    fn from(state: FormState) -> Self {
        Self::control(state)
    }
}

fn collect_keyed<I, K>(controls: I) -> Vec<(String, ControlSpec)>
where
    I: IntoIterator<Item = (K, ControlSpec)>,
    K: Into<String>,
{
    controls
        .into_iter()
        .map(|(key, spec)| (key.into(), spec))
        .collect()
}

/// Allocates [`ControlSpec`]s into a tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormBuilder {
    non_nullable: bool,
}

impl FormBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every leaf built from here on resets to its initial value.
    #[must_use]
    pub fn non_nullable(mut self) -> Self {
        self.non_nullable = true;
        self
    }

    /// Build `spec` into `tree` and return the root id.
    ///
    /// On error, controls already built for this call are released again.
    pub fn build(&self, tree: &mut ControlTree, spec: ControlSpec) -> Result<ControlId> {
        match spec {
            ControlSpec::Control { state, options } => {
                let non_nullable = options.non_nullable || self.non_nullable;
                tree.new_control(state, options.non_nullable(non_nullable))
            }
            ControlSpec::Group {
                controls,
                options,
                disabled,
            } => {
                let children = self.build_keyed(tree, controls)?;
                let ids = keyed_ids(&children);
                let id = build_or_release(tree, &ids, |tree| tree.new_group(children, options))?;
                finish(tree, id, disabled)
            }
            ControlSpec::Record {
                controls,
                options,
                disabled,
            } => {
                let children = self.build_keyed(tree, controls)?;
                let ids = keyed_ids(&children);
                let id = build_or_release(tree, &ids, |tree| tree.new_record(children, options))?;
                finish(tree, id, disabled)
            }
            ControlSpec::Array {
                controls,
                options,
                disabled,
            } => {
                let mut children = Vec::with_capacity(controls.len());
                for spec in controls {
                    match self.build(tree, spec) {
                        Ok(id) => children.push(id),
                        Err(err) => {
                            release_all(tree, &children);
                            return Err(err);
                        }
                    }
                }
                let ids = children.clone();
                let id = build_or_release(tree, &ids, |tree| tree.new_array(children, options))?;
                finish(tree, id, disabled)
            }
        }
    }

    fn build_keyed(
        &self,
        tree: &mut ControlTree,
        controls: Vec<(String, ControlSpec)>,
    ) -> Result<Vec<(String, ControlId)>> {
        if controls.iter().any(|(key, _)| key.is_empty()) {
            return Err(FormError::MissingControlName);
        }
        let mut built: Vec<(String, ControlId)> = Vec::with_capacity(controls.len());
        for (key, spec) in controls {
            match self.build(tree, spec) {
                Ok(id) => built.push((key, id)),
                Err(err) => {
                    release_all(tree, &keyed_ids(&built));
                    return Err(err);
                }
            }
        }
        Ok(built)
    }
}

fn keyed_ids(children: &[(String, ControlId)]) -> Vec<ControlId> {
    children.iter().map(|(_, id)| *id).collect()
}

fn build_or_release(
    tree: &mut ControlTree,
    children: &[ControlId],
    build: impl FnOnce(&mut ControlTree) -> Result<ControlId>,
) -> Result<ControlId> {
    let built = build(tree);
    if built.is_err() {
        release_all(tree, children);
    }
    built
}

/// Release partially built roots. A control that cannot be released stays
/// in the tree and is logged.
fn release_all(tree: &mut ControlTree, ids: &[ControlId]) {
    for id in ids {
        if let Err(err) = tree.release(*id) {
            tracing::warn!(
                control = %id,
                error = %err,
                "could not release partially built control"
            );
        }
    }
}

fn finish(tree: &mut ControlTree, id: ControlId, disabled: bool) -> Result<ControlId> {
    if disabled
        && let Err(err) = tree.disable(id, UpdateOptions::silent().only_self(true))
    {
        release_all(tree, &[id]);
        return Err(err);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::control::ControlKind;
    use crate::status::ControlStatus;
    use crate::validation::{min_length, required};

    #[test]
    fn builds_nested_shapes() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([
            ("user", ControlSpec::control(json!("ada"))),
            (
                "address",
                ControlSpec::group([("city", ControlSpec::control(json!("London")))]),
            ),
            (
                "phones",
                ControlSpec::array([ControlSpec::control(json!("1")), ControlSpec::control(json!("2"))]),
            ),
        ]);
        let form = FormBuilder::new().build(&mut tree, spec).unwrap();
        let control = tree.control(form).unwrap();
        assert_eq!(
            control.value(),
            &json!({"user": "ada", "address": {"city": "London"}, "phones": ["1", "2"]})
        );
        assert_eq!(control.get("phones").unwrap().kind(), ControlKind::Array);
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn validators_and_update_on_apply() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([(
            "name",
            ControlSpec::control(json!("ab")).with_validators(vec![required(), min_length(3)]),
        )])
        .update_on(UpdateOn::Blur);
        let form = FormBuilder::new().build(&mut tree, spec).unwrap();
        let control = tree.control(form).unwrap();
        assert_eq!(control.status(), ControlStatus::Invalid);
        assert!(control.has_error_at("minlength", "name"));
        assert_eq!(control.get("name").unwrap().update_on(), UpdateOn::Blur);
    }

    #[test]
    fn boxed_state_and_disabled_composites() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([
            ("a", ControlSpec::from(json!({"value": 1, "disabled": true}))),
            ("b", ControlSpec::array([ControlSpec::control(json!(2))]).disabled(true)),
            ("c", ControlSpec::control(json!(3))),
        ]);
        let form = FormBuilder::new().build(&mut tree, spec).unwrap();
        let control = tree.control(form).unwrap();
        assert!(control.get("a").unwrap().disabled());
        assert!(control.get("b.0").unwrap().disabled());
        assert_eq!(control.value(), &json!({"c": 3}));
    }

    #[test]
    fn non_nullable_builder_remembers_initial_values() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([("n", ControlSpec::control(json!(5)))]);
        let form = FormBuilder::new().non_nullable().build(&mut tree, spec).unwrap();
        tree.patch_value(form, json!({"n": 9}), Default::default())
            .unwrap();
        tree.reset(form, None, UpdateOptions::default()).unwrap();
        assert_eq!(tree.control(form).unwrap().value(), &json!({"n": 5}));
    }

    #[test]
    fn empty_key_is_rejected_without_leaking() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([
            ("ok", ControlSpec::control(json!(1))),
            ("", ControlSpec::control(json!(2))),
        ]);
        assert_eq!(
            FormBuilder::new().build(&mut tree, spec),
            Err(FormError::MissingControlName)
        );
        assert!(tree.is_empty());
    }

    #[test]
    fn nested_failure_releases_built_siblings() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([
            ("first", ControlSpec::control(json!(1))),
            ("inner", ControlSpec::record([("", ControlSpec::control(json!(2)))])),
        ]);
        assert!(FormBuilder::new().build(&mut tree, spec).is_err());
        assert!(tree.is_empty());
    }

    #[test]
    fn release_all_keeps_controls_it_cannot_release() {
        let mut tree = ControlTree::new();
        let spec = ControlSpec::group([("a", ControlSpec::control(json!(1)))]);
        let form = FormBuilder::new().build(&mut tree, spec).unwrap();
        let attached = tree.control(form).unwrap().get("a").unwrap().id();
        let loose = FormBuilder::new()
            .build(&mut tree, ControlSpec::control(json!(2)))
            .unwrap();

        release_all(&mut tree, &[attached, loose]);

        assert!(tree.control(loose).is_none());
        assert_eq!(tree.control(attached).unwrap().parent().unwrap().id(), form);
        assert_eq!(tree.len(), 2);
    }
}
