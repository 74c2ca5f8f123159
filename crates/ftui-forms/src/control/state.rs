#![forbid(unsafe_code)]

//! The control state machine: status calculation, validity propagation,
//! enable/disable, marking and validator slots.
//!
//! # Status rule
//!
//! Status is recomputed in priority order:
//!
//! 1. every control in the subtree disabled: `DISABLED`
//! 2. own errors: `INVALID`
//! 3. own async validation in flight, or an enabled child pending: `PENDING`
//! 4. an enabled child invalid: `INVALID`
//! 5. otherwise `VALID`
//!
//! A composite with no children only counts as all-disabled when it was
//! disabled explicitly.

use serde_json::Value;

use super::{Body, ControlId, ControlKind, ControlTree, EmitOptions, MarkOptions, SetValueOptions, UpdateOptions};
use crate::error::{FormError, Result};
use crate::status::ControlStatus;
use crate::validation::async_validation::{
    AsyncValidatorFn, InFlightValidation, StreamPoll, to_stream,
};
use crate::validation::compose::{
    add_validators, coerce_to_async_validator, coerce_to_validator, remove_validators,
};
use crate::validation::validators::{ValidationErrors, ValidatorFn};

impl ControlTree {
    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub(crate) fn all_controls_disabled(&self, id: ControlId) -> bool {
        let Some(node) = self.slot(id) else {
            return false;
        };
        match &node.body {
            Body::Leaf(_) => node.status == ControlStatus::Disabled,
            body => {
                let children = body.child_ids();
                !children.iter().any(|child| self.is_enabled(*child))
                    && (!children.is_empty() || node.status == ControlStatus::Disabled)
            }
        }
    }

    /// `true` if an enabled child satisfies `condition`.
    pub(crate) fn any_enabled_child(
        &self,
        id: ControlId,
        condition: impl Fn(&super::ControlNode) -> bool,
    ) -> bool {
        self.child_ids(id).into_iter().any(|child| {
            self.slot(child)
                .is_some_and(|node| node.status.is_enabled() && condition(node))
        })
    }

    pub(crate) fn calculate_status(&self, id: ControlId) -> ControlStatus {
        if self.all_controls_disabled(id) {
            return ControlStatus::Disabled;
        }
        let Some(node) = self.slot(id) else {
            return ControlStatus::Valid;
        };
        if node.errors.is_some() {
            return ControlStatus::Invalid;
        }
        if node.has_own_pending_async_validator
            || self.any_enabled_child(id, |child| child.status == ControlStatus::Pending)
        {
            return ControlStatus::Pending;
        }
        if self.any_enabled_child(id, |child| child.status == ControlStatus::Invalid) {
            return ControlStatus::Invalid;
        }
        ControlStatus::Valid
    }

    fn set_initial_status(&mut self, id: ControlId) {
        let status = if self.all_controls_disabled(id) {
            ControlStatus::Disabled
        } else {
            ControlStatus::Valid
        };
        if let Some(node) = self.slot_mut(id) {
            node.status = status;
        }
    }

    /// Rebuild a composite's value from its children.
    pub(crate) fn update_value(&mut self, id: ControlId) {
        let Some(node) = self.slot(id) else {
            return;
        };
        let include_disabled = node.status == ControlStatus::Disabled;
        let included = |child: &ControlId| {
            self.slot(*child)
                .filter(|c| include_disabled || c.status.is_enabled())
                .map(|c| c.value.clone())
        };
        let value = match &node.body {
            Body::Leaf(_) => return,
            Body::Keyed(entries) => Value::Object(
                entries
                    .iter()
                    .filter_map(|(name, child)| Some((name.clone(), included(child)?)))
                    .collect(),
            ),
            Body::Indexed(ids) => Value::Array(ids.iter().filter_map(included).collect()),
        };
        if let Some(node) = self.slot_mut(id) {
            node.value = value;
        }
    }

    // -----------------------------------------------------------------------
    // Validity
    // -----------------------------------------------------------------------

    /// Recompute value, errors and status, then continue with the ancestors.
    ///
    /// Sync validators run first. If the result is `VALID` or `PENDING` and
    /// an async validator is attached, it is started and the control becomes
    /// `PENDING`; any earlier run for the control is cancelled beforehand.
    ///
    /// # Errors
    ///
    /// [`FormError::AsyncValidatorMisuse`] if the async validator returns a
    /// synchronous result. The walk stops at that control.
    pub fn update_value_and_validity(&mut self, id: ControlId, opts: UpdateOptions) -> Result<()> {
        self.node(id)?;
        let mut current = id;
        loop {
            self.set_initial_status(current);
            self.update_value(current);

            if self.is_enabled(current) {
                self.cancel_existing_validation(current);
                let errors = self.run_validator(current);
                self.node_mut(current)?.errors = errors;
                let status = self.calculate_status(current);
                self.node_mut(current)?.status = status;
                tracing::trace!(control = %current, status = %status, "status recalculated");

                if matches!(status, ControlStatus::Valid | ControlStatus::Pending) {
                    self.run_async_validator(current, opts.emit_event)?;
                }
            }

            if opts.emit_event {
                self.emit_value_and_status(current);
            }

            match self.parent_of(current) {
                Some(parent) if !opts.only_self => current = parent,
                _ => return Ok(()),
            }
        }
    }

    /// Re-run validation over a whole subtree, children first.
    pub fn update_tree_validity(&mut self, id: ControlId, opts: EmitOptions) -> Result<()> {
        let children = self.node(id)?.body.child_ids();
        for child in children {
            self.update_tree_validity(child, opts)?;
        }
        self.update_value_and_validity(
            id,
            UpdateOptions {
                only_self: true,
                emit_event: opts.emit_event,
            },
        )
    }

    fn run_validator(&self, id: ControlId) -> Option<ValidationErrors> {
        let control = self.control(id)?;
        control.validator()?.validate(&control)
    }

    fn run_async_validator(&mut self, id: ControlId, emit_event: bool) -> Result<()> {
        let Some(validator) = self.node(id)?.async_validator.clone() else {
            return Ok(());
        };
        {
            let node = self.node_mut(id)?;
            node.status = ControlStatus::Pending;
            node.has_own_pending_async_validator = true;
        }
        let outcome = match self.control(id) {
            Some(control) => validator.validate(&control),
            None => return Ok(()),
        };
        let stream = match to_stream(outcome) {
            Ok(stream) => stream,
            Err(misuse) => {
                tracing::warn!(control = %id, "async validator returned a synchronous result");
                return Err(FormError::AsyncValidatorMisuse {
                    id,
                    message: misuse.to_string(),
                });
            }
        };
        let token = self.coordinator.start(id);
        self.node_mut(id)?.async_run = Some(InFlightValidation {
            token,
            stream,
            emit_event,
        });
        // Sources that already settled deliver right away.
        self.poll_validation(id)?;
        Ok(())
    }

    /// Drop the control's in-flight async run, if any.
    pub(crate) fn cancel_existing_validation(&mut self, id: ControlId) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        node.has_own_pending_async_validator = false;
        if node.async_run.take().is_some() {
            self.coordinator.cancel(id);
        }
    }

    /// Apply the first result of `id`'s async run if it is available.
    fn poll_validation(&mut self, id: ControlId) -> Result<bool> {
        let node = self.node_mut(id)?;
        let Some(run) = node.async_run.as_mut() else {
            return Ok(false);
        };
        let polled = run.stream.poll_next();
        let token = run.token;
        let emit_event = run.emit_event;
        match polled {
            StreamPoll::Pending => Ok(false),
            StreamPoll::Ready(errors) => {
                node.async_run = None;
                node.has_own_pending_async_validator = false;
                self.coordinator.resolve(id, token, errors.is_none());
                self.set_errors(id, errors, EmitOptions { emit_event })?;
                Ok(true)
            }
            StreamPoll::Closed => {
                // The control keeps its pending marker until the next run.
                node.async_run = None;
                self.coordinator.exhaust(id, token);
                Ok(false)
            }
        }
    }

    /// Drive every in-flight async validation once.
    ///
    /// Returns the number of results applied. Controls whose source is still
    /// silent stay `PENDING`.
    pub fn poll_async_validations(&mut self) -> Result<usize> {
        let in_flight: Vec<ControlId> = self
            .ids()
            .filter(|id| self.slot(*id).is_some_and(|node| node.async_run.is_some()))
            .collect();
        let mut applied = 0;
        for id in in_flight {
            if self.poll_validation(id)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    /// Replace the control's own errors and recompute status up the tree.
    ///
    /// No validator runs. Status is published unless `emit_event` is false.
    pub fn set_errors(
        &mut self,
        id: ControlId,
        errors: Option<ValidationErrors>,
        opts: EmitOptions,
    ) -> Result<()> {
        self.node_mut(id)?.errors = errors;
        self.update_controls_errors(id, opts.emit_event);
        Ok(())
    }

    /// Shorthand for `set_errors(id, None, opts)`.
    pub fn clear_errors(&mut self, id: ControlId, opts: EmitOptions) -> Result<()> {
        self.set_errors(id, None, opts)
    }

    fn update_controls_errors(&mut self, id: ControlId, emit_event: bool) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let status = self.calculate_status(current);
            if let Some(node) = self.slot_mut(current) {
                node.status = status;
            }
            if emit_event {
                self.emit_status(current);
            }
            cursor = self.parent_of(current);
        }
    }

    // -----------------------------------------------------------------------
    // Enable / disable
    // -----------------------------------------------------------------------

    /// Disable the control and its whole subtree.
    ///
    /// Validators do not run; errors are cleared and any async run is
    /// cancelled. Ancestors then recompute value, validity, pristine and
    /// touched state unless `only_self` is set.
    pub fn disable(&mut self, id: ControlId, opts: UpdateOptions) -> Result<()> {
        self.node(id)?;
        let skip_pristine_check = self.parent_marked_dirty(id, opts.only_self);
        {
            let node = self.node_mut(id)?;
            node.status = ControlStatus::Disabled;
            node.errors = None;
        }
        self.cancel_existing_validation(id);
        for child in self.child_ids(id) {
            self.disable(child, opts.only_self(true))?;
        }
        self.update_value(id);
        if opts.emit_event {
            self.emit_value_and_status(id);
        }
        self.update_ancestors(id, opts, skip_pristine_check)?;
        self.notify_disabled_change(id, true);
        tracing::trace!(control = %id, "disabled");
        Ok(())
    }

    /// Enable the control and its whole subtree, then re-run validation.
    pub fn enable(&mut self, id: ControlId, opts: UpdateOptions) -> Result<()> {
        self.node(id)?;
        let skip_pristine_check = self.parent_marked_dirty(id, opts.only_self);
        self.node_mut(id)?.status = ControlStatus::Valid;
        for child in self.child_ids(id) {
            self.enable(child, opts.only_self(true))?;
        }
        self.update_value_and_validity(id, opts.only_self(true))?;
        self.update_ancestors(id, opts, skip_pristine_check)?;
        self.notify_disabled_change(id, false);
        tracing::trace!(control = %id, "enabled");
        Ok(())
    }

    /// The parent was marked dirty directly rather than through a child.
    fn parent_marked_dirty(&self, id: ControlId, only_self: bool) -> bool {
        let Some(parent) = self.parent_of(id) else {
            return false;
        };
        let parent_dirty = self.slot(parent).is_some_and(|node| !node.pristine);
        !only_self && parent_dirty && !self.any_enabled_child(parent, |child| !child.pristine)
    }

    fn update_ancestors(
        &mut self,
        id: ControlId,
        opts: UpdateOptions,
        skip_pristine_check: bool,
    ) -> Result<()> {
        let Some(parent) = self.parent_of(id) else {
            return Ok(());
        };
        if opts.only_self {
            return Ok(());
        }
        self.update_value_and_validity(parent, opts)?;
        if !skip_pristine_check {
            self.update_pristine(parent, MarkOptions::default());
        }
        self.update_touched(parent, MarkOptions::default());
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Marking
    // -----------------------------------------------------------------------

    /// Mark the control dirty, and its ancestors unless `only_self`.
    pub fn mark_as_dirty(&mut self, id: ControlId, opts: MarkOptions) -> Result<()> {
        self.node(id)?;
        self.walk_up(id, opts.only_self, |node| node.pristine = false);
        Ok(())
    }

    /// Mark the control touched, and its ancestors unless `only_self`.
    pub fn mark_as_touched(&mut self, id: ControlId, opts: MarkOptions) -> Result<()> {
        self.node(id)?;
        self.walk_up(id, opts.only_self, |node| node.touched = true);
        Ok(())
    }

    /// Mark the control and every descendant touched. Ancestors are left alone.
    pub fn mark_all_as_touched(&mut self, id: ControlId) -> Result<()> {
        self.mark_as_touched(id, MarkOptions::only_self())?;
        for child in self.child_ids(id) {
            self.mark_all_as_touched(child)?;
        }
        Ok(())
    }

    /// Reset the subtree to pristine; ancestors recompute from their children.
    pub fn mark_as_pristine(&mut self, id: ControlId, opts: MarkOptions) -> Result<()> {
        let node = self.node_mut(id)?;
        node.pristine = true;
        if let Body::Leaf(leaf) = &mut node.body {
            leaf.pending_dirty = false;
        }
        for child in self.child_ids(id) {
            self.mark_as_pristine(child, MarkOptions::only_self())?;
        }
        if let Some(parent) = self.parent_of(id)
            && !opts.only_self
        {
            self.update_pristine(parent, opts);
        }
        Ok(())
    }

    /// Reset the subtree to untouched; ancestors recompute from their children.
    pub fn mark_as_untouched(&mut self, id: ControlId, opts: MarkOptions) -> Result<()> {
        let node = self.node_mut(id)?;
        node.touched = false;
        if let Body::Leaf(leaf) = &mut node.body {
            leaf.pending_touched = false;
        }
        for child in self.child_ids(id) {
            self.mark_as_untouched(child, MarkOptions::only_self())?;
        }
        if let Some(parent) = self.parent_of(id)
            && !opts.only_self
        {
            self.update_touched(parent, opts);
        }
        Ok(())
    }

    /// Set the status to `PENDING` without running anything.
    pub fn mark_as_pending(&mut self, id: ControlId, opts: UpdateOptions) -> Result<()> {
        self.node(id)?;
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(node) = self.slot_mut(current) {
                node.status = ControlStatus::Pending;
            }
            if opts.emit_event {
                self.emit_status(current);
            }
            cursor = if opts.only_self {
                None
            } else {
                self.parent_of(current)
            };
        }
        Ok(())
    }

    /// Recompute `pristine` from the enabled children, then up the tree.
    pub(crate) fn update_pristine(&mut self, id: ControlId, opts: MarkOptions) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let any_dirty = self.any_enabled_child(current, |child| !child.pristine);
            if let Some(node) = self.slot_mut(current) {
                node.pristine = !any_dirty;
            }
            cursor = if opts.only_self {
                None
            } else {
                self.parent_of(current)
            };
        }
    }

    /// Recompute `touched` from the enabled children, then up the tree.
    pub(crate) fn update_touched(&mut self, id: ControlId, opts: MarkOptions) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let any_touched = self.any_enabled_child(current, |child| child.touched);
            if let Some(node) = self.slot_mut(current) {
                node.touched = any_touched;
            }
            cursor = if opts.only_self {
                None
            } else {
                self.parent_of(current)
            };
        }
    }

    fn walk_up(&mut self, id: ControlId, only_self: bool, mut apply: impl FnMut(&mut super::ControlNode)) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(node) = self.slot_mut(current) {
                apply(node);
            }
            cursor = if only_self {
                None
            } else {
                self.parent_of(current)
            };
        }
    }

    // -----------------------------------------------------------------------
    // Validator slots
    // -----------------------------------------------------------------------
    //
    // None of these re-run validation; call `update_value_and_validity`.

    /// Replace the synchronous validators.
    pub fn set_validators(&mut self, id: ControlId, validators: Vec<ValidatorFn>) -> Result<()> {
        let node = self.node_mut(id)?;
        node.validator = coerce_to_validator(&validators);
        node.raw_validators = validators;
        Ok(())
    }

    /// Append validators not already attached (by identity).
    pub fn add_validators(&mut self, id: ControlId, validators: &[ValidatorFn]) -> Result<()> {
        let merged = add_validators(&self.node(id)?.raw_validators, validators);
        self.set_validators(id, merged)
    }

    /// Detach the given validators (by identity).
    pub fn remove_validators(&mut self, id: ControlId, validators: &[ValidatorFn]) -> Result<()> {
        let kept = remove_validators(&self.node(id)?.raw_validators, validators);
        self.set_validators(id, kept)
    }

    /// Detach every synchronous validator.
    pub fn clear_validators(&mut self, id: ControlId) -> Result<()> {
        self.set_validators(id, Vec::new())
    }

    /// Replace the async validators.
    pub fn set_async_validators(
        &mut self,
        id: ControlId,
        validators: Vec<AsyncValidatorFn>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        node.async_validator = coerce_to_async_validator(&validators);
        node.raw_async_validators = validators;
        Ok(())
    }

    /// Append async validators not already attached (by identity).
    pub fn add_async_validators(
        &mut self,
        id: ControlId,
        validators: &[AsyncValidatorFn],
    ) -> Result<()> {
        let merged = add_validators(&self.node(id)?.raw_async_validators, validators);
        self.set_async_validators(id, merged)
    }

    /// Detach the given async validators (by identity).
    pub fn remove_async_validators(
        &mut self,
        id: ControlId,
        validators: &[AsyncValidatorFn],
    ) -> Result<()> {
        let kept = remove_validators(&self.node(id)?.raw_async_validators, validators);
        self.set_async_validators(id, kept)
    }

    /// Detach every async validator.
    pub fn clear_async_validators(&mut self, id: ControlId) -> Result<()> {
        self.set_async_validators(id, Vec::new())
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Set the value of a control.
    ///
    /// Composites are strict: every child needs a value and every value
    /// needs a child.
    ///
    /// # Errors
    ///
    /// [`FormError::NoControls`], [`FormError::MissingControl`] or
    /// [`FormError::MissingControlValue`] when the value's shape does not
    /// match the composite.
    pub fn set_value(&mut self, id: ControlId, value: Value, opts: SetValueOptions) -> Result<()> {
        let kind = self.node(id)?.kind;
        match kind {
            ControlKind::Leaf => self.set_leaf_value(id, value, opts),
            ControlKind::Group | ControlKind::Record => self.set_group_value(id, value, opts),
            ControlKind::Array => self.set_array_value(id, value, opts),
        }
    }

    /// Set the values that have a matching child and ignore the rest.
    /// `null` leaves a composite untouched.
    pub fn patch_value(&mut self, id: ControlId, value: Value, opts: SetValueOptions) -> Result<()> {
        let kind = self.node(id)?.kind;
        match kind {
            ControlKind::Leaf => self.set_leaf_value(id, value, opts),
            ControlKind::Group | ControlKind::Record => self.patch_group_value(id, value, opts),
            ControlKind::Array => self.patch_array_value(id, value, opts),
        }
    }

    /// Reset to pristine and untouched with `value`, or the default value.
    ///
    /// Leaves read `{"value": .., "disabled": ..}` as boxed state. Composites
    /// hand each child its entry of `value`.
    pub fn reset(&mut self, id: ControlId, value: Option<Value>, opts: UpdateOptions) -> Result<()> {
        let kind = self.node(id)?.kind;
        match kind {
            ControlKind::Leaf => self.reset_leaf(id, value, opts),
            ControlKind::Group | ControlKind::Record => self.reset_group(id, value, opts),
            ControlKind::Array => self.reset_array(id, value, opts),
        }
    }

    /// Value including disabled descendants.
    pub fn get_raw_value(&self, id: ControlId) -> Result<Value> {
        self.control(id)
            .map(|control| control.raw_value())
            .ok_or(FormError::UnknownControl { id })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::control::{ControlOptions, FormState};
    use crate::validation::async_validation::{AsyncValidation, Deferred, deferred};
    use crate::validation::validators::{error, required};

    fn leaf(tree: &mut ControlTree, value: Value, options: ControlOptions) -> ControlId {
        tree.new_control(FormState::new(value), options).unwrap()
    }

    #[test]
    fn required_leaf_is_invalid() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!(""), ControlOptions::default().validator(required()));
        let control = tree.control(id).unwrap();
        assert_eq!(control.status(), ControlStatus::Invalid);
        assert_eq!(control.errors(), Some(&error("required", json!(true))));
    }

    #[test]
    fn empty_group_is_valid_until_disabled() {
        let mut tree = ControlTree::new();
        let group = tree
            .new_group(Vec::<(String, ControlId)>::new(), ControlOptions::default())
            .unwrap();
        assert_eq!(tree.control(group).unwrap().status(), ControlStatus::Valid);
        tree.disable(group, UpdateOptions::default()).unwrap();
        assert_eq!(tree.control(group).unwrap().status(), ControlStatus::Disabled);
        tree.update_value_and_validity(group, UpdateOptions::default())
            .unwrap();
        assert_eq!(tree.control(group).unwrap().status(), ControlStatus::Disabled);
    }

    #[test]
    fn own_errors_take_priority_over_pending_children() {
        let mut tree = ControlTree::new();
        let (_resolver, pending) = deferred();
        let slot = std::sync::Mutex::new(Some(pending));
        let child = leaf(
            &mut tree,
            json!(1),
            ControlOptions::default().async_validator(AsyncValidatorFn::new(move |_| {
                match slot.lock().ok().and_then(|mut guard| guard.take()) {
                    Some(pending) => AsyncValidation::Deferred(pending),
                    None => AsyncValidation::Deferred(Deferred::resolved(None)),
                }
            })),
        );
        let group = tree
            .new_group(
                [("child", child)],
                ControlOptions::default().validator(ValidatorFn::new(|_| Some(error("own", json!(1))))),
            )
            .unwrap();
        assert_eq!(tree.control(child).unwrap().status(), ControlStatus::Pending);
        assert_eq!(tree.control(group).unwrap().status(), ControlStatus::Invalid);
        tree.clear_errors(group, EmitOptions::default()).unwrap();
        assert_eq!(tree.control(group).unwrap().status(), ControlStatus::Pending);
    }

    #[test]
    fn disable_twice_is_idempotent() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!(""), ControlOptions::default().validator(required()));
        tree.disable(id, UpdateOptions::default()).unwrap();
        tree.disable(id, UpdateOptions::default()).unwrap();
        let control = tree.control(id).unwrap();
        assert_eq!(control.status(), ControlStatus::Disabled);
        assert!(control.errors().is_none());
    }

    #[test]
    fn enable_reruns_validators() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!(""), ControlOptions::default().validator(required()));
        tree.disable(id, UpdateOptions::default()).unwrap();
        tree.enable(id, UpdateOptions::default()).unwrap();
        assert!(tree.control(id).unwrap().has_error("required"));
    }

    #[test]
    fn disabled_change_callbacks_fire() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!(1), ControlOptions::default());
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&seen);
        tree.register_on_disabled_change(id, move |disabled| sink.borrow_mut().push(disabled))
            .unwrap();
        tree.disable(id, UpdateOptions::default()).unwrap();
        tree.enable(id, UpdateOptions::default()).unwrap();
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn dirty_propagates_up_and_pristine_recomputes() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let b = leaf(&mut tree, json!(2), ControlOptions::default());
        let group = tree
            .new_group([("a", a), ("b", b)], ControlOptions::default())
            .unwrap();
        tree.mark_as_dirty(a, MarkOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().dirty());
        tree.mark_as_pristine(a, MarkOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().pristine());

        tree.mark_as_dirty(b, MarkOptions::only_self()).unwrap();
        assert!(tree.control(group).unwrap().pristine());
    }

    #[test]
    fn pristine_and_untouched_cascade_down() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let group = tree.new_group([("a", a)], ControlOptions::default()).unwrap();
        tree.mark_as_dirty(a, MarkOptions::default()).unwrap();
        tree.mark_all_as_touched(group).unwrap();
        assert!(tree.control(a).unwrap().touched());

        tree.mark_as_pristine(group, MarkOptions::default()).unwrap();
        tree.mark_as_untouched(group, MarkOptions::default()).unwrap();
        assert!(tree.control(a).unwrap().pristine());
        assert!(tree.control(a).unwrap().untouched());
    }

    #[test]
    fn touched_ignores_disabled_children() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let b = leaf(&mut tree, json!(2), ControlOptions::default());
        let group = tree
            .new_group([("a", a), ("b", b)], ControlOptions::default())
            .unwrap();
        tree.mark_as_touched(a, MarkOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().touched());
        tree.disable(a, UpdateOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().untouched());
    }

    #[test]
    fn parent_marked_dirty_directly_stays_dirty_across_disable() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let group = tree.new_group([("a", a)], ControlOptions::default()).unwrap();
        tree.mark_as_dirty(group, MarkOptions::default()).unwrap();
        tree.disable(a, UpdateOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().dirty());
        tree.enable(a, UpdateOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().dirty());
    }

    #[test]
    fn dirty_child_recomputed_on_disable() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let b = leaf(&mut tree, json!(2), ControlOptions::default());
        let group = tree
            .new_group([("a", a), ("b", b)], ControlOptions::default())
            .unwrap();
        tree.mark_as_dirty(a, MarkOptions::default()).unwrap();
        tree.disable(a, UpdateOptions::default()).unwrap();
        assert!(tree.control(group).unwrap().pristine());
    }

    #[test]
    fn mark_as_pending_propagates() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let group = tree.new_group([("a", a)], ControlOptions::default()).unwrap();
        tree.mark_as_pending(a, UpdateOptions::default()).unwrap();
        assert!(tree.control(a).unwrap().pending());
        assert!(tree.control(group).unwrap().pending());
    }

    #[test]
    fn set_errors_does_not_run_validators() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!("x"), ControlOptions::default().validator(required()));
        tree.set_errors(id, Some(error("server", json!("taken"))), EmitOptions::default())
            .unwrap();
        let control = tree.control(id).unwrap();
        assert!(control.invalid());
        assert_eq!(control.get_error("server"), Some(&json!("taken")));
        assert!(!control.has_error("required"));
    }

    #[test]
    fn validator_slots_do_not_revalidate() {
        let mut tree = ControlTree::new();
        let id = leaf(&mut tree, json!(""), ControlOptions::default());
        let req = required();
        tree.add_validators(id, std::slice::from_ref(&req)).unwrap();
        assert!(tree.control(id).unwrap().has_validator(&req));
        assert!(tree.control(id).unwrap().valid());

        tree.update_value_and_validity(id, UpdateOptions::default())
            .unwrap();
        assert!(tree.control(id).unwrap().invalid());

        tree.remove_validators(id, std::slice::from_ref(&req)).unwrap();
        assert!(!tree.control(id).unwrap().has_validator(&req));
        tree.update_value_and_validity(id, UpdateOptions::default())
            .unwrap();
        assert!(tree.control(id).unwrap().valid());
    }

    #[test]
    fn set_validators_replaces_and_recomposes() {
        let mut tree = ControlTree::new();
        let first = required();
        let id = leaf(&mut tree, json!(""), ControlOptions::default().validator(first.clone()));
        let second = ValidatorFn::new(|_| Some(error("custom", json!(true))));
        tree.set_validators(id, vec![second.clone()]).unwrap();
        tree.update_value_and_validity(id, UpdateOptions::default())
            .unwrap();
        let control = tree.control(id).unwrap();
        assert!(!control.has_validator(&first));
        assert!(control.has_validator(&second));
        assert_eq!(control.error(), Some("custom"));

        tree.clear_validators(id).unwrap();
        assert!(tree.control(id).unwrap().validator().is_none());
    }

    #[test]
    fn tree_validity_runs_children_first() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(""), ControlOptions::default());
        let group = tree.new_group([("a", a)], ControlOptions::default()).unwrap();
        tree.set_validators(a, vec![required()]).unwrap();
        tree.update_tree_validity(group, EmitOptions::default())
            .unwrap();
        assert!(tree.control(a).unwrap().invalid());
        assert!(tree.control(group).unwrap().invalid());
    }

    #[test]
    fn raw_value_includes_disabled_children() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let b = leaf(&mut tree, json!(2), ControlOptions::default());
        let group = tree
            .new_group([("a", a), ("b", b)], ControlOptions::default())
            .unwrap();
        tree.disable(b, UpdateOptions::default()).unwrap();
        assert_eq!(tree.control(group).unwrap().value(), &json!({"a": 1}));
        assert_eq!(tree.get_raw_value(group).unwrap(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn disabled_group_value_includes_every_child() {
        let mut tree = ControlTree::new();
        let a = leaf(&mut tree, json!(1), ControlOptions::default());
        let b = leaf(&mut tree, json!(2), ControlOptions::default());
        let group = tree
            .new_group([("a", a), ("b", b)], ControlOptions::default())
            .unwrap();
        tree.disable(b, UpdateOptions::default()).unwrap();
        tree.disable(group, UpdateOptions::default()).unwrap();
        assert_eq!(tree.control(group).unwrap().value(), &json!({"a": 1, "b": 2}));
    }
}
