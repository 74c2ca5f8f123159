#![forbid(unsafe_code)]

//! Leaf controls and the view-commit pipeline.
//!
//! A view writes into a leaf through [`ControlTree::view_input`] and
//! [`ControlTree::view_blur`]. Input is staged as a pending value and
//! committed according to the effective [`UpdateOn`] strategy: immediately
//! on `change`, on blur for `blur`, and on
//! [`ControlTree::sync_pending_controls`] for `submit`.

use serde_json::Value;

use super::{
    Body, ControlId, ControlKind, ControlNode, ControlOptions, ControlTree, FormState, LeafState,
    MarkOptions, SetValueOptions, Subscription, UpdateOptions,
};
use crate::error::{FormError, Result};
use crate::status::UpdateOn;

impl ControlTree {
    /// Create a detached leaf control.
    ///
    /// With `non_nullable` set the initial value becomes the reset value;
    /// otherwise `reset()` restores `null`.
    pub fn new_control(
        &mut self,
        state: impl Into<FormState>,
        options: impl Into<ControlOptions>,
    ) -> Result<ControlId> {
        let state = state.into();
        let options = options.into();
        let default_value = if options.non_nullable {
            state.value.clone()
        } else {
            Value::Null
        };
        let leaf = LeafState {
            default_value,
            pending_value: state.value.clone(),
            ..LeafState::default()
        };
        let mut node = ControlNode::new(ControlKind::Leaf, Body::Leaf(leaf), options);
        node.value = state.value;
        let emit_event = node.async_validator.is_some();
        let id = self.alloc(node);
        if state.disabled {
            self.disable(id, UpdateOptions::silent().only_self(true))?;
        }
        // Async validators start here, so their first status is published.
        self.update_value_and_validity(
            id,
            UpdateOptions {
                only_self: true,
                emit_event,
            },
        )?;
        tracing::debug!(control = %id, "created leaf control");
        Ok(id)
    }

    pub(crate) fn set_leaf_value(
        &mut self,
        id: ControlId,
        value: Value,
        opts: SetValueOptions,
    ) -> Result<()> {
        let leaf = self.leaf_mut(id)?;
        leaf.pending_value = value.clone();
        self.node_mut(id)?.value = value;
        if opts.emit_model_to_view_change {
            self.notify_view_change(id, opts.emit_view_to_model_change);
        }
        self.update_value_and_validity(id, opts.into())
    }

    pub(crate) fn reset_leaf(
        &mut self,
        id: ControlId,
        value: Option<Value>,
        opts: UpdateOptions,
    ) -> Result<()> {
        let value = match value {
            Some(value) => value,
            None => self.leaf_mut(id)?.default_value.clone(),
        };
        self.apply_form_state(id, value)?;
        self.mark_as_pristine(id, opts.into())?;
        self.mark_as_untouched(id, opts.into())?;
        let current = self.node(id)?.value.clone();
        self.set_leaf_value(id, current, opts.into())?;
        self.leaf_mut(id)?.pending_change = false;
        Ok(())
    }

    fn apply_form_state(&mut self, id: ControlId, value: Value) -> Result<()> {
        match FormState::from_boxed(&value) {
            Some(state) => {
                self.leaf_mut(id)?.pending_value = state.value.clone();
                self.node_mut(id)?.value = state.value;
                let opts = UpdateOptions::silent().only_self(true);
                if state.disabled {
                    self.disable(id, opts)
                } else {
                    self.enable(id, opts)
                }
            }
            None => {
                self.leaf_mut(id)?.pending_value = value.clone();
                self.node_mut(id)?.value = value;
                Ok(())
            }
        }
    }

    /// Called on every model-to-view write with the new value and the
    /// `emit_view_to_model_change` flag.
    pub fn register_on_change<F>(&mut self, id: ControlId, callback: F) -> Result<Subscription>
    where
        F: FnMut(&Value, bool) + 'static,
    {
        self.leaf_mut(id)?;
        self.register_view_change(id, Box::new(callback))
    }

    /// A value typed into the view.
    ///
    /// Staged, then committed right away under the `change` strategy.
    pub fn view_input(&mut self, id: ControlId, value: Value) -> Result<()> {
        let leaf = self.leaf_mut(id)?;
        leaf.pending_value = value;
        leaf.pending_change = true;
        leaf.pending_dirty = true;
        if self.effective_update_on(id) == UpdateOn::Change {
            self.commit_pending(id)?;
        }
        Ok(())
    }

    /// The view lost focus.
    ///
    /// Commits staged input under the `blur` strategy. The control is marked
    /// touched unless the strategy is `submit`.
    pub fn view_blur(&mut self, id: ControlId) -> Result<()> {
        let leaf = self.leaf_mut(id)?;
        leaf.pending_touched = true;
        let has_change = leaf.pending_change;
        let update_on = self.effective_update_on(id);
        if update_on == UpdateOn::Blur && has_change {
            self.commit_pending(id)?;
        }
        if update_on != UpdateOn::Submit {
            self.mark_as_touched(id, MarkOptions::default())?;
        }
        Ok(())
    }

    /// Commit every change staged under the `submit` strategy in the subtree.
    ///
    /// Composites whose subtree changed re-run their own validation. Returns
    /// `true` if any value was committed.
    pub fn sync_pending_controls(&mut self, id: ControlId) -> Result<bool> {
        let kind = self.node(id)?.kind;
        if kind.is_composite() {
            let mut updated = false;
            for child in self.child_ids(id) {
                updated |= self.sync_pending_controls(child)?;
            }
            if updated {
                self.update_value_and_validity(id, UpdateOptions::default().only_self(true))?;
            }
            return Ok(updated);
        }

        if self.effective_update_on(id) != UpdateOn::Submit {
            return Ok(false);
        }
        let leaf = self.leaf_mut(id)?;
        let (dirty, touched, changed) = (leaf.pending_dirty, leaf.pending_touched, leaf.pending_change);
        let value = leaf.pending_value.clone();
        leaf.pending_dirty = false;
        leaf.pending_touched = false;
        leaf.pending_change = false;
        if dirty {
            self.mark_as_dirty(id, MarkOptions::default())?;
        }
        if touched {
            self.mark_as_touched(id, MarkOptions::default())?;
        }
        if changed {
            self.set_leaf_value(
                id,
                value,
                SetValueOptions::default()
                    .only_self(true)
                    .emit_model_to_view_change(false),
            )?;
        }
        Ok(changed)
    }

    fn commit_pending(&mut self, id: ControlId) -> Result<()> {
        let leaf = self.leaf_mut(id)?;
        let dirty = leaf.pending_dirty;
        let value = leaf.pending_value.clone();
        if dirty {
            self.mark_as_dirty(id, MarkOptions::default())?;
        }
        self.set_leaf_value(
            id,
            value,
            SetValueOptions::default().emit_model_to_view_change(false),
        )?;
        self.leaf_mut(id)?.pending_change = false;
        Ok(())
    }

    fn effective_update_on(&self, id: ControlId) -> UpdateOn {
        self.control(id)
            .map_or(UpdateOn::Change, |control| control.update_on())
    }

    fn leaf_mut(&mut self, id: ControlId) -> Result<&mut LeafState> {
        match &mut self.node_mut(id)?.body {
            Body::Leaf(leaf) => Ok(leaf),
            _ => Err(FormError::WrongKind {
                id,
                expected: "leaf control",
            }),
        }
    }
}
