#![forbid(unsafe_code)]

//! Arrays: composites with positional children.
//!
//! Indices accepted by the public operations may be negative and then count
//! from the end. Insertion clamps to the valid range the way a slice splice
//! does; lookups past either end return `None`.

use serde_json::Value;

use super::{
    Body, ControlId, ControlKind, ControlNode, ControlOptions, ControlTree, EmitOptions,
    SetValueOptions, UpdateOptions, adjust_index,
};
use crate::error::{CompositeKind, FormError, Result};

/// Clamp a possibly negative index into `0..=len`.
fn splice_position(index: isize, len: usize) -> usize {
    adjust_index(index, len).unwrap_or(0).min(len)
}

impl ControlTree {
    /// Create an array owning `controls`, in order.
    pub fn new_array(&mut self, controls: Vec<ControlId>, options: ControlOptions) -> Result<ControlId> {
        let node = ControlNode::new(ControlKind::Array, Body::Indexed(controls.clone()), options);
        let emit_event = node.async_validator.is_some();
        let id = self.alloc(node);
        self.adopt_children(id, &controls)?;
        self.update_value_and_validity(
            id,
            UpdateOptions {
                only_self: true,
                emit_event,
            },
        )?;
        tracing::debug!(control = %id, children = controls.len(), "created array control");
        Ok(id)
    }

    /// The child at `index`; negative indices count from the end.
    pub fn at(&self, array: ControlId, index: isize) -> Result<Option<ControlId>> {
        let ids = self.indexed(array)?;
        Ok(adjust_index(index, ids.len()).and_then(|i| ids.get(i).copied()))
    }

    /// Append `child`.
    pub fn push(&mut self, array: ControlId, child: ControlId, opts: EmitOptions) -> Result<()> {
        self.indexed(array)?;
        self.attach(child, array)?;
        self.indexed_mut(array)?.push(child);
        self.finish_collection_change(array, opts)
    }

    /// Insert `child` before `index`, clamped to the array bounds.
    pub fn insert(
        &mut self,
        array: ControlId,
        index: isize,
        child: ControlId,
        opts: EmitOptions,
    ) -> Result<()> {
        self.indexed(array)?;
        self.attach(child, array)?;
        let ids = self.indexed_mut(array)?;
        let position = splice_position(index, ids.len());
        ids.insert(position, child);
        self.finish_collection_change(array, opts)
    }

    /// Detach the child at `index`. The child stays usable as a root.
    pub fn remove_at(
        &mut self,
        array: ControlId,
        index: isize,
        opts: EmitOptions,
    ) -> Result<Option<ControlId>> {
        let ids = self.indexed_mut(array)?;
        let position = adjust_index(index, ids.len()).unwrap_or(0);
        let removed = (position < ids.len()).then(|| ids.remove(position));
        if let Some(child) = removed {
            self.detach(child);
        }
        self.finish_collection_change(array, opts)?;
        Ok(removed)
    }

    /// Replace the child at `index` with `child`, or append it when `index`
    /// is past the end.
    pub fn set_control_at(
        &mut self,
        array: ControlId,
        index: isize,
        child: ControlId,
        opts: EmitOptions,
    ) -> Result<Option<ControlId>> {
        let len = self.indexed(array)?.len();
        let position = adjust_index(index, len).unwrap_or(0);
        let current = self.indexed(array)?.get(position).copied();
        if current != Some(child) {
            if let Some(parent) = self.node(child)?.parent {
                return Err(FormError::ControlAlreadyAttached { id: child, parent });
            }
            self.attach(child, array)?;
        }
        let ids = self.indexed_mut(array)?;
        let replaced = if position < ids.len() {
            Some(std::mem::replace(&mut ids[position], child))
        } else {
            ids.push(child);
            None
        };
        if let Some(old) = replaced.filter(|old| *old != child) {
            self.detach(old);
        }
        self.finish_collection_change(array, opts)?;
        Ok(replaced)
    }

    /// Detach every child.
    pub fn clear(&mut self, array: ControlId, opts: EmitOptions) -> Result<()> {
        let removed = std::mem::take(self.indexed_mut(array)?);
        if removed.is_empty() {
            return Ok(());
        }
        for child in removed {
            self.detach(child);
        }
        self.finish_collection_change(array, opts)
    }

    fn finish_collection_change(&mut self, array: ControlId, opts: EmitOptions) -> Result<()> {
        self.update_value_and_validity(array, UpdateOptions::default().emit_event(opts.emit_event))?;
        self.notify_collection_change(array);
        Ok(())
    }

    pub(crate) fn set_array_value(
        &mut self,
        id: ControlId,
        value: Value,
        opts: SetValueOptions,
    ) -> Result<()> {
        let ids = self.indexed(id)?.to_vec();
        let items = match value {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
        if items.len() < ids.len() {
            tracing::warn!(control = %id, index = items.len(), "set_value is missing an item");
            return Err(FormError::MissingControlValue {
                kind: CompositeKind::Array,
                key: items.len().to_string(),
            });
        }
        if !items.is_empty() && ids.is_empty() {
            tracing::warn!(control = %id, "set_value on an array without controls");
            return Err(FormError::NoControls {
                kind: CompositeKind::Array,
            });
        }
        if items.len() > ids.len() {
            tracing::warn!(control = %id, index = ids.len(), "set_value has more items than controls");
            return Err(FormError::MissingControl {
                kind: CompositeKind::Array,
                key: ids.len().to_string(),
            });
        }
        for (child, item) in ids.into_iter().zip(items) {
            self.set_value(
                child,
                item,
                SetValueOptions::default()
                    .only_self(true)
                    .emit_event(opts.emit_event),
            )?;
        }
        self.update_value_and_validity(id, opts.into())
    }

    pub(crate) fn patch_array_value(
        &mut self,
        id: ControlId,
        value: Value,
        opts: SetValueOptions,
    ) -> Result<()> {
        let Value::Array(items) = value else {
            return Ok(());
        };
        let ids = self.indexed(id)?.to_vec();
        for (child, item) in ids.into_iter().zip(items) {
            self.patch_value(
                child,
                item,
                SetValueOptions::default()
                    .only_self(true)
                    .emit_event(opts.emit_event),
            )?;
        }
        self.update_value_and_validity(id, opts.into())
    }

    pub(crate) fn reset_array(
        &mut self,
        id: ControlId,
        value: Option<Value>,
        opts: UpdateOptions,
    ) -> Result<()> {
        let ids = self.indexed(id)?.to_vec();
        for (i, child) in ids.into_iter().enumerate() {
            let item = value.as_ref().and_then(|v| v.get(i)).cloned();
            self.reset(
                child,
                item,
                UpdateOptions::default()
                    .only_self(true)
                    .emit_event(opts.emit_event),
            )?;
        }
        self.update_pristine(id, opts.into());
        self.update_touched(id, opts.into());
        self.update_value_and_validity(id, opts)
    }

    fn indexed(&self, array: ControlId) -> Result<&[ControlId]> {
        match &self.node(array)?.body {
            Body::Indexed(ids) => Ok(ids),
            _ => Err(FormError::WrongKind {
                id: array,
                expected: "array",
            }),
        }
    }

    fn indexed_mut(&mut self, array: ControlId) -> Result<&mut Vec<ControlId>> {
        match &mut self.node_mut(array)?.body {
            Body::Indexed(ids) => Ok(ids),
            _ => Err(FormError::WrongKind {
                id: array,
                expected: "array",
            }),
        }
    }
}
