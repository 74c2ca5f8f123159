#![forbid(unsafe_code)]

//! Groups and records: composites with named children.
//!
//! A group's value is an object holding the values of its enabled children
//! (every child once the group itself is disabled). Records share the same
//! storage and operations; they differ only in their [`ControlKind`] tag,
//! which marks them as maps whose keys come and go at runtime.

use serde_json::{Map, Value};

use super::{
    Body, ControlId, ControlKind, ControlNode, ControlOptions, ControlTree, EmitOptions,
    SetValueOptions, UpdateOptions,
};
use crate::error::{CompositeKind, FormError, Result};

impl ControlTree {
    /// Create a group owning `controls`.
    ///
    /// Every child must be a detached root. A repeated name keeps the last
    /// control given for it; the earlier one stays detached.
    pub fn new_group<I, K>(&mut self, controls: I, options: ControlOptions) -> Result<ControlId>
    where
        I: IntoIterator<Item = (K, ControlId)>,
        K: Into<String>,
    {
        self.new_keyed(ControlKind::Group, controls, options)
    }

    /// Create a record owning `controls`. See [`ControlTree::new_group`].
    pub fn new_record<I, K>(&mut self, controls: I, options: ControlOptions) -> Result<ControlId>
    where
        I: IntoIterator<Item = (K, ControlId)>,
        K: Into<String>,
    {
        self.new_keyed(ControlKind::Record, controls, options)
    }

    fn new_keyed<I, K>(
        &mut self,
        kind: ControlKind,
        controls: I,
        options: ControlOptions,
    ) -> Result<ControlId>
    where
        I: IntoIterator<Item = (K, ControlId)>,
        K: Into<String>,
    {
        let mut entries: Vec<(String, ControlId)> = Vec::new();
        for (name, child) in controls {
            let name = name.into();
            if name.is_empty() {
                return Err(FormError::MissingControlName);
            }
            match entries.iter_mut().find(|(key, _)| *key == name) {
                Some(entry) => entry.1 = child,
                None => entries.push((name, child)),
            }
        }
        let children: Vec<ControlId> = entries.iter().map(|(_, id)| *id).collect();
        let node = ControlNode::new(kind, Body::Keyed(entries), options);
        let emit_event = node.async_validator.is_some();
        let id = self.alloc(node);
        self.adopt_children(id, &children)?;
        self.update_value_and_validity(
            id,
            UpdateOptions {
                only_self: true,
                emit_event,
            },
        )?;
        tracing::debug!(control = %id, kind = %kind, children = children.len(), "created composite control");
        Ok(id)
    }

    /// Attach `child` under `name` without recomputing anything.
    ///
    /// If the name is taken the existing child is returned and `child` stays
    /// detached.
    pub fn register_control(
        &mut self,
        group: ControlId,
        name: &str,
        child: ControlId,
    ) -> Result<ControlId> {
        if name.is_empty() {
            return Err(FormError::MissingControlName);
        }
        if let Some(existing) = self.keyed_child(group, name)? {
            return Ok(existing);
        }
        self.attach(child, group)?;
        self.entries_mut(group)?.push((name.to_owned(), child));
        Ok(child)
    }

    /// Attach `child` under `name` and update the group's value and validity.
    pub fn add_control(
        &mut self,
        group: ControlId,
        name: &str,
        child: ControlId,
        opts: EmitOptions,
    ) -> Result<ControlId> {
        let registered = self.register_control(group, name, child)?;
        self.update_value_and_validity(group, UpdateOptions::default().emit_event(opts.emit_event))?;
        self.notify_collection_change(group);
        Ok(registered)
    }

    /// Detach the child named `name`. The child stays usable as a root.
    ///
    /// Returns the detached child, or `None` if the name was unknown.
    pub fn remove_control(
        &mut self,
        group: ControlId,
        name: &str,
        opts: EmitOptions,
    ) -> Result<Option<ControlId>> {
        let removed = self.take_entry(group, name)?;
        self.update_value_and_validity(group, UpdateOptions::default().emit_event(opts.emit_event))?;
        self.notify_collection_change(group);
        Ok(removed)
    }

    /// Replace the child named `name` with `child`.
    ///
    /// Returns the replaced child, if there was one.
    pub fn set_control(
        &mut self,
        group: ControlId,
        name: &str,
        child: ControlId,
        opts: EmitOptions,
    ) -> Result<Option<ControlId>> {
        if name.is_empty() {
            return Err(FormError::MissingControlName);
        }
        let current = self.keyed_child(group, name)?;
        // Attach first: a rejected child leaves the group intact.
        if current != Some(child) {
            self.attach(child, group)?;
        }
        let entries = self.entries_mut(group)?;
        entries.retain(|(key, _)| key != name);
        entries.push((name.to_owned(), child));
        if let Some(previous) = current
            && previous != child
        {
            self.detach(previous);
        }
        self.update_value_and_validity(group, UpdateOptions::default().emit_event(opts.emit_event))?;
        self.notify_collection_change(group);
        Ok(current)
    }

    fn take_entry(&mut self, group: ControlId, name: &str) -> Result<Option<ControlId>> {
        let entries = self.entries_mut(group)?;
        let Some(position) = entries.iter().position(|(key, _)| key == name) else {
            return Ok(None);
        };
        let (_, child) = entries.remove(position);
        self.detach(child);
        Ok(Some(child))
    }

    pub(crate) fn set_group_value(
        &mut self,
        id: ControlId,
        value: Value,
        opts: SetValueOptions,
    ) -> Result<()> {
        let entries = self.entries(id)?;
        let kind = self.keyed_kind(id)?;
        let empty = Map::new();
        let object = value.as_object().unwrap_or(&empty);
        for (name, _) in &entries {
            if !object.contains_key(name) {
                tracing::warn!(control = %id, key = %name, "set_value is missing a child value");
                return Err(FormError::MissingControlValue {
                    kind,
                    key: name.clone(),
                });
            }
        }
        for (name, child_value) in object {
            let child = assert_control_present(id, kind, &entries, name)?;
            self.set_value(
                child,
                child_value.clone(),
                SetValueOptions::default()
                    .only_self(true)
                    .emit_event(opts.emit_event),
            )?;
        }
        self.update_value_and_validity(id, opts.into())
    }

    pub(crate) fn patch_group_value(
        &mut self,
        id: ControlId,
        value: Value,
        opts: SetValueOptions,
    ) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let entries = self.entries(id)?;
        if let Value::Object(object) = value {
            for (name, child_value) in object {
                if let Some((_, child)) = entries.iter().find(|(key, _)| *key == name) {
                    self.patch_value(
                        *child,
                        child_value,
                        SetValueOptions::default()
                            .only_self(true)
                            .emit_event(opts.emit_event),
                    )?;
                }
            }
        }
        self.update_value_and_validity(id, opts.into())
    }

    pub(crate) fn reset_group(
        &mut self,
        id: ControlId,
        value: Option<Value>,
        opts: UpdateOptions,
    ) -> Result<()> {
        for (name, child) in self.entries(id)? {
            let child_value = match &value {
                None => None,
                Some(Value::Null) => Some(Value::Null),
                Some(value) => value.get(&name).cloned(),
            };
            self.reset(
                child,
                child_value,
                UpdateOptions::default()
                    .only_self(true)
                    .emit_event(opts.emit_event),
            )?;
        }
        self.update_pristine(id, opts.into());
        self.update_touched(id, opts.into());
        self.update_value_and_validity(id, opts)
    }

    fn keyed_child(&self, group: ControlId, name: &str) -> Result<Option<ControlId>> {
        Ok(self
            .entries_ref(group)?
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, id)| *id))
    }

    fn keyed_kind(&self, group: ControlId) -> Result<CompositeKind> {
        match self.node(group)?.kind {
            ControlKind::Record => Ok(CompositeKind::Record),
            _ => Ok(CompositeKind::Group),
        }
    }

    fn entries(&self, group: ControlId) -> Result<Vec<(String, ControlId)>> {
        self.entries_ref(group).map(<[_]>::to_vec)
    }

    fn entries_ref(&self, group: ControlId) -> Result<&[(String, ControlId)]> {
        match &self.node(group)?.body {
            Body::Keyed(entries) => Ok(entries),
            _ => Err(FormError::WrongKind {
                id: group,
                expected: "group or record",
            }),
        }
    }

    fn entries_mut(&mut self, group: ControlId) -> Result<&mut Vec<(String, ControlId)>> {
        match &mut self.node_mut(group)?.body {
            Body::Keyed(entries) => Ok(entries),
            _ => Err(FormError::WrongKind {
                id: group,
                expected: "group or record",
            }),
        }
    }
}

fn assert_control_present(
    group: ControlId,
    kind: CompositeKind,
    entries: &[(String, ControlId)],
    name: &str,
) -> Result<ControlId> {
    if entries.is_empty() {
        tracing::warn!(control = %group, "set_value on a group without controls");
        return Err(FormError::NoControls { kind });
    }
    match entries.iter().find(|(key, _)| key == name) {
        Some((_, child)) => Ok(*child),
        None => {
            tracing::warn!(control = %group, key = %name, "set_value names an unknown control");
            Err(FormError::MissingControl {
                kind,
                key: name.to_owned(),
            })
        }
    }
}
