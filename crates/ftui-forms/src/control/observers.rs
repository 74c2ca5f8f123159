#![forbid(unsafe_code)]

//! Per-control observer lists and the synchronous emission points.
//!
//! Callbacks run inline, at the moment a control finishes updating and
//! before its parent is touched. A callback only sees the payload; it cannot
//! reach back into the tree.

use std::fmt;

use serde_json::Value;

use super::{Body, ControlId, ControlTree};
use crate::error::{FormError, Result};
use crate::status::ControlStatus;

/// Keyed list of boxed callbacks.
pub(crate) struct ObserverList<F: ?Sized> {
    entries: Vec<(u64, Box<F>)>,
}

impl<F: ?Sized> Default for ObserverList<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for ObserverList<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverList")
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<F: ?Sized> ObserverList<F> {
    pub(crate) fn push(&mut self, key: u64, callback: Box<F>) {
        self.entries.push((key, callback));
    }

    pub(crate) fn remove(&mut self, key: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != key);
        self.entries.len() != before
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<F>> {
        self.entries.iter_mut().map(|(_, callback)| callback)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Every notification channel of one control.
#[derive(Debug, Default)]
pub(crate) struct Observers {
    pub(crate) value_changes: ObserverList<dyn FnMut(&Value)>,
    pub(crate) status_changes: ObserverList<dyn FnMut(ControlStatus)>,
    pub(crate) disabled_changes: ObserverList<dyn FnMut(bool)>,
    pub(crate) collection_changes: ObserverList<dyn FnMut()>,
    pub(crate) view_changes: ObserverList<dyn FnMut(&Value, bool)>,
}

impl Observers {
    fn remove(&mut self, channel: ObserverChannel, key: u64) -> bool {
        match channel {
            ObserverChannel::Value => self.value_changes.remove(key),
            ObserverChannel::Status => self.status_changes.remove(key),
            ObserverChannel::DisabledChange => self.disabled_changes.remove(key),
            ObserverChannel::CollectionChange => self.collection_changes.remove(key),
            ObserverChannel::ViewChange => self.view_changes.remove(key),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.value_changes.len()
            + self.status_changes.len()
            + self.disabled_changes.len()
            + self.collection_changes.len()
            + self.view_changes.len()
    }
}

/// Which list a [`Subscription`] lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverChannel {
    /// Value after every completed update.
    Value,
    /// Status after every completed update.
    Status,
    /// Enable/disable transitions.
    DisabledChange,
    /// Children added, removed or replaced.
    CollectionChange,
    /// Model-to-view writes on a leaf.
    ViewChange,
}

/// Handle returned by every registration; pass it to
/// [`ControlTree::unsubscribe`] to stop the callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    control: ControlId,
    channel: ObserverChannel,
    key: u64,
}

impl Subscription {
    /// The observed control.
    #[must_use]
    pub fn control(&self) -> ControlId {
        self.control
    }

    /// The observed channel.
    #[must_use]
    pub fn channel(&self) -> ObserverChannel {
        self.channel
    }
}

impl ControlTree {
    /// Observe the control's value after every update that emits.
    pub fn subscribe_value_changes<F>(&mut self, id: ControlId, callback: F) -> Result<Subscription>
    where
        F: FnMut(&Value) + 'static,
    {
        let key = self.next_subscription_key();
        self.node_mut(id)?
            .observers
            .value_changes
            .push(key, Box::new(callback));
        Ok(Subscription {
            control: id,
            channel: ObserverChannel::Value,
            key,
        })
    }

    /// Observe the control's status after every update that emits.
    pub fn subscribe_status_changes<F>(
        &mut self,
        id: ControlId,
        callback: F,
    ) -> Result<Subscription>
    where
        F: FnMut(ControlStatus) + 'static,
    {
        let key = self.next_subscription_key();
        self.node_mut(id)?
            .observers
            .status_changes
            .push(key, Box::new(callback));
        Ok(Subscription {
            control: id,
            channel: ObserverChannel::Status,
            key,
        })
    }

    /// Called with `true` after `disable` and `false` after `enable`.
    pub fn register_on_disabled_change<F>(
        &mut self,
        id: ControlId,
        callback: F,
    ) -> Result<Subscription>
    where
        F: FnMut(bool) + 'static,
    {
        let key = self.next_subscription_key();
        self.node_mut(id)?
            .observers
            .disabled_changes
            .push(key, Box::new(callback));
        Ok(Subscription {
            control: id,
            channel: ObserverChannel::DisabledChange,
            key,
        })
    }

    /// Called after children are added to, removed from or replaced in a composite.
    pub fn register_on_collection_change<F>(
        &mut self,
        id: ControlId,
        callback: F,
    ) -> Result<Subscription>
    where
        F: FnMut() + 'static,
    {
        let key = self.next_subscription_key();
        let node = self.node_mut(id)?;
        if matches!(node.body, Body::Leaf(_)) {
            return Err(FormError::WrongKind {
                id,
                expected: "composite control",
            });
        }
        node.observers
            .collection_changes
            .push(key, Box::new(callback));
        Ok(Subscription {
            control: id,
            channel: ObserverChannel::CollectionChange,
            key,
        })
    }

    /// Stop a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.slot_mut(subscription.control)
            .is_some_and(|node| node.observers.remove(subscription.channel, subscription.key))
    }

    /// Number of callbacks registered on a control, across every channel.
    #[must_use]
    pub fn observer_count(&self, id: ControlId) -> usize {
        self.slot(id).map_or(0, |node| node.observers.total())
    }

    pub(crate) fn register_view_change(
        &mut self,
        id: ControlId,
        callback: Box<dyn FnMut(&Value, bool)>,
    ) -> Result<Subscription> {
        let key = self.next_subscription_key();
        self.node_mut(id)?.observers.view_changes.push(key, callback);
        Ok(Subscription {
            control: id,
            channel: ObserverChannel::ViewChange,
            key,
        })
    }

    pub(crate) fn emit_value_and_status(&mut self, id: ControlId) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        tracing::trace!(control = %id, status = %node.status, "emitting value and status");
        for callback in node.observers.value_changes.iter_mut() {
            callback(&node.value);
        }
        let status = node.status;
        for callback in node.observers.status_changes.iter_mut() {
            callback(status);
        }
    }

    pub(crate) fn emit_status(&mut self, id: ControlId) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        tracing::trace!(control = %id, status = %node.status, "emitting status");
        let status = node.status;
        for callback in node.observers.status_changes.iter_mut() {
            callback(status);
        }
    }

    pub(crate) fn notify_disabled_change(&mut self, id: ControlId, disabled: bool) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        for callback in node.observers.disabled_changes.iter_mut() {
            callback(disabled);
        }
    }

    pub(crate) fn notify_collection_change(&mut self, id: ControlId) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        for callback in node.observers.collection_changes.iter_mut() {
            callback();
        }
    }

    pub(crate) fn notify_view_change(&mut self, id: ControlId, emit_view_to_model_change: bool) {
        let Some(node) = self.slot_mut(id) else {
            return;
        };
        if node.observers.view_changes.is_empty() {
            return;
        }
        for callback in node.observers.view_changes.iter_mut() {
            callback(&node.value, emit_view_to_model_change);
        }
    }
}
