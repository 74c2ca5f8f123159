#![forbid(unsafe_code)]

//! The control tree.
//!
//! Every control lives in a [`ControlTree`] arena and is addressed by a
//! [`ControlId`]. Composite controls (groups, records and arrays) hold the
//! ids of their children; each child holds the id of its parent. Mutations
//! are methods on the tree, reads go through the borrowed [`ControlRef`]
//! view that validators also receive.
//!
//! # Example
//!
//! ```rust
//! use ftui_forms::control::{ControlOptions, ControlTree, FormState};
//! use ftui_forms::validation::required;
//! use ftui_forms::ControlStatus;
//! use serde_json::json;
//!
//! let mut tree = ControlTree::new();
//! let name = tree
//!     .new_control(FormState::new(json!("")), ControlOptions::default().validator(required()))
//!     .unwrap();
//! let form = tree.new_group([("name", name)], ControlOptions::default()).unwrap();
//!
//! assert_eq!(tree.control(form).unwrap().status(), ControlStatus::Invalid);
//! assert!(tree.control(form).unwrap().has_error_at("required", "name"));
//! ```

mod array;
mod group;
mod leaf;
mod observers;
mod snapshot;
mod state;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FormError, Result};
use crate::status::{ControlStatus, UpdateOn};
use crate::validation::async_validation::{
    AsyncValidationCoordinator, AsyncValidatorFn, InFlightValidation, ValidationTrace,
};
use crate::validation::compose::{coerce_to_async_validator, coerce_to_validator};
use crate::validation::validators::{ValidationErrors, ValidatorFn};
use crate::value::is_truthy;

pub use observers::{ObserverChannel, Subscription};
pub use snapshot::{ControlSnapshot, InvariantCode, InvariantIssue, InvariantReport};

pub(crate) use observers::Observers;
pub(crate) use snapshot::{FNV_OFFSET_BASIS, fnv1a};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Stable identifier of a control inside its [`ControlTree`].
///
/// Ids are never reused, so an id that outlives its control stays dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(usize);

impl ControlId {
    /// Create an id from a raw slot index (for testing).
    #[must_use]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// Get the raw slot index.
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The control variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// A single value with no children.
    Leaf,
    /// Named children of mixed shape.
    Group,
    /// Ordered children.
    Array,
    /// Named children added and removed at runtime.
    Record,
}

impl ControlKind {
    /// Lower-case variant name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Group => "group",
            Self::Array => "array",
            Self::Record => "record",
        }
    }

    /// `true` for every variant that can own children.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        !matches!(self, Self::Leaf)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// One step of a [`ControlPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A child name. Arrays read it as a decimal index.
    Key(String),
    /// An array position. Negative values count from the end.
    Index(isize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(isize::try_from(index).unwrap_or(isize::MAX))
    }
}

impl From<isize> for PathSegment {
    fn from(index: isize) -> Self {
        Self::Index(index)
    }
}

/// A route from a control to one of its descendants.
///
/// String paths are split on `.`, so `"address.street"` and
/// `["address", "street"]` name the same control.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ControlPath(Vec<PathSegment>);

impl ControlPath {
    /// The segments in walk order.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// `true` when the path has no segments. Empty paths resolve to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ControlPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for ControlPath {
    fn from(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        Self(path.split('.').map(PathSegment::from).collect())
    }
}

impl From<&String> for ControlPath {
    fn from(path: &String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<String> for ControlPath {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<&[&str]> for ControlPath {
    fn from(keys: &[&str]) -> Self {
        Self(keys.iter().copied().map(PathSegment::from).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ControlPath {
    fn from(keys: [&str; N]) -> Self {
        Self(keys.into_iter().map(PathSegment::from).collect())
    }
}

impl From<Vec<PathSegment>> for ControlPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl From<usize> for ControlPath {
    fn from(index: usize) -> Self {
        Self(vec![PathSegment::from(index)])
    }
}

impl From<isize> for ControlPath {
    fn from(index: isize) -> Self {
        Self(vec![PathSegment::Index(index)])
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Options for operations that recompute validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Stop at this control instead of continuing to its ancestors.
    pub only_self: bool,
    /// Publish value and status notifications.
    pub emit_event: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            only_self: false,
            emit_event: true,
        }
    }
}

impl UpdateOptions {
    /// Set `only_self`.
    #[must_use]
    pub const fn only_self(mut self, only_self: bool) -> Self {
        self.only_self = only_self;
        self
    }

    /// Set `emit_event`.
    #[must_use]
    pub const fn emit_event(mut self, emit_event: bool) -> Self {
        self.emit_event = emit_event;
        self
    }

    /// Propagate without publishing anything.
    #[must_use]
    pub const fn silent() -> Self {
        Self {
            only_self: false,
            emit_event: false,
        }
    }
}

/// Options for operations that only publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    /// Publish value and status notifications.
    pub emit_event: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self { emit_event: true }
    }
}

impl EmitOptions {
    /// Suppress notifications.
    #[must_use]
    pub const fn silent() -> Self {
        Self { emit_event: false }
    }
}

impl From<UpdateOptions> for EmitOptions {
    fn from(opts: UpdateOptions) -> Self {
        Self {
            emit_event: opts.emit_event,
        }
    }
}

/// Options for the marking operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOptions {
    /// Leave ancestors untouched.
    pub only_self: bool,
}

impl MarkOptions {
    /// Mark this control only.
    #[must_use]
    pub const fn only_self() -> Self {
        Self { only_self: true }
    }
}

impl From<UpdateOptions> for MarkOptions {
    fn from(opts: UpdateOptions) -> Self {
        Self {
            only_self: opts.only_self,
        }
    }
}

/// Options for `set_value` and `patch_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetValueOptions {
    /// Stop at this control instead of continuing to its ancestors.
    pub only_self: bool,
    /// Publish value and status notifications.
    pub emit_event: bool,
    /// Call the leaf's view-change callbacks.
    pub emit_model_to_view_change: bool,
    /// Second argument handed to the view-change callbacks.
    pub emit_view_to_model_change: bool,
}

impl Default for SetValueOptions {
    fn default() -> Self {
        Self {
            only_self: false,
            emit_event: true,
            emit_model_to_view_change: true,
            emit_view_to_model_change: true,
        }
    }
}

impl SetValueOptions {
    /// Set `only_self`.
    #[must_use]
    pub const fn only_self(mut self, only_self: bool) -> Self {
        self.only_self = only_self;
        self
    }

    /// Set `emit_event`.
    #[must_use]
    pub const fn emit_event(mut self, emit_event: bool) -> Self {
        self.emit_event = emit_event;
        self
    }

    /// Set `emit_model_to_view_change`.
    #[must_use]
    pub const fn emit_model_to_view_change(mut self, emit: bool) -> Self {
        self.emit_model_to_view_change = emit;
        self
    }

    /// Set `emit_view_to_model_change`.
    #[must_use]
    pub const fn emit_view_to_model_change(mut self, emit: bool) -> Self {
        self.emit_view_to_model_change = emit;
        self
    }
}

impl From<UpdateOptions> for SetValueOptions {
    fn from(opts: UpdateOptions) -> Self {
        Self {
            only_self: opts.only_self,
            emit_event: opts.emit_event,
            ..Self::default()
        }
    }
}

impl From<SetValueOptions> for UpdateOptions {
    fn from(opts: SetValueOptions) -> Self {
        Self {
            only_self: opts.only_self,
            emit_event: opts.emit_event,
        }
    }
}

/// Construction options shared by every control variant.
#[derive(Debug, Clone, Default)]
pub struct ControlOptions {
    /// Synchronous validators, in run order.
    pub validators: Vec<ValidatorFn>,
    /// Async validators, started together.
    pub async_validators: Vec<AsyncValidatorFn>,
    /// Update strategy. Unset means inherit from the parent.
    pub update_on: Option<UpdateOn>,
    /// Leaves reset to their construction value instead of `null`.
    pub non_nullable: bool,
}

impl ControlOptions {
    /// Append a validator.
    #[must_use]
    pub fn validator(mut self, validator: impl Into<ValidatorFn>) -> Self {
        self.validators.push(validator.into());
        self
    }

    /// Replace the validators.
    #[must_use]
    pub fn validators(mut self, validators: Vec<ValidatorFn>) -> Self {
        self.validators = validators;
        self
    }

    /// Append an async validator.
    #[must_use]
    pub fn async_validator(mut self, validator: AsyncValidatorFn) -> Self {
        self.async_validators.push(validator);
        self
    }

    /// Replace the async validators.
    #[must_use]
    pub fn async_validators(mut self, validators: Vec<AsyncValidatorFn>) -> Self {
        self.async_validators = validators;
        self
    }

    /// Set the update strategy.
    #[must_use]
    pub fn update_on(mut self, update_on: UpdateOn) -> Self {
        self.update_on = Some(update_on);
        self
    }

    /// Remember the initial value as the reset value.
    #[must_use]
    pub fn non_nullable(mut self, non_nullable: bool) -> Self {
        self.non_nullable = non_nullable;
        self
    }
}

impl From<Vec<ValidatorFn>> for ControlOptions {
    fn from(validators: Vec<ValidatorFn>) -> Self {
        Self {
            validators,
            ..Self::default()
        }
    }
}

impl From<ValidatorFn> for ControlOptions {
    fn from(validator: ValidatorFn) -> Self {
        Self::from(vec![validator])
    }
}

/// Initial state of a leaf: a value and whether it starts disabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    pub value: Value,
    pub disabled: bool,
}

impl FormState {
    /// An enabled control holding `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            disabled: false,
        }
    }

    /// A disabled control holding `value`.
    #[must_use]
    pub fn disabled(value: Value) -> Self {
        Self {
            value,
            disabled: true,
        }
    }

    /// Read an object with exactly the keys `value` and `disabled` as boxed state.
    #[must_use]
    pub fn from_boxed(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 2 {
            return None;
        }
        let inner = object.get("value")?;
        let disabled = object.get("disabled")?;
        Some(Self {
            value: inner.clone(),
            disabled: is_truthy(disabled),
        })
    }
}

impl From<Value> for FormState {
    fn from(value: Value) -> Self {
        Self::from_boxed(&value).unwrap_or_else(|| Self::new(value))
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// View-side state only leaves carry.
#[derive(Debug, Clone, Default)]
pub(crate) struct LeafState {
    pub(crate) default_value: Value,
    pub(crate) pending_value: Value,
    pub(crate) pending_change: bool,
    pub(crate) pending_dirty: bool,
    pub(crate) pending_touched: bool,
}

/// Children of a node, by variant.
#[derive(Debug)]
pub(crate) enum Body {
    Leaf(LeafState),
    Keyed(Vec<(String, ControlId)>),
    Indexed(Vec<ControlId>),
}

impl Body {
    pub(crate) fn child_ids(&self) -> Vec<ControlId> {
        match self {
            Self::Leaf(_) => Vec::new(),
            Self::Keyed(entries) => entries.iter().map(|(_, id)| *id).collect(),
            Self::Indexed(ids) => ids.clone(),
        }
    }

    pub(crate) fn child_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Keyed(entries) => entries.len(),
            Self::Indexed(ids) => ids.len(),
        }
    }
}

/// One arena slot.
#[derive(Debug)]
pub(crate) struct ControlNode {
    pub(crate) kind: ControlKind,
    pub(crate) body: Body,
    pub(crate) value: Value,
    pub(crate) status: ControlStatus,
    pub(crate) errors: Option<ValidationErrors>,
    pub(crate) pristine: bool,
    pub(crate) touched: bool,
    pub(crate) parent: Option<ControlId>,
    pub(crate) update_on: Option<UpdateOn>,
    pub(crate) raw_validators: Vec<ValidatorFn>,
    pub(crate) validator: Option<ValidatorFn>,
    pub(crate) raw_async_validators: Vec<AsyncValidatorFn>,
    pub(crate) async_validator: Option<AsyncValidatorFn>,
    pub(crate) has_own_pending_async_validator: bool,
    pub(crate) async_run: Option<InFlightValidation>,
    pub(crate) observers: Observers,
}

impl ControlNode {
    pub(crate) fn new(kind: ControlKind, body: Body, options: ControlOptions) -> Self {
        let validator = coerce_to_validator(&options.validators);
        let async_validator = coerce_to_async_validator(&options.async_validators);
        Self {
            kind,
            body,
            value: Value::Null,
            status: ControlStatus::Valid,
            errors: None,
            pristine: true,
            touched: false,
            parent: None,
            update_on: options.update_on,
            raw_validators: options.validators,
            validator,
            raw_async_validators: options.async_validators,
            async_validator,
            has_own_pending_async_validator: false,
            async_run: None,
            observers: Observers::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ControlTree
// ---------------------------------------------------------------------------

/// Arena owning every control of one or more form trees.
#[derive(Debug, Default)]
pub struct ControlTree {
    slots: Vec<Option<ControlNode>>,
    coordinator: AsyncValidationCoordinator,
    next_subscription: u64,
}

impl ControlTree {
    /// Create an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read view of a live control.
    #[must_use]
    pub fn control(&self, id: ControlId) -> Option<ControlRef<'_>> {
        let node = self.slot(id)?;
        Some(ControlRef {
            tree: self,
            id,
            node,
        })
    }

    /// `true` while `id` refers to a live control.
    #[must_use]
    pub fn is_live(&self, id: ControlId) -> bool {
        self.slot(id).is_some()
    }

    /// Number of live controls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// `true` when no control is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live control in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ControlId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(raw, _)| ControlId(raw))
    }

    /// Every async run started, cancelled or settled in this tree.
    #[must_use]
    pub fn validation_trace(&self) -> &ValidationTrace {
        self.coordinator.trace()
    }

    /// The coordinator issuing async validation tokens.
    #[must_use]
    pub fn coordinator(&self) -> &AsyncValidationCoordinator {
        &self.coordinator
    }

    /// Free a detached control and its whole subtree.
    ///
    /// Async runs in the subtree are cancelled. Returns the number of
    /// controls freed.
    pub fn release(&mut self, id: ControlId) -> Result<usize> {
        if let Some(parent) = self.node(id)?.parent {
            return Err(FormError::ReleaseAttached { id, parent });
        }
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            self.cancel_existing_validation(current);
            if let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) {
                stack.extend(node.body.child_ids());
                freed += 1;
            }
        }
        tracing::debug!(control = %id, freed, "released control subtree");
        Ok(freed)
    }

    pub(crate) fn slot(&self, id: ControlId) -> Option<&ControlNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn slot_mut(&mut self, id: ControlId) -> Option<&mut ControlNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub(crate) fn node(&self, id: ControlId) -> Result<&ControlNode> {
        self.slot(id).ok_or(FormError::UnknownControl { id })
    }

    pub(crate) fn node_mut(&mut self, id: ControlId) -> Result<&mut ControlNode> {
        self.slot_mut(id).ok_or(FormError::UnknownControl { id })
    }

    pub(crate) fn alloc(&mut self, node: ControlNode) -> ControlId {
        let id = ControlId(self.slots.len());
        self.slots.push(Some(node));
        id
    }

    pub(crate) fn parent_of(&self, id: ControlId) -> Option<ControlId> {
        self.slot(id).and_then(|node| node.parent)
    }

    pub(crate) fn child_ids(&self, id: ControlId) -> Vec<ControlId> {
        self.slot(id)
            .map(|node| node.body.child_ids())
            .unwrap_or_default()
    }

    pub(crate) fn is_enabled(&self, id: ControlId) -> bool {
        self.slot(id).is_some_and(|node| node.status.is_enabled())
    }

    /// Make `parent` own `child`.
    pub(crate) fn attach(&mut self, child: ControlId, parent: ControlId) -> Result<()> {
        if let Some(existing) = self.node(child)?.parent {
            return Err(FormError::ControlAlreadyAttached {
                id: child,
                parent: existing,
            });
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(FormError::CycleDetected {
                    ancestor: child,
                    descendant: parent,
                });
            }
            cursor = self.parent_of(current);
        }
        self.node_mut(child)?.parent = Some(parent);
        tracing::debug!(control = %child, parent = %parent, "attached control");
        Ok(())
    }

    /// Sever `child` from its parent; it becomes an independent root.
    pub(crate) fn detach(&mut self, child: ControlId) {
        if let Some(node) = self.slot_mut(child)
            && let Some(parent) = node.parent.take()
        {
            tracing::debug!(control = %child, parent = %parent, "detached control");
        }
    }

    /// Attach every child to a freshly inserted composite, or none of them.
    ///
    /// On failure the composite's slot is freed again so the children stay
    /// independent roots.
    pub(crate) fn adopt_children(&mut self, parent: ControlId, children: &[ControlId]) -> Result<()> {
        for (i, child) in children.iter().enumerate() {
            if let Err(err) = self.attach(*child, parent) {
                for attached in &children[..i] {
                    self.detach(*attached);
                }
                if let Some(slot) = self.slots.get_mut(parent.0) {
                    *slot = None;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn next_subscription_key(&mut self) -> u64 {
        self.next_subscription += 1;
        self.next_subscription
    }
}

// ---------------------------------------------------------------------------
// ControlRef
// ---------------------------------------------------------------------------

/// Borrowed read view of one control.
#[derive(Clone, Copy)]
pub struct ControlRef<'a> {
    tree: &'a ControlTree,
    id: ControlId,
    node: &'a ControlNode,
}

impl fmt::Debug for ControlRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlRef")
            .field("id", &self.id)
            .field("kind", &self.node.kind)
            .field("status", &self.node.status)
            .field("value", &self.node.value)
            .finish()
    }
}

impl<'a> ControlRef<'a> {
    /// The control's id.
    #[must_use]
    pub fn id(&self) -> ControlId {
        self.id
    }

    /// The control's variant.
    #[must_use]
    pub fn kind(&self) -> ControlKind {
        self.node.kind
    }

    /// The tree this view borrows from.
    #[must_use]
    pub fn tree(&self) -> &'a ControlTree {
        self.tree
    }

    /// Current value. Composites exclude disabled children unless they are
    /// disabled themselves.
    #[must_use]
    pub fn value(&self) -> &'a Value {
        &self.node.value
    }

    /// Value including disabled descendants.
    #[must_use]
    pub fn raw_value(&self) -> Value {
        match &self.node.body {
            Body::Leaf(_) => self.node.value.clone(),
            Body::Keyed(entries) => Value::Object(
                entries
                    .iter()
                    .filter_map(|(name, child)| {
                        Some((name.clone(), self.tree.control(*child)?.raw_value()))
                    })
                    .collect(),
            ),
            Body::Indexed(ids) => Value::Array(
                ids.iter()
                    .filter_map(|child| Some(self.tree.control(*child)?.raw_value()))
                    .collect(),
            ),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ControlStatus {
        self.node.status
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.node.status == ControlStatus::Valid
    }

    #[must_use]
    pub fn invalid(&self) -> bool {
        self.node.status == ControlStatus::Invalid
    }

    #[must_use]
    pub fn pending(&self) -> bool {
        self.node.status == ControlStatus::Pending
    }

    #[must_use]
    pub fn disabled(&self) -> bool {
        self.node.status == ControlStatus::Disabled
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.node.status.is_enabled()
    }

    /// The control's own errors. Descendant failures are not included.
    #[must_use]
    pub fn errors(&self) -> Option<&'a ValidationErrors> {
        self.node.errors.as_ref()
    }

    /// The first error code, in key order.
    #[must_use]
    pub fn error(&self) -> Option<&'a str> {
        self.node
            .errors
            .as_ref()
            .and_then(|errors| errors.keys().next())
            .map(String::as_str)
    }

    /// Detail recorded under `code`.
    #[must_use]
    pub fn get_error(&self, code: &str) -> Option<&'a Value> {
        self.node.errors.as_ref()?.get(code)
    }

    /// Detail recorded under `code` on the descendant at `path`.
    #[must_use]
    pub fn get_error_at(&self, code: &str, path: impl Into<ControlPath>) -> Option<&'a Value> {
        self.get(path)?.get_error(code)
    }

    /// `true` if the control's own errors contain `code`.
    #[must_use]
    pub fn has_error(&self, code: &str) -> bool {
        self.get_error(code).is_some()
    }

    /// `true` if the descendant at `path` has `code` among its errors.
    #[must_use]
    pub fn has_error_at(&self, code: &str, path: impl Into<ControlPath>) -> bool {
        self.get_error_at(code, path).is_some()
    }

    /// Walk `path` down from this control.
    #[must_use]
    pub fn get(&self, path: impl Into<ControlPath>) -> Option<ControlRef<'a>> {
        let path = path.into();
        if path.is_empty() {
            return None;
        }
        let mut current = *self;
        for segment in path.segments() {
            current = current.find_child(segment)?;
        }
        Some(current)
    }

    fn find_child(&self, segment: &PathSegment) -> Option<ControlRef<'a>> {
        match (&self.node.body, segment) {
            (Body::Keyed(_), PathSegment::Key(name)) => self.child(name),
            (Body::Keyed(_), PathSegment::Index(index)) => self.child(&index.to_string()),
            (Body::Indexed(_), PathSegment::Key(key)) => self.at(key.parse().ok()?),
            (Body::Indexed(_), PathSegment::Index(index)) => self.at(*index),
            (Body::Leaf(_), _) => None,
        }
    }

    /// Named child of a group or record, enabled or not.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<ControlRef<'a>> {
        let Body::Keyed(entries) = &self.node.body else {
            return None;
        };
        let (_, id) = entries.iter().find(|(key, _)| key == name)?;
        self.tree.control(*id)
    }

    /// Array child at `index`. Negative indices count from the end.
    #[must_use]
    pub fn at(&self, index: isize) -> Option<ControlRef<'a>> {
        let Body::Indexed(ids) = &self.node.body else {
            return None;
        };
        let position = adjust_index(index, ids.len())?;
        self.tree.control(*ids.get(position)?)
    }

    /// `true` if a group or record has an enabled child named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.child(name).is_some_and(|child| child.enabled())
    }

    /// Names of a group's or record's children, in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<&'a str> {
        match &self.node.body {
            Body::Keyed(entries) => entries.iter().map(|(key, _)| key.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Direct children in order.
    #[must_use]
    pub fn children(&self) -> Vec<ControlRef<'a>> {
        self.node
            .body
            .child_ids()
            .into_iter()
            .filter_map(|id| self.tree.control(id))
            .collect()
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.node.body.child_count()
    }

    /// `true` when the control has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn parent(&self) -> Option<ControlRef<'a>> {
        self.tree.control(self.node.parent?)
    }

    /// The topmost ancestor, or the control itself.
    #[must_use]
    pub fn root(&self) -> ControlRef<'a> {
        let mut current = *self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    #[must_use]
    pub fn pristine(&self) -> bool {
        self.node.pristine
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        !self.node.pristine
    }

    #[must_use]
    pub fn touched(&self) -> bool {
        self.node.touched
    }

    #[must_use]
    pub fn untouched(&self) -> bool {
        !self.node.touched
    }

    /// Effective update strategy, inherited from the nearest ancestor that sets one.
    #[must_use]
    pub fn update_on(&self) -> UpdateOn {
        match self.node.update_on {
            Some(update_on) => update_on,
            None => self.parent().map_or(UpdateOn::Change, |parent| parent.update_on()),
        }
    }

    /// `true` if `validator` is attached (by identity).
    #[must_use]
    pub fn has_validator(&self, validator: &ValidatorFn) -> bool {
        self.node.raw_validators.contains(validator)
    }

    /// `true` if `validator` is attached as an async validator (by identity).
    #[must_use]
    pub fn has_async_validator(&self, validator: &AsyncValidatorFn) -> bool {
        self.node.raw_async_validators.contains(validator)
    }

    /// `true` while this control's own async validation is in flight.
    #[must_use]
    pub fn has_own_pending_async_validator(&self) -> bool {
        self.node.has_own_pending_async_validator
    }

    /// The composed synchronous validator, if any.
    #[must_use]
    pub fn validator(&self) -> Option<&'a ValidatorFn> {
        self.node.validator.as_ref()
    }

    /// The composed async validator, if any.
    #[must_use]
    pub fn async_validator(&self) -> Option<&'a AsyncValidatorFn> {
        self.node.async_validator.as_ref()
    }

    /// Value a leaf resets to. `None` for composites.
    #[must_use]
    pub fn default_value(&self) -> Option<&'a Value> {
        match &self.node.body {
            Body::Leaf(leaf) => Some(&leaf.default_value),
            _ => None,
        }
    }

    /// Value staged by the view but not yet committed. `None` for composites.
    #[must_use]
    pub fn pending_value(&self) -> Option<&'a Value> {
        match &self.node.body {
            Body::Leaf(leaf) => Some(&leaf.pending_value),
            _ => None,
        }
    }
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn adjust_index(index: isize, len: usize) -> Option<usize> {
    if index < 0 {
        len.checked_sub(index.unsigned_abs())
    } else {
        usize::try_from(index).ok()
    }
}
