#![forbid(unsafe_code)]

//! Serializable snapshots and structural diagnostics.
//!
//! A [`ControlSnapshot`] captures a subtree as plain data, suitable for
//! golden tests and replay logs. [`ControlTree::invariant_report`] checks
//! the parent/child links and async bookkeeping of a subtree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Body, ControlId, ControlKind, ControlTree};
use crate::error::Result;
use crate::status::{ControlStatus, UpdateOn};
use crate::validation::validators::ValidationErrors;

/// Plain-data view of one control and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub id: ControlId,
    pub kind: ControlKind,
    /// Name within a group or record parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Value,
    pub status: ControlStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
    pub pristine: bool,
    pub touched: bool,
    pub update_on: UpdateOn,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pending_async: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ControlSnapshot>,
}

pub(crate) const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// Fold `bytes` into a running FNV-1a hash.
pub(crate) fn fnv1a(hash: u64, bytes: &[u8]) -> u64 {
    const PRIME: u64 = 0x0000_0001_0000_01b3;
    bytes
        .iter()
        .fold(hash, |hash, byte| (hash ^ u64::from(*byte)).wrapping_mul(PRIME))
}

impl ControlSnapshot {
    /// Deterministic hash over the serialized snapshot.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        // Serializing plain data into a Vec cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        fnv1a(FNV_OFFSET_BASIS, &bytes)
    }

    /// Number of controls in the snapshot, itself included.
    #[must_use]
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

/// Stable code for invariant findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantCode {
    /// A composite lists a child id that is no longer live.
    DeadChild,
    /// A child's parent link does not point back at the composite listing it.
    ParentMismatch,
    /// A composite lists the same child twice.
    DuplicateChild,
    /// The control's async run and the coordinator disagree.
    StaleAsyncRun,
}

/// One invariant finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantIssue {
    pub code: InvariantCode,
    pub control: ControlId,
    pub related: Option<ControlId>,
    pub message: String,
}

/// Structured report over a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvariantReport {
    pub issues: Vec<InvariantIssue>,
}

impl InvariantReport {
    /// `true` when no finding was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// `true` if any finding carries `code`.
    #[must_use]
    pub fn has(&self, code: InvariantCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

impl ControlTree {
    /// Capture the subtree rooted at `id`.
    pub fn snapshot(&self, id: ControlId) -> Result<ControlSnapshot> {
        self.node(id)?;
        Ok(self.snapshot_inner(id, None))
    }

    fn snapshot_inner(&self, id: ControlId, key: Option<String>) -> ControlSnapshot {
        let Some(control) = self.control(id) else {
            return ControlSnapshot {
                id,
                kind: ControlKind::Leaf,
                key,
                value: Value::Null,
                status: ControlStatus::Disabled,
                errors: None,
                pristine: true,
                touched: false,
                update_on: UpdateOn::Change,
                pending_async: false,
                children: Vec::new(),
            };
        };
        let children = match &control.node.body {
            Body::Leaf(_) => Vec::new(),
            Body::Keyed(entries) => entries
                .iter()
                .map(|(name, child)| self.snapshot_inner(*child, Some(name.clone())))
                .collect(),
            Body::Indexed(ids) => ids
                .iter()
                .map(|child| self.snapshot_inner(*child, None))
                .collect(),
        };
        ControlSnapshot {
            id,
            kind: control.kind(),
            key,
            value: control.value().clone(),
            status: control.status(),
            errors: control.errors().cloned(),
            pristine: control.pristine(),
            touched: control.touched(),
            update_on: control.update_on(),
            pending_async: control.has_own_pending_async_validator(),
            children,
        }
    }

    /// Check the subtree rooted at `id` for broken links and stale async runs.
    pub fn invariant_report(&self, id: ControlId) -> Result<InvariantReport> {
        self.node(id)?;
        let mut report = InvariantReport::default();
        let mut stack = vec![id];
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.slot(current) else {
                continue;
            };

            let token = self.coordinator.current_token(current);
            let run = node.async_run.as_ref().map(|run| run.token);
            if token != run {
                report.issues.push(InvariantIssue {
                    code: InvariantCode::StaleAsyncRun,
                    control: current,
                    related: None,
                    message: format!(
                        "control {current} holds run {run:?} but the coordinator tracks {token:?}"
                    ),
                });
            }

            let mut seen = HashSet::new();
            for child in node.body.child_ids() {
                if !seen.insert(child) {
                    report.issues.push(InvariantIssue {
                        code: InvariantCode::DuplicateChild,
                        control: current,
                        related: Some(child),
                        message: format!("control {current} lists child {child} more than once"),
                    });
                    continue;
                }
                let Some(child_node) = self.slot(child) else {
                    report.issues.push(InvariantIssue {
                        code: InvariantCode::DeadChild,
                        control: current,
                        related: Some(child),
                        message: format!("control {current} lists released child {child}"),
                    });
                    continue;
                };
                if child_node.parent != Some(current) {
                    report.issues.push(InvariantIssue {
                        code: InvariantCode::ParentMismatch,
                        control: child,
                        related: Some(current),
                        message: format!(
                            "control {child} is listed by {current} but points at {:?}",
                            child_node.parent
                        ),
                    });
                }
                stack.push(child);
            }
        }
        if !report.is_clean() {
            tracing::warn!(control = %id, issues = report.issues.len(), "invariant report found issues");
        }
        Ok(report)
    }
}
