#![forbid(unsafe_code)]

//! Async validation: deferred values, error streams, and run tracking.
//!
//! An async validator returns an [`AsyncValidation`]: either a [`Deferred`]
//! (one result, later) or a [`ValidationStream`] (a push stream). [`to_stream`]
//! turns both into a stream the control tree polls.
//!
//! Each run gets a [`ValidationToken`] from the tree's
//! [`AsyncValidationCoordinator`]. A control has at most one run in flight;
//! starting another cancels the first and drops its stream, so a late result
//! has nowhere to land. Every start and settle is appended to a
//! [`ValidationTrace`].
//!
//! ```rust
//! use ftui_forms::validation::{Deferred, StreamPoll, ValidationStream, deferred};
//!
//! let (resolver, pending) = deferred();
//! let mut stream = ValidationStream::from(pending);
//! assert_eq!(stream.poll_next(), StreamPoll::Pending);
//!
//! resolver.resolve(None);
//! assert_eq!(stream.poll_next(), StreamPoll::Ready(None));
//! assert_eq!(stream.poll_next(), StreamPoll::Closed);
//! # let _ = Deferred::resolved(None);
//! ```

use std::collections::BTreeMap;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use super::compose::merge_errors;
use super::validators::ValidationErrors;
use crate::control::{ControlId, ControlRef, FNV_OFFSET_BASIS, fnv1a};

// ---------------------------------------------------------------------------
// Deferred values
// ---------------------------------------------------------------------------

/// A single validation result that will be available later.
#[derive(Debug)]
pub struct Deferred {
    rx: Receiver<Option<ValidationErrors>>,
}

/// The producing half of a [`Deferred`].
#[derive(Debug)]
pub struct Resolver {
    tx: Sender<Option<ValidationErrors>>,
}

/// Create a connected resolver/deferred pair.
#[must_use]
pub fn deferred() -> (Resolver, Deferred) {
    let (tx, rx) = mpsc::channel();
    (Resolver { tx }, Deferred { rx })
}

impl Deferred {
    /// A deferred value that is already settled.
    #[must_use]
    pub fn resolved(errors: Option<ValidationErrors>) -> Self {
        let (resolver, deferred) = deferred();
        resolver.resolve(errors);
        deferred
    }
}

impl Resolver {
    /// Settle the deferred value.
    ///
    /// Returns `false` when nobody is listening any more, which is the case
    /// once the validation run it belonged to was cancelled.
    pub fn resolve(self, errors: Option<ValidationErrors>) -> bool {
        self.tx.send(errors).is_ok()
    }
}

// ---------------------------------------------------------------------------
// ValidationStream
// ---------------------------------------------------------------------------

/// Outcome of polling a [`ValidationStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPoll {
    /// The next emitted result.
    Ready(Option<ValidationErrors>),
    /// Nothing yet; the source is still alive.
    Pending,
    /// The source finished. No more results will arrive.
    Closed,
}

/// A push stream of validation results.
#[derive(Debug)]
pub struct ValidationStream {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Channel(Receiver<Option<ValidationErrors>>),
    Join(Vec<JoinSlot>),
    Poll(PollFn),
    Done,
}

struct PollFn(Box<dyn FnMut() -> StreamPoll + Send>);

impl fmt::Debug for PollFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PollFn")
    }
}

#[derive(Debug)]
struct JoinSlot {
    stream: ValidationStream,
    last: Option<Option<ValidationErrors>>,
    closed: bool,
}

/// The producing half of a [`ValidationStream`]. Dropping every sink closes it.
#[derive(Debug, Clone)]
pub struct StreamSink {
    tx: Sender<Option<ValidationErrors>>,
}

impl StreamSink {
    /// Push a result. Returns `false` once the stream has been dropped.
    pub fn emit(&self, errors: Option<ValidationErrors>) -> bool {
        self.tx.send(errors).is_ok()
    }
}

/// Create a connected sink/stream pair.
#[must_use]
pub fn validation_stream() -> (StreamSink, ValidationStream) {
    let (tx, rx) = mpsc::channel();
    (
        StreamSink { tx },
        ValidationStream {
            source: Source::Channel(rx),
        },
    )
}

impl ValidationStream {
    /// Wait for every stream to finish, then emit one merged result built
    /// from each stream's last value.
    ///
    /// The sources run side by side; none waits for another. If any source
    /// finishes without ever emitting, the joined stream closes without
    /// emitting as well.
    #[must_use]
    pub fn join(streams: Vec<ValidationStream>) -> Self {
        let slots = streams
            .into_iter()
            .map(|stream| JoinSlot {
                stream,
                last: None,
                closed: false,
            })
            .collect();
        Self {
            source: Source::Join(slots),
        }
    }

    /// A stream driven by `poll`. Once `poll` reports [`StreamPoll::Closed`]
    /// it is not called again.
    #[must_use]
    pub fn poll_fn<F>(poll: F) -> Self
    where
        F: FnMut() -> StreamPoll + Send + 'static,
    {
        Self {
            source: Source::Poll(PollFn(Box::new(poll))),
        }
    }

    /// Take the next result without blocking.
    pub fn poll_next(&mut self) -> StreamPoll {
        match &mut self.source {
            Source::Done => StreamPoll::Closed,
            Source::Poll(PollFn(poll)) => {
                let next = poll();
                if next == StreamPoll::Closed {
                    self.source = Source::Done;
                }
                next
            }
            Source::Channel(rx) => match rx.try_recv() {
                Ok(errors) => StreamPoll::Ready(errors),
                Err(TryRecvError::Empty) => StreamPoll::Pending,
                Err(TryRecvError::Disconnected) => {
                    self.source = Source::Done;
                    StreamPoll::Closed
                }
            },
            Source::Join(slots) => {
                for slot in slots.iter_mut().filter(|slot| !slot.closed) {
                    loop {
                        match slot.stream.poll_next() {
                            StreamPoll::Ready(errors) => slot.last = Some(errors),
                            StreamPoll::Pending => break,
                            StreamPoll::Closed => {
                                slot.closed = true;
                                break;
                            }
                        }
                    }
                }
                if slots.iter().any(|slot| slot.closed && slot.last.is_none()) {
                    self.source = Source::Done;
                    return StreamPoll::Closed;
                }
                if !slots.iter().all(|slot| slot.closed) {
                    return StreamPoll::Pending;
                }
                let Source::Join(slots) = std::mem::replace(&mut self.source, Source::Done) else {
                    return StreamPoll::Closed;
                };
                StreamPoll::Ready(merge_errors(slots.into_iter().filter_map(|slot| slot.last)))
            }
        }
    }
}

impl From<Deferred> for ValidationStream {
    fn from(deferred: Deferred) -> Self {
        Self {
            source: Source::Channel(deferred.rx),
        }
    }
}

// ---------------------------------------------------------------------------
// AsyncValidation
// ---------------------------------------------------------------------------

/// What an async validator hands back.
#[derive(Debug)]
pub enum AsyncValidation {
    /// A single result that settles later.
    Deferred(Deferred),
    /// A stream of results; the first one is applied.
    Stream(ValidationStream),
    /// A synchronous result. Async validators must not return this; it is
    /// rejected by [`to_stream`].
    Immediate(Option<ValidationErrors>),
}

impl From<Deferred> for AsyncValidation {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

impl From<ValidationStream> for AsyncValidation {
    fn from(stream: ValidationStream) -> Self {
        Self::Stream(stream)
    }
}

/// An async validator returned a synchronous result.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncValidatorMisuse {
    returned: Option<ValidationErrors>,
}

impl AsyncValidatorMisuse {
    /// Human-readable description of the misuse.
    #[must_use]
    pub fn message(&self) -> &'static str {
        "expected async validator to return a deferred value or a stream; \
         are you using a synchronous validator where an async validator is expected?"
    }

    /// The synchronous result that was returned.
    #[must_use]
    pub fn into_returned(self) -> Option<ValidationErrors> {
        self.returned
    }
}

impl fmt::Display for AsyncValidatorMisuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AsyncValidatorMisuse {}

/// Normalize an async validator's return value into a stream.
pub fn to_stream(outcome: AsyncValidation) -> Result<ValidationStream, AsyncValidatorMisuse> {
    match outcome {
        AsyncValidation::Deferred(deferred) => Ok(deferred.into()),
        AsyncValidation::Stream(stream) => Ok(stream),
        AsyncValidation::Immediate(returned) => Err(AsyncValidatorMisuse { returned }),
    }
}

type AsyncFn = dyn Fn(&ControlRef<'_>) -> AsyncValidation + Send + Sync;

/// A shareable async validator function. Identity is by allocation.
#[derive(Clone)]
pub struct AsyncValidatorFn(Arc<AsyncFn>);

impl AsyncValidatorFn {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ControlRef<'_>) -> AsyncValidation + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Start the validator.
    #[must_use]
    pub fn validate(&self, control: &ControlRef<'_>) -> AsyncValidation {
        (self.0)(control)
    }

    /// `true` if both handles share the same underlying function.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl PartialEq for AsyncValidatorFn {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for AsyncValidatorFn {}

impl fmt::Debug for AsyncValidatorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncValidatorFn({:p})", Arc::as_ptr(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Runs and their trace
// ---------------------------------------------------------------------------

/// Identifies one async validation run. Issued in increasing order per tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValidationToken(u64);

impl ValidationToken {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.0)
    }
}

/// One step in the life of an async run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationEvent {
    Started {
        token: ValidationToken,
        control: ControlId,
    },
    /// Superseded, disabled, or released before it settled.
    Cancelled {
        token: ValidationToken,
        control: ControlId,
    },
    /// The first emission was applied to the control.
    Resolved {
        token: ValidationToken,
        control: ControlId,
        is_valid: bool,
    },
    /// The source closed without emitting; the control stays pending.
    Exhausted {
        token: ValidationToken,
        control: ControlId,
    },
}

impl ValidationEvent {
    #[must_use]
    pub fn token(&self) -> ValidationToken {
        match self {
            Self::Started { token, .. }
            | Self::Cancelled { token, .. }
            | Self::Resolved { token, .. }
            | Self::Exhausted { token, .. } => *token,
        }
    }

    #[must_use]
    pub fn control(&self) -> ControlId {
        match self {
            Self::Started { control, .. }
            | Self::Cancelled { control, .. }
            | Self::Resolved { control, .. }
            | Self::Exhausted { control, .. } => *control,
        }
    }

    /// Lowercase name, as used in log messages.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Cancelled { .. } => "cancelled",
            Self::Resolved { .. } => "resolved",
            Self::Exhausted { .. } => "exhausted",
        }
    }

    fn fold_into(&self, hash: u64) -> u64 {
        let hash = fnv1a(hash, self.event_type().as_bytes());
        let hash = fnv1a(hash, &self.token().raw().to_le_bytes());
        let hash = fnv1a(hash, &(self.control().raw() as u64).to_le_bytes());
        match self {
            Self::Resolved { is_valid, .. } => fnv1a(hash, &[u8::from(*is_valid)]),
            _ => hash,
        }
    }
}

/// Append-only log of every async run in a tree.
#[derive(Debug, Clone, Default)]
pub struct ValidationTrace {
    events: Vec<ValidationEvent>,
}

impl ValidationTrace {
    #[must_use]
    pub fn events(&self) -> &[ValidationEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// FNV-1a over the event sequence. Identical histories hash identically
    /// across runs and builds.
    #[must_use]
    pub fn checksum(&self) -> u64 {
        self.events
            .iter()
            .fold(FNV_OFFSET_BASIS, |hash, event| event.fold_into(hash))
    }

    /// Describe every broken rule: start tokens must increase, and each run
    /// settles at most once, on the control it started on.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut last_started: Option<ValidationToken> = None;
        let mut started: BTreeMap<ValidationToken, ControlId> = BTreeMap::new();
        let mut settled: BTreeSet<ValidationToken> = BTreeSet::new();

        for event in &self.events {
            let token = event.token();
            if let ValidationEvent::Started { control, .. } = event {
                if let Some(last) = last_started
                    && token <= last
                {
                    violations.push(format!("{token} started after {last}"));
                }
                last_started = Some(token);
                started.insert(token, *control);
                continue;
            }
            match started.get(&token) {
                None => violations.push(format!(
                    "{} for {token} without a matching start",
                    event.event_type()
                )),
                Some(control) if *control != event.control() => violations.push(format!(
                    "{} for {token} on {} but it started on {control}",
                    event.event_type(),
                    event.control()
                )),
                Some(_) => {}
            }
            if !settled.insert(token) {
                violations.push(format!("{token} settled more than once"));
            }
        }

        violations
    }

    fn push(&mut self, event: ValidationEvent) {
        self.events.push(event);
    }
}

/// The cancellable handle of a control's running async validation.
#[derive(Debug)]
pub(crate) struct InFlightValidation {
    pub(crate) token: ValidationToken,
    pub(crate) stream: ValidationStream,
    pub(crate) emit_event: bool,
}

/// Issues tokens and records the trace for every async run in a tree.
#[derive(Debug)]
pub struct AsyncValidationCoordinator {
    next_token: u64,
    in_flight: HashMap<ControlId, ValidationToken>,
    trace: ValidationTrace,
}

impl Default for AsyncValidationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncValidationCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_token: 1,
            in_flight: HashMap::new(),
            trace: ValidationTrace::default(),
        }
    }

    /// Start a run for `control`, cancelling the one in flight for it.
    pub fn start(&mut self, control: ControlId) -> ValidationToken {
        self.cancel(control);
        let token = ValidationToken(self.next_token);
        self.next_token += 1;
        self.in_flight.insert(control, token);
        self.trace.push(ValidationEvent::Started { token, control });
        tracing::debug!(control = %control, token = token.raw(), "async validation started");
        token
    }

    /// Cancel the run in flight for `control`, if any.
    pub fn cancel(&mut self, control: ControlId) -> Option<ValidationToken> {
        let token = self.in_flight.remove(&control)?;
        self.trace.push(ValidationEvent::Cancelled { token, control });
        tracing::debug!(control = %control, token = token.raw(), "async validation cancelled");
        Some(token)
    }

    /// Record that `token` emitted. `false` means the token is stale and its
    /// result must be dropped.
    pub fn resolve(&mut self, control: ControlId, token: ValidationToken, is_valid: bool) -> bool {
        if !self.settle(control, token) {
            return false;
        }
        self.trace.push(ValidationEvent::Resolved {
            token,
            control,
            is_valid,
        });
        tracing::debug!(
            control = %control,
            token = token.raw(),
            is_valid,
            "async validation resolved"
        );
        true
    }

    /// Record that `token`'s source closed without emitting.
    pub fn exhaust(&mut self, control: ControlId, token: ValidationToken) -> bool {
        if !self.settle(control, token) {
            return false;
        }
        self.trace.push(ValidationEvent::Exhausted { token, control });
        tracing::debug!(control = %control, token = token.raw(), "async validation exhausted");
        true
    }

    fn settle(&mut self, control: ControlId, token: ValidationToken) -> bool {
        if self.in_flight.get(&control) != Some(&token) {
            return false;
        }
        self.in_flight.remove(&control);
        true
    }

    #[must_use]
    pub fn current_token(&self, control: ControlId) -> Option<ValidationToken> {
        self.in_flight.get(&control).copied()
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    #[must_use]
    pub fn trace(&self) -> &ValidationTrace {
        &self.trace
    }

    /// `Err` with every violation found in the trace.
    pub fn verify_trace(&self) -> Result<(), Vec<String>> {
        let violations = self.trace.verify_invariants();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
