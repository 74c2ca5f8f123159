#![forbid(unsafe_code)]

//! End-to-end tests for async validation.
//!
//! # Invariants
//!
//! 1. **Latest run wins**: starting a run cancels the previous one for the
//!    same control; a late result from a cancelled run is never applied.
//! 2. **First emission only**: a stream's later values are ignored.
//! 3. **Fan-in**: composed async validators settle only after all of them
//!    have, with later validators' keys overriding earlier ones.
//! 4. **Trace consistency**: every settle matches a start, tokens increase,
//!    and a token settles at most once.
//! 5. **E-mail lookups**: empty input never reaches the provider; a rejected
//!    address or a failed lookup both mark the control invalid.
//!
//! Run: `cargo test -p ftui-forms --test async_validation_e2e`

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use ftui_forms::validation::{
    AsyncValidation, AsyncValidatorFn, EmailReply, Resolver, StreamSink, ValidationEvent,
    async_email, compose_async, deferred, email_check, error, validation_stream,
};
use ftui_forms::{
    ControlId, ControlOptions, ControlStatus, ControlTree, EmitOptions, FormError, FormState,
    SetValueOptions, UpdateOptions,
};
use serde_json::{Value, json};

// ============================================================================
// Helpers
// ============================================================================

/// An async validator that hands out a fresh deferred value per run and
/// keeps the resolvers, oldest first.
fn deferred_validator() -> (AsyncValidatorFn, Arc<Mutex<Vec<Resolver>>>) {
    let resolvers = Arc::new(Mutex::new(Vec::new()));
    let shared = Arc::clone(&resolvers);
    let validator = AsyncValidatorFn::new(move |_| {
        let (resolver, pending) = deferred();
        shared.lock().unwrap().push(resolver);
        pending.into()
    });
    (validator, resolvers)
}

/// Same as [`deferred_validator`] but backed by push streams.
fn stream_validator() -> (AsyncValidatorFn, Arc<Mutex<Vec<StreamSink>>>) {
    let sinks = Arc::new(Mutex::new(Vec::new()));
    let shared = Arc::clone(&sinks);
    let validator = AsyncValidatorFn::new(move |_| {
        let (sink, stream) = validation_stream();
        shared.lock().unwrap().push(sink);
        stream.into()
    });
    (validator, sinks)
}

fn take_resolver(resolvers: &Arc<Mutex<Vec<Resolver>>>, index: usize) -> Resolver {
    resolvers.lock().unwrap().remove(index)
}

/// Provider lookups as `(address, validators, reply)`, oldest first.
type Lookups = Arc<Mutex<Vec<(String, Vec<String>, EmailReply)>>>;

fn email_validator() -> (AsyncValidatorFn, Lookups) {
    let lookups: Lookups = Arc::default();
    let shared = Arc::clone(&lookups);
    let validator = async_email(
        vec!["mx".into(), "disposable".into()],
        move |address: &str, validators: &[String]| {
            let (reply, check) = email_check();
            shared
                .lock()
                .unwrap()
                .push((address.to_owned(), validators.to_vec(), reply));
            check
        },
    );
    (validator, lookups)
}

fn take_reply(lookups: &Lookups) -> EmailReply {
    lookups.lock().unwrap().remove(0).2
}

fn async_leaf(tree: &mut ControlTree, value: Value, validator: AsyncValidatorFn) -> ControlId {
    tree.new_control(
        FormState::new(value),
        ControlOptions::default().async_validator(validator),
    )
    .unwrap()
}

// ============================================================================
// Deferred values
// ============================================================================

#[test]
fn deferred_result_is_applied_on_poll() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = async_leaf(&mut tree, json!("taken"), validator);
    let form = tree
        .new_group([("username", id)], ControlOptions::default())
        .unwrap();

    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Pending);
    assert!(tree.control(id).unwrap().has_own_pending_async_validator());
    assert_eq!(tree.control(form).unwrap().status(), ControlStatus::Pending);
    assert!(!tree.control(form).unwrap().has_own_pending_async_validator());
    assert_eq!(tree.poll_async_validations(), Ok(0));

    assert!(take_resolver(&resolvers, 0).resolve(Some(error("taken", json!(true)))));
    assert_eq!(tree.poll_async_validations(), Ok(1));

    let control = tree.control(id).unwrap();
    assert_eq!(control.status(), ControlStatus::Invalid);
    assert!(control.has_error("taken"));
    assert!(!control.has_own_pending_async_validator());
    assert_eq!(tree.control(form).unwrap().status(), ControlStatus::Invalid);
    assert!(!tree.coordinator().has_in_flight());
}

#[test]
fn settled_deferred_is_applied_synchronously() {
    let mut tree = ControlTree::new();
    let validator = AsyncValidatorFn::new(|control| {
        let errors = control
            .value()
            .as_str()
            .filter(|name| name.starts_with("admin"))
            .map(|_| error("reserved", json!(true)));
        ftui_forms::validation::Deferred::resolved(errors).into()
    });
    let id = async_leaf(&mut tree, json!("admin1"), validator);
    assert!(tree.control(id).unwrap().has_error("reserved"));

    tree.set_value(id, json!("ada"), SetValueOptions::default())
        .unwrap();
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);
}

#[test]
fn sync_errors_skip_async_validation() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = tree
        .new_control(
            FormState::new(json!("")),
            ControlOptions::default()
                .validator(ftui_forms::validation::required())
                .async_validator(validator),
        )
        .unwrap();
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Invalid);
    assert!(resolvers.lock().unwrap().is_empty());
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn late_result_from_cancelled_run_is_ignored() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = async_leaf(&mut tree, json!("a"), validator);

    // A second run supersedes the first.
    tree.set_value(id, json!("b"), SetValueOptions::default())
        .unwrap();
    assert_eq!(resolvers.lock().unwrap().len(), 2);

    let stale = take_resolver(&resolvers, 0);
    let current = take_resolver(&resolvers, 0);
    assert!(current.resolve(None));
    assert_eq!(tree.poll_async_validations(), Ok(1));
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);

    // The cancelled run's receiver is gone.
    assert!(!stale.resolve(Some(error("stale", json!(true)))));
    assert_eq!(tree.poll_async_validations(), Ok(0));
    assert!(tree.control(id).unwrap().errors().is_none());

    let trace = tree.validation_trace();
    let types: Vec<&str> = trace.events().iter().map(ValidationEvent::event_type).collect();
    assert_eq!(types, vec!["started", "cancelled", "started", "resolved"]);
    assert!(trace.verify_invariants().is_empty());
}

#[test]
fn disable_cancels_in_flight_run() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = async_leaf(&mut tree, json!("a"), validator);

    tree.disable(id, UpdateOptions::default()).unwrap();
    let control = tree.control(id).unwrap();
    assert_eq!(control.status(), ControlStatus::Disabled);
    assert!(!control.has_own_pending_async_validator());
    assert!(!tree.coordinator().has_in_flight());
    assert!(!take_resolver(&resolvers, 0).resolve(Some(error("x", json!(1)))));

    tree.enable(id, UpdateOptions::default()).unwrap();
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Pending);
    assert_eq!(resolvers.lock().unwrap().len(), 1);
}

#[test]
fn release_cancels_runs_in_subtree() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = async_leaf(&mut tree, json!("a"), validator);
    let form = tree.new_group([("a", id)], ControlOptions::default()).unwrap();
    assert_eq!(tree.release(form), Ok(2));
    assert_eq!(tree.coordinator().in_flight_count(), 0);
    assert!(!take_resolver(&resolvers, 0).resolve(None));
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn only_first_stream_emission_counts() {
    let mut tree = ControlTree::new();
    let (validator, sinks) = stream_validator();
    let id = async_leaf(&mut tree, json!("a"), validator);

    let sink = sinks.lock().unwrap().remove(0);
    assert!(sink.emit(None));
    assert_eq!(tree.poll_async_validations(), Ok(1));
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);

    // The run is over; the stream was dropped with it.
    assert!(!sink.emit(Some(error("late", json!(true)))));
    assert!(tree.control(id).unwrap().errors().is_none());
}

#[test]
fn stream_closing_without_value_leaves_control_pending() {
    let mut tree = ControlTree::new();
    let (validator, sinks) = stream_validator();
    let id = async_leaf(&mut tree, json!("a"), validator);

    drop(sinks.lock().unwrap().remove(0));
    assert_eq!(tree.poll_async_validations(), Ok(0));
    let control = tree.control(id).unwrap();
    assert_eq!(control.status(), ControlStatus::Pending);
    assert!(control.has_own_pending_async_validator());
    assert!(
        tree.validation_trace()
            .events()
            .iter()
            .any(|event| event.event_type() == "exhausted")
    );

    // Manual errors still decide validity.
    tree.set_errors(id, Some(error("manual", json!(true))), EmitOptions::default())
        .unwrap();
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Invalid);
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn composed_async_validators_wait_for_all() {
    let mut tree = ControlTree::new();
    let (first, first_resolvers) = deferred_validator();
    let (second, second_resolvers) = deferred_validator();
    let composed = compose_async([first, second]).unwrap();
    let id = async_leaf(&mut tree, json!("x"), composed);

    assert!(take_resolver(&second_resolvers, 0).resolve(Some(error("shared", json!("second")))));
    assert_eq!(tree.poll_async_validations(), Ok(0));
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Pending);

    assert!(
        take_resolver(&first_resolvers, 0).resolve(Some(
            json!({"shared": "first", "only_first": true})
                .as_object()
                .cloned()
                .unwrap()
        ))
    );
    assert_eq!(tree.poll_async_validations(), Ok(1));
    assert_eq!(
        tree.control(id).unwrap().errors(),
        json!({"shared": "second", "only_first": true}).as_object()
    );
}

#[test]
fn separate_async_validators_are_composed() {
    let mut tree = ControlTree::new();
    let (first, first_resolvers) = deferred_validator();
    let (second, second_resolvers) = deferred_validator();
    let id = tree
        .new_control(
            FormState::new(json!("x")),
            ControlOptions::default().async_validators(vec![first.clone(), second]),
        )
        .unwrap();
    assert!(tree.control(id).unwrap().has_async_validator(&first));

    assert!(take_resolver(&first_resolvers, 0).resolve(None));
    assert!(take_resolver(&second_resolvers, 0).resolve(None));
    assert_eq!(tree.poll_async_validations(), Ok(1));
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);
}

// ============================================================================
// Misuse
// ============================================================================

#[test]
fn synchronous_result_is_rejected() {
    let mut tree = ControlTree::new();
    let validator = AsyncValidatorFn::new(|_| AsyncValidation::Immediate(None));
    let result = tree.new_control(
        FormState::new(json!("x")),
        ControlOptions::default().async_validator(validator),
    );
    match result {
        Err(FormError::AsyncValidatorMisuse { message, .. }) => assert_eq!(
            message,
            "expected async validator to return a deferred value or a stream; \
             are you using a synchronous validator where an async validator is expected?"
        ),
        other => panic!("expected misuse error, got {other:?}"),
    }
}

#[test]
fn misuse_inside_composition_is_reported() {
    let mut tree = ControlTree::new();
    let (good, _resolvers) = deferred_validator();
    let bad = AsyncValidatorFn::new(|_| AsyncValidation::Immediate(None));
    let leaf = tree
        .new_control(FormState::new(json!("x")), ControlOptions::default())
        .unwrap();
    tree.set_async_validators(leaf, vec![good, bad]).unwrap();
    assert!(matches!(
        tree.update_value_and_validity(leaf, UpdateOptions::default()),
        Err(FormError::AsyncValidatorMisuse { id, .. }) if id == leaf
    ));
}

// ============================================================================
// Notifications and determinism
// ============================================================================

#[test]
fn status_stream_reports_pending_then_result() {
    let mut tree = ControlTree::new();
    let (validator, resolvers) = deferred_validator();
    let id = tree
        .new_control(FormState::new(json!("x")), ControlOptions::default())
        .unwrap();
    let statuses = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&statuses);
    tree.subscribe_status_changes(id, move |status| sink.borrow_mut().push(status))
        .unwrap();

    tree.set_async_validators(id, vec![validator]).unwrap();
    tree.update_value_and_validity(id, UpdateOptions::default())
        .unwrap();
    take_resolver(&resolvers, 0).resolve(None);
    tree.poll_async_validations().unwrap();

    assert_eq!(
        *statuses.borrow(),
        vec![ControlStatus::Pending, ControlStatus::Valid]
    );
}

#[test]
fn identical_sessions_produce_identical_traces() {
    fn session() -> u64 {
        let mut tree = ControlTree::new();
        let (validator, resolvers) = deferred_validator();
        let id = async_leaf(&mut tree, json!(0), validator);
        for i in 1..5 {
            tree.set_value(id, json!(i), SetValueOptions::default())
                .unwrap();
        }
        let last = resolvers.lock().unwrap().pop().unwrap();
        last.resolve(None);
        tree.poll_async_validations().unwrap();
        assert!(tree.coordinator().verify_trace().is_ok());
        tree.validation_trace().checksum()
    }
    assert_eq!(session(), session());
}

// ============================================================================
// E-mail provider
// ============================================================================

#[test]
fn empty_address_skips_the_provider() {
    let mut tree = ControlTree::new();
    let (validator, lookups) = email_validator();
    let id = async_leaf(&mut tree, json!(""), validator);

    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);
    assert!(lookups.lock().unwrap().is_empty());
    assert!(!tree.coordinator().has_in_flight());
}

#[test]
fn provider_verdicts_settle_the_control() {
    let mut tree = ControlTree::new();
    let (validator, lookups) = email_validator();
    let id = async_leaf(&mut tree, json!("ada@example.com"), validator);
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Pending);
    {
        let pending = lookups.lock().unwrap();
        assert_eq!(pending[0].0, "ada@example.com");
        assert_eq!(pending[0].1, vec!["mx".to_string(), "disposable".to_string()]);
    }

    assert!(take_reply(&lookups).valid());
    assert_eq!(tree.poll_async_validations(), Ok(1));
    assert_eq!(tree.control(id).unwrap().status(), ControlStatus::Valid);

    tree.set_value(id, json!("ada@mailinator.test"), SetValueOptions::default())
        .unwrap();
    assert!(take_reply(&lookups).invalid());
    assert_eq!(tree.poll_async_validations(), Ok(1));
    let control = tree.control(id).unwrap();
    assert_eq!(control.status(), ControlStatus::Invalid);
    assert_eq!(control.get_error("asyncValidateMail"), Some(&json!(true)));
}

#[test]
fn provider_failure_marks_the_address_invalid() {
    let mut tree = ControlTree::new();
    let (validator, lookups) = email_validator();
    let id = async_leaf(&mut tree, json!("ada@example.com"), validator);

    assert!(take_reply(&lookups).fail("lookup timed out"));
    assert_eq!(tree.poll_async_validations(), Ok(1));
    let control = tree.control(id).unwrap();
    assert_eq!(control.status(), ControlStatus::Invalid);
    assert!(control.has_error("asyncValidateMail"));
}

#[test]
fn newer_lookup_supersedes_an_older_one() {
    let mut tree = ControlTree::new();
    let (validator, lookups) = email_validator();
    let first = async_leaf(&mut tree, json!("a@example.com"), validator.clone());
    let second = async_leaf(&mut tree, json!("b@example.com"), validator);

    let stale = take_reply(&lookups);
    let current = take_reply(&lookups);
    stale.invalid();
    current.valid();
    tree.poll_async_validations().unwrap();

    assert_eq!(tree.control(first).unwrap().status(), ControlStatus::Pending);
    assert!(!tree.control(first).unwrap().has_error("asyncValidateMail"));
    assert_eq!(tree.control(second).unwrap().status(), ControlStatus::Valid);
    assert!(
        tree.validation_trace()
            .events()
            .iter()
            .any(|event| event.control() == first && event.event_type() == "exhausted")
    );
}
