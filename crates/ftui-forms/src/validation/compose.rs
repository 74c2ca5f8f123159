#![forbid(unsafe_code)]

//! Validator composition: merging, list maintenance and fan-in of async results.

use super::async_validation::{AsyncValidation, AsyncValidatorFn, ValidationStream, to_stream};
use super::validators::{ValidationErrors, ValidatorFn};

/// Merge error maps in order. Later maps override earlier ones on key
/// collision; `None` entries are skipped. Returns `None` when nothing remains.
#[must_use]
pub fn merge_errors<I>(all: I) -> Option<ValidationErrors>
where
    I: IntoIterator<Item = Option<ValidationErrors>>,
{
    let mut merged = ValidationErrors::new();
    for errors in all.into_iter().flatten() {
        for (code, detail) in errors {
            merged.insert(code, detail);
        }
    }
    (!merged.is_empty()).then_some(merged)
}

/// Combine validators into one that runs them all and merges their errors.
///
/// Absent entries are dropped. Returns `None` when no validator remains.
#[must_use]
pub fn compose<I, V>(validators: I) -> Option<ValidatorFn>
where
    I: IntoIterator<Item = V>,
    V: Into<Option<ValidatorFn>>,
{
    let present: Vec<ValidatorFn> = validators.into_iter().filter_map(Into::into).collect();
    if present.is_empty() {
        return None;
    }
    Some(ValidatorFn::new(move |control| {
        merge_errors(present.iter().map(|validator| validator.validate(control)))
    }))
}

/// Combine async validators into one that starts them all at once and emits
/// the merged errors after every one of them has settled.
///
/// If any validator returns something other than a deferred value or a
/// stream, the combined validator hands that result back unchanged so the
/// caller reports the misuse.
#[must_use]
pub fn compose_async<I, V>(validators: I) -> Option<AsyncValidatorFn>
where
    I: IntoIterator<Item = V>,
    V: Into<Option<AsyncValidatorFn>>,
{
    let present: Vec<AsyncValidatorFn> = validators.into_iter().filter_map(Into::into).collect();
    if present.is_empty() {
        return None;
    }
    Some(AsyncValidatorFn::new(move |control| {
        let mut streams = Vec::with_capacity(present.len());
        for validator in &present {
            match to_stream(validator.validate(control)) {
                Ok(stream) => streams.push(stream),
                Err(misuse) => return AsyncValidation::Immediate(misuse.into_returned()),
            }
        }
        AsyncValidation::Stream(ValidationStream::join(streams))
    }))
}

/// A single composed validator for a raw list: `None` when empty, the sole
/// entry when there is one, otherwise [`compose`].
#[must_use]
pub fn coerce_to_validator(validators: &[ValidatorFn]) -> Option<ValidatorFn> {
    match validators {
        [] => None,
        [only] => Some(only.clone()),
        many => compose(many.iter().cloned()),
    }
}

/// Async counterpart of [`coerce_to_validator`].
#[must_use]
pub fn coerce_to_async_validator(validators: &[AsyncValidatorFn]) -> Option<AsyncValidatorFn> {
    match validators {
        [] => None,
        [only] => Some(only.clone()),
        many => compose_async(many.iter().cloned()),
    }
}

/// `true` if `validator` is in `validators` (by identity).
#[must_use]
pub fn has_validator<T: PartialEq>(validators: &[T], validator: &T) -> bool {
    validators.contains(validator)
}

/// Append the validators not already present, keeping the first of any duplicates.
#[must_use]
pub fn add_validators<T: PartialEq + Clone>(current: &[T], to_add: &[T]) -> Vec<T> {
    let mut result = current.to_vec();
    for validator in to_add {
        if !has_validator(&result, validator) {
            result.push(validator.clone());
        }
    }
    result
}

/// Drop every validator that appears in `to_remove`.
#[must_use]
pub fn remove_validators<T: PartialEq + Clone>(current: &[T], to_remove: &[T]) -> Vec<T> {
    current
        .iter()
        .filter(|validator| !has_validator(to_remove, validator))
        .cloned()
        .collect()
}
