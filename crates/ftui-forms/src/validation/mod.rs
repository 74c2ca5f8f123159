#![forbid(unsafe_code)]

//! Validators, their composition, and async validation.

pub mod async_email;
pub mod async_validation;
pub mod compose;
pub mod validators;

pub use async_email::{
    ERROR_CODE_ASYNC_EMAIL, EmailCheck, EmailReply, EmailValidationProvider, EmailVerdict,
    async_email, email_check,
};
pub use async_validation::{
    AsyncValidation, AsyncValidationCoordinator, AsyncValidatorFn, AsyncValidatorMisuse, Deferred,
    Resolver, StreamPoll, StreamSink, ValidationEvent, ValidationStream, ValidationToken,
    ValidationTrace, deferred, to_stream, validation_stream,
};
pub use compose::{
    add_validators, coerce_to_async_validator, coerce_to_validator, compose, compose_async,
    has_validator, merge_errors, remove_validators,
};
pub use validators::{
    ERROR_CODE_EMAIL, ERROR_CODE_EQUALITY, ERROR_CODE_MAX, ERROR_CODE_MAX_LENGTH, ERROR_CODE_MIN,
    ERROR_CODE_MIN_LENGTH, ERROR_CODE_PATTERN, ERROR_CODE_REQUIRED, Email, Equality, Max,
    MaxLength, Min, MinLength, NullValidator, Pattern, Required, RequiredTrue, ValidationErrors,
    Validator, ValidatorBuilder, ValidatorFn, email, equality, error, max, max_length, min,
    min_length, null_validator, pattern, required, required_true,
};
