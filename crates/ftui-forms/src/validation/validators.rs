#![forbid(unsafe_code)]

//! Validator functions and the built-in validators.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::control::{ControlPath, ControlRef};
use crate::error::FormError;
use crate::value::{as_js_string, has_valid_length, is_empty_input_value, parse_float, value_length};

// ---------------------------------------------------------------------------
// Error Codes
// ---------------------------------------------------------------------------

/// Error code reported by [`Required`] and [`RequiredTrue`].
pub const ERROR_CODE_REQUIRED: &str = "required";
/// Error code reported by [`MinLength`].
pub const ERROR_CODE_MIN_LENGTH: &str = "minlength";
/// Error code reported by [`MaxLength`].
pub const ERROR_CODE_MAX_LENGTH: &str = "maxlength";
/// Error code reported by [`Min`].
pub const ERROR_CODE_MIN: &str = "min";
/// Error code reported by [`Max`].
pub const ERROR_CODE_MAX: &str = "max";
/// Error code reported by [`Pattern`].
pub const ERROR_CODE_PATTERN: &str = "pattern";
/// Error code reported by [`Email`].
pub const ERROR_CODE_EMAIL: &str = "email";
/// Error code reported by [`Equality`].
pub const ERROR_CODE_EQUALITY: &str = "equality";

/// Mapping from error code to error detail.
///
/// A control without errors stores `None`, never an empty map.
pub type ValidationErrors = Map<String, Value>;

/// Build a single-entry error map.
#[must_use]
pub fn error(code: impl Into<String>, detail: Value) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.insert(code.into(), detail);
    errors
}

// ---------------------------------------------------------------------------
// Validator Trait
// ---------------------------------------------------------------------------

/// An object-style synchronous validator.
///
/// Implementors inspect the control (usually just its value) and return the
/// errors they found, or `None` when the control passes.
///
/// ```rust
/// use ftui_forms::{ControlRef, Validator, ValidatorFn, ValidationErrors};
/// use serde_json::json;
///
/// struct NoSpaces;
///
/// impl Validator for NoSpaces {
///     fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
///         let text = control.value().as_str()?;
///         text.contains(' ')
///             .then(|| ftui_forms::validation::error("no_spaces", json!(true)))
///     }
/// }
///
/// let validator = ValidatorFn::from_validator(NoSpaces);
/// # let _ = validator;
/// ```
pub trait Validator: Send + Sync {
    /// Validate the given control.
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors>;
}

type SyncValidatorFn = dyn Fn(&ControlRef<'_>) -> Option<ValidationErrors> + Send + Sync;

/// A shareable synchronous validator function.
///
/// Identity is by allocation: two `ValidatorFn`s are equal only when one was
/// cloned from the other. Presence checks and removal rely on this. The
/// parameterless built-ins are shared handles; parameterized ones such as
/// [`min_length`] allocate per call, so keep the handle you attached.
#[derive(Clone)]
pub struct ValidatorFn(Arc<SyncValidatorFn>);

impl ValidatorFn {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ControlRef<'_>) -> Option<ValidationErrors> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Normalize an object-style validator into a function.
    pub fn from_validator<V: Validator + 'static>(validator: V) -> Self {
        Self::new(move |control| validator.validate(control))
    }

    /// Run the validator.
    #[must_use]
    pub fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        (self.0)(control)
    }

    /// `true` if both handles share the same underlying function.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl PartialEq for ValidatorFn {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for ValidatorFn {}

impl fmt::Debug for ValidatorFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorFn({:p})", Arc::as_ptr(&self.0))
    }
}

impl<V: Validator + 'static> From<V> for ValidatorFn {
    fn from(validator: V) -> Self {
        Self::from_validator(validator)
    }
}

// ---------------------------------------------------------------------------
// Built-in Validators
// ---------------------------------------------------------------------------

/// Fails on `null`, `""` and `[]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Required;

impl Validator for Required {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        is_empty_input_value(control.value()).then(|| error(ERROR_CODE_REQUIRED, json!(true)))
    }
}

/// Fails unless the value is exactly `true`. Used for consent checkboxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredTrue;

impl Validator for RequiredTrue {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        (control.value() != &Value::Bool(true)).then(|| error(ERROR_CODE_REQUIRED, json!(true)))
    }
}

/// Fails when a string or array is shorter than `min`.
#[derive(Debug, Clone, Copy)]
pub struct MinLength {
    /// Minimum length, in characters or items.
    pub min: usize,
}

impl MinLength {
    /// Create a new `MinLength` validator.
    #[must_use]
    pub fn new(min: usize) -> Self {
        Self { min }
    }
}

impl Validator for MinLength {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if is_empty_input_value(value) {
            return None;
        }
        let len = value_length(value)?;
        (len < self.min).then(|| {
            error(
                ERROR_CODE_MIN_LENGTH,
                json!({ "requiredLength": self.min, "actualLength": len }),
            )
        })
    }
}

/// Fails when a string or array is longer than `max`.
#[derive(Debug, Clone, Copy)]
pub struct MaxLength {
    /// Maximum length, in characters or items.
    pub max: usize,
}

impl MaxLength {
    /// Create a new `MaxLength` validator.
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl Validator for MaxLength {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if !has_valid_length(value) {
            return None;
        }
        let len = value_length(value)?;
        (len > self.max).then(|| {
            error(
                ERROR_CODE_MAX_LENGTH,
                json!({ "requiredLength": self.max, "actualLength": len }),
            )
        })
    }
}

/// Fails when the numeric value is below `min`.
///
/// Values that do not parse as numbers are treated as having no minimum.
#[derive(Debug, Clone, Copy)]
pub struct Min {
    /// Inclusive lower bound.
    pub min: f64,
}

impl Min {
    /// Create a new `Min` validator.
    #[must_use]
    pub fn new(min: f64) -> Self {
        Self { min }
    }
}

impl Validator for Min {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if is_empty_input_value(value) || self.min.is_nan() {
            return None;
        }
        let number = parse_float(value)?;
        (number < self.min)
            .then(|| error(ERROR_CODE_MIN, json!({ "min": self.min, "actual": value })))
    }
}

/// Fails when the numeric value is above `max`.
#[derive(Debug, Clone, Copy)]
pub struct Max {
    /// Inclusive upper bound.
    pub max: f64,
}

impl Max {
    /// Create a new `Max` validator.
    #[must_use]
    pub fn new(max: f64) -> Self {
        Self { max }
    }
}

impl Validator for Max {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if is_empty_input_value(value) || self.max.is_nan() {
            return None;
        }
        let number = parse_float(value)?;
        (number > self.max)
            .then(|| error(ERROR_CODE_MAX, json!({ "max": self.max, "actual": value })))
    }
}

/// Fails when the value does not match a regular expression.
///
/// String patterns are anchored (`^…$`) unless they already are; a compiled
/// [`Regex`] is used as given, so it matches anywhere unless it anchors itself.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    source: String,
}

impl Pattern {
    /// Compile an anchored pattern from a string.
    pub fn new(pattern: &str) -> Result<Self, FormError> {
        let mut source = String::with_capacity(pattern.len() + 2);
        if !pattern.starts_with('^') {
            source.push('^');
        }
        source.push_str(pattern);
        if !pattern.ends_with('$') {
            source.push('$');
        }
        let regex = Regex::new(&source).map_err(|e| FormError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { regex, source })
    }

    /// Use a compiled expression as-is.
    #[must_use]
    pub fn from_regex(regex: Regex) -> Self {
        let source = regex.as_str().to_string();
        Self { regex, source }
    }

    /// The expression reported as `requiredPattern`.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Validator for Pattern {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if is_empty_input_value(value) {
            return None;
        }
        if self.regex.is_match(&as_js_string(value)) {
            return None;
        }
        Some(error(
            ERROR_CODE_PATTERN,
            json!({ "requiredPattern": self.source, "actualValue": value }),
        ))
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\\|!"£$%&/()='?^€*\[\]°#§<>,;:\s]+@[a-z0-9.-]+\.[a-z]{2,4}$"#)
        .expect("email expression is a valid literal")
});

/// Fails on values that do not look like an e-mail address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Email;

impl Validator for Email {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let value = control.value();
        if is_empty_input_value(value) {
            return None;
        }
        (!EMAIL_RE.is_match(&as_js_string(value))).then(|| error(ERROR_CODE_EMAIL, json!(true)))
    }
}

/// Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullValidator;

impl Validator for NullValidator {
    fn validate(&self, _control: &ControlRef<'_>) -> Option<ValidationErrors> {
        None
    }
}

/// Group-level validator: fails when the named children hold different values.
///
/// Every key is compared against the first. With fewer than two keys the
/// validator never fails.
#[derive(Debug, Clone)]
pub struct Equality {
    keys: Vec<String>,
}

impl Equality {
    /// Compare the children at `keys` (dot paths are allowed).
    ///
    /// At least two keys are required.
    pub fn new<I, K>(keys: I) -> Result<Self, FormError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.len() < 2 {
            return Err(FormError::TooFewEqualityKeys { count: keys.len() });
        }
        Ok(Self { keys })
    }
}

impl Validator for Equality {
    fn validate(&self, control: &ControlRef<'_>) -> Option<ValidationErrors> {
        let (first, rest) = self.keys.split_first()?;
        let lookup = |key: &str| {
            control
                .get(ControlPath::from(key))
                .map(|child| child.value().clone())
        };
        let expected = lookup(first);
        rest.iter()
            .any(|key| lookup(key) != expected)
            .then(|| error(ERROR_CODE_EQUALITY, json!(true)))
    }
}

// ---------------------------------------------------------------------------
// Factory functions
// ---------------------------------------------------------------------------

/// [`Required`] as a validator function.
///
/// Every call returns the same shared handle, so it can be passed to
/// `has_validator` or `remove_validators` later.
#[must_use]
pub fn required() -> ValidatorFn {
    static REQUIRED: LazyLock<ValidatorFn> =
        LazyLock::new(|| ValidatorFn::from_validator(Required));
    REQUIRED.clone()
}

/// [`RequiredTrue`] as a validator function.
///
/// Every call returns the same shared handle, so it can be passed to
/// `has_validator` or `remove_validators` later.
#[must_use]
pub fn required_true() -> ValidatorFn {
    static REQUIRED_TRUE: LazyLock<ValidatorFn> =
        LazyLock::new(|| ValidatorFn::from_validator(RequiredTrue));
    REQUIRED_TRUE.clone()
}

/// [`MinLength`] as a validator function.
#[must_use]
pub fn min_length(min: usize) -> ValidatorFn {
    ValidatorFn::from_validator(MinLength::new(min))
}

/// [`MaxLength`] as a validator function.
#[must_use]
pub fn max_length(max: usize) -> ValidatorFn {
    ValidatorFn::from_validator(MaxLength::new(max))
}

/// [`Min`] as a validator function.
#[must_use]
pub fn min(min: f64) -> ValidatorFn {
    ValidatorFn::from_validator(Min::new(min))
}

/// [`Max`] as a validator function.
#[must_use]
pub fn max(max: f64) -> ValidatorFn {
    ValidatorFn::from_validator(Max::new(max))
}

/// [`Pattern`] as a validator function. An empty pattern never fails.
pub fn pattern(pattern: &str) -> Result<ValidatorFn, FormError> {
    if pattern.is_empty() {
        return Ok(null_validator());
    }
    Ok(ValidatorFn::from_validator(Pattern::new(pattern)?))
}

/// [`Email`] as a validator function.
///
/// Every call returns the same shared handle, so it can be passed to
/// `has_validator` or `remove_validators` later.
#[must_use]
pub fn email() -> ValidatorFn {
    static EMAIL: LazyLock<ValidatorFn> =
        LazyLock::new(|| ValidatorFn::from_validator(Email));
    EMAIL.clone()
}

/// [`NullValidator`] as a validator function.
///
/// Every call returns the same shared handle, so it can be passed to
/// `has_validator` or `remove_validators` later.
#[must_use]
pub fn null_validator() -> ValidatorFn {
    static NULL_VALIDATOR: LazyLock<ValidatorFn> =
        LazyLock::new(|| ValidatorFn::from_validator(NullValidator));
    NULL_VALIDATOR.clone()
}

/// [`Equality`] as a validator function.
pub fn equality<I, K>(keys: I) -> Result<ValidatorFn, FormError>
where
    I: IntoIterator<Item = K>,
    K: Into<String>,
{
    Ok(ValidatorFn::from_validator(Equality::new(keys)?))
}

// ---------------------------------------------------------------------------
// ValidatorBuilder
// ---------------------------------------------------------------------------

/// Collects validators fluently, in the order they should run.
///
/// ```rust
/// use ftui_forms::validation::ValidatorBuilder;
///
/// let validators = ValidatorBuilder::new().required().min_length(3).build();
/// assert_eq!(validators.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidatorBuilder {
    validators: Vec<ValidatorFn>,
}

impl ValidatorBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add any validator function.
    #[must_use]
    pub fn custom(mut self, validator: impl Into<ValidatorFn>) -> Self {
        self.validators.push(validator.into());
        self
    }

    /// Add [`Required`].
    #[must_use]
    pub fn required(self) -> Self {
        self.custom(required())
    }

    /// Add [`MinLength`].
    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.custom(min_length(min))
    }

    /// Add [`MaxLength`].
    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.custom(max_length(max))
    }

    /// Add [`Min`].
    #[must_use]
    pub fn min(self, bound: f64) -> Self {
        self.custom(min(bound))
    }

    /// Add [`Max`].
    #[must_use]
    pub fn max(self, bound: f64) -> Self {
        self.custom(max(bound))
    }

    /// Add [`Email`].
    #[must_use]
    pub fn email(self) -> Self {
        self.custom(email())
    }

    /// Add [`Pattern`], failing if it does not compile.
    pub fn pattern(self, expr: &str) -> Result<Self, FormError> {
        Ok(self.custom(pattern(expr)?))
    }

    /// The collected validators.
    #[must_use]
    pub fn build(self) -> Vec<ValidatorFn> {
        self.validators
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlOptions, ControlTree, FormState, SetValueOptions};
    use crate::error::FormError;

    fn check(validator: &ValidatorFn, value: Value) -> Option<ValidationErrors> {
        let mut tree = ControlTree::new();
        let id = tree
            .new_control(FormState::from(value), ControlOptions::default())
            .unwrap();
        validator.validate(&tree.control(id).unwrap())
    }

    // -- Required --

    #[test]
    fn required_rejects_empty_inputs() {
        let v = required();
        assert_eq!(check(&v, json!("")), Some(error("required", json!(true))));
        assert!(check(&v, Value::Null).is_some());
        assert!(check(&v, json!([])).is_some());
    }

    #[test]
    fn required_accepts_falsy_non_empty_values() {
        let v = required();
        assert!(check(&v, json!("x")).is_none());
        assert!(check(&v, json!(0)).is_none());
        assert!(check(&v, json!(false)).is_none());
        assert!(check(&v, json!(" ")).is_none());
    }

    #[test]
    fn required_true_only_accepts_true() {
        let v = required_true();
        assert!(check(&v, json!(true)).is_none());
        assert!(check(&v, json!(false)).is_some());
        assert!(check(&v, json!("true")).is_some());
    }

    // -- Length --

    #[test]
    fn min_length_boundary_and_details() {
        let v = min_length(3);
        assert!(check(&v, json!("abc")).is_none());
        assert_eq!(
            check(&v, json!("ab")),
            Some(error(
                "minlength",
                json!({"requiredLength": 3, "actualLength": 2})
            ))
        );
    }

    #[test]
    fn min_length_skips_empty_and_lengthless_values() {
        let v = min_length(3);
        assert!(check(&v, json!("")).is_none());
        assert!(check(&v, json!(12)).is_none());
    }

    #[test]
    fn min_length_counts_characters() {
        let v = min_length(4);
        assert!(check(&v, json!("café")).is_none());
        assert!(check(&v, json!("caf")).is_some());
    }

    #[test]
    fn max_length_applies_to_arrays() {
        let v = max_length(2);
        assert!(check(&v, json!([1, 2])).is_none());
        assert_eq!(
            check(&v, json!([1, 2, 3])),
            Some(error(
                "maxlength",
                json!({"requiredLength": 2, "actualLength": 3})
            ))
        );
    }

    // -- Numeric --

    #[test]
    fn min_and_max_parse_strings() {
        assert!(check(&min(5.0), json!("4")).is_some());
        assert!(check(&min(5.0), json!("5")).is_none());
        assert!(check(&max(5.0), json!(6)).is_some());
        assert!(check(&max(5.0), json!("5.0")).is_none());
    }

    #[test]
    fn min_ignores_non_numeric_values() {
        assert!(check(&min(5.0), json!("abc")).is_none());
        assert!(check(&min(5.0), Value::Null).is_none());
    }

    #[test]
    fn max_reports_bound_and_actual() {
        let errors = check(&max(10.0), json!(11)).unwrap();
        assert_eq!(errors["max"]["max"], json!(10.0));
        assert_eq!(errors["max"]["actual"], json!(11));
    }

    // -- Pattern --

    #[test]
    fn pattern_strings_are_anchored() {
        let v = pattern("[a-z]+").unwrap();
        assert!(check(&v, json!("abc")).is_none());
        let errors = check(&v, json!("abc1")).unwrap();
        assert_eq!(errors["pattern"]["requiredPattern"], json!("^[a-z]+$"));
        assert_eq!(errors["pattern"]["actualValue"], json!("abc1"));
    }

    #[test]
    fn pattern_from_regex_is_not_anchored() {
        let v = ValidatorFn::from_validator(Pattern::from_regex(Regex::new("[0-9]").unwrap()));
        assert!(check(&v, json!("a1b")).is_none());
        assert!(check(&v, json!("ab")).is_some());
    }

    #[test]
    fn pattern_matches_numbers_as_text() {
        let v = pattern("[0-9]{3}").unwrap();
        assert!(check(&v, json!(123)).is_none());
    }

    #[test]
    fn empty_pattern_is_null_validator() {
        let v = pattern("").unwrap();
        assert!(check(&v, json!("anything")).is_none());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = pattern("(").unwrap_err();
        assert!(matches!(err, FormError::InvalidPattern { .. }));
    }

    // -- Email --

    #[test]
    fn email_accepts_common_addresses() {
        let v = email();
        assert!(check(&v, json!("foo@bar.it")).is_none());
        assert!(check(&v, json!("user.name+tag@example.com")).is_none());
    }

    #[test]
    fn email_rejects_malformed_addresses() {
        let v = email();
        assert!(check(&v, json!("not-an-email")).is_some());
        assert!(check(&v, json!("user@example")).is_some());
        assert!(check(&v, json!("us er@example.com")).is_some());
        assert!(check(&v, json!("user@EXAMPLE.COM")).is_some());
    }

    #[test]
    fn email_skips_empty() {
        assert!(check(&email(), json!("")).is_none());
    }

    // -- Identity --

    #[test]
    fn parameterless_builtins_share_one_handle() {
        assert_eq!(required(), required());
        assert_eq!(required_true(), required_true());
        assert_eq!(email(), email());
        assert_eq!(null_validator(), null_validator());
        assert_eq!(pattern("").unwrap(), null_validator());
        assert_ne!(required(), required_true());
    }

    #[test]
    fn parameterized_builtins_allocate_per_call() {
        let a = min_length(3);
        assert_eq!(a, a.clone());
        assert_ne!(a, min_length(3));
    }

    #[test]
    fn attached_required_is_found_by_a_fresh_handle() {
        let mut tree = ControlTree::new();
        let id = tree
            .new_control(
                FormState::from(json!("x")),
                ControlOptions::default().validator(required()),
            )
            .unwrap();
        assert!(tree.control(id).unwrap().has_validator(&required()));
        assert!(!tree.control(id).unwrap().has_validator(&email()));
        tree.remove_validators(id, &[required()]).unwrap();
        assert!(!tree.control(id).unwrap().has_validator(&required()));
    }

    #[test]
    fn equality_compares_named_children() {
        let mut tree = ControlTree::new();
        let a = tree
            .new_control(FormState::from(json!("x")), ControlOptions::default())
            .unwrap();
        let b = tree
            .new_control(FormState::from(json!("y")), ControlOptions::default())
            .unwrap();
        let form = tree
            .new_group(
                [("a", a), ("b", b)],
                ControlOptions::default().validator(equality(["a", "b"]).unwrap()),
            )
            .unwrap();
        assert_eq!(
            tree.control(form).unwrap().errors(),
            Some(&error(ERROR_CODE_EQUALITY, json!(true)))
        );
        tree.set_value(b, json!("x"), SetValueOptions::default())
            .unwrap();
        assert!(tree.control(form).unwrap().errors().is_none());
    }

    #[test]
    fn equality_needs_two_keys() {
        assert_eq!(
            equality(["only"]).unwrap_err(),
            FormError::TooFewEqualityKeys { count: 1 }
        );
        assert_eq!(
            equality(Vec::<String>::new()).unwrap_err().to_string(),
            "equality needs at least two keys, got 0"
        );
    }

    #[test]
    fn builder_preserves_order() {
        let first = required();
        let validators = ValidatorBuilder::new()
            .custom(first.clone())
            .min_length(2)
            .email()
            .build();
        assert_eq!(validators.len(), 3);
        assert_eq!(validators[0], first);
    }

    #[test]
    fn builder_surfaces_pattern_errors() {
        assert!(ValidatorBuilder::new().pattern("[").is_err());
    }
}
