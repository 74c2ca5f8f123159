#![forbid(unsafe_code)]

//! E-mail addresses checked by an external provider.
//!
//! [`async_email`] wraps an [`EmailValidationProvider`] into an async
//! validator. Empty input is not checked. Each call supersedes the previous
//! one made through the same validator: the older run closes without a
//! result, so only the newest lookup can settle a control. A provider that
//! rejects the address, or fails, produces `{"asyncValidateMail": true}`.
//!
//! ```rust
//! use ftui_forms::validation::{EmailCheck, EmailVerdict, async_email};
//! use ftui_forms::{ControlOptions, ControlTree, FormState};
//! use serde_json::json;
//!
//! let validator = async_email(vec!["mx".into()], |address: &str, _: &[String]| {
//!     EmailCheck::settled(Ok(EmailVerdict { valid: address.ends_with(".org") }))
//! });
//! let mut tree = ControlTree::new();
//! let id = tree
//!     .new_control(
//!         FormState::new(json!("ada@example.com")),
//!         ControlOptions::default().async_validator(validator),
//!     )
//!     .unwrap();
//! assert!(tree.control(id).unwrap().has_error("asyncValidateMail"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::async_validation::{AsyncValidatorFn, Deferred, StreamPoll, ValidationStream};
use super::validators::error;
use crate::value::{as_js_string, is_empty_input_value};

/// Error code reported by [`async_email`].
pub const ERROR_CODE_ASYNC_EMAIL: &str = "asyncValidateMail";

/// A provider's answer for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerdict {
    pub valid: bool,
}

type Outcome = Result<EmailVerdict, String>;

/// A provider lookup that settles later.
#[derive(Debug)]
pub struct EmailCheck {
    rx: Receiver<Outcome>,
}

/// The answering half of an [`EmailCheck`].
#[derive(Debug)]
pub struct EmailReply {
    tx: Sender<Outcome>,
}

/// Create a connected reply/check pair.
#[must_use]
pub fn email_check() -> (EmailReply, EmailCheck) {
    let (tx, rx) = mpsc::channel();
    (EmailReply { tx }, EmailCheck { rx })
}

impl EmailCheck {
    /// A lookup whose outcome is already known.
    #[must_use]
    pub fn settled(outcome: Result<EmailVerdict, String>) -> Self {
        let (reply, check) = email_check();
        reply.send(outcome);
        check
    }
}

impl EmailReply {
    /// Deliver the outcome. `false` once nobody waits for it.
    pub fn send(self, outcome: Result<EmailVerdict, String>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    pub fn valid(self) -> bool {
        self.send(Ok(EmailVerdict { valid: true }))
    }

    pub fn invalid(self) -> bool {
        self.send(Ok(EmailVerdict { valid: false }))
    }

    /// The provider could not answer.
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.send(Err(message.into()))
    }
}

/// A service that checks addresses against a set of named validators.
pub trait EmailValidationProvider: Send + Sync {
    fn check(&self, address: &str, validators: &[String]) -> EmailCheck;
}

impl<F> EmailValidationProvider for F
where
    F: Fn(&str, &[String]) -> EmailCheck + Send + Sync,
{
    fn check(&self, address: &str, validators: &[String]) -> EmailCheck {
        self(address, validators)
    }
}

/// An async validator that asks `provider` about the control's address.
///
/// `validators` is passed through to the provider untouched.
pub fn async_email<P>(validators: Vec<String>, provider: P) -> AsyncValidatorFn
where
    P: EmailValidationProvider + 'static,
{
    let latest = Arc::new(AtomicU64::new(0));
    AsyncValidatorFn::new(move |control| {
        let value = control.value();
        if is_empty_input_value(value) {
            return Deferred::resolved(None).into();
        }
        let call = latest.fetch_add(1, Ordering::SeqCst) + 1;
        let address = as_js_string(value);
        let mut check = Some(provider.check(&address, &validators));
        let latest = Arc::clone(&latest);
        ValidationStream::poll_fn(move || {
            if latest.load(Ordering::SeqCst) != call {
                return StreamPoll::Closed;
            }
            let polled = match &check {
                Some(pending) => pending.rx.try_recv(),
                None => return StreamPoll::Closed,
            };
            let outcome = match polled {
                Ok(outcome) => outcome,
                Err(TryRecvError::Empty) => return StreamPoll::Pending,
                Err(TryRecvError::Disconnected) => {
                    check = None;
                    return StreamPoll::Closed;
                }
            };
            check = None;
            match outcome {
                Ok(EmailVerdict { valid: true }) => StreamPoll::Ready(None),
                Ok(EmailVerdict { valid: false }) => {
                    StreamPoll::Ready(Some(error(ERROR_CODE_ASYNC_EMAIL, json!(true))))
                }
                Err(message) => {
                    tracing::debug!(
                        address = %address,
                        error = %message,
                        "e-mail provider failed"
                    );
                    StreamPoll::Ready(Some(error(ERROR_CODE_ASYNC_EMAIL, json!(true))))
                }
            }
        })
        .into()
    })
}
