//! Remote procedure calls
//!
//! A CALL becomes a [`CallInvocation`] handed to the application. The
//! application answers through the invocation's [`CallResponder`], which
//! turns the outcome into exactly one CALL_RESULT or CALL_ERROR for the
//! calling client.

pub mod error;
pub mod responder;

pub use error::CallError;
pub use responder::{CallInvocation, CallResponder};
