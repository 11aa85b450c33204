use core::fmt;
use std::error;

/// Errors reported by promise and future operations.
///
/// These cover the contract violations of the one-shot channel; a panic thrown
/// by a continuation callable is not an `Error` but a payload that resumes
/// unwinding when the result is claimed (see [`Future::get`]).
///
/// [`Future::get`]: crate::Future::get
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The promise was dropped before it was completed.
    BrokenPromise,

    /// [`Promise::get_future`] was already called on this promise.
    ///
    /// [`Promise::get_future`]: crate::Promise::get_future
    FutureAlreadyRetrieved,

    /// The promise already holds a result.
    PromiseAlreadySatisfied,

    /// The handle no longer owns a channel.
    NoState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BrokenPromise => f.write_str("promise dropped before completion"),
            Error::FutureAlreadyRetrieved => f.write_str("future already retrieved"),
            Error::PromiseAlreadySatisfied => f.write_str("promise already satisfied"),
            Error::NoState => f.write_str("no shared state"),
        }
    }
}

impl error::Error for Error {}
