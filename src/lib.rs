//! One-shot promise/future channel with schedulable continuations.
//!
//! A [`Promise`] and the [`Future`] taken from it share a synchronized state
//! that transports a single result (a value, a reference, a unit or a
//! captured panic) from the producing thread to the consuming one. On top of
//! that channel, [`Future::then`] chains follow-on computations whose
//! scheduling is explicit: a [`Trigger`] decides *when* a continuation runs
//! relative to its parent's completion and the consumer's demand, and a
//! [`Submit`] mode hands the continuation to an external [`Executor`] instead
//! of running it inline.
//!
//! # Producing and consuming
//!
//! ```
//! use sequent::Promise;
//!
//! let mut promise = Promise::new();
//! let future = promise.get_future().unwrap();
//!
//! std::thread::spawn(move || {
//!     promise.set_value(1 + 2).unwrap();
//! });
//!
//! assert_eq!(future.get().unwrap(), 3);
//! ```
//!
//! The channel is strictly one-shot: a second [`Promise::set_value`] reports
//! [`Error::PromiseAlreadySatisfied`], a second [`Promise::get_future`]
//! reports [`Error::FutureAlreadyRetrieved`], and dropping the promise
//! without completing it delivers [`Error::BrokenPromise`] to the consumer.
//!
//! # Scheduling continuations
//!
//! Each link in a chain runs under one of three trigger policies:
//!
//! - [`Trigger::Any`] runs at the earliest opportunity: when the parent
//!   completes, or eagerly when the consumer demands the result first.
//! - [`Trigger::Set`] runs exactly when the parent completes, on the thread
//!   that completed it, whether or not anyone is waiting.
//! - [`Trigger::Get`] runs only once a consumer demands the result.
//!
//! ```
//! use sequent::{Promise, Trigger};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let ran = Arc::new(AtomicBool::new(false));
//! let flag = ran.clone();
//!
//! let mut promise = Promise::new();
//! let future = promise.get_future().unwrap().then_on(Trigger::Get, move |n: i32| {
//!     flag.store(true, Ordering::SeqCst);
//!     n * 2
//! });
//!
//! promise.set_value(1).unwrap();
//! assert!(!ran.load(Ordering::SeqCst)); // still lazy
//! assert_eq!(future.get().unwrap(), 2);
//! assert!(ran.load(Ordering::SeqCst));
//! ```
//!
//! An entire chain is serialized by the root state's mutex, and user
//! callables always run with that mutex released. A panic in a continuation
//! is captured into its stage and resumes unwinding at the final
//! [`Future::get`]; when the panic was driven by the producer's
//! `set_value`, that call panics on the producer's thread as well.
//!
//! # Executors and allocators
//!
//! [`Future::then_via`] submits the continuation to an [`Executor`] with one
//! of the [`Submit`] modes (`Dispatch`, `Post`, `Defer`). The chain can draw
//! its storage from a user [`Allocator`] via [`Promise::with_allocator`] and
//! [`Future::then_in`], and every executor submission receives the chain's
//! [`AllocHandle`] for its own use.
//!
//! [`PackagedTask`] bundles a callable with a promise, and [`UseFuture`] is a
//! completion token that adapts any initiating function speaking the
//! [`CompletionToken`] protocol to return a [`Future`].

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

mod alloc_api;
mod chain;
mod continuation;
mod error;
mod executor;
mod future;
mod packaged_task;
mod promise;
mod state;
mod use_future;

pub use crate::alloc_api::{AllocHandle, Allocator, Global};
pub use crate::continuation::Trigger;
pub use crate::error::Error;
pub use crate::executor::{Executor, Submit};
pub use crate::future::{Future, FutureStatus};
pub use crate::packaged_task::PackagedTask;
pub use crate::promise::Promise;
pub use crate::use_future::{
    CompletionHandler, CompletionToken, PromiseHandler, UseFuture, USE_FUTURE,
};
