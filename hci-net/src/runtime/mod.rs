//! Readiness bridge and async task dispatch.
//!
//! A single tokio reactor owns the session's descriptor and all inbound
//! reads; blocking setup syscalls (socket creation, bind, ioctls) run on a
//! worker context and report back through completion records.
//!
//! # How delivery works
//!
//! 1. The [`Poller`] registers the bound descriptor with tokio's reactor via
//!    `AsyncFd` when started.
//! 2. Each readiness event triggers exactly one bounded read (1024 bytes by
//!    default).
//! 3. The payload is forwarded to the caller's [`EventSink`] uninterpreted.
//! 4. `stop()` cancels the read task and awaits it; by the time it returns no
//!    further sink callbacks fire and the descriptor is deregistered.
//!
//! The [`Dispatcher`] is the entry point external callers use: submit a
//! [`Task`], get exactly one [`Completion`] back, tagged with the task kind
//! and carrying either a success payload or a classified error.

mod dispatch;
mod poller;

pub use dispatch::{
    Completion, Dispatcher, DispatcherConfig, ServiceTable, Task, TaskKind, TaskPayload,
};
pub use poller::{EventSink, Poller, PollerConfig, RawIngressHook};
