//! Raw Bluetooth HCI socket transport.
//!
//! This crate binds a raw Host-Controller-Interface socket on Linux, applies
//! kernel-side packet filtering, and bridges the descriptor's readiness events
//! into tokio. Higher layers (GATT, advertising payloads, device UIs) are
//! expected to sit on top; this crate only moves raw HCI packets.
//!
//! # Architecture
//!
//! - [`api::hci`] wraps the OS surface: socket creation, `sockaddr_hci` bind,
//!   the `HCIGETDEVINFO`/`HCIGETDEVLIST` ioctls, and the `HCI_FILTER` socket
//!   option.
//! - [`transport`] owns the bound session state: channel mode, device index,
//!   local address, and the blocking write path.
//! - [`runtime`] provides the readiness bridge (a poller built on tokio's
//!   `AsyncFd`) and the task dispatcher that runs blocking setup syscalls off
//!   the reactor and reports each task's outcome through a completion record.

pub mod api;
pub mod runtime;
pub mod transport;

pub use api::{Result, TransportError};
