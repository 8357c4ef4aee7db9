//! HCI transport test harness.
//!
//! Real HCI sockets need a Bluetooth adapter and CAP_NET_RAW, so the
//! integration tests run against socketpair-backed descriptors instead: the
//! poller, writer and dispatcher all operate on a plain file descriptor and
//! never notice the difference. [`loopback`] provides the session/peer pairs,
//! collecting event sinks, and fake binders.

pub mod loopback;

/// Install the fmt subscriber once per test binary. Safe to call from every
/// test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
