//! Socketpair-backed sessions, collecting sinks and fake binders.

use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use hci_net::TransportError;
use hci_net::api::hci::HciSocket;
use hci_net::runtime::EventSink;
use hci_net::transport::{
    BindOutcome, BindRequest, ChannelMode, DeviceBinder, RadioSession,
};

/// A session backed by one end of a stream socketpair, plus the peer end the
/// test writes into and reads from.
pub fn loopback_session(mode: ChannelMode) -> (Arc<RadioSession>, UnixStream) {
    let (ours, peer) = UnixStream::pair().expect("socketpair");
    ours.set_nonblocking(true).expect("nonblocking");
    let socket = HciSocket::from_owned_fd(OwnedFd::from(ours));
    (Arc::new(RadioSession::from_socket(socket, mode, 0)), peer)
}

/// Event sink that records everything it is handed.
#[derive(Default)]
pub struct CollectSink {
    packets: Mutex<Vec<Bytes>>,
    read_errors: Mutex<Vec<TransportError>>,
    fatal_errors: Mutex<Vec<TransportError>>,
}

impl CollectSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn packets(&self) -> Vec<Bytes> {
        self.packets.lock().expect("packets").clone()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.lock().expect("packets").len()
    }

    pub fn received_bytes(&self) -> usize {
        self.packets.lock().expect("packets").iter().map(|p| p.len()).sum()
    }

    pub fn fatal_errors(&self) -> Vec<TransportError> {
        self.fatal_errors.lock().expect("fatal").clone()
    }

    pub fn read_errors(&self) -> Vec<TransportError> {
        self.read_errors.lock().expect("read").clone()
    }

    /// Poll until at least `bytes` payload bytes arrived or the deadline
    /// passes. Returns whether the condition was met.
    pub async fn wait_for_bytes(&self, bytes: usize, deadline: Duration) -> bool {
        self.wait_until(deadline, || self.received_bytes() >= bytes).await
    }

    /// Poll until at least one fatal error was emitted.
    pub async fn wait_for_fatal(&self, deadline: Duration) -> bool {
        self.wait_until(deadline, || !self.fatal_errors().is_empty()).await
    }

    async fn wait_until(&self, deadline: Duration, cond: impl Fn() -> bool) -> bool {
        let end = tokio::time::Instant::now() + deadline;
        loop {
            if cond() {
                return true;
            }
            if tokio::time::Instant::now() >= end {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl EventSink for CollectSink {
    fn data_received(&self, packet: Bytes) {
        self.packets.lock().expect("packets").push(packet);
    }

    fn read_error(&self, error: TransportError) {
        self.read_errors.lock().expect("read").push(error);
    }

    fn fatal_error(&self, error: TransportError) {
        self.fatal_errors.lock().expect("fatal").push(error);
    }
}

/// Binder that always fails with a fixed classified error.
pub struct FailingBinder {
    pub error: TransportError,
}

impl DeviceBinder for FailingBinder {
    fn bind(&self, _request: &BindRequest) -> Result<BindOutcome, TransportError> {
        Err(self.error.clone())
    }
}

/// Binder that panics instead of publishing a result, simulating a worker
/// dying mid-task.
pub struct PanickingBinder;

impl DeviceBinder for PanickingBinder {
    fn bind(&self, _request: &BindRequest) -> Result<BindOutcome, TransportError> {
        panic!("binder died before producing an outcome");
    }
}

/// Binder producing socketpair-backed sessions. Peers of bound sessions are
/// parked for the test to pick up with [`LoopbackBinder::take_peer`].
#[derive(Default)]
pub struct LoopbackBinder {
    /// Simulates a failing post-bind device-info query: the session comes
    /// back with a zeroed identity and this error in the outcome.
    pub info_error: Option<TransportError>,
    /// Artificial delay before the bind completes, for timeout tests.
    pub bind_delay: Option<Duration>,
    peers: Mutex<Vec<UnixStream>>,
}

impl LoopbackBinder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_info_error(error: TransportError) -> Arc<Self> {
        Arc::new(Self {
            info_error: Some(error),
            ..Self::default()
        })
    }

    pub fn with_bind_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            bind_delay: Some(delay),
            ..Self::default()
        })
    }

    /// The peer end of the most recent bind.
    pub fn take_peer(&self) -> UnixStream {
        self.peers.lock().expect("peers").pop().expect("no bound peer")
    }
}

impl DeviceBinder for LoopbackBinder {
    fn bind(&self, request: &BindRequest) -> Result<BindOutcome, TransportError> {
        if let Some(delay) = self.bind_delay {
            // runs on the blocking pool, so a real sleep is fine
            std::thread::sleep(delay);
        }
        let (ours, peer) = UnixStream::pair().expect("socketpair");
        ours.set_nonblocking(true).expect("nonblocking");
        self.peers.lock().expect("peers").push(peer);
        let socket = HciSocket::from_owned_fd(OwnedFd::from(ours));
        Ok(BindOutcome {
            session: RadioSession::from_socket(socket, request.mode, 0),
            info_error: self.info_error.clone(),
        })
    }
}
