use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::hci::HciSocket;
use crate::api::{Errno, Result, TransportError};
use crate::transport::{ChannelMode, RadioSession};

/// Default capacity of a single poller read.
pub const DEFAULT_READ_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upper bound on a single read. A burst larger than this arrives as
    /// multiple delivered packets.
    pub read_capacity: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            read_capacity: DEFAULT_READ_CAPACITY,
        }
    }
}

/// Where inbound packets and poller failures go.
///
/// Callbacks run on the reactor thread and must not block.
pub trait EventSink: Send + Sync + 'static {
    /// One inbound packet, raw and uninterpreted.
    fn data_received(&self, packet: Bytes);

    /// Transient read failure; the poller keeps running.
    fn read_error(&self, error: TransportError) {
        tracing::warn!(%error, "transient HCI read failure");
    }

    /// Fatal poller failure; the poller has stopped itself.
    fn fatal_error(&self, error: TransportError) {
        tracing::error!(%error, "HCI poller stopped");
    }
}

/// Workaround hook applied to raw-channel packets before delivery.
///
/// The kernel-disconnect quirk handling lives with an external collaborator;
/// the poller only guarantees the hook runs on the reactor thread for every
/// RAW-mode packet.
pub type RawIngressHook = dyn Fn(&mut Vec<u8>) + Send + Sync;

enum PollerState {
    Stopped,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
        /// Cleared by the read task itself on fatal self-stop.
        alive: Arc<AtomicBool>,
    },
}

/// Readiness bridge for one bound session.
///
/// `start()`/`stop()` are idempotent. The read task performs one bounded
/// read per readiness event and never issues the dispatcher's blocking setup
/// syscalls.
pub struct Poller {
    session: Arc<RadioSession>,
    config: PollerConfig,
    sink: Arc<dyn EventSink>,
    raw_hook: Option<Arc<RawIngressHook>>,
    state: Mutex<PollerState>,
}

impl Poller {
    pub fn new(session: Arc<RadioSession>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            session,
            config: PollerConfig::default(),
            sink,
            raw_hook: None,
            state: Mutex::new(PollerState::Stopped),
        }
    }

    pub fn with_config(mut self, config: PollerConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the RAW-channel ingress workaround hook.
    pub fn with_raw_ingress_hook(mut self, hook: Arc<RawIngressHook>) -> Self {
        self.raw_hook = Some(hook);
        self
    }

    pub fn session(&self) -> &Arc<RadioSession> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        match &*self.state.lock().expect("poller state") {
            PollerState::Running { alive, .. } => alive.load(Ordering::Acquire),
            PollerState::Stopped => false,
        }
    }

    /// Register the descriptor with the reactor and start delivering inbound
    /// packets. No-op when already delivering.
    ///
    /// After a fatal self-stop the descriptor is gone, so a restart attempt
    /// reports [`TransportError::DescriptorInvalidated`] instead of silently
    /// doing nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock().expect("poller state");
        if let PollerState::Running { alive, .. } = &*state {
            if alive.load(Ordering::Acquire) {
                return Ok(());
            }
            // the read task stopped itself on a fatal error; its handle is
            // already finished, so dropping it here reaps it
            *state = PollerState::Stopped;
            return Err(TransportError::DescriptorInvalidated);
        }

        let afd = AsyncFd::with_interest(self.session.socket().clone(), Interest::READABLE)
            .map_err(|e| TransportError::RegistrationFailed(errno_of(&e)))?;

        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(read_loop(
            afd,
            self.session.mode(),
            self.config.read_capacity,
            self.sink.clone(),
            self.raw_hook.clone(),
            cancel.clone(),
            alive.clone(),
        ));
        *state = PollerState::Running { cancel, task, alive };
        tracing::debug!(device = self.session.device_id(), "HCI poller started");
        Ok(())
    }

    /// Stop delivery. When this returns, no further sink callbacks fire for
    /// this session and the descriptor is deregistered from the reactor.
    /// No-op when already stopped.
    pub async fn stop(&self) {
        let taken = {
            let mut state = self.state.lock().expect("poller state");
            std::mem::replace(&mut *state, PollerState::Stopped)
        };
        if let PollerState::Running { cancel, task, .. } = taken {
            cancel.cancel();
            // synchronize-with: the read task is gone once this resolves
            let _ = task.await;
            tracing::debug!(device = self.session.device_id(), "HCI poller stopped");
        }
    }
}

fn errno_of(err: &std::io::Error) -> Errno {
    Errno::from_raw(err.raw_os_error().unwrap_or(0))
}

async fn read_loop(
    afd: AsyncFd<Arc<HciSocket>>,
    mode: ChannelMode,
    capacity: usize,
    sink: Arc<dyn EventSink>,
    raw_hook: Option<Arc<RawIngressHook>>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; capacity];
    loop {
        let guard = tokio::select! {
            _ = cancel.cancelled() => break,
            guard = afd.readable() => guard,
        };
        let mut guard = match guard {
            Ok(guard) => guard,
            Err(err) => {
                sink.fatal_error(TransportError::classify_read(errno_of(&err)));
                break;
            }
        };

        match guard.try_io(|fd| fd.get_ref().read(&mut buf).map_err(std::io::Error::from)) {
            Ok(Ok(0)) => {
                // EOF: the descriptor died underneath us
                sink.fatal_error(TransportError::DescriptorInvalidated);
                break;
            }
            Ok(Ok(n)) => {
                let mut packet = buf[..n].to_vec();
                if mode == ChannelMode::Raw
                    && let Some(hook) = &raw_hook
                {
                    hook(&mut packet);
                }
                sink.data_received(Bytes::from(packet));
            }
            Ok(Err(err)) => {
                let classified = TransportError::classify_read(errno_of(&err));
                if classified.is_fatal_to_poller() {
                    sink.fatal_error(classified);
                    break;
                }
                sink.read_error(classified);
            }
            // readiness was a false positive; wait for the next event
            Err(_would_block) => continue,
        }
    }
    alive.store(false, Ordering::Release);
    // dropping the AsyncFd deregisters the descriptor from the reactor
}
