use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};

use crate::api::{Result, TransportError};
use crate::transport::{BindRequest, DeviceBinder, RadioSession};

use super::poller::{EventSink, Poller, PollerConfig, RawIngressHook};

/// Opaque service table blob. Payload format belongs to the GATT layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceTable(pub Vec<u8>);

/// A request submitted to the dispatcher.
#[derive(Debug)]
pub enum Task {
    /// Create and bind the socket and construct the readiness bridge.
    Init(BindRequest),
    /// Enable inbound delivery.
    StartAdvertising,
    /// Disable inbound delivery.
    StopAdvertising,
    /// Install the opaque service table.
    SetServices(ServiceTable),
    /// Reserved no-op.
    RunLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Init,
    StartAdvertising,
    StopAdvertising,
    SetServices,
    RunLoop,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Init(_) => TaskKind::Init,
            Task::StartAdvertising => TaskKind::StartAdvertising,
            Task::StopAdvertising => TaskKind::StopAdvertising,
            Task::SetServices(_) => TaskKind::SetServices,
            Task::RunLoop => TaskKind::RunLoop,
        }
    }
}

/// Success payload of a completion record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPayload {
    /// Init succeeded: the bound identity.
    Bound {
        device_id: u16,
        address: [u8; 6],
        address_type: u8,
    },
    /// The task had nothing to report beyond success.
    None,
}

/// Exactly one of these is published per submitted task.
#[derive(Debug)]
pub struct Completion {
    pub kind: TaskKind,
    pub result: Result<TaskPayload>,
}

#[derive(Clone)]
pub struct DispatcherConfig {
    /// Bounded wait used by [`Dispatcher::run`] around worker-task
    /// completion.
    pub task_timeout: Duration,
    pub poller: PollerConfig,
    /// RAW-channel ingress workaround hook, installed on pollers created by
    /// Init tasks.
    pub raw_hook: Option<Arc<RawIngressHook>>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(5),
            poller: PollerConfig::default(),
            raw_hook: None,
        }
    }
}

struct DispatchState {
    session: Option<Arc<RadioSession>>,
    poller: Option<Arc<Poller>>,
    services: Option<ServiceTable>,
}

struct Inner {
    binder: Arc<dyn DeviceBinder>,
    sink: Arc<dyn EventSink>,
    config: DispatcherConfig,
    // serializes lifecycle tasks; reads/writes on a bound session stay
    // concurrent
    state: Mutex<DispatchState>,
}

/// Runs blocking/syscall-heavy operations off the reactor and publishes one
/// completion record per task.
///
/// The dispatcher never retries; a failed Init is retried by submitting a
/// fresh Init task.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(binder: Arc<dyn DeviceBinder>, sink: Arc<dyn EventSink>) -> Self {
        Self::with_config(binder, sink, DispatcherConfig::default())
    }

    pub fn with_config(
        binder: Arc<dyn DeviceBinder>,
        sink: Arc<dyn EventSink>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                binder,
                sink,
                config,
                state: Mutex::new(DispatchState {
                    session: None,
                    poller: None,
                    services: None,
                }),
            }),
        }
    }

    /// Submit a task. The receiver yields exactly one completion record,
    /// tagged with the task kind. Ordering across independent tasks is not
    /// guaranteed.
    pub fn submit(&self, task: Task) -> oneshot::Receiver<Completion> {
        let (tx, rx) = oneshot::channel();
        let inner = self.inner.clone();
        let kind = task.kind();
        tokio::spawn(async move {
            let result = execute(&inner, task).await;
            if let Err(completion) = tx.send(Completion { kind, result }) {
                tracing::debug!(kind = ?completion.kind, "completion receiver dropped");
            }
        });
        rx
    }

    /// Submit a task and wait for its completion record, bounded by the
    /// configured task timeout.
    pub async fn run(&self, task: Task) -> Completion {
        let kind = task.kind();
        let timeout = self.inner.config.task_timeout;
        match tokio::time::timeout(timeout, self.submit(task)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_recv)) => Completion {
                kind,
                result: Err(TransportError::WorkerTaskFailed {
                    reason: "worker dropped its completion record".to_string(),
                }),
            },
            Err(_elapsed) => Completion {
                kind,
                result: Err(TransportError::WorkerTimeout(timeout)),
            },
        }
    }

    /// The bound session, if an Init task has succeeded in binding.
    pub async fn session(&self) -> Option<Arc<RadioSession>> {
        self.inner.state.lock().await.session.clone()
    }

    /// Whether the readiness bridge is currently delivering.
    pub async fn is_polling(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .poller
            .as_ref()
            .is_some_and(|p| p.is_running())
    }

    /// The last installed service table.
    pub async fn service_table(&self) -> Option<ServiceTable> {
        self.inner.state.lock().await.services.clone()
    }
}

async fn execute(inner: &Arc<Inner>, task: Task) -> Result<TaskPayload> {
    // one lifecycle task in flight per session
    let mut state = inner.state.lock().await;
    match task {
        Task::Init(request) => {
            // re-init: the poller must be stopped before the socket goes away
            if let Some(old) = state.poller.take() {
                old.stop().await;
            }
            state.session = None;

            let binder = inner.binder.clone();
            let outcome = tokio::task::spawn_blocking(move || binder.bind(&request))
                .await
                .map_err(|e| TransportError::WorkerTaskFailed {
                    reason: e.to_string(),
                })??;

            let session = Arc::new(outcome.session);
            let mut poller = Poller::new(session.clone(), inner.sink.clone())
                .with_config(inner.config.poller.clone());
            if let Some(hook) = &inner.config.raw_hook {
                poller = poller.with_raw_ingress_hook(hook.clone());
            }
            let payload = TaskPayload::Bound {
                device_id: session.device_id(),
                address: session.address(),
                address_type: session.address_type(),
            };
            state.session = Some(session);
            state.poller = Some(Arc::new(poller));

            match outcome.info_error {
                Some(error) => Err(error),
                None => Ok(payload),
            }
        }
        Task::StartAdvertising => {
            let poller = state.poller.as_ref().ok_or(TransportError::SessionNotBound)?;
            poller.start()?;
            Ok(TaskPayload::None)
        }
        Task::StopAdvertising => {
            let poller = state.poller.as_ref().ok_or(TransportError::SessionNotBound)?;
            poller.stop().await;
            Ok(TaskPayload::None)
        }
        Task::SetServices(table) => {
            state.services = Some(table);
            Ok(TaskPayload::None)
        }
        Task::RunLoop => Ok(TaskPayload::None),
    }
}
