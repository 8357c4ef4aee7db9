use std::time::Duration;

use super::Errno;

/// Classified transport errors.
///
/// Every OS failure in this crate is converted into one of these variants
/// before it reaches a caller, either directly, inside a task completion
/// record, or through an emitted event. Logging alone never stands in for
/// propagation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// `socket(AF_BLUETOOTH, SOCK_RAW, BTPROTO_HCI)` failed.
    #[error("failed to create HCI socket: {0}")]
    SocketCreateFailed(Errno),

    /// Binding the requested channel mode failed.
    #[error("failed to bind HCI channel: {0}")]
    BindFailed(Errno),

    /// `HCIGETDEVINFO` failed; the session's address stays all-zero with
    /// address type 0 and this error is surfaced instead of being swallowed.
    #[error("HCI device info query failed: {0}")]
    DeviceInfoUnavailable(Errno),

    /// Device enumeration found no adapter whose up/down flag matches the
    /// requested channel mode.
    #[error("no HCI device matched the requested power state")]
    NoDeviceFound,

    /// The kernel rejected the `HCI_FILTER` socket option. Non-fatal to the
    /// session; read/write stay usable.
    #[error("kernel rejected HCI filter: {0}")]
    FilterRejected(Errno),

    /// Registering the descriptor with the async reactor failed. The poller
    /// never started.
    #[error("failed to register HCI descriptor with the reactor: {0}")]
    RegistrationFailed(Errno),

    /// Transient per-readiness-event read failure. The poller keeps running.
    #[error("HCI read failed: {0}")]
    ReadError(Errno),

    /// An outbound packet was not written in full.
    #[error("HCI write failed ({written}/{len} bytes written)")]
    WriteError {
        errno: Option<Errno>,
        written: usize,
        len: usize,
    },

    /// The descriptor was closed or invalidated underneath the poller.
    /// Fatal: the poller stops itself and emits this through the event sink.
    #[error("HCI descriptor invalidated")]
    DescriptorInvalidated,

    /// The operation requires a bound session and none exists.
    #[error("no bound HCI session")]
    SessionNotBound,

    /// The worker executing a task died before publishing its completion
    /// record (panic or runtime shutdown).
    #[error("worker task failed: {reason}")]
    WorkerTaskFailed { reason: String },

    /// A submitted task did not publish its completion record within the
    /// dispatcher's bounded wait.
    #[error("worker task did not complete within {0:?}")]
    WorkerTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Classify an I/O error from the readiness path.
    ///
    /// Descriptor-level failures (`EBADF`, `ENODEV`, `ENXIO`) are fatal to the
    /// poller; anything else is a transient [`TransportError::ReadError`].
    pub fn classify_read(errno: Errno) -> Self {
        match errno {
            Errno::EBADF | Errno::ENODEV | Errno::ENXIO => Self::DescriptorInvalidated,
            other => Self::ReadError(other),
        }
    }

    /// Whether this error stops the poller.
    pub fn is_fatal_to_poller(&self) -> bool {
        matches!(self, Self::DescriptorInvalidated)
    }
}
