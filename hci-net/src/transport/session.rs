use std::sync::Arc;

use crate::api::hci::{
    HCI_CHANNEL_CONTROL, HCI_CHANNEL_RAW, HCI_CHANNEL_USER, HCI_DEV_NONE, HciSocket,
};
use crate::api::{Result, TransportError};

use super::device::{
    DeviceDescriptor, DeviceSelection, flag_is_up, normalize_address_type, select_device,
};

/// HCI channel the session binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Promiscuous delivery of all HCI traffic on the adapter.
    Raw,
    /// Exclusive low-level ownership of one controller.
    User,
    /// Management channel, not tied to a single adapter.
    Control,
}

impl ChannelMode {
    pub fn channel(self) -> u16 {
        match self {
            Self::Raw => HCI_CHANNEL_RAW,
            Self::User => HCI_CHANNEL_USER,
            Self::Control => HCI_CHANNEL_CONTROL,
        }
    }

    /// Power state the binder looks for when enumerating adapters: the raw
    /// channel shares a running adapter, the user channel needs one the
    /// kernel stack has not brought up.
    pub fn wants_up(self) -> bool {
        !matches!(self, Self::User)
    }
}

/// What the dispatcher's Init task asks the binder for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindRequest {
    pub mode: ChannelMode,
    pub device: DeviceSelection,
}

impl BindRequest {
    pub fn raw() -> Self {
        Self {
            mode: ChannelMode::Raw,
            device: DeviceSelection::default(),
        }
    }

    pub fn user() -> Self {
        Self {
            mode: ChannelMode::User,
            device: DeviceSelection::default(),
        }
    }
}

/// A bound HCI session.
///
/// An owned value, passed by `Arc` into the poller and dispatcher; there is
/// deliberately no process-global socket state, so multiple sessions can
/// coexist and tests can run against injected descriptors.
#[derive(Debug)]
pub struct RadioSession {
    socket: Arc<HciSocket>,
    mode: ChannelMode,
    dev_id: u16,
    address: [u8; 6],
    address_type: u8,
}

impl RadioSession {
    /// Wrap a pre-bound, non-blocking descriptor.
    ///
    /// The address stays all-zero with type 0 until
    /// [`refresh_identity`](Self::refresh_identity) succeeds. This is also
    /// the entry point for loopback tests running against socketpair
    /// descriptors.
    pub fn from_socket(socket: HciSocket, mode: ChannelMode, dev_id: u16) -> Self {
        Self {
            socket: Arc::new(socket),
            mode,
            dev_id,
            address: [0u8; 6],
            address_type: 0,
        }
    }

    pub fn socket(&self) -> &Arc<HciSocket> {
        &self.socket
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    pub fn device_id(&self) -> u16 {
        self.dev_id
    }

    /// Local controller address; all-zero when the device-info query failed.
    pub fn address(&self) -> [u8; 6] {
        self.address
    }

    /// Recorded address type: 1 public, other values random, never 3.
    pub fn address_type(&self) -> u8 {
        self.address_type
    }

    /// Re-query the kernel for the local address and address type.
    ///
    /// On failure the recorded identity is left untouched and the error is
    /// returned for the caller to surface.
    pub fn refresh_identity(&mut self) -> Result<()> {
        let info = self
            .socket
            .device_info(self.dev_id)
            .map_err(TransportError::DeviceInfoUnavailable)?;
        self.address = info.bdaddr;
        self.address_type = normalize_address_type(info.type_);
        Ok(())
    }

    /// Fresh kernel snapshot of the bound device. Never cached.
    pub fn device_info(&self) -> Result<DeviceDescriptor> {
        let info = self
            .socket
            .device_info(self.dev_id)
            .map_err(TransportError::DeviceInfoUnavailable)?;
        Ok(DeviceDescriptor::from(&info))
    }

    /// Whether the kernel reports the bound adapter as up.
    pub fn is_device_up(&self) -> Result<bool> {
        let info = self
            .socket
            .device_info(self.dev_id)
            .map_err(TransportError::DeviceInfoUnavailable)?;
        Ok(flag_is_up(info.flags))
    }

    /// Replace the kernel-side event filter with the given blob.
    pub fn set_filter(&self, filter: &[u8]) -> Result<()> {
        self.socket
            .set_filter(filter)
            .map_err(TransportError::FilterRejected)
    }

    /// Write one outbound packet. Partial writes are an error; the payload is
    /// never silently dropped.
    ///
    /// The descriptor is non-blocking, so a full socket send buffer surfaces
    /// as a [`TransportError::WriteError`] carrying `EAGAIN` for the caller
    /// to retry rather than blocking the task.
    pub fn send(&self, packet: &[u8]) -> Result<usize> {
        match self.socket.write(packet) {
            Ok(n) if n == packet.len() => Ok(n),
            Ok(n) => Err(TransportError::WriteError {
                errno: None,
                written: n,
                len: packet.len(),
            }),
            Err(errno) => Err(TransportError::WriteError {
                errno: Some(errno),
                written: 0,
                len: packet.len(),
            }),
        }
    }
}

/// Result of a bind: the session, plus the outcome of the post-bind
/// device-info query. A failed query leaves the session identity zeroed and
/// is reported here instead of being swallowed.
#[derive(Debug)]
pub struct BindOutcome {
    pub session: RadioSession,
    pub info_error: Option<TransportError>,
}

/// Seam between the dispatcher and the OS-facing bind path, so the
/// dispatcher is testable with an injected fake.
pub trait DeviceBinder: Send + Sync + 'static {
    fn bind(&self, request: &BindRequest) -> Result<BindOutcome>;
}

/// The real binder: opens the socket, resolves the adapter index, binds the
/// channel and queries the device identity.
#[derive(Debug, Default)]
pub struct HciBinder;

impl HciBinder {
    fn resolve_device(&self, socket: &HciSocket, request: &BindRequest) -> Result<u16> {
        if request.mode == ChannelMode::Control {
            return Ok(HCI_DEV_NONE);
        }
        match request.device {
            DeviceSelection::Index(id) => Ok(id),
            DeviceSelection::First => {
                let entries = socket
                    .device_list()
                    .map_err(TransportError::DeviceInfoUnavailable)?;
                select_device(&entries, request.mode.wants_up())
                    .ok_or(TransportError::NoDeviceFound)
            }
        }
    }
}

impl DeviceBinder for HciBinder {
    fn bind(&self, request: &BindRequest) -> Result<BindOutcome> {
        let socket = HciSocket::open().map_err(TransportError::SocketCreateFailed)?;
        let dev_id = self.resolve_device(&socket, request)?;

        socket
            .bind_channel(dev_id, request.mode.channel())
            .map_err(TransportError::BindFailed)?;

        let mut session = RadioSession::from_socket(socket, request.mode, dev_id);
        let info_error = if request.mode == ChannelMode::Control {
            None
        } else {
            session.refresh_identity().err()
        };
        Ok(BindOutcome {
            session,
            info_error,
        })
    }
}
