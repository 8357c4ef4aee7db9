// Raw Bluetooth HCI socket API
// Structure layouts mirror <net/bluetooth/hci.h>; sizes are asserted in tests.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::libc;

use super::Errno;

pub const BTPROTO_HCI: libc::c_int = 1;

pub const SOL_HCI: libc::c_int = 0;
pub const HCI_FILTER: libc::c_int = 2;

/// Promiscuous delivery of all HCI traffic on one adapter; typically needs
/// CAP_NET_RAW.
pub const HCI_CHANNEL_RAW: u16 = 0;
/// Exclusive low-level ownership of one controller, bypassing the kernel's
/// Bluetooth stack for it.
pub const HCI_CHANNEL_USER: u16 = 1;
pub const HCI_CHANNEL_CONTROL: u16 = 3;

/// Device index used when a channel is not tied to one adapter.
pub const HCI_DEV_NONE: u16 = 0xffff;

pub const HCI_MAX_DEV: usize = 16;

/// Bit positions in `HciDevInfo::flags`.
pub const HCI_UP: u32 = 0;

// _IOR('H', 210, int) / _IOR('H', 211, int)
pub const HCIGETDEVLIST: libc::c_ulong = 0x800448D2;
pub const HCIGETDEVINFO: libc::c_ulong = 0x800448D3;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SockaddrHci {
    pub hci_family: libc::sa_family_t,
    pub hci_dev: u16,
    pub hci_channel: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HciDevReq {
    pub dev_id: u16,
    pub dev_opt: u32,
}

#[repr(C)]
pub struct HciDevListReq {
    pub dev_num: u16,
    pub dev_req: [HciDevReq; HCI_MAX_DEV],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HciDevStats {
    pub err_rx: u32,
    pub err_tx: u32,
    pub cmd_tx: u32,
    pub evt_rx: u32,
    pub acl_tx: u32,
    pub acl_rx: u32,
    pub sco_tx: u32,
    pub sco_rx: u32,
    pub byte_rx: u32,
    pub byte_tx: u32,
}

/// Kernel-reported device snapshot, filled by `HCIGETDEVINFO`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct HciDevInfo {
    pub dev_id: u16,
    pub name: [u8; 8],
    pub bdaddr: [u8; 6],
    pub flags: u32,
    pub type_: u8,
    pub features: [u8; 8],
    pub pkt_type: u32,
    pub link_policy: u32,
    pub link_mode: u32,
    pub acl_mtu: u16,
    pub acl_pkts: u16,
    pub sco_mtu: u16,
    pub sco_pkts: u16,
    pub stat: HciDevStats,
}

/// An open HCI socket.
///
/// The descriptor is opened non-blocking so it can be registered with the
/// tokio reactor. All methods return raw [`Errno`] values; classification
/// into [`TransportError`](crate::TransportError) happens one layer up.
#[derive(Debug)]
pub struct HciSocket {
    fd: OwnedFd,
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for HciSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl HciSocket {
    /// Open a raw, non-blocking, close-on-exec HCI socket.
    pub fn open() -> Result<Self, Errno> {
        let fd = Errno::result(unsafe {
            libc::socket(
                libc::AF_BLUETOOTH,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                BTPROTO_HCI,
            )
        })?;
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Adopt a pre-opened descriptor.
    ///
    /// Used for loopback testing with socketpair-backed descriptors. The
    /// descriptor must already be non-blocking.
    pub fn from_owned_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Bind the socket to a device index on the given HCI channel.
    pub fn bind_channel(&self, dev_id: u16, channel: u16) -> Result<(), Errno> {
        let addr = SockaddrHci {
            hci_family: libc::AF_BLUETOOTH as libc::sa_family_t,
            hci_dev: dev_id,
            hci_channel: channel,
        };
        Errno::result(unsafe {
            libc::bind(
                self.as_raw_fd(),
                (&addr as *const SockaddrHci).cast::<libc::sockaddr>(),
                std::mem::size_of::<SockaddrHci>() as libc::socklen_t,
            )
        })
        .map(drop)
    }

    /// Fetch the kernel's snapshot of one device (`HCIGETDEVINFO`).
    pub fn device_info(&self, dev_id: u16) -> Result<HciDevInfo, Errno> {
        let mut info = HciDevInfo {
            dev_id,
            ..HciDevInfo::default()
        };
        Errno::result(unsafe {
            libc::ioctl(self.as_raw_fd(), HCIGETDEVINFO, &mut info as *mut HciDevInfo)
        })?;
        Ok(info)
    }

    /// Enumerate kernel-reported devices (`HCIGETDEVLIST`).
    pub fn device_list(&self) -> Result<Vec<HciDevReq>, Errno> {
        let mut list = HciDevListReq {
            dev_num: HCI_MAX_DEV as u16,
            dev_req: [HciDevReq::default(); HCI_MAX_DEV],
        };
        Errno::result(unsafe {
            libc::ioctl(self.as_raw_fd(), HCIGETDEVLIST, &mut list as *mut HciDevListReq)
        })?;
        let n = usize::from(list.dev_num).min(HCI_MAX_DEV);
        Ok(list.dev_req[..n].to_vec())
    }

    /// Install a kernel-side event filter. The blob is opaque here; each call
    /// fully replaces the previous filter.
    pub fn set_filter(&self, filter: &[u8]) -> Result<(), Errno> {
        Errno::result(unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                filter.as_ptr().cast::<libc::c_void>(),
                filter.len() as libc::socklen_t,
            )
        })
        .map(drop)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        let n = Errno::result(unsafe {
            libc::read(self.as_raw_fd(), buf.as_mut_ptr().cast::<libc::c_void>(), buf.len())
        })?;
        Ok(n as usize)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize, Errno> {
        let n = Errno::result(unsafe {
            libc::write(self.as_raw_fd(), buf.as_ptr().cast::<libc::c_void>(), buf.len())
        })?;
        Ok(n as usize)
    }
}
