use crate::api::hci::{HCI_UP, HciDevInfo, HciDevReq};

/// How the binder picks an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSelection {
    /// First kernel-reported device whose up/down flag matches the channel
    /// mode's requirement (raw wants an up adapter, user channel wants a down
    /// one). Fails with `NoDeviceFound` when nothing matches.
    #[default]
    First,
    /// A fixed adapter index, bound without enumeration.
    Index(u16),
}

/// Per-direction byte and packet counters from the kernel snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
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

/// Transient kernel-reported device snapshot.
///
/// Fetched on demand at bind time and on up/down queries; never cached
/// beyond the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: u16,
    pub name: String,
    /// Local 6-byte controller address, as reported (little-endian).
    pub address: [u8; 6],
    /// Raw address type byte. See [`normalize_address_type`] for the value
    /// the session records.
    pub address_type: u8,
    pub flags: u32,
    pub features: [u8; 8],
    pub acl_mtu: u16,
    pub acl_pkts: u16,
    pub sco_mtu: u16,
    pub sco_pkts: u16,
    pub stats: TrafficStats,
}

impl DeviceDescriptor {
    pub fn is_up(&self) -> bool {
        flag_is_up(self.flags)
    }
}

impl From<&HciDevInfo> for DeviceDescriptor {
    fn from(info: &HciDevInfo) -> Self {
        let name_len = info.name.iter().position(|&b| b == 0).unwrap_or(info.name.len());
        Self {
            id: info.dev_id,
            name: String::from_utf8_lossy(&info.name[..name_len]).into_owned(),
            address: info.bdaddr,
            address_type: info.type_,
            flags: info.flags,
            features: info.features,
            acl_mtu: info.acl_mtu,
            acl_pkts: info.acl_pkts,
            sco_mtu: info.sco_mtu,
            sco_pkts: info.sco_pkts,
            stats: TrafficStats {
                err_rx: info.stat.err_rx,
                err_tx: info.stat.err_tx,
                cmd_tx: info.stat.cmd_tx,
                evt_rx: info.stat.evt_rx,
                acl_tx: info.stat.acl_tx,
                acl_rx: info.stat.acl_rx,
                sco_tx: info.stat.sco_tx,
                sco_rx: info.stat.sco_rx,
                byte_rx: info.stat.byte_rx,
                byte_tx: info.stat.byte_tx,
            },
        }
    }
}

pub(crate) fn flag_is_up(flags: u32) -> bool {
    flags & (1 << HCI_UP) != 0
}

/// Address type 1 is public; the kernel reports 3 for some controllers,
/// which is treated as public. Never persisted as-is.
pub(crate) fn normalize_address_type(raw: u8) -> u8 {
    if raw == 3 { 1 } else { raw }
}

/// Pick the first enumerated device whose up/down flag matches the request.
pub fn select_device(entries: &[HciDevReq], want_up: bool) -> Option<u16> {
    entries
        .iter()
        .find(|req| flag_is_up(req.dev_opt) == want_up)
        .map(|req| req.dev_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::hci::HciDevStats;

    fn req(dev_id: u16, up: bool) -> HciDevReq {
        HciDevReq {
            dev_id,
            dev_opt: if up { 1 << HCI_UP } else { 0 },
        }
    }

    #[test]
    fn test_normalize_address_type() {
        assert_eq!(normalize_address_type(0), 0);
        assert_eq!(normalize_address_type(1), 1);
        assert_eq!(normalize_address_type(2), 2);
        // 3 is remapped to public and never persists
        assert_eq!(normalize_address_type(3), 1);
        assert_eq!(normalize_address_type(4), 4);
    }

    #[test]
    fn test_select_device_first_match() {
        let entries = [req(0, false), req(1, true), req(2, true)];
        assert_eq!(select_device(&entries, true), Some(1));
        assert_eq!(select_device(&entries, false), Some(0));
    }

    #[test]
    fn test_select_device_no_match() {
        let entries = [req(0, false), req(1, false)];
        assert_eq!(select_device(&entries, true), None);
        assert_eq!(select_device(&[], true), None);
    }

    #[test]
    fn test_descriptor_from_info() {
        let mut info = HciDevInfo {
            dev_id: 2,
            flags: 1 << HCI_UP,
            type_: 3,
            acl_mtu: 1021,
            acl_pkts: 8,
            stat: HciDevStats {
                byte_rx: 4096,
                ..HciDevStats::default()
            },
            ..HciDevInfo::default()
        };
        info.name[..4].copy_from_slice(b"hci2");
        info.bdaddr = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];

        let desc = DeviceDescriptor::from(&info);
        assert_eq!(desc.id, 2);
        assert_eq!(desc.name, "hci2");
        assert!(desc.is_up());
        assert_eq!(desc.address, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        // snapshot keeps the raw type byte
        assert_eq!(desc.address_type, 3);
        assert_eq!(desc.acl_mtu, 1021);
        assert_eq!(desc.stats.byte_rx, 4096);
    }
}
