//! Bound HCI session state: device selection, channel binding, filter setup
//! and the blocking write path.

mod device;
mod session;

pub use device::{DeviceDescriptor, DeviceSelection, TrafficStats, select_device};
pub use session::{BindOutcome, BindRequest, ChannelMode, DeviceBinder, HciBinder, RadioSession};
