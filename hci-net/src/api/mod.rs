pub mod hci;

mod error;

pub use error::{Result, TransportError};

pub type Errno = nix::errno::Errno;
