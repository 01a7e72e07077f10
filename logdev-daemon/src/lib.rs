//! logdev daemon: notify-backed watch, event worker, character devices and
//! the control socket.

mod backend;
pub mod devices;
mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use backend::{mask_for_kind, NotifyBackend};
pub use devices::{DeviceKind, Devices, HELLO_REPLY, NULL2_REPLY};
pub use error::DaemonError;
pub use protocol::{
    request_read, request_status, request_stop, request_write, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{run, start_blocking};
