//! Thin socket-ops façade, implemented once per platform.
//!
//! [`crate::line::Line`] is written entirely in terms of `socket2::Socket`
//! and the handful of functions here; the platform split stays confined to
//! this module instead of leaking `cfg(unix)`/`cfg(windows)` branches
//! throughout the façade.

use crate::readiness::Handle;
use socket2::Socket;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use self::unix::{apply_reuse_addr, as_handle, process_init, process_shutdown, somaxconn};

#[cfg(windows)]
pub(crate) use self::windows::{apply_reuse_addr, as_handle, process_init, process_shutdown, somaxconn};

/// Returns the raw handle [`crate::readiness::readable`] understands for a
/// given socket, without taking ownership.
pub(crate) fn handle_of(sock: &Socket) -> Handle {
    as_handle(sock)
}
