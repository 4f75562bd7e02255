//! POSIX socket-ops backend.

use crate::readiness::Handle;
use crate::Result;
use socket2::Socket;
use std::os::unix::io::AsRawFd;

/// No Winsock-equivalent bracket is required on POSIX.
pub(crate) fn process_init() -> Result<()> {
    Ok(())
}

/// See [`process_init`].
pub(crate) fn process_shutdown() -> Result<()> {
    Ok(())
}

pub(crate) fn as_handle(sock: &Socket) -> Handle {
    sock.as_raw_fd()
}

/// `connect_client` and `bind_server` both set `SO_REUSEADDR` on POSIX
/// before `connect`/`bind`; Windows has no equivalent requirement so its
/// half of this function is a no-op.
pub(crate) fn apply_reuse_addr(sock: &Socket) -> std::io::Result<()> {
    sock.set_reuse_address(true)
}

/// `listen` backlog used by `bind_server`.
pub(crate) fn somaxconn() -> i32 {
    libc::SOMAXCONN as i32
}
