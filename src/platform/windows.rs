//! Windows (Winsock2) socket-ops backend.

use crate::readiness::Handle;
use crate::{LineError, Result};
use socket2::Socket;
use std::os::windows::io::AsRawSocket;
use windows_sys::Win32::Networking::WinSock as ws;

/// Starts Winsock for the process. Links directly against the Winsock
/// import library via `windows-sys` rather than probing for
/// `GetAddrInfoW` at runtime, so the floor is Windows Vista/Server 2008,
/// the first releases guaranteed to ship that symbol statically in
/// `ws2_32.dll`.
pub(crate) fn process_init() -> Result<()> {
    let mut wsa_data: ws::WSADATA = unsafe { std::mem::zeroed() };
    // Request the 2.2 Winsock API, the version every supported target ships.
    let version = (2u16) | (2u16 << 8);
    let rc = unsafe { ws::WSAStartup(version, &mut wsa_data) };
    if rc != 0 {
        return Err(LineError::IoError(std::io::Error::from_raw_os_error(rc)));
    }
    Ok(())
}

/// See [`process_init`].
pub(crate) fn process_shutdown() -> Result<()> {
    let rc = unsafe { ws::WSACleanup() };
    if rc != 0 {
        return Err(LineError::IoError(std::io::Error::last_os_error()));
    }
    Ok(())
}

pub(crate) fn as_handle(sock: &Socket) -> Handle {
    sock.as_raw_socket()
}

/// Windows has no POSIX-style `TIME_WAIT` address-reuse hazard for a client
/// socket, so this step of the connect/bind sequence is a no-op here.
pub(crate) fn apply_reuse_addr(_sock: &Socket) -> std::io::Result<()> {
    Ok(())
}

/// `listen` backlog used by `bind_server`.
pub(crate) fn somaxconn() -> i32 {
    ws::SOMAXCONN as i32
}
