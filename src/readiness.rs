//! The readiness multiplexer: given a set of OS handles and a millisecond
//! timeout, returns the subset currently readable (data available, peer
//! closed, or an incoming connection pending).
//!
//! The POSIX implementation is the interesting half: the native `select`
//! readiness primitive addresses descriptors through a fixed-size bitmap
//! capped at `FD_SETSIZE` (traditionally 1024). Rather than use
//! `libc::fd_set` directly — which would silently misbehave or panic past
//! that cap — this module builds its own appropriately sized bitmap and
//! hands the kernel an `nfds` sized to that bitmap instead of to
//! `FD_SETSIZE`. This is the one place in the crate where we reach past
//! `libc`'s typed wrappers into a raw syscall.
//!
//! The Windows implementation needs no such trick: WinSock's `fd_set` is a
//! length-prefixed array of handles, not a bitmap, so it is naturally sized
//! to the input set.

use std::time::Duration;

#[cfg(unix)]
pub type Handle = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type Handle = std::os::windows::io::RawSocket;

/// Blocks up to `timeout` waiting for any handle in `handles` to become
/// readable. Returns the subset that is ready at return time, preserving
/// input order. A zero timeout performs a non-blocking poll. An empty
/// `handles` returns empty immediately without issuing a syscall.
pub fn readable(handles: &[Handle], timeout: Duration) -> std::io::Result<Vec<Handle>> {
    if handles.is_empty() {
        return Ok(Vec::new());
    }
    imp::select_readable(handles, timeout)
}

/// Convenience: true iff [`readable`] returns a non-empty set.
pub fn readable_any(handles: &[Handle], timeout: Duration) -> std::io::Result<bool> {
    Ok(!readable(handles, timeout)?.is_empty())
}

#[cfg(unix)]
mod imp {
    use super::Handle;
    use std::time::Duration;

    /// Bits per word of our custom descriptor bitmap. `c_ulong` matches the
    /// word type the kernel's `fd_set` itself uses, so casting our buffer to
    /// `*mut libc::fd_set` below reads the layout the kernel expects.
    const BITS_PER_WORD: usize = std::mem::size_of::<libc::c_ulong>() * 8;

    /// Word count and `nfds` for a bitmap wide enough to hold `max_fd`. Pure
    /// sizing math, split out from `select_readable` so it can be checked
    /// without opening thousands of real descriptors: this is the part of
    /// the oversized-bitmap trick that actually needs to scale past
    /// `FD_SETSIZE`.
    pub(super) fn bitmap_sizing(max_fd: usize) -> (usize, libc::c_int) {
        let word_count = (max_fd + 1 + BITS_PER_WORD - 1) / BITS_PER_WORD;
        (word_count, (word_count * BITS_PER_WORD) as libc::c_int)
    }

    pub(super) fn select_readable(handles: &[Handle], timeout: Duration) -> std::io::Result<Vec<Handle>> {
        let max_fd = *handles.iter().max().expect("handles checked non-empty by caller");
        if max_fd < 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "negative file descriptor"));
        }
        let (word_count, nfds) = bitmap_sizing(max_fd as usize);
        let mut bitmap: Vec<libc::c_ulong> = vec![0; word_count];

        for &fd in handles {
            let idx = fd as usize / BITS_PER_WORD;
            let bit = fd as usize % BITS_PER_WORD;
            bitmap[idx] |= 1 << bit;
        }

        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        // SAFETY: `bitmap` is sized and laid out exactly as a kernel fd_set
        // of `word_count` words would be (an array of `c_ulong` bit-words);
        // `nfds` matches that size rather than the compiled-in
        // `FD_SETSIZE`, which is what lets this scale past 1024 descriptors.
        let ready = unsafe {
            libc::select(
                nfds,
                bitmap.as_mut_ptr() as *mut libc::fd_set,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut tv,
            )
        };

        if ready < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let mut result = Vec::with_capacity(ready as usize);
        for &fd in handles {
            let idx = fd as usize / BITS_PER_WORD;
            let bit = fd as usize % BITS_PER_WORD;
            if bitmap[idx] & (1 << bit) != 0 {
                result.push(fd);
            }
        }
        Ok(result)
    }
}

#[cfg(windows)]
mod imp {
    use super::Handle;
    use std::collections::HashSet;
    use std::time::Duration;
    use windows_sys::Win32::Networking::WinSock as ws;

    const HEADER_BYTES: usize = std::mem::size_of::<u32>();
    const SOCKET_BYTES: usize = std::mem::size_of::<ws::SOCKET>();

    /// WinSock's `fd_set` is `{ fd_count: u32, fd_array: [SOCKET; N] }`. We
    /// allocate a byte buffer sized to the input set rather than the
    /// default 64-entry `FD_SETSIZE`, write the header and handle array in,
    /// call `select`, and read the (possibly shrunk) array back out — the
    /// memcpy-in/memcpy-out shape the original Windows implementation used.
    fn build_buffer(handles: &[Handle]) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_BYTES + handles.len() * SOCKET_BYTES];
        buf[0..HEADER_BYTES].copy_from_slice(&(handles.len() as u32).to_ne_bytes());
        for (i, &h) in handles.iter().enumerate() {
            let start = HEADER_BYTES + i * SOCKET_BYTES;
            let sock = h as ws::SOCKET;
            buf[start..start + SOCKET_BYTES].copy_from_slice(&sock.to_ne_bytes());
        }
        buf
    }

    pub(super) fn select_readable(handles: &[Handle], timeout: Duration) -> std::io::Result<Vec<Handle>> {
        let mut buf = build_buffer(handles);
        let mut tv = ws::TIMEVAL {
            tv_sec: timeout.as_secs() as i32,
            tv_usec: timeout.subsec_micros() as i32,
        };

        // SAFETY: `buf` was sized and populated to match `ws::fd_set`'s
        // layout (`u32` count followed by a `SOCKET` array) for exactly
        // `handles.len()` entries; WinSock's `select` ignores its first
        // argument and reads/writes the fd_set structures by pointer.
        let ready = unsafe {
            ws::select(
                0,
                buf.as_mut_ptr() as *mut ws::fd_set,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                &mut tv,
            )
        };

        if ready == ws::SOCKET_ERROR {
            return Err(std::io::Error::last_os_error());
        }

        let ready_count = u32::from_ne_bytes(buf[0..HEADER_BYTES].try_into().unwrap()) as usize;
        let mut ready_set = HashSet::with_capacity(ready_count);
        for i in 0..ready_count {
            let start = HEADER_BYTES + i * SOCKET_BYTES;
            let sock = ws::SOCKET::from_ne_bytes(buf[start..start + SOCKET_BYTES].try_into().unwrap());
            ready_set.insert(sock as Handle);
        }

        Ok(handles.iter().copied().filter(|h| ready_set.contains(h)).collect())
    }
}
