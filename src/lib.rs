//! netline — cross-platform TCP/UDP socket facade
//!
//! A single object (`Line`) that wraps one OS socket handle and offers a
//! uniform, error-checked API across Windows (Winsock2) and POSIX (BSD
//! sockets): TCP and UDP, IPv4 and IPv6, blocking I/O with timeouts,
//! broadcast, keep-alive, and a readiness multiplexer that scales beyond the
//! platform-imposed 1024-descriptor limit of the classical `select` API on
//! POSIX.
//!
//! # Architecture
//!
//! ```text
//! +------------------------+
//! |        Line            |   connect / bind+accept / send / recv
//! +------------------------+
//! |   readiness multiplexer|   readable(handles, timeout)
//! +------------------------+
//! |      ip utilities      |   validate / normalize / link-local
//! +------------------------+
//! |   platform socket ops  |   unix (libc) / windows (windows-sys)
//! +------------------------+
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use netline::{Line, Kind, Family};
//!
//! netline::init().unwrap();
//!
//! let mut line = Line::new(Kind::Tcp, Family::V4);
//! line.connect_client("127.0.0.1", 8080, false).unwrap();
//! line.send(b"hello").unwrap();
//!
//! netline::shutdown().unwrap();
//! ```

pub mod config;
pub mod ip;
pub mod line;
pub mod platform;
pub mod prelude;
pub mod readiness;
pub mod resolve;

pub use config::LineConfig;
pub use line::{Family, Kind, Line};
pub use readiness::{readable, readable_any};

/// Error taxonomy for the socket facade.
///
/// Every fallible public function returns `Result<T, LineError>`; internal
/// helpers talking to `libc`/`windows-sys` return `std::io::Error` and are
/// mapped to one of these variants at the module boundary.
#[derive(thiserror::Error, Debug)]
pub enum LineError {
    #[error("invalid address: {0}")]
    AddressError(String),

    #[error("address resolution failed: {0}")]
    ResolveError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("connect failed: {0}")]
    ConnectError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal: a TCP send/recv/accept failure. The Line has already
    /// self-closed and fired `on_disconnected` by the time this is raised;
    /// callers typically treat it as "the loop should stop", not a
    /// diagnostic to surface.
    #[error("connection aborted")]
    SilentAbort,
}

/// Result type for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, LineError>;

/// Crate version, exposed for diagnostics/telemetry by embedding applications.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process-wide startup hook.
///
/// On Windows this calls `WSAStartup`; on POSIX it is a no-op. Embedding
/// applications must call this once before constructing any `Line`, and
/// call [`shutdown`] once when done. Calling it more than once is safe (the
/// Winsock reference count is incremented/decremented correctly by the OS).
pub fn init() -> Result<()> {
    platform::process_init()?;
    log::info!("netline {} initialized", VERSION);
    Ok(())
}

/// Process-wide teardown hook. See [`init`].
pub fn shutdown() -> Result<()> {
    platform::process_shutdown()?;
    log::info!("netline shutdown complete");
    Ok(())
}
