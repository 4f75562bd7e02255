//! The per-socket façade: one OS handle, one peer, a small state machine,
//! and the connect/bind/accept/send/recv/option surface callers use.
//!
//! `Line` is the 75% of this crate's budget. It is written entirely against
//! `socket2::Socket` plus the [`crate::platform`] façade, so the TCP/UDP and
//! IPv4/IPv6 branches live here while the Windows/POSIX branches stay
//! confined to `platform`.

use crate::config::{clamp_buffer_size, LineConfig};
use crate::{ip, platform, readiness, resolve, LineError, Result};
use parking_lot::RwLock;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Transport flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Tcp,
    Udp,
}

/// Address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// Observable lifecycle state of a [`Line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Inactive,
    Active,
}

/// A connect/disconnect notification hook. Invoked at most once per state
/// transition; a panic inside the callback is caught and logged, never
/// propagated.
pub type OnConnected = Arc<dyn Fn(&Line) + Send + Sync>;
pub type OnDisconnected = Arc<dyn Fn(&Line) + Send + Sync>;

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic tick count used for `last_sent`/`last_received`. Not wall-clock
/// time — only deltas between two calls are meaningful.
fn now_ticks() -> u64 {
    CLOCK_EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

fn looks_like_ipv6_literal(host: &str) -> bool {
    host.contains(':')
}

pub struct Line {
    socket: RwLock<Option<Socket>>,
    kind: Kind,
    family: Family,
    active: AtomicBool,
    ever_activated: AtomicBool,
    last_sent: AtomicU64,
    last_received: AtomicU64,
    peer_ip: RwLock<String>,
    zone: RwLock<Option<String>>,
    connect_timeout_ms: AtomicU32,
    pending_receive_buffer: Option<u32>,
    pending_send_buffer: Option<u32>,
    data_object: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    on_connected: Option<OnConnected>,
    on_disconnected: Option<OnDisconnected>,
}

impl Line {
    /// Constructs an inactive Line with the given transport/family.
    /// `peer_ip` starts at `127.0.0.1` per the original's documented
    /// default, overwritten once the Line activates.
    pub fn new(kind: Kind, family: Family) -> Self {
        Self {
            socket: RwLock::new(None),
            kind,
            family,
            active: AtomicBool::new(false),
            ever_activated: AtomicBool::new(false),
            last_sent: AtomicU64::new(0),
            last_received: AtomicU64::new(0),
            peer_ip: RwLock::new("127.0.0.1".to_string()),
            zone: RwLock::new(None),
            connect_timeout_ms: AtomicU32::new(100),
            pending_receive_buffer: None,
            pending_send_buffer: None,
            data_object: RwLock::new(None),
            on_connected: None,
            on_disconnected: None,
        }
    }

    /// Constructs a Line using the defaults in `config` (kind, family,
    /// connect timeout, and buffer sizes applied once activated).
    pub fn with_config(config: &LineConfig) -> Self {
        let mut line = Self::new(config.kind, config.family);
        line.connect_timeout_ms = AtomicU32::new(config.connect_timeout_ms);
        line.pending_receive_buffer = config.receive_buffer;
        line.pending_send_buffer = config.send_buffer;
        line
    }

    /// Applies the config-supplied buffer sizes, if any, to a freshly
    /// created socket before it is published on `self.socket`.
    fn apply_pending_buffers(&self, sock: &Socket) -> Result<()> {
        if let Some(n) = self.pending_receive_buffer {
            sock.set_recv_buffer_size(clamp_buffer_size(n) as usize)
                .map_err(LineError::IoError)?;
        }
        if let Some(n) = self.pending_send_buffer {
            sock.set_send_buffer_size(clamp_buffer_size(n) as usize)
                .map_err(LineError::IoError)?;
        }
        Ok(())
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn state(&self) -> State {
        if self.active.load(Ordering::SeqCst) {
            State::Active
        } else {
            State::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peer_ip(&self) -> String {
        self.peer_ip.read().clone()
    }

    /// The zone-id stripped from a link-local IPv6 literal during the last
    /// `connect_client`, if any. Captured but not yet threaded through to
    /// the platform `connect`/`bind` call — see design notes on link-local
    /// scope-id handling.
    pub fn zone(&self) -> Option<String> {
        self.zone.read().clone()
    }

    pub fn last_sent(&self) -> u64 {
        self.last_sent.load(Ordering::Relaxed)
    }

    pub fn last_received(&self) -> u64 {
        self.last_received.load(Ordering::Relaxed)
    }

    pub fn connect_timeout_ms(&self) -> u32 {
        self.connect_timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_connect_timeout_ms(&self, ms: u32) {
        self.connect_timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Sets the opaque, crate-never-dereferenced user payload. Callers
    /// typically set this once, before activating the line.
    pub fn set_data_object(&self, obj: Arc<dyn Any + Send + Sync>) {
        *self.data_object.write() = Some(obj);
    }

    pub fn data_object(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.data_object.read().clone()
    }

    /// Must be called before activation; callbacks inherited by `accept` are
    /// whatever is set on the listener at the moment `accept` is called.
    pub fn set_on_connected(&mut self, cb: impl Fn(&Line) + Send + Sync + 'static) {
        self.on_connected = Some(Arc::new(cb));
    }

    pub fn set_on_disconnected(&mut self, cb: impl Fn(&Line) + Send + Sync + 'static) {
        self.on_disconnected = Some(Arc::new(cb));
    }

    /// Attempts to change the transport kind. Mutating while active is
    /// rejected explicitly (redesigned from the original's silent ignore).
    pub fn set_kind(&mut self, kind: Kind) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            return Err(LineError::ConfigError("cannot change kind while active".into()));
        }
        self.kind = kind;
        Ok(())
    }

    /// See [`Line::set_kind`].
    pub fn set_family(&mut self, family: Family) -> Result<()> {
        if self.active.load(Ordering::SeqCst) {
            return Err(LineError::ConfigError("cannot change family while active".into()));
        }
        self.family = family;
        Ok(())
    }

    /// Raw handle this Line currently owns, suitable for
    /// [`crate::readiness::readable`]. `None` while inactive.
    pub fn handle(&self) -> Option<readiness::Handle> {
        self.socket.read().as_ref().map(platform::handle_of)
    }

    fn fire_on_connected(&self) {
        if let Some(cb) = self.on_connected.clone() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(self)));
            if result.is_err() {
                log::warn!("on_connected callback panicked; suppressing");
            }
        }
    }

    fn fire_on_disconnected(&self) {
        if let Some(cb) = self.on_disconnected.clone() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(self)));
            if result.is_err() {
                log::warn!("on_disconnected callback panicked; suppressing");
            }
        }
    }

    /// Takes and drops the socket (closing the fd), flips `active`, and
    /// fires `on_disconnected` exactly once. Returns `false` if the Line was
    /// already inactive (idempotent no-op).
    fn close_internal(&self) -> bool {
        let mut guard = self.socket.write();
        if guard.is_none() {
            return false;
        }
        *guard = None;
        drop(guard);
        self.active.store(false, Ordering::SeqCst);
        self.fire_on_disconnected();
        true
    }

    /// Explicit close. Idempotent: a second call is a no-op and does not
    /// re-fire `on_disconnected`.
    pub fn close(&self) -> Result<()> {
        self.close_internal();
        Ok(())
    }

    fn domain(&self) -> Domain {
        match self.family {
            Family::V4 => Domain::IPV4,
            Family::V6 => Domain::IPV6,
        }
    }

    fn socket_type(&self) -> Type {
        match self.kind {
            Kind::Tcp => Type::STREAM,
            Kind::Udp => Type::DGRAM,
        }
    }

    fn protocol(&self) -> Protocol {
        match self.kind {
            Kind::Tcp => Protocol::TCP,
            Kind::Udp => Protocol::UDP,
        }
    }

    fn new_raw_socket(&self) -> Result<Socket> {
        Socket::new(self.domain(), self.socket_type(), Some(self.protocol())).map_err(LineError::IoError)
    }

    /// Connects this Line as a client. See the component-design steps in
    /// `SPEC_FULL.md` §4.4 for the exact sequence this follows.
    pub fn connect_client(&self, host: &str, port: u16, broadcast: bool) -> Result<()> {
        if self.ever_activated.swap(true, Ordering::SeqCst) {
            return Err(LineError::ConfigError(
                "line cannot be reactivated after close".into(),
            ));
        }

        if self.family == Family::V6 && looks_like_ipv6_literal(host) {
            if let Err(e) = ip::validate_ipv6_literal(host) {
                self.ever_activated.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
        if self.family == Family::V4 && ip::is_broadcast(host) && !broadcast {
            self.ever_activated.store(false, Ordering::SeqCst);
            return Err(LineError::ConfigError(format!(
                "{host} is a broadcast address; pass broadcast=true to target it"
            )));
        }

        let result = self.connect_client_inner(host, port, broadcast);
        if result.is_err() {
            // Allow a retry after a resolution/connect failure that never
            // reached activation (distinct from "forbidden after close").
            self.ever_activated.store(false, Ordering::SeqCst);
        }
        result
    }

    fn connect_client_inner(&self, host: &str, port: u16, broadcast: bool) -> Result<()> {
        let resolved = resolve::resolve_connect(host, port, self.family)?;
        *self.zone.write() = resolved.zone.clone();

        let sock = self.new_raw_socket()?;
        platform::apply_reuse_addr(&sock).map_err(LineError::IoError)?;
        self.apply_pending_buffers(&sock)?;

        let sock_addr = SockAddr::from(resolved.addr);

        match self.kind {
            Kind::Tcp => {
                let timeout = Duration::from_millis(self.connect_timeout_ms() as u64);
                sock.connect_timeout(&sock_addr, timeout)
                    .map_err(|e| LineError::ConnectError(e.to_string()))?;
            }
            Kind::Udp => match self.family {
                Family::V4 if broadcast => {
                    sock.set_broadcast(true).map_err(LineError::IoError)?;
                }
                Family::V4 => {
                    sock.connect(&sock_addr)
                        .map_err(|e| LineError::ConnectError(e.to_string()))?;
                }
                Family::V6 => {
                    // Left unbound-peer; see link-local scope-id gap in design notes.
                }
            },
        }

        let peer_ip_str = match self.kind {
            Kind::Tcp => ip::ip_from_storage(&resolved.addr).unwrap_or_else(|_| "0.0.0.0".to_string()),
            Kind::Udp => ip::any_address_sentinel(self.family).to_string(),
        };

        *self.peer_ip.write() = peer_ip_str;
        *self.socket.write() = Some(sock);
        self.active.store(true, Ordering::SeqCst);
        log::info!("line connected to {host}:{port}");
        self.fire_on_connected();
        Ok(())
    }

    /// Binds (and, for TCP, listens on) `port`. See §4.5.
    pub fn bind_server(&self, port: u16) -> Result<()> {
        if self.ever_activated.swap(true, Ordering::SeqCst) {
            return Err(LineError::ConfigError(
                "line cannot be reactivated after close".into(),
            ));
        }

        let result = self.bind_server_inner(port);
        if result.is_err() {
            self.ever_activated.store(false, Ordering::SeqCst);
        }
        result
    }

    fn bind_server_inner(&self, port: u16) -> Result<()> {
        let addr = resolve::resolve_bind(port, self.family)?;
        let sock = self.new_raw_socket()?;

        if self.family == Family::V6 {
            sock.set_only_v6(true).map_err(LineError::IoError)?;
        }
        platform::apply_reuse_addr(&sock).map_err(LineError::IoError)?;
        self.apply_pending_buffers(&sock)?;

        sock.bind(&SockAddr::from(addr)).map_err(LineError::IoError)?;
        if self.kind == Kind::Tcp {
            sock.listen(platform::somaxconn()).map_err(LineError::IoError)?;
        }

        *self.peer_ip.write() = ip::any_address_sentinel(self.family).to_string();
        *self.socket.write() = Some(sock);
        self.active.store(true, Ordering::SeqCst);
        log::info!("line listening on port {port}");
        self.fire_on_connected();
        Ok(())
    }

    /// Accepts one pending connection. Only valid on an active TCP listener.
    /// The returned Line inherits `kind`, `family`, and callback hooks, is
    /// already active, and has already fired its own `on_connected`.
    pub fn accept(&self) -> Result<Line> {
        if self.kind != Kind::Tcp {
            return Err(LineError::ConfigError("UDP lines cannot accept".into()));
        }
        if !self.is_active() {
            return Err(LineError::ConfigError("line is not active".into()));
        }

        let accept_result = {
            let guard = self.socket.read();
            let sock = guard
                .as_ref()
                .ok_or_else(|| LineError::ConfigError("line is not active".into()))?;
            sock.accept()
        };

        let (new_sock, raw_addr) = match accept_result {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("accept failed: {e}");
                return Err(LineError::SilentAbort);
            }
        };

        let peer_addr: SocketAddr = raw_addr
            .as_socket()
            .ok_or_else(|| LineError::AddressError("accepted peer has no socket address".into()))?;
        let peer_ip_str = ip::ip_from_storage(&peer_addr).unwrap_or_else(|_| "0.0.0.0".to_string());

        let new_line = Line {
            socket: RwLock::new(Some(new_sock)),
            kind: self.kind,
            family: self.family,
            active: AtomicBool::new(true),
            ever_activated: AtomicBool::new(true),
            last_sent: AtomicU64::new(0),
            last_received: AtomicU64::new(0),
            peer_ip: RwLock::new(peer_ip_str),
            zone: RwLock::new(None),
            connect_timeout_ms: AtomicU32::new(self.connect_timeout_ms()),
            pending_receive_buffer: self.pending_receive_buffer,
            pending_send_buffer: self.pending_send_buffer,
            data_object: RwLock::new(None),
            on_connected: self.on_connected.clone(),
            on_disconnected: self.on_disconnected.clone(),
        };

        log::debug!("accepted connection from {}", new_line.peer_ip());
        new_line.fire_on_connected();
        Ok(new_line)
    }

    /// Sends `buf`. A TCP send failure self-closes the Line and returns
    /// [`LineError::SilentAbort`]; a UDP send failure returns
    /// [`LineError::IoError`] without closing.
    pub fn send(&self, buf: &[u8]) -> Result<usize> {
        let send_result = {
            let guard = self.socket.read();
            let sock = guard
                .as_ref()
                .ok_or_else(|| LineError::ConfigError("line is not active".into()))?;
            sock.send(buf)
        };

        match send_result {
            Ok(n) => {
                self.last_sent.store(now_ticks(), Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => self.handle_data_path_error(e),
        }
    }

    /// Receives into `buf`. A TCP `recv` returning 0 (orderly peer close)
    /// or any error self-closes the Line and returns
    /// [`LineError::SilentAbort`]; a UDP error returns
    /// [`LineError::IoError`] without closing.
    pub fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let recv_result = {
            let guard = self.socket.read();
            let sock = guard
                .as_ref()
                .ok_or_else(|| LineError::ConfigError("line is not active".into()))?;
            // SAFETY: `recv` writes only initialized bytes into the prefix
            // of `buf` it reports reading; we hand it the buffer through
            // socket2's uninitialized-slice adapter and trust that contract.
            let uninit = unsafe {
                &mut *(buf as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
            };
            sock.recv(uninit)
        };

        match recv_result {
            Ok(0) if self.kind == Kind::Tcp => {
                log::debug!("peer closed connection");
                self.close_internal();
                Err(LineError::SilentAbort)
            }
            Ok(n) => {
                self.last_received.store(now_ticks(), Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => self.handle_data_path_error(e),
        }
    }

    fn handle_data_path_error<T>(&self, e: std::io::Error) -> Result<T> {
        if self.kind == Kind::Tcp {
            log::error!("tcp data path error, closing line: {e}");
            self.close_internal();
            Err(LineError::SilentAbort)
        } else {
            Err(LineError::IoError(e))
        }
    }

    fn with_socket<T>(&self, f: impl FnOnce(&Socket) -> std::io::Result<T>) -> Result<T> {
        let guard = self.socket.read();
        let sock = guard
            .as_ref()
            .ok_or_else(|| LineError::ConfigError("line is not active".into()))?;
        f(sock).map_err(LineError::IoError)
    }

    pub fn enable_no_delay(&self) -> Result<()> {
        if self.kind != Kind::Tcp {
            return Err(LineError::ConfigError("TCP_NODELAY requires a TCP line".into()));
        }
        self.with_socket(|s| s.set_nodelay(true))
    }

    pub fn enable_keep_alive(&self) -> Result<()> {
        if self.kind != Kind::Tcp {
            return Err(LineError::ConfigError("SO_KEEPALIVE requires a TCP line".into()));
        }
        self.with_socket(|s| s.set_keepalive(true))
    }

    pub fn enable_broadcast(&self) -> Result<()> {
        if self.kind != Kind::Udp {
            return Err(LineError::ConfigError("SO_BROADCAST requires a UDP line".into()));
        }
        self.with_socket(|s| s.set_broadcast(true))
    }

    /// No-op on an IPv4 line, matching the original's precondition.
    pub fn enable_ipv6_only(&self) -> Result<()> {
        if self.family != Family::V6 {
            return Ok(());
        }
        self.with_socket(|s| s.set_only_v6(true))
    }

    pub fn enable_reuse_address(&self) -> Result<()> {
        self.with_socket(|s| s.set_reuse_address(true))
    }

    pub fn set_receive_buffer(&self, n: u32) -> Result<()> {
        let n = clamp_buffer_size(n);
        self.with_socket(|s| s.set_recv_buffer_size(n as usize))
    }

    /// Sets `SO_SNDBUF`. The original set `SO_RCVBUF` here (a probable
    /// copy-paste bug); this implementation sets the send buffer as named.
    pub fn set_send_buffer(&self, n: u32) -> Result<()> {
        let n = clamp_buffer_size(n);
        self.with_socket(|s| s.set_send_buffer_size(n as usize))
    }

    pub fn receive_timeout(&self) -> Result<Option<Duration>> {
        self.with_socket(|s| s.read_timeout())
    }

    pub fn set_receive_timeout(&self, ms: Option<u32>) -> Result<()> {
        self.with_socket(|s| s.set_read_timeout(ms.map(|m| Duration::from_millis(m as u64))))
    }

    pub fn send_timeout(&self) -> Result<Option<Duration>> {
        self.with_socket(|s| s.write_timeout())
    }

    pub fn set_send_timeout(&self, ms: Option<u32>) -> Result<()> {
        self.with_socket(|s| s.set_write_timeout(ms.map(|m| Duration::from_millis(m as u64))))
    }
}

impl std::fmt::Debug for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Line")
            .field("kind", &self.kind)
            .field("family", &self.family)
            .field("state", &self.state())
            .field("peer_ip", &self.peer_ip())
            .finish()
    }
}

impl Drop for Line {
    fn drop(&mut self) {
        if self.close_internal() {
            log::debug!("line dropped while active; closed");
        }
    }
}
