//! End-to-end scenarios exercised through the public API only.

use netline::{Family, Kind, Line};
use std::io::{Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::time::Duration;

#[test]
fn tcp_client_against_std_echo_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 11];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&buf).unwrap();
    });

    let line = Line::new(Kind::Tcp, Family::V4);
    line.connect_client("127.0.0.1", addr.port(), false).unwrap();
    line.enable_no_delay().unwrap();

    line.send(b"hello world").unwrap();
    let mut buf = [0u8; 11];
    let n = line.recv(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello world");

    server.join().unwrap();
    line.close().unwrap();
}

#[test]
fn tcp_server_accepts_and_echoes_to_std_client() {
    let server = Line::new(Kind::Tcp, Family::V4);
    server.bind_server(18099).unwrap();

    let client_thread = std::thread::spawn(|| {
        let mut stream = std::net::TcpStream::connect("127.0.0.1:18099").unwrap();
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    });

    let accepted = server.accept().unwrap();
    let mut buf = [0u8; 4];
    accepted.recv(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");
    accepted.send(b"pong").unwrap();

    client_thread.join().unwrap();
}

#[test]
fn udp_unicast_exchanges_datagrams() {
    let server = Line::new(Kind::Udp, Family::V4);
    server.bind_server(18100).unwrap();

    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.send_to(b"ping", "127.0.0.1:18100").unwrap();

    let server_handle = server.handle().unwrap();
    let ready = netline::readable(&[server_handle], Duration::from_secs(1)).unwrap();
    assert_eq!(ready.len(), 1);
}

#[test]
fn udp_broadcast_requires_opt_in() {
    let line = Line::new(Kind::Udp, Family::V4);
    let err = line.connect_client("255.255.255.255", 18101, false).unwrap_err();
    assert!(matches!(err, netline::LineError::ConfigError(_)));

    let line = Line::new(Kind::Udp, Family::V4);
    line.connect_client("255.255.255.255", 18102, true).unwrap();
    line.close().unwrap();
}

#[test]
fn ipv6_link_local_literal_normalizes_and_resolves() {
    use netline::ip;
    let normalized = ip::normalize_address("FE80::0001%lo0");
    assert_eq!(normalized, "fe80::1%lo0");
    assert!(ip::is_link_local(&normalized));

    let line = Line::new(Kind::Tcp, Family::V6);
    // A link-local literal without a reachable peer still exercises
    // validation and zone stripping before the (expected) connect failure.
    let result = line.connect_client("fe80::1%lo0", 1, false);
    assert!(result.is_err());
}

#[test]
#[cfg(unix)]
fn readiness_scales_to_a_couple_hundred_descriptors() {
    const N: usize = 256;
    let mut listeners = Vec::with_capacity(N);
    let mut clients = Vec::with_capacity(N);

    for _ in 0..N {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        listeners.push(server_side);
        clients.push(client);
    }

    for (i, client) in clients.iter_mut().enumerate() {
        if i % 4 == 0 {
            client.write_all(&[7u8]).unwrap();
        }
    }

    use std::os::unix::io::AsRawFd;
    let handles: Vec<_> = listeners.iter().map(|l| l.as_raw_fd()).collect();
    let ready = netline::readable(&handles, Duration::from_millis(200)).unwrap();
    assert_eq!(ready.len(), N / 4);
}

#[test]
fn close_is_idempotent_and_disconnect_fires_once() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = std::thread::spawn(move || {
        let (_stream, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_millis(100));
    });

    let line = Line::new(Kind::Tcp, Family::V4);
    line.connect_client("127.0.0.1", addr.port(), false).unwrap();
    assert!(line.is_active());

    line.close().unwrap();
    assert!(!line.is_active());
    line.close().unwrap();
    assert!(!line.is_active());

    server.join().unwrap();
}
