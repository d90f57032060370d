//! Integration tests for the tokio-backed transports.
//!
//! The transports are non-blocking, so each test polls with a short sleep
//! until the expected frame shows up or a deadline passes.

#[cfg(feature = "tokio-net")]
mod tokio_net {
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    use orbit_transport::{
        Connection, Connector, DatagramSocket, Listener, TcpConnector, TcpTransport,
        TransportError, UdpEndpoint,
    };

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime should build")
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    /// Polls `f` until it yields a value or two seconds pass.
    fn poll_until<T>(mut f: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(value) = f() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out waiting");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_tcp_accept_and_exchange_frames() {
        let rt = runtime();
        let mut listener = TcpTransport::bind(loopback(), rt.handle()).expect("should bind");
        let mut connector = TcpConnector::new(rt.handle().clone());

        let mut client = connector.connect(listener.local_addr()).unwrap();
        client.send(b"first").unwrap();
        client.send(b"second").unwrap();

        let mut server = poll_until(|| listener.try_accept().unwrap());
        assert_eq!(server.remote_addr().ip(), client.remote_addr().ip());

        let first = poll_until(|| server.try_recv().unwrap());
        let second = poll_until(|| server.try_recv().unwrap());
        assert_eq!(first, b"first");
        assert_eq!(second, b"second");

        server.send(b"").unwrap();
        let empty = poll_until(|| client.try_recv().unwrap());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_tcp_close_is_reported_to_peer() {
        let rt = runtime();
        let mut listener = TcpTransport::bind(loopback(), rt.handle()).unwrap();
        let mut connector = TcpConnector::new(rt.handle().clone());

        let mut client = connector.connect(listener.local_addr()).unwrap();
        let mut server = poll_until(|| listener.try_accept().unwrap());

        client.send(b"bye").unwrap();
        client.close();

        assert_eq!(poll_until(|| server.try_recv().unwrap()), b"bye");
        let err = poll_until(|| server.try_recv().err());
        assert!(matches!(err, TransportError::ConnectionClosed(_)));
    }

    #[test]
    fn test_tcp_connect_refused_reports_failure() {
        let rt = runtime();
        // Bind then drop to get a port with nothing listening on it.
        let addr = {
            let listener = std::net::TcpListener::bind(loopback()).unwrap();
            listener.local_addr().unwrap()
        };
        let mut connector = TcpConnector::new(rt.handle().clone());
        let mut client = connector.connect(addr).unwrap();

        let err = poll_until(|| client.try_recv().err());
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
    }

    #[test]
    fn test_tcp_oversized_frame_rejected() {
        let rt = runtime();
        let listener = TcpTransport::bind(loopback(), rt.handle()).unwrap();
        let mut connector = TcpConnector::new(rt.handle().clone());
        let mut client = connector.connect(listener.local_addr()).unwrap();

        let frame = vec![0u8; orbit_transport::MAX_FRAME_LEN + 1];
        assert!(matches!(
            client.send(&frame),
            Err(TransportError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_tcp_set_accepting_toggles() {
        let rt = runtime();
        let mut listener = TcpTransport::bind(loopback(), rt.handle()).unwrap();
        assert!(listener.is_accepting());
        listener.set_accepting(false);
        assert!(!listener.is_accepting());
        listener.set_accepting(true);
        assert!(listener.is_accepting());
    }

    #[test]
    fn test_udp_unicast_round_trip() {
        let rt = runtime();
        let mut a = UdpEndpoint::bind(loopback(), rt.handle()).unwrap();
        let mut b = UdpEndpoint::bind(loopback(), rt.handle()).unwrap();

        a.send_to(b"ping", b.local_addr()).unwrap();
        let (datagram, from) = poll_until(|| b.try_recv_from().unwrap());
        assert_eq!(datagram, b"ping");
        assert_eq!(from.port(), a.local_addr().port());

        b.send_to(b"pong", from).unwrap();
        let (reply, _) = poll_until(|| a.try_recv_from().unwrap());
        assert_eq!(reply, b"pong");
    }
}
