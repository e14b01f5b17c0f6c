use mdns_reflector::{Endpoint, Family, UdpEndpoint, ACK};
use std::{net::SocketAddr, thread, time::Duration};

fn recv_one(endpoint: &UdpEndpoint, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
    for _ in 0..50 {
        if let Some(got) = endpoint.recv(buf).unwrap() {
            return Some(got);
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

/// This test covers: a fixed-port unicast endpoint talking to an ephemeral one
/// over loopback, replying to the exact source address.
#[test]
fn unicast_endpoint_round_trip() {
    let test_port = fastrand::u16(20000u16..30000u16);
    let mut server = UdpEndpoint::unicast(Family::V4, test_port);
    let mut client = UdpEndpoint::unicast(Family::V4, 0);

    let server_addr = server.start().expect("bind fixed port");
    assert_eq!(server_addr.port(), test_port);
    client.start().unwrap();
    assert!(server.is_running() && client.is_running());

    let query = [0u8; 12];
    client.send(&query, "127.0.0.1", test_port).unwrap();

    let mut buf = [0u8; 64];
    let (sz, from) = recv_one(&server, &mut buf).expect("query over loopback");
    assert_eq!(&buf[..sz], &query);

    server.send_to(ACK, from).unwrap();
    let (sz, reply_from) = recv_one(&client, &mut buf).expect("ACK over loopback");
    assert_eq!(&buf[..sz], ACK);
    assert_eq!(reply_from.port(), test_port);

    server.stop();
    client.stop();
    assert!(!server.is_running());
}
