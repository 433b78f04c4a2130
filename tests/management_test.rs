//! Session-layer integration tests.
//!
//! These tests drive the management registry and its point-to-point
//! connections through the in-memory mock tunnel: handshake, numbered
//! sends with acknowledgement, rate limiting, and the teardown paths.
//!
//! Each test runs the demux loop next to the test body with `join`, the
//! same way an application drives `Management::run`. The test body comes
//! first so connection slots are claimed before the demux sees the
//! scripted messages.

use embassy_futures::join::join;
use embassy_time::Duration;

use knx_mgmt::addressing::IndividualAddress;
use knx_mgmt::protocol::cemi::{ControlField1, ControlField2, LData, Message};
use knx_mgmt::protocol::tpdu::{Apci, AppData, ControlData, TransportUnit};
use knx_mgmt::tunnel::mock::MockTunnel;
use knx_mgmt::Management;

const LOCAL_RAW: u16 = 0x1101;
const DEVICE_RAW: u16 = 0x1105;

fn local() -> IndividualAddress {
    IndividualAddress::from(LOCAL_RAW)
}

fn device() -> IndividualAddress {
    IndividualAddress::from(DEVICE_RAW)
}

fn ldata(src: u16, dst: u16, payload: TransportUnit) -> LData {
    LData {
        control1: ControlField1::from(0x90),
        control2: ControlField2::from(0x60),
        source: IndividualAddress::from(src),
        destination: dst,
        payload,
    }
}

/// The gateway's confirmation of our T_CONNECT.
fn connect_con() -> Message {
    Message::LDataCon(ldata(
        LOCAL_RAW,
        DEVICE_RAW,
        TransportUnit::Control(ControlData::t_connect()),
    ))
}

/// A T_ACK indication from the device.
fn device_ack(seq: u8) -> Message {
    Message::LDataInd(ldata(
        DEVICE_RAW,
        LOCAL_RAW,
        TransportUnit::Control(ControlData::t_ack(seq)),
    ))
}

/// An application response indication from the device.
fn device_response(seq: u8) -> Message {
    let mut app = AppData::new(Apci::MASK_VERSION_RESPONSE, &[0x07, 0xB0]).unwrap();
    app.numbered = true;
    app.seq_number = seq;
    Message::LDataInd(ldata(DEVICE_RAW, LOCAL_RAW, TransportUnit::Data(app)))
}

/// A peer-initiated T_DISCONNECT for our session.
fn peer_disconnect() -> Message {
    Message::LDataInd(ldata(
        LOCAL_RAW,
        DEVICE_RAW,
        TransportUnit::Control(ControlData::t_disconnect()),
    ))
}

fn mask_version_read() -> AppData {
    AppData::new(Apci::MASK_VERSION_READ, &[0x00]).unwrap()
}

/// Sequence number of the application data inside a sent request.
fn sent_seq(tunnel: &MockTunnel, idx: usize) -> u8 {
    let msg = tunnel.sent(idx).expect("message was sent");
    let app = msg.ldata().payload.as_app_data().expect("app data");
    assert!(app.numbered);
    app.seq_number
}

#[tokio::test]
async fn test_handshake_success() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    let ((), run_res) = join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();
            assert!(conn.is_connected());
            assert_eq!(conn.target_addr(), device());

            // The T_CONNECT request went out with the management flags.
            let sent = tunnel.sent(0).unwrap();
            assert_eq!(sent, Message::connect_req(local(), device()));

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await;

    run_res.unwrap();
}

#[tokio::test]
async fn test_handshake_timeout() {
    let tunnel = MockTunnel::new(local()).with_response_timeout(Duration::from_millis(100));
    let mgmt = Management::new(&tunnel);

    // No confirmation scripted.
    join(
        async {
            let err = mgmt.connect(device()).await.unwrap_err();
            assert!(err.is_response_timeout());

            // The failed attempt must not leak a registry entry.
            assert!(mgmt.get(device()).is_none());

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_send_receives_response_and_acks() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());
    tunnel.push_inbound(device_ack(0));
    tunnel.push_inbound(device_response(9));

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            let req = conn.data_req(mask_version_read());
            let res = conn
                .send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(1))
                .await
                .unwrap();

            let app = res.ldata().payload.as_app_data().unwrap();
            assert_eq!(app.command, Apci::MASK_VERSION_RESPONSE);
            assert_eq!(&app.data[..], &[0x07, 0xB0]);

            // connect, numbered request (seq 0), ack for the device's
            // sequence number 9.
            assert_eq!(tunnel.sent_count(), 3);
            assert_eq!(sent_seq(&tunnel, 1), 0);
            assert_eq!(tunnel.sent(2).unwrap(), Message::ack(local(), device(), 9));

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_send_requires_connection() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();
            conn.disconnect().await.unwrap();

            let req = conn.data_req(mask_version_read());
            let err = conn
                .send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_millis(50))
                .await
                .unwrap_err();
            assert!(err.is_not_connected());

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_ack_mismatch_keeps_session_usable() {
    let tunnel = MockTunnel::new(local()).with_response_timeout(Duration::from_millis(500));
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());
    // The device acknowledges the wrong sequence number.
    tunnel.push_inbound(device_ack(3));

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            let req = conn.data_req(mask_version_read());
            let err = conn
                .send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(err.is_ack_mismatch());

            // The session stays open; the next send uses a fresh
            // sequence number.
            assert!(conn.is_connected());
            tunnel.push_inbound(device_ack(1));
            tunnel.push_inbound(device_response(10));

            let req = conn.data_req(mask_version_read());
            conn.send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(1))
                .await
                .unwrap();

            assert_eq!(sent_seq(&tunnel, 1), 0);
            assert_eq!(sent_seq(&tunnel, 2), 1);

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_response_timeout() {
    let tunnel = MockTunnel::new(local()).with_response_timeout(Duration::from_millis(500));
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());
    tunnel.push_inbound(device_ack(0));
    // No application response scripted.

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            let req = conn.data_req(mask_version_read());
            let err = conn
                .send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_millis(100))
                .await
                .unwrap_err();
            assert!(err.is_response_timeout());

            // No auto-reconnect, no teardown: the session stays open.
            assert!(conn.is_connected());

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_rate_limit_spaces_sends() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());
    tunnel.push_inbound(device_ack(0));
    tunnel.push_inbound(device_response(1));
    tunnel.push_inbound(device_ack(1));
    tunnel.push_inbound(device_response(2));

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();
            conn.set_rate_limit(10);

            let req = conn.data_req(mask_version_read());
            conn.send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(1))
                .await
                .unwrap();

            let started = std::time::Instant::now();
            let req = conn.data_req(mask_version_read());
            conn.send(req, Apci::MASK_VERSION_RESPONSE, Duration::from_secs(1))
                .await
                .unwrap();

            // At 10 msgs/s the second transaction (request + returned
            // ACK) spans at least one full 100 ms interval.
            assert!(started.elapsed() >= std::time::Duration::from_millis(100));

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_connect_returns_existing_session() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            let first = mgmt.connect(device()).await.unwrap();
            let count = tunnel.sent_count();

            let second = mgmt.connect(device()).await.unwrap();
            assert!(core::ptr::eq(first, second));
            // No second handshake went out.
            assert_eq!(tunnel.sent_count(), count);

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_stale_session_is_replaced() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();
            conn.disconnect().await.unwrap();

            // The stale entry is evicted and a new handshake starts.
            tunnel.push_inbound(connect_con());
            let conn = mgmt.connect(device()).await.unwrap();
            assert!(conn.is_connected());

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_management_disconnect_removes_entry() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            mgmt.connect(device()).await.unwrap();
            assert!(mgmt.get(device()).is_some());

            mgmt.disconnect(device()).await.unwrap();
            assert!(mgmt.get(device()).is_none());

            // The T_DISCONNECT went out.
            assert_eq!(
                tunnel.last_sent().unwrap(),
                Message::disconnect_req(local(), device())
            );

            // A second disconnect reports the missing entry.
            assert!(mgmt.disconnect(device()).await.unwrap_err().is_not_found());

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_peer_disconnect_closes_session() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            tunnel.push_inbound(peer_disconnect());

            // The demux tears the session down; blocked reads observe
            // it.
            let err = conn.recv().await.unwrap_err();
            assert!(err.is_connection_closed());
            assert!(!conn.is_connected());

            // No T_DISCONNECT is sent back for a peer-initiated
            // teardown.
            assert_eq!(tunnel.sent_count(), 1);

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}

#[tokio::test]
async fn test_tunnel_closed_fails_blocked_operations() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    let ((), run_res) = join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            tunnel.close();

            let err = conn.recv().await.unwrap_err();
            assert!(err.is_tunnel_closed());
            assert!(!conn.is_connected());
        },
        mgmt.run(),
    )
    .await;

    assert!(run_res.unwrap_err().is_tunnel_closed());
}

#[tokio::test]
async fn test_inbound_queue_overflow_drops() {
    let tunnel = MockTunnel::new(local());
    let mgmt = Management::new(&tunnel);

    tunnel.push_inbound(connect_con());

    join(
        async {
            let conn = mgmt.connect(device()).await.unwrap();

            // Twelve indications against a queue of ten; the first ten
            // arrive in order, overflow is dropped.
            for seq in 0..12 {
                tunnel.push_inbound(device_response(seq));
            }

            for seq in 0..10 {
                let msg = conn.recv().await.unwrap();
                let app = msg.ldata().payload.as_app_data().unwrap();
                assert_eq!(app.seq_number, seq);
            }

            mgmt.close().await;
        },
        mgmt.run(),
    )
    .await
    .1
    .unwrap();
}
