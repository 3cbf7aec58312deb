//! 命令客户端端到端测试
//!
//! 使用本地 Mock 端点（`merlin-net` 的 `mock` feature）验证完整的请求路径。

use merlin_client::{AcquisitionSettings, ClientBuilder, ClientError, CommandClient};
use merlin_net::{Connection, MockEndpoint, TcpConfig, TcpTransport};
use merlin_protocol::{PropertyValue, StatusError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn client_for(endpoint: &MockEndpoint) -> CommandClient {
    ClientBuilder::new()
        .port(endpoint.port())
        .read_timeout(Duration::from_millis(500))
        .settle_delay(Duration::ZERO)
        .build()
        .unwrap()
}

#[test]
fn test_set_hvbias_success() {
    let endpoint = MockEndpoint::echo(",0").unwrap();
    let client = client_for(&endpoint);

    client.set("HVBIAS", 120).unwrap();
    assert_eq!(
        endpoint.received(),
        vec![b"MPX,0000000015,SET,HVBIAS,120".to_vec()]
    );
}

#[test]
fn test_set_hvbias_out_of_range() {
    let endpoint = MockEndpoint::echo(",3").unwrap();
    let client = client_for(&endpoint);

    let err = client.set("HVBIAS", 120).unwrap_err();
    assert_eq!(err.status(), Some(StatusError::OutOfRange));
}

#[test]
fn test_busy_surfaces_immediately() {
    let endpoint = MockEndpoint::echo(",1").unwrap();
    let client = client_for(&endpoint);

    let err = client.start_acquisition().unwrap_err();
    assert!(err.is_busy());
    assert_eq!(endpoint.received().len(), 1);
}

#[test]
fn test_unknown_status_is_not_success() {
    let endpoint = MockEndpoint::echo(",9").unwrap();
    let client = client_for(&endpoint);

    let err = client.get("GAIN").unwrap_err();
    assert_eq!(err.status(), Some(StatusError::Unknown('9')));
}

#[test]
fn test_name_mismatch_from_endpoint() {
    let endpoint = MockEndpoint::with_responder(|_| b"MPX,0000000009,GET,GAIN,0".to_vec()).unwrap();
    let client = client_for(&endpoint);

    let err = client.get("HVBIAS").unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[test]
fn test_get_property_from_reply() {
    let endpoint = MockEndpoint::with_responder(|request| {
        let mut reply = request.to_vec();
        reply.extend_from_slice(b",24,0");
        reply
    })
    .unwrap();
    let client = client_for(&endpoint);

    assert_eq!(
        client.get_property("COUNTERDEPTH").unwrap(),
        PropertyValue::Integer(24)
    );
}

#[test]
fn test_serialized_requests_from_threads() {
    let endpoint = MockEndpoint::echo_success().unwrap();
    let client = client_for(&endpoint);

    std::thread::scope(|s| {
        for i in 0..4 {
            let client = &client;
            s.spawn(move || {
                for _ in 0..5 {
                    client.set("THRESHOLD0", i).unwrap();
                }
            });
        }
    });
    assert_eq!(endpoint.received().len(), 20);
}

#[test]
fn test_acquisition_settings_sequence() {
    let endpoint = MockEndpoint::echo_success().unwrap();
    let client = client_for(&endpoint);

    client
        .start_acquisition_with(&AcquisitionSettings::default())
        .unwrap();
    let received = endpoint.received();
    assert_eq!(received.len(), 12);
    assert!(received[0].ends_with(b"SET,HVBIAS,120"));
    assert!(received[11].ends_with(b"CMD,STARTACQUISITION"));
}

#[test]
fn test_settings_stop_on_first_failure() {
    let endpoint = MockEndpoint::echo(",3").unwrap();
    let client = client_for(&endpoint);

    assert!(
        client
            .start_acquisition_with(&AcquisitionSettings::default())
            .is_err()
    );
    assert_eq!(endpoint.received().len(), 1);
}

#[test]
fn test_receive_timeout_propagates() {
    let endpoint = MockEndpoint::silent().unwrap();
    let client = ClientBuilder::new()
        .port(endpoint.port())
        .read_timeout(Duration::from_millis(100))
        .settle_delay(Duration::ZERO)
        .build()
        .unwrap();

    let err = client.get("GAIN").unwrap_err();
    assert!(err.is_timeout());
    assert!(!err.is_connection_failed());
    assert_eq!(client.reconnect_count(), 0);
    assert!(!client.is_connected());
}

#[test]
fn test_out_of_range_reply_split_at_declared_length() {
    let endpoint = MockEndpoint::echo(",3").unwrap();
    // 首次读取恰好是声明长度（即回显的请求），状态字段在第二次读取中
    let client = ClientBuilder::new()
        .port(endpoint.port())
        .read_timeout(Duration::from_millis(500))
        .recv_capacity(29)
        .settle_delay(Duration::ZERO)
        .build()
        .unwrap();

    for _ in 0..2 {
        let err = client.set("HVBIAS", 120).unwrap_err();
        assert_eq!(err.status(), Some(StatusError::OutOfRange));
    }
    assert_eq!(endpoint.received().len(), 2);
}

#[test]
fn test_late_reply_not_read_by_next_request() {
    let calls = Arc::new(AtomicUsize::new(0));
    let endpoint = {
        let calls = calls.clone();
        MockEndpoint::with_responder(move |request| {
            let mut reply = request.to_vec();
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                // 第一次回复迟于客户端读超时
                std::thread::sleep(Duration::from_millis(300));
                reply.extend_from_slice(b",3");
            } else {
                reply.extend_from_slice(b",0");
            }
            reply
        })
        .unwrap()
    };
    let client = ClientBuilder::new()
        .port(endpoint.port())
        .read_timeout(Duration::from_millis(100))
        .settle_delay(Duration::ZERO)
        .build()
        .unwrap();

    assert!(client.set("HVBIAS", 120).unwrap_err().is_timeout());
    std::thread::sleep(Duration::from_millis(400));
    client.set("HVBIAS", 120).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_connect_refused() {
    // 先占用端口再释放，确保无人监听
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = ClientBuilder::new()
        .port(port)
        .connect_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let err = client.get("GAIN").unwrap_err();
    assert!(matches!(
        err,
        ClientError::Net(merlin_net::NetError::ConnectionFailed { .. })
    ));
    assert!(err.is_connection_failed());
}

#[test]
fn test_generic_client_over_tcp_transport() {
    let endpoint = MockEndpoint::echo_success().unwrap();
    let transport = TcpTransport::new(TcpConfig::new("127.0.0.1", endpoint.port()));
    let client = CommandClient::with_connection(Connection::new(transport));

    client.cmd("SOFTTRIGGER").unwrap();
    assert!(client.is_connected());
    assert_eq!(
        client.to_string(),
        format!("<CommandClient, 127.0.0.1:{}>", endpoint.port())
    );
}
