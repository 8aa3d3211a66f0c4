//! End-to-end exchanges over a loopback transport.

use std::sync::Arc;
use std::time::Duration;

use linkwave_protocol::{
    codes, ClientConfig, Connection, ConnectionObserver, ConnectionObservers, ConnectionState,
    Frame, LoopbackTransport, MessageQueueManager, PacketOutcome, PacketState, SignGenerator,
};

fn build_stack() -> (Arc<MessageQueueManager>, Arc<LoopbackTransport>) {
    let transport = Arc::new(LoopbackTransport::new());
    let observers = Arc::new(ConnectionObservers::new());
    let connection = Arc::new(Connection::new(transport.clone(), observers));
    connection.connect().unwrap();

    let manager = Arc::new(MessageQueueManager::new(
        ClientConfig::default(),
        Arc::new(SignGenerator::new()),
        connection,
    ));
    (manager, transport)
}

/// Pump written request frames back as successful echo responses.
fn spawn_echo(manager: Arc<MessageQueueManager>, transport: Arc<LoopbackTransport>) {
    tokio::spawn(async move {
        loop {
            for bytes in transport.drain_written() {
                let request = Frame::decode(&bytes).expect("client wrote a valid frame");
                manager.dispatch(Frame::response_ok(request.sign, request.payload));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
}

#[tokio::test]
async fn request_resolves_with_echoed_payload() {
    let (manager, transport) = build_stack();
    spawn_echo(manager.clone(), transport);

    let packet = manager.submit(b"who am i".to_vec()).unwrap();
    let outcome = packet.wait(Duration::from_secs(20)).await.unwrap();

    assert_eq!(outcome, PacketOutcome::Success(b"who am i".to_vec()));
    assert_eq!(manager.pending_count(), 0);
}

#[tokio::test]
async fn concurrent_requests_each_get_their_own_response() {
    let (manager, transport) = build_stack();
    spawn_echo(manager.clone(), transport);

    let mut waiters = Vec::new();
    for i in 0..32u32 {
        let packet = manager.submit(format!("req-{i}").into_bytes()).unwrap();
        waiters.push((i, packet));
    }

    for (i, packet) in waiters {
        let outcome = packet.wait(Duration::from_secs(20)).await.unwrap();
        assert_eq!(outcome, PacketOutcome::Success(format!("req-{i}").into_bytes()));
    }
    assert_eq!(manager.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_server_times_out_and_packet_is_gone() {
    let (manager, _transport) = build_stack();

    let packet = manager.submit(b"anyone there".to_vec()).unwrap();
    let sign = packet.sign();

    let outcome = packet.wait(Duration::from_secs(20)).await.unwrap();
    match outcome {
        PacketOutcome::Fail { code, .. } => assert_eq!(code, codes::ERR_TIMEOUT),
        other => panic!("expected timeout failure, got {other:?}"),
    }

    // Aged out of the registry: a late response finds nobody.
    assert!(!manager.is_pending(sign));
    manager.dispatch(Frame::response_ok(sign, b"too late".to_vec()));
    assert_eq!(packet.state(), PacketState::Fail);
}

#[tokio::test]
async fn server_error_status_propagates_code_and_message() {
    let (manager, transport) = build_stack();

    let packet = manager.submit(b"fetch".to_vec()).unwrap();
    let written = transport.drain_written();
    let request = Frame::decode(&written[0]).unwrap();
    manager.dispatch(Frame::response_err(request.sign, 404, "conversation not found"));

    let outcome = packet.wait(Duration::from_secs(20)).await.unwrap();
    assert_eq!(
        outcome,
        PacketOutcome::Fail {
            code: 404,
            message: "conversation not found".to_string(),
        }
    );
}

struct CloseFailsPending {
    manager: Arc<MessageQueueManager>,
}

impl ConnectionObserver for CloseFailsPending {
    fn on_state_changed(&self, _old: ConnectionState, new: ConnectionState) {
        if new == ConnectionState::Closed {
            self.manager
                .fail_all_pending(codes::ERR_CONN_CLOSED, "connection closed");
        }
    }
}

#[tokio::test]
async fn closing_connection_fails_stale_packets() {
    let transport = Arc::new(LoopbackTransport::new());
    let observers = Arc::new(ConnectionObservers::new());
    let connection = Arc::new(Connection::new(transport, observers.clone()));
    connection.connect().unwrap();

    let manager = Arc::new(MessageQueueManager::new(
        ClientConfig::default(),
        Arc::new(SignGenerator::new()),
        connection.clone(),
    ));
    observers.subscribe(Arc::new(CloseFailsPending {
        manager: manager.clone(),
    }));

    let packet = manager.submit(b"in flight".to_vec()).unwrap();
    connection.close();

    let outcome = packet.wait(Duration::from_secs(20)).await.unwrap();
    assert_eq!(
        outcome,
        PacketOutcome::Fail {
            code: codes::ERR_CONN_CLOSED,
            message: "connection closed".to_string(),
        }
    );

    // The closed connection rejects further sends; a fresh submit fails
    // with an enqueue error rather than being silently dropped.
    let stale = manager.submit(b"after close".to_vec()).unwrap();
    assert_eq!(stale.error().unwrap().0, codes::ERR_ENQUEUE);
}
