use super::*;
use crate::queue::bounded;
use logbeat_protocol::Hello;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;

/// Records every write attempt; fails the attempt numbered `fail_on`
#[derive(Clone, Default)]
struct Recorder {
    attempts: Arc<Mutex<Vec<String>>>,
    delivered: Arc<Mutex<Vec<String>>>,
    sends: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

struct MockConnector {
    recorder: Recorder,
    fail_on: Option<usize>,
    refuse_first_connects: usize,
}

struct MockLink {
    recorder: Recorder,
    fail_on: Option<usize>,
}

#[async_trait]
impl Connector for MockConnector {
    type Link = MockLink;

    async fn connect(&self) -> Result<MockLink, SendError> {
        let n = self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        if n < self.refuse_first_connects {
            return Err(SendError::ConnectionFailed {
                target: "mock".into(),
                source: std::io::Error::new(ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(MockLink {
            recorder: self.recorder.clone(),
            fail_on: self.fail_on,
        })
    }

    fn target(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl Link for MockLink {
    async fn send(&mut self, line: &str) -> Result<(), SendError> {
        let n = self.recorder.sends.fetch_add(1, Ordering::SeqCst);
        self.recorder.attempts.lock().push(line.to_string());
        if Some(n) == self.fail_on {
            return Err(SendError::WriteFailed(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        self.recorder.delivered.lock().push(line.to_string());
        Ok(())
    }
}

fn fast_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(1), Duration::from_millis(4))
}

#[test]
fn test_backoff_doubles_to_cap_and_resets() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(5));
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    assert_eq!(backoff.next_delay(), Duration::from_secs(5));

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
}

#[test]
fn test_backoff_max_below_initial_is_raised() {
    let mut backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(1));
    assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    assert_eq!(backoff.next_delay(), Duration::from_secs(3));
}

#[tokio::test]
async fn test_failed_write_resends_only_the_in_flight_message() {
    let (producer, consumer) = bounded(16);
    let recorder = Recorder::default();
    let connector = MockConnector {
        recorder: recorder.clone(),
        fail_on: Some(2),
        refuse_first_connects: 0,
    };
    let metrics = Arc::new(ShipperMetrics::new());
    let cancel = CancellationToken::new();

    let sender = Sender::new(connector, consumer, Arc::clone(&metrics), fast_backoff(), cancel.clone());
    let task = tokio::spawn(sender.run());

    for i in 0..5 {
        producer.put(LogMessage::new(format!("m{i}"))).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(2), producer.join())
        .await
        .unwrap()
        .unwrap();

    cancel.cancel();
    task.await.unwrap();

    assert_eq!(*recorder.delivered.lock(), vec!["m0", "m1", "m2", "m3", "m4"]);
    assert_eq!(
        *recorder.attempts.lock(),
        vec!["m0", "m1", "m2", "m2", "m3", "m4"]
    );
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 2);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.messages_sent, 5);
    assert_eq!(snapshot.send_failures, 1);
    assert_eq!(snapshot.connects, 2);
}

#[tokio::test]
async fn test_refused_connects_are_retried_without_losing_messages() {
    let (producer, consumer) = bounded(4);
    let recorder = Recorder::default();
    let connector = MockConnector {
        recorder: recorder.clone(),
        fail_on: None,
        refuse_first_connects: 3,
    };
    let cancel = CancellationToken::new();
    let sender = Sender::new(
        connector,
        consumer,
        Arc::new(ShipperMetrics::new()),
        fast_backoff(),
        cancel.clone(),
    );
    let task = tokio::spawn(sender.run());

    producer.put(LogMessage::new("only")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), producer.join())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*recorder.delivered.lock(), vec!["only"]);
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 4);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn test_cancel_stops_sender_while_collector_is_down() {
    let (producer, consumer) = bounded(4);
    let connector = MockConnector {
        recorder: Recorder::default(),
        fail_on: None,
        refuse_first_connects: usize::MAX,
    };
    let cancel = CancellationToken::new();
    let sender = Sender::new(
        connector,
        consumer,
        Arc::new(ShipperMetrics::new()),
        Backoff::new(Duration::from_secs(60), Duration::from_secs(60)),
        cancel.clone(),
    );
    let task = tokio::spawn(sender.run());

    producer.put(LogMessage::new("stuck")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("sender should stop on cancel")
        .unwrap();
    assert_eq!(producer.pending(), 1);
}

#[tokio::test]
async fn test_sender_exits_when_producers_are_gone() {
    let (producer, consumer) = bounded(4);
    let connector = MockConnector {
        recorder: Recorder::default(),
        fail_on: None,
        refuse_first_connects: 0,
    };
    let sender = Sender::new(
        connector,
        consumer,
        Arc::new(ShipperMetrics::new()),
        fast_backoff(),
        CancellationToken::new(),
    );
    let task = tokio::spawn(sender.run());

    drop(producer);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}

fn transport(password: &str) -> TransportConfig {
    TransportConfig {
        username: "shipper".into(),
        password: password.into(),
        connect_timeout: Duration::from_secs(2),
        write_timeout: Duration::from_secs(2),
        reconnect_interval: Duration::from_millis(10),
        max_reconnect_interval: Duration::from_millis(40),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_tcp_connector_denied_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut hello = String::new();
        reader.read_line(&mut hello).await.unwrap();
        write_line(reader.get_mut(), &Reply::Denied("bad credentials".into()).to_line())
            .await
            .unwrap();
    });

    let connector = TcpConnector::new(&transport("wrong")).with_target(addr.to_string());
    match connector.connect().await {
        Err(SendError::Handshake {
            source: ProtocolError::Denied(reason),
            ..
        }) => assert_eq!(reason, "bad credentials"),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("handshake should be denied"),
    }
}

#[tokio::test]
async fn test_tcp_sender_reconnects_after_dropped_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let credentials = Credentials::new("shipper", "secret");

    let server = tokio::spawn(async move {
        // First connection: read the hello, then hang up without replying
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        drop(reader);

        // Second connection: proper handshake, then collect two lines
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut hello = String::new();
        reader.read_line(&mut hello).await.unwrap();
        let parsed = Hello::parse(hello.trim_end()).unwrap();
        assert!(credentials.accepts(&parsed));
        write_line(reader.get_mut(), &Reply::Ok.to_line()).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 2 {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            received.push(line.trim_end().to_string());
        }
        received
    });

    let config = transport("secret");
    let connector = TcpConnector::new(&config).with_target(addr.to_string());
    let (producer, consumer) = bounded(8);
    let metrics = Arc::new(ShipperMetrics::new());
    let cancel = CancellationToken::new();
    let sender = Sender::new(
        connector,
        consumer,
        Arc::clone(&metrics),
        Backoff::from_transport(&config),
        cancel.clone(),
    );
    let task = tokio::spawn(sender.run());

    producer.put(LogMessage::new("first")).await.unwrap();
    producer.put(LogMessage::new("second")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), producer.join())
        .await
        .unwrap()
        .unwrap();

    let received = server.await.unwrap();
    assert_eq!(received, vec!["first", "second"]);
    assert_eq!(metrics.snapshot().connects, 1);

    cancel.cancel();
    task.await.unwrap();
}
