use super::*;
use crate::error::SendError;
use crate::sender::Link;
use async_trait::async_trait;
use logbeat_protocol::{Hello, Reply, write_line};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Collected(Arc<Mutex<Vec<String>>>);

impl Collected {
    fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

struct MemoryConnector(Collected);
struct MemoryLink(Collected);

#[async_trait]
impl Connector for MemoryConnector {
    type Link = MemoryLink;

    async fn connect(&self) -> Result<MemoryLink, SendError> {
        Ok(MemoryLink(self.0.clone()))
    }

    fn target(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl Link for MemoryLink {
    async fn send(&mut self, line: &str) -> Result<(), SendError> {
        self.0.0.lock().push(line.to_string());
        Ok(())
    }
}

fn append(path: &Path, data: &str) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

fn config(watch: Vec<PathBuf>) -> ShipperConfig {
    ShipperConfig {
        watch,
        idle_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

fn backoff() -> Backoff {
    Backoff::new(Duration::from_millis(5), Duration::from_millis(20))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn spawn_memory(
    config: ShipperConfig,
) -> (
    Collected,
    Arc<ShipperMetrics>,
    mpsc::Sender<ControlCommand>,
    tokio::task::JoinHandle<Result<MetricsSnapshot, ShipperError>>,
) {
    let collected = Collected::default();
    let shipper =
        Shipper::with_connector(config, MemoryConnector(collected.clone()), backoff()).unwrap();
    let metrics = shipper.metrics();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(shipper.run(rx));
    (collected, metrics, tx, task)
}

#[test]
fn test_no_watch_targets_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = config(vec![dir.path().join("missing.log")]);
    let result = Shipper::with_connector(missing, MemoryConnector(Collected::default()), backoff());
    assert!(matches!(result, Err(ShipperError::NoWatchTargets { .. })));

    let empty = config(Vec::new());
    let result = Shipper::with_connector(empty, MemoryConnector(Collected::default()), backoff());
    assert!(matches!(result, Err(ShipperError::NoWatchTargets { .. })));
}

#[tokio::test]
async fn test_ships_only_new_lines_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, "old line\n");

    let (collected, _metrics, tx, task) = spawn_memory(config(vec![path.clone()]));

    append(&path, "new 1\nnew 2\n");
    wait_until(|| collected.lines().len() == 2).await;

    tx.send(ControlCommand::Shutdown).await.unwrap();
    let snapshot = task.await.unwrap().unwrap();

    assert_eq!(collected.lines(), vec!["new 1", "new 2"]);
    assert_eq!(snapshot.messages_sent, 2);
}

#[tokio::test]
async fn test_start_from_beginning_with_offset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, "skip\nkeep 1\nkeep 2\n");

    let mut cfg = config(vec![path.clone()]);
    cfg.start_position = StartPosition::Beginning;
    cfg.start_offset = 5;

    let (collected, _metrics, tx, task) = spawn_memory(cfg);
    wait_until(|| collected.lines().len() == 2).await;

    tx.send(ControlCommand::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();
    assert_eq!(collected.lines(), vec!["keep 1", "keep 2"]);
}

#[tokio::test]
async fn test_rotate_command_ships_tail_before_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, "");

    let mut cfg = config(vec![path.clone()]);
    // Long idle sleep so the unread tail is still unread when the command lands
    cfg.idle_interval = Duration::from_secs(30);
    let (collected, _metrics, tx, task) = spawn_memory(cfg);

    tokio::time::sleep(Duration::from_millis(50)).await;
    append(&path, "before rotation\n");
    std::fs::rename(&path, dir.path().join("access.log.1")).unwrap();
    append(&path, "");

    tx.send(ControlCommand::Rotate).await.unwrap();
    wait_until(|| collected.lines().len() == 1).await;

    append(&path, "after rotation\n");
    tx.send(ControlCommand::Reload(None)).await.unwrap();
    tx.send(ControlCommand::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(collected.lines(), vec!["before rotation", "after rotation"]);
}

#[tokio::test]
async fn test_offsets_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    append(&path, "");

    let mut cfg = config(vec![path.clone()]);
    cfg.offsets_file = Some(dir.path().join("offsets.json"));

    let (collected, _metrics, tx, task) = spawn_memory(cfg.clone());
    append(&path, "first run\n");
    wait_until(|| collected.lines().len() == 1).await;
    tx.send(ControlCommand::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();

    // Written while no shipper was running
    append(&path, "while stopped\n");

    let (collected, _metrics, tx, task) = spawn_memory(cfg);
    wait_until(|| collected.lines().len() == 1).await;
    tx.send(ControlCommand::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(collected.lines(), vec!["while stopped"]);
}

#[tokio::test]
async fn test_slow_log_block_flushed_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slow.log");
    append(&path, "");

    let mut cfg = config(vec![path.clone()]);
    cfg.format = logbeat_config::WatchFormat::MysqlSlow;
    let (collected, metrics, tx, task) = spawn_memory(cfg);

    append(
        &path,
        "# Time: 2024-03-05T10:00:00.000000Z\n\
         # User@Host: app[app] @ db1 [10.0.0.5]  Id:    42\n\
         # Query_time: 1.5  Lock_time: 0.1 Rows_sent: 3  Rows_examined: 900\n\
         SET timestamp=1709632800;\n\
         SELECT * FROM orders;\n",
    );
    wait_until(|| metrics.snapshot().lines_read == 5).await;

    tx.send(ControlCommand::Shutdown).await.unwrap();
    task.await.unwrap().unwrap();

    let lines = collected.lines();
    assert_eq!(lines.len(), 1);
    assert!(logbeat_protocol::is_slow_log_message(&lines[0]));
    assert!(lines[0].contains("SELECT * FROM orders;"));
}

#[tokio::test]
async fn test_graceful_shutdown_drains_queue_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut hello = String::new();
        reader.read_line(&mut hello).await.unwrap();
        assert!(Hello::parse(hello.trim_end()).is_ok());
        write_line(reader.get_mut(), &Reply::Ok.to_line()).await.unwrap();

        let mut received = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            // Slow consumer keeps the queue full
            if received.len() % 25 == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            received.push(line.trim_end().to_string());
        }
        received
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access.log");
    let expected: Vec<String> = (0..100).map(|i| format!("line {i}")).collect();
    append(&path, &(expected.join("\n") + "\n"));

    let mut cfg = config(vec![path.clone()]);
    cfg.start_position = StartPosition::Beginning;
    cfg.queue_capacity = 8;

    let transport = TransportConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        password: "secret".into(),
        reconnect_interval: Duration::from_millis(10),
        ..Default::default()
    };

    let shipper = Shipper::start(cfg, &transport).unwrap();
    let metrics = shipper.metrics();
    let (tx, rx) = mpsc::channel(1);
    let task = tokio::spawn(shipper.run(rx));

    wait_until(|| metrics.snapshot().lines_read == 100).await;
    tx.send(ControlCommand::Shutdown).await.unwrap();
    let snapshot = task.await.unwrap().unwrap();

    // Every line was written before the shipper returned
    assert_eq!(snapshot.messages_sent, 100);

    let received = server.await.unwrap();
    assert_eq!(received, expected);
}
