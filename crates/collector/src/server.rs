//! Ingest server
//!
//! Accepts shipper connections on `[transport] host:port`. Each connection
//! authenticates once with a hello line, then streams newline-delimited
//! messages. Every message is parsed, routed to its month partition and
//! inserted before the next one is read, so rows from one connection land
//! in arrival order.
//!
//! Unparseable lines and failed inserts are logged and skipped; neither
//! closes the connection. Only a bad handshake or a transport error does.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use logbeat_config::{CollectorConfig, TransportConfig};
use logbeat_protocol::{
    Credentials, Hello, LineRead, ProtocolError, Reply, is_connection_reset, read_bounded_line,
    write_line,
};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::metrics::{IngestMetrics, IngestSnapshot};
use crate::parser::LineParser;
use crate::partition::PartitionRouter;
use crate::store::{LogStore, StoreWriter};

/// Longest accepted hello line
const MAX_HELLO_SIZE: usize = 1024;

/// State shared by every connection
struct Ingest {
    credentials: Credentials,
    max_message_size: usize,
    handshake_timeout: Duration,
    keepalive: Option<Duration>,
    parser: LineParser,
    router: PartitionRouter,
    writer: StoreWriter,
    metrics: Arc<IngestMetrics>,
}

pub struct IngestServer {
    address: String,
    ingest: Arc<Ingest>,
}

impl IngestServer {
    pub fn new(
        config: &CollectorConfig,
        transport: &TransportConfig,
        store: Arc<dyn LogStore>,
    ) -> Self {
        let metrics = Arc::new(IngestMetrics::new());
        let router = PartitionRouter::new(
            Arc::clone(&store),
            config.access_table_prefix.clone(),
            config.slow_table_prefix.clone(),
            Arc::clone(&metrics),
        );

        let ingest = Ingest {
            credentials: Credentials::new(&transport.username, &transport.password),
            max_message_size: config.max_message_size,
            handshake_timeout: config.handshake_timeout,
            keepalive: transport
                .tcp_keepalive
                .then_some(transport.tcp_keepalive_interval),
            parser: LineParser::new(),
            router,
            writer: StoreWriter::new(store),
            metrics,
        };

        Self {
            address: transport.address(),
            ingest: Arc::new(ingest),
        }
    }

    /// Replace the line parser (e.g. to render times at a fixed offset)
    ///
    /// Must be called before the server is shared.
    pub fn with_parser(mut self, parser: LineParser) -> Self {
        if let Some(ingest) = Arc::get_mut(&mut self.ingest) {
            ingest.parser = parser;
        }
        self
    }

    pub fn metrics(&self) -> IngestSnapshot {
        self.ingest.metrics.snapshot()
    }

    /// Bind the configured address and serve until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<IngestSnapshot, ServerError> {
        let listener =
            TcpListener::bind(&self.address)
                .await
                .map_err(|source| ServerError::Bind {
                    address: self.address.clone(),
                    source,
                })?;

        self.serve(listener, cancel).await
    }

    /// Serve connections from an already bound listener
    ///
    /// Existing partitions are loaded before the first accept. On
    /// cancellation each connection finishes the line it is processing
    /// and closes.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<IngestSnapshot, ServerError> {
        self.ingest.router.seed().await?;

        tracing::info!(
            address = %listener.local_addr()?,
            max_message_size = self.ingest.max_message_size,
            "collector listening"
        );

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                Some(_) = connections.join_next(), if !connections.is_empty() => {}

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        let handler = ConnectionHandler {
                            ingest: Arc::clone(&self.ingest),
                            peer_addr,
                            cancel: cancel.clone(),
                        };
                        connections.spawn(handler.handle(stream));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept error");
                    }
                },
            }
        }

        drop(listener);
        while connections.join_next().await.is_some() {}

        let snapshot = self.metrics();
        tracing::info!(
            connections = snapshot.connections_total,
            received = snapshot.messages_received,
            written = snapshot.records_written,
            parse_failures = snapshot.parse_failures,
            write_failures = snapshot.write_failures,
            partitions_created = snapshot.partitions_created,
            "collector stopped"
        );

        Ok(snapshot)
    }
}

/// Serves a single shipper connection
struct ConnectionHandler {
    ingest: Arc<Ingest>,
    peer_addr: SocketAddr,
    cancel: CancellationToken,
}

impl ConnectionHandler {
    async fn handle(self, stream: TcpStream) {
        self.ingest.metrics.connection_opened();
        self.configure_socket(&stream);

        let mut reader = BufReader::new(stream);

        match timeout(self.ingest.handshake_timeout, self.handshake(&mut reader)).await {
            Ok(Ok(username)) => {
                tracing::info!(peer = %self.peer_addr, username = %username, "shipper connected");
                self.read_loop(&mut reader).await;
            }
            Ok(Err(e)) => {
                self.ingest.metrics.auth_failure();
                tracing::warn!(peer = %self.peer_addr, error = %e, "handshake rejected");
            }
            Err(_) => {
                self.ingest.metrics.auth_failure();
                tracing::warn!(peer = %self.peer_addr, "handshake timed out");
            }
        }

        self.ingest.metrics.connection_closed();
        tracing::debug!(peer = %self.peer_addr, "connection closed");
    }

    fn configure_socket(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        if let Some(idle) = self.ingest.keepalive {
            let keepalive = TcpKeepalive::new().with_time(idle);

            #[cfg(target_os = "linux")]
            let keepalive = keepalive.with_interval(idle);

            if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %e, "failed to set TCP keep-alive");
            }
        }
    }

    /// Read and check the hello line, answering `OK` or `DENIED`
    ///
    /// Returns the authenticated username.
    async fn handshake(&self, reader: &mut BufReader<TcpStream>) -> Result<String, ProtocolError> {
        let mut buf = Vec::new();
        match read_bounded_line(reader, &mut buf, MAX_HELLO_SIZE).await? {
            LineRead::Line(_) => {}
            LineRead::Eof => return Err(ProtocolError::Closed),
            LineRead::TooLong(_) => {
                let reply = Reply::Denied("malformed handshake".into());
                write_line(reader.get_mut(), &reply.to_line()).await?;
                return Err(ProtocolError::LineTooLong {
                    max: MAX_HELLO_SIZE,
                });
            }
        }

        let hello = match Hello::parse(&String::from_utf8_lossy(&buf)) {
            Ok(hello) => hello,
            Err(e) => {
                let reply = Reply::Denied("malformed handshake".into());
                write_line(reader.get_mut(), &reply.to_line()).await?;
                return Err(e);
            }
        };

        if !self.ingest.credentials.accepts(&hello) {
            let reply = Reply::Denied("invalid credentials".into());
            write_line(reader.get_mut(), &reply.to_line()).await?;
            return Err(ProtocolError::Denied(format!(
                "invalid credentials for '{}'",
                hello.username
            )));
        }

        write_line(reader.get_mut(), &Reply::Ok.to_line()).await?;
        Ok(hello.username)
    }

    async fn read_loop(&self, reader: &mut BufReader<TcpStream>) {
        let max = self.ingest.max_message_size;
        let mut line_buf = Vec::with_capacity(8 * 1024);

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = read_bounded_line(reader, &mut line_buf, max) => read,
            };

            match read {
                Ok(LineRead::Line(_)) => {
                    if line_buf.is_empty() {
                        continue;
                    }
                    self.process(&line_buf).await;
                }
                Ok(LineRead::TooLong(size)) => {
                    self.ingest.metrics.message_received();
                    self.ingest.metrics.parse_failure();
                    tracing::warn!(peer = %self.peer_addr, size, max, "message too large, dropped");
                }
                Ok(LineRead::Eof) => break,
                Err(e) => {
                    if is_connection_reset(&e) {
                        tracing::debug!(peer = %self.peer_addr, error = %e, "connection reset");
                    } else {
                        tracing::warn!(peer = %self.peer_addr, error = %e, "read error");
                    }
                    break;
                }
            }
        }
    }

    /// Parse, route and insert one message
    async fn process(&self, raw: &[u8]) {
        let ingest = &self.ingest;
        ingest.metrics.message_received();

        let Ok(line) = std::str::from_utf8(raw) else {
            ingest.metrics.parse_failure();
            tracing::warn!(peer = %self.peer_addr, "message is not valid UTF-8, dropped");
            return;
        };

        let Some(record) = ingest.parser.parse(line) else {
            ingest.metrics.parse_failure();
            return;
        };

        let table = match ingest.router.route_and_ensure(&record).await {
            Ok(table) => table,
            Err(e) => {
                ingest.metrics.write_failure();
                tracing::warn!(error = %e, time = record.time(), "cannot prepare partition");
                return;
            }
        };

        match ingest.writer.write(&record, &table).await {
            Ok(()) => ingest.metrics.record_written(),
            Err(e) => {
                ingest.metrics.write_failure();
                tracing::warn!(error = %e, table = %table, "insert failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod server_test;
