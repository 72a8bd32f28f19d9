//! Delivery from the queue to the collector
//!
//! The sender owns one connection at a time. A message taken from the
//! queue stays in flight until a write succeeds; on failure the connection
//! is dropped, a new one is established (with exponential backoff) and the
//! same message is written again. Only then is it marked done, so `join`
//! on the queue means "everything was written".
//!
//! Delivery is at-least-once: a write that reached the collector but
//! failed locally is repeated.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logbeat_config::TransportConfig;
use logbeat_protocol::{Credentials, LineRead, ProtocolError, Reply, read_bounded_line, write_line};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::metrics::ShipperMetrics;
use crate::queue::{LogMessage, QueueConsumer};

/// Longest handshake reply we accept
const MAX_REPLY_SIZE: usize = 1024;

/// Something that can open a connection to the collector
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: Link;

    /// Open and authenticate a fresh connection
    async fn connect(&self) -> Result<Self::Link, SendError>;

    /// Address for log lines
    fn target(&self) -> &str;
}

/// An established, authenticated connection
#[async_trait]
pub trait Link: Send + 'static {
    /// Write one message line
    async fn send(&mut self, line: &str) -> Result<(), SendError>;
}

/// Reconnect delay doubling from `initial` up to `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn from_transport(config: &TransportConfig) -> Self {
        Self::new(config.reconnect_interval, config.max_reconnect_interval)
    }

    /// Delay to wait now; the following one doubles
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Plain TCP connector with the logbeat handshake
pub struct TcpConnector {
    target: String,
    credentials: Credentials,
    connect_timeout: Duration,
    write_timeout: Duration,
    tcp_keepalive: bool,
    tcp_keepalive_interval: Duration,
}

impl TcpConnector {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            target: config.address(),
            credentials: Credentials::new(&config.username, &config.password),
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            tcp_keepalive: config.tcp_keepalive,
            tcp_keepalive_interval: config.tcp_keepalive_interval,
        }
    }

    /// Override the target address
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    fn configure_socket(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        if self.tcp_keepalive {
            let keepalive = TcpKeepalive::new().with_time(self.tcp_keepalive_interval);

            #[cfg(target_os = "linux")]
            let keepalive = keepalive.with_interval(self.tcp_keepalive_interval);

            if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %e, "failed to set TCP keep-alive");
            }
        }
    }

    async fn handshake(&self, stream: &mut BufReader<TcpStream>) -> Result<(), ProtocolError> {
        write_line(stream.get_mut(), &self.credentials.hello_line()).await?;

        let mut buf = Vec::new();
        match read_bounded_line(stream, &mut buf, MAX_REPLY_SIZE).await? {
            LineRead::Line(_) => {}
            LineRead::Eof => return Err(ProtocolError::Closed),
            LineRead::TooLong(_) => return Err(ProtocolError::malformed("reply too long")),
        }

        match Reply::parse(&String::from_utf8_lossy(&buf))? {
            Reply::Ok => Ok(()),
            Reply::Denied(reason) => Err(ProtocolError::Denied(reason)),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Link = TcpLink;

    async fn connect(&self) -> Result<TcpLink, SendError> {
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SendError::ConnectionFailed {
                    target: self.target.clone(),
                    source: e,
                });
            }
            Err(_) => {
                return Err(SendError::ConnectionFailed {
                    target: self.target.clone(),
                    source: std::io::Error::new(ErrorKind::TimedOut, "connection timed out"),
                });
            }
        };

        self.configure_socket(&stream);

        let mut stream = BufReader::new(stream);
        let handshake = match timeout(self.connect_timeout, self.handshake(&mut stream)).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        };
        handshake.map_err(|source| SendError::Handshake {
            target: self.target.clone(),
            source,
        })?;

        Ok(TcpLink {
            stream,
            write_timeout: self.write_timeout,
        })
    }

    fn target(&self) -> &str {
        &self.target
    }
}

pub struct TcpLink {
    stream: BufReader<TcpStream>,
    write_timeout: Duration,
}

#[async_trait]
impl Link for TcpLink {
    async fn send(&mut self, line: &str) -> Result<(), SendError> {
        match timeout(self.write_timeout, write_line(self.stream.get_mut(), line)).await {
            Ok(result) => result.map_err(SendError::from),
            Err(_) => Err(SendError::Timeout),
        }
    }
}

/// Drains the delivery queue into the collector
pub struct Sender<C: Connector> {
    connector: C,
    consumer: QueueConsumer,
    metrics: Arc<ShipperMetrics>,
    backoff: Backoff,
    cancel: CancellationToken,
}

impl<C: Connector> Sender<C> {
    pub fn new(
        connector: C,
        consumer: QueueConsumer,
        metrics: Arc<ShipperMetrics>,
        backoff: Backoff,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            connector,
            consumer,
            metrics,
            backoff,
            cancel,
        }
    }

    /// Run until cancelled or until every producer is gone and the queue is empty
    pub async fn run(mut self) {
        let mut in_flight: Option<LogMessage> = None;
        let mut link: Option<C::Link> = None;

        loop {
            if in_flight.is_none() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    message = self.consumer.get() => match message {
                        Some(message) => in_flight = Some(message),
                        None => break,
                    },
                }
            }

            if link.is_none() {
                match self.establish().await {
                    Some(established) => link = Some(established),
                    None => break,
                }
            }

            let (Some(message), Some(conn)) = (in_flight.as_ref(), link.as_mut()) else {
                continue;
            };

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = conn.send(&message.payload) => result,
            };

            match result {
                Ok(()) => {
                    in_flight = None;
                    self.consumer.task_done();
                    self.metrics.record_sent();
                }
                Err(e) => {
                    self.metrics.record_send_failure();
                    tracing::warn!(
                        target_addr = %self.connector.target(),
                        error = %e,
                        "send failed, reconnecting"
                    );
                    link = None;
                }
            }
        }

        tracing::debug!(
            unsent = in_flight.is_some(),
            "sender stopped"
        );
    }

    /// Connect, retrying with backoff; `None` when cancelled first
    async fn establish(&mut self) -> Option<C::Link> {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                attempt = self.connector.connect() => attempt,
            };

            match attempt {
                Ok(link) => {
                    self.backoff.reset();
                    self.metrics.record_connect();
                    tracing::info!(target_addr = %self.connector.target(), "connected to collector");
                    return Some(link);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        target_addr = %self.connector.target(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "collector unavailable"
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "sender_test.rs"]
mod sender_test;
