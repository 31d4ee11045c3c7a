//! Dispatcher actor: the single owner of the message-id counter, the table of
//! pending requests and the write half of the transport.
//!
//! Callers and the reader task talk to it over one unbounded command channel,
//! so every mutation of the table is serialized without locks.

use crate::ber::Packet;
use crate::control::Control;
use crate::error::{LdapError, Result};
use crate::metrics::Metrics;
use crate::protocol::{self, UNSOLICITED_MESSAGE_ID};
use crate::reader::{self, ReaderControl};
use crate::transport::{self, TransportStream};
use bytes::BytesMut;
use rustls_pki_types::ServerName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// Per-request response channel.
pub(crate) type Sink = mpsc::UnboundedSender<Packet>;

pub(crate) enum Command {
    /// Allocate the next message id, register `sink` (if any) under it, wrap
    /// `op` in an envelope and write it. Replies with the id.
    Send {
        op: Packet,
        controls: Vec<Control>,
        sink: Option<Sink>,
        reply: oneshot::Sender<Result<i64>>,
    },
    Finish {
        message_id: i64,
    },
    Route {
        message_id: i64,
        packet: Packet,
    },
    ReaderStopped {
        error: Option<LdapError>,
    },
    StartTls {
        connector: TlsConnector,
        server_name: ServerName<'static>,
        reply: oneshot::Sender<Result<()>>,
    },
    Pending {
        reply: oneshot::Sender<usize>,
    },
    Quit {
        reply: Option<oneshot::Sender<()>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::New,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// State visible to the connection handle without a round trip.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    tls: AtomicBool,
}

impl Shared {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
            tls: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.tls.load(Ordering::Acquire)
    }

    fn set_tls(&self, tls: bool) {
        self.tls.store(tls, Ordering::Release);
    }
}

pub(crate) struct Dispatcher {
    commands: mpsc::UnboundedReceiver<Command>,
    /// Handed to each reader task it spawns.
    reader_tx: mpsc::UnboundedSender<Command>,
    reader_control: Option<oneshot::Sender<ReaderControl>>,
    writer: Option<WriteHalf<TransportStream>>,
    pending: HashMap<i64, Sink>,
    next_id: i64,
    shared: Arc<Shared>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    /// Spawn the dispatcher and its reader on the current runtime.
    pub(crate) fn spawn(
        stream: TransportStream,
        shared: Arc<Shared>,
        metrics: Arc<Metrics>,
    ) -> mpsc::UnboundedSender<Command> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut dispatcher = Dispatcher {
            commands: rx,
            reader_tx: tx.clone(),
            reader_control: None,
            writer: None,
            pending: HashMap::new(),
            next_id: 1,
            shared,
            metrics,
        };
        dispatcher.shared.set_tls(stream.is_tls());
        dispatcher.attach(stream, BytesMut::with_capacity(4096));
        dispatcher.shared.set_state(ConnectionState::Open);
        tokio::spawn(dispatcher.run());
        tx
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Send {
                    op,
                    controls,
                    sink,
                    reply,
                } => {
                    let message_id = self.next_id;
                    self.next_id += 1;
                    let frame = match protocol::build_envelope(message_id, op, &controls) {
                        Ok(envelope) => envelope.to_bytes(),
                        Err(e) => {
                            let _ = reply.send(Err(e));
                            continue;
                        }
                    };
                    let registered = sink.is_some();
                    if let Some(sink) = sink {
                        self.pending.insert(message_id, sink);
                    }
                    debug!(message_id, bytes = frame.len(), "sending message");
                    if let Err(e) = self.write(&frame).await {
                        warn!(message_id, error = %e, "write failed; closing connection");
                        self.pending.remove(&message_id);
                        let _ = reply.send(Err(LdapError::Network(format!("send failed: {}", e))));
                        break;
                    }
                    if reply.send(Ok(message_id)).is_err() && registered {
                        // The caller gave up before learning its id.
                        self.pending.remove(&message_id);
                    }
                }
                Command::Finish { message_id } => {
                    if self.pending.remove(&message_id).is_some() {
                        debug!(message_id, "request finished");
                    }
                }
                Command::Route { message_id, packet } => self.route(message_id, packet),
                Command::ReaderStopped { error } => {
                    match error {
                        Some(e) => warn!(error = %e, "reader failed; closing connection"),
                        None => info!("server closed the connection"),
                    }
                    break;
                }
                Command::StartTls {
                    connector,
                    server_name,
                    reply,
                } => {
                    if self.shared.is_tls() {
                        let _ = reply.send(Err(LdapError::Network(
                            "connection is already encrypted".to_string(),
                        )));
                        continue;
                    }
                    // Once the reader has handed back the transport there is no
                    // way to resume plaintext, so any failure closes.
                    let result = self.upgrade(connector, server_name).await;
                    let failed = result.is_err();
                    let _ = reply.send(result);
                    if failed {
                        break;
                    }
                }
                Command::Pending { reply } => {
                    let _ = reply.send(self.pending.len());
                }
                Command::Quit { reply } => {
                    self.shutdown().await;
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return;
                }
            }
        }
        self.shutdown().await;
    }

    fn route(&mut self, message_id: i64, packet: Packet) {
        match self.pending.get(&message_id) {
            Some(sink) => {
                if sink.send(packet).is_err() {
                    debug!(message_id, "requester went away; dropping response");
                    self.pending.remove(&message_id);
                }
            }
            None if message_id == UNSOLICITED_MESSAGE_ID => {
                warn!("unsolicited notification from server");
            }
            None => {
                debug!(message_id, "no pending request for message; dropping response");
                self.metrics.inc_dropped_frame();
            }
        }
    }

    async fn write(&mut self, frame: &[u8]) -> std::io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "transport is closed")
        })?;
        writer.write_all(frame).await?;
        writer.flush().await
    }

    fn attach(&mut self, stream: TransportStream, buf: BytesMut) {
        let (read_half, write_half) = tokio::io::split(stream);
        let (control_tx, control_rx) = oneshot::channel();
        self.writer = Some(write_half);
        self.reader_control = Some(control_tx);
        tokio::spawn(reader::run(
            read_half,
            buf,
            self.reader_tx.clone(),
            control_rx,
            Arc::clone(&self.metrics),
        ));
    }

    async fn upgrade(&mut self, connector: TlsConnector, server_name: ServerName<'static>) -> Result<()> {
        let control = self
            .reader_control
            .take()
            .ok_or_else(|| LdapError::Closing("reader is not running".to_string()))?;
        let (tx, rx) = oneshot::channel();
        if control.send(ReaderControl::Handoff(tx)).is_err() {
            return Err(LdapError::Closing("reader already stopped".to_string()));
        }
        let (read_half, leftover) = rx
            .await
            .map_err(|_| LdapError::Closing("reader stopped during TLS upgrade".to_string()))?;
        if !leftover.is_empty() {
            return Err(LdapError::Network(format!(
                "{} unexpected bytes before TLS handshake",
                leftover.len()
            )));
        }
        let writer = self
            .writer
            .take()
            .ok_or_else(|| LdapError::Closing("transport is closed".to_string()))?;
        let tcp = match read_half.unsplit(writer) {
            TransportStream::Tcp(tcp) => tcp,
            TransportStream::Tls(_) => {
                return Err(LdapError::Network("connection is already encrypted".to_string()))
            }
        };
        let stream = transport::tls_handshake(&connector, server_name, tcp).await?;
        self.attach(stream, BytesMut::with_capacity(4096));
        self.shared.set_tls(true);
        info!("TLS established");
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.shared.set_state(ConnectionState::Closing);
        let pending = self.pending.len();
        // Dropping the sinks wakes every waiter with a closed channel.
        self.pending.clear();
        self.reader_control.take();
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.shared.set_state(ConnectionState::Closed);
        self.commands.close();
        info!(pending, "connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip() {
        let shared = Shared::new(ConnectionState::New);
        assert_eq!(shared.state(), ConnectionState::New);
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            shared.set_state(state);
            assert_eq!(shared.state(), state);
        }
        assert!(!shared.is_tls());
    }

    async fn send(
        commands: &mpsc::UnboundedSender<Command>,
        sink: Option<Sink>,
    ) -> Result<i64> {
        let (tx, rx) = oneshot::channel();
        let op = Packet::tagged_integer(crate::ber::Class::Application, protocol::APP_ABANDON_REQUEST, 0);
        commands
            .send(Command::Send {
                op,
                controls: Vec::new(),
                sink,
                reply: tx,
            })
            .unwrap();
        rx.await.unwrap()
    }

    async fn pending(commands: &mpsc::UnboundedSender<Command>) -> usize {
        let (tx, rx) = oneshot::channel();
        commands.send(Command::Pending { reply: tx }).unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_send_allocates_and_registers_in_one_step() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let shared = Arc::new(Shared::new(ConnectionState::Connecting));
        let commands = Dispatcher::spawn(TransportStream::Tcp(tcp), Arc::clone(&shared), Arc::new(Metrics::new()));
        assert_eq!(shared.state(), ConnectionState::Open);

        let (sink, _responses) = mpsc::unbounded_channel();
        assert_eq!(send(&commands, Some(sink)).await.unwrap(), 1);
        assert_eq!(send(&commands, None).await.unwrap(), 2);
        assert_eq!(pending(&commands).await, 1);

        // A caller that is gone before the reply leaves nothing registered.
        let (sink, _unused) = mpsc::unbounded_channel();
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let op = Packet::tagged_integer(crate::ber::Class::Application, protocol::APP_ABANDON_REQUEST, 0);
        commands
            .send(Command::Send {
                op,
                controls: Vec::new(),
                sink: Some(sink),
                reply: tx,
            })
            .unwrap();
        assert_eq!(pending(&commands).await, 1);

        commands.send(Command::Finish { message_id: 1 }).unwrap();
        assert_eq!(pending(&commands).await, 0);
        assert_eq!(send(&commands, None).await.unwrap(), 4);
    }
}
