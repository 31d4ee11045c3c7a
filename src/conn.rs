use crate::ber::{Class, Packet, Value};
use crate::config::Config;
use crate::control::Control;
use crate::dispatcher::{Command, ConnectionState, Dispatcher, Shared};
use crate::error::{LdapError, Result};
use crate::metrics::Metrics;
use crate::protocol::{self, APP_ABANDON_REQUEST, APP_UNBIND_REQUEST};
use crate::result_code::decode_ldap_result;
use crate::tls;
use crate::transport::{self, TransportStream};
use rustls_pki_types::ServerName;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// Response timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// How long to wait for each response frame when a request sets none.
    pub read_timeout: Duration,
    /// Send an Abandon for requests that time out.
    pub abandon_on_timeout: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_TIMEOUT,
            abandon_on_timeout: false,
        }
    }
}

/// A single LDAP connection. Safe to share between tasks behind an `Arc`;
/// requests issued concurrently are multiplexed over the one transport.
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    options: ConnectionOptions,
    metrics: Arc<Metrics>,
}

/// One in-flight request. Dropping it deregisters the message id.
pub(crate) struct Exchange {
    message_id: i64,
    responses: mpsc::UnboundedReceiver<Packet>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Exchange {
    pub(crate) fn message_id(&self) -> i64 {
        self.message_id
    }

    pub(crate) async fn next(&mut self, timeout: Duration) -> Result<Packet> {
        match tokio::time::timeout(timeout, self.responses.recv()).await {
            Ok(Some(packet)) => Ok(packet),
            Ok(None) => Err(LdapError::Closing(format!(
                "connection closed while waiting for message {}",
                self.message_id
            ))),
            Err(_) => Err(LdapError::Timeout {
                message_id: self.message_id,
            }),
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Finish {
            message_id: self.message_id,
        });
    }
}

impl Connection {
    /// Connect according to `config`: TCP or ldaps://, then StartTLS and a
    /// simple bind when configured.
    pub async fn connect(config: &Config) -> Result<Connection> {
        let url = transport::parse_ldap_url(&config.url)?;
        let tls_config = config.tls.clone().unwrap_or_default();
        let host = tls_config.server_name.clone().unwrap_or_else(|| url.host.clone());
        let wants_starttls = tls_config.starttls.unwrap_or(false) && !url.secure;

        let tcp = transport::connect_tcp(&url, config.connect_timeout()).await?;
        let connector = if url.secure || wants_starttls {
            let client = tls::client_config(
                tls_config.ca_file.as_deref(),
                tls_config.skip_verify.unwrap_or(false),
            )?;
            Some(tls::connector(client))
        } else {
            None
        };

        let stream = match (&connector, url.secure) {
            (Some(connector), true) => {
                transport::tls_handshake(connector, tls::server_name(&host)?, tcp).await?
            }
            _ => TransportStream::Tcp(tcp),
        };

        let conn = Connection::from_stream(stream, config.connection_options());
        info!(url = %config.url, tls = conn.is_tls(), "connected");

        if let (Some(connector), true) = (connector, wants_starttls) {
            conn.start_tls(connector, tls::server_name(&host)?).await?;
        }
        if let Some(bind) = &config.bind {
            if let (Some(dn), Some(password)) = (&bind.binddn, &bind.credentials) {
                conn.simple_bind(dn, password).await?;
            }
        }
        Ok(conn)
    }

    /// Wrap an established transport. Must be called inside a Tokio runtime.
    pub fn from_stream(stream: TransportStream, options: ConnectionOptions) -> Connection {
        Self::from_stream_with_metrics(stream, options, Arc::new(Metrics::new()))
    }

    pub fn from_stream_with_metrics(
        stream: TransportStream,
        options: ConnectionOptions,
        metrics: Arc<Metrics>,
    ) -> Connection {
        let shared = Arc::new(Shared::new(ConnectionState::Connecting));
        metrics.inc_connections();
        let commands = Dispatcher::spawn(stream, Arc::clone(&shared), Arc::clone(&metrics));
        Connection {
            commands,
            shared,
            options,
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_tls(&self) -> bool {
        self.shared.is_tls()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Number of requests currently registered with the dispatcher.
    pub async fn pending_requests(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Pending { reply: tx }).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// `None` falls back to the connection default; `Some` is taken as is.
    pub(crate) fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or(self.options.read_timeout)
    }

    /// One dispatcher round trip: allocate an id, register `sink` under it and
    /// write the request.
    async fn dispatch(&self, op: Packet, controls: &[Control], sink: Option<mpsc::UnboundedSender<Packet>>) -> Result<i64> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                op,
                controls: controls.to_vec(),
                sink,
                reply: tx,
            })
            .map_err(|_| LdapError::closing())?;
        rx.await.map_err(|_| LdapError::closing())?
    }

    pub(crate) async fn send_request(&self, op: Packet, controls: &[Control]) -> Result<Exchange> {
        let (sink, responses) = mpsc::unbounded_channel();
        let message_id = self.dispatch(op, controls, Some(sink)).await?;
        Ok(Exchange {
            message_id,
            responses,
            commands: self.commands.clone(),
        })
    }

    /// Send a request that expects exactly one response and wait for it.
    pub async fn send_and_await(
        &self,
        op: Packet,
        controls: &[Control],
        timeout: Option<Duration>,
    ) -> Result<Packet> {
        let timeout = self.effective_timeout(timeout);
        let mut exchange = self.send_request(op, controls).await?;
        match exchange.next(timeout).await {
            Err(LdapError::Timeout { message_id }) => {
                drop(exchange);
                self.on_timeout(message_id).await;
                Err(LdapError::Timeout { message_id })
            }
            other => other,
        }
    }

    pub(crate) async fn on_timeout(&self, message_id: i64) {
        self.metrics.inc_timeout();
        warn!(message_id, "timed out waiting for response");
        if self.options.abandon_on_timeout {
            if let Err(e) = self.abandon(message_id).await {
                debug!(message_id, error = %e, "abandon after timeout failed");
            }
        }
    }

    /// Send a single-response request, check the LDAPResult and return the
    /// response protocol op.
    pub(crate) async fn simple_request(
        &self,
        op: Packet,
        controls: &[Control],
        expected: u8,
    ) -> Result<Packet> {
        let name = protocol::metric_op_name(op.tag());
        let start = Instant::now();
        let outcome = async {
            let envelope = self.send_and_await(op, controls, None).await?;
            let response = protocol::expect_response(envelope, expected)?;
            decode_ldap_result(&response)?.check()?;
            Ok::<_, LdapError>(response)
        }
        .await;
        self.metrics.record(name, start.elapsed(), outcome.is_ok());
        outcome
    }

    /// Ask the server to stop processing `message_id`. There is no response.
    pub async fn abandon(&self, message_id: i64) -> Result<()> {
        let op = Packet::tagged_integer(Class::Application, APP_ABANDON_REQUEST, message_id);
        self.dispatch(op, &[], None).await?;
        self.metrics.inc_abandon();
        debug!(message_id, "abandon sent");
        Ok(())
    }

    /// Upgrade the connection with the StartTLS extended operation. Issue it
    /// while no other operations are in flight.
    pub async fn start_tls(&self, connector: TlsConnector, server_name: ServerName<'static>) -> Result<()> {
        if self.is_tls() {
            return Err(LdapError::Network("connection is already encrypted".to_string()));
        }
        self.extended(protocol::START_TLS_OID, None).await?;
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::StartTls {
                connector,
                server_name,
                reply: tx,
            })
            .map_err(|_| LdapError::closing())?;
        rx.await.map_err(|_| LdapError::closing())?
    }

    /// Unbind and close. Later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if matches!(self.state(), ConnectionState::Closing | ConnectionState::Closed) {
            return Ok(());
        }
        let op = Packet::new(Class::Application, false, APP_UNBIND_REQUEST, Value::None);
        if let Err(e) = self.dispatch(op, &[], None).await {
            debug!(error = %e, "unbind failed");
        }
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Quit { reply: Some(tx) }).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Quit { reply: None });
    }
}
