use crate::error::{LdapError, Result};
use rustls_pki_types::ServerName;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

pub const DEFAULT_LDAP_PORT: u16 = 389;
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Stream to the directory server: plain TCP (ldap://) or TLS (ldaps:// or after StartTLS).
pub enum TransportStream {
    Tcp(TcpStream),
    Tls(Box<ClientTlsStream<TcpStream>>),
}

impl TransportStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, TransportStream::Tls(_))
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            TransportStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut *self {
            TransportStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }
    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            TransportStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match &mut *self {
            TransportStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            TransportStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapUrl {
    pub host: String,
    pub port: u16,
    /// ldaps:// (TLS from the first byte).
    pub secure: bool,
}

impl LdapUrl {
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Parse "ldap://host[:port][/dn]" or "ldaps://host[:port][/dn]".
pub fn parse_ldap_url(url: &str) -> Result<LdapUrl> {
    let (rest, secure) = if let Some(rest) = url.strip_prefix("ldap://") {
        (rest, false)
    } else if let Some(rest) = url.strip_prefix("ldaps://") {
        (rest, true)
    } else {
        return Err(LdapError::InvalidArgument(format!(
            "invalid LDAP URL scheme: {}",
            url
        )));
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let default_port = if secure {
        DEFAULT_LDAPS_PORT
    } else {
        DEFAULT_LDAP_PORT
    };

    let (host, port_str) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| LdapError::InvalidArgument(format!("unterminated IPv6 address: {}", url)))?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };
    if host.is_empty() {
        return Err(LdapError::InvalidArgument(format!("no host in LDAP URL: {}", url)));
    }
    let port = match port_str {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| LdapError::InvalidArgument(format!("invalid port in LDAP URL: {}", url)))?,
        None => default_port,
    };
    Ok(LdapUrl {
        host: host.to_string(),
        port,
        secure,
    })
}

pub async fn connect_tcp(url: &LdapUrl, timeout: Duration) -> Result<TcpStream> {
    let addr = url.address();
    let tcp = tokio::time::timeout(timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| LdapError::Network(format!("connect to {} timed out", addr)))?
        .map_err(|e| LdapError::Network(format!("failed to connect to {}: {}", addr, e)))?;
    let _ = tcp.set_nodelay(true);
    debug!(%addr, "tcp connected");
    Ok(tcp)
}

pub async fn tls_handshake(
    connector: &TlsConnector,
    server_name: ServerName<'static>,
    tcp: TcpStream,
) -> Result<TransportStream> {
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| LdapError::Tls(format!("TLS handshake failed: {}", e)))?;
    Ok(TransportStream::Tls(Box::new(tls_stream)))
}
