//! Transport establishment: TCP, and TLS via rustls.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::client::ClientOptions;
use crate::error::Error;

/// Transport kind of a connection, part of the connection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Tcp,
    Tls,
}

impl Transport {
    pub fn default_port(self) -> u16 {
        match self {
            Transport::Tcp => 80,
            Transport::Tls => 443,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Tls => f.write_str("tls"),
        }
    }
}

/// An established client connection, plain or TLS.
///
/// Handed to the caller on a successful protocol upgrade; until then
/// it is owned by its client task.
pub struct TransportStream {
    inner: Inner,
}

enum Inner {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl fmt::Debug for TransportStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Tcp(stream) => f.debug_tuple("TransportStream").field(stream).finish(),
            Inner::Tls(_) => f.debug_tuple("TransportStream").field(&"tls").finish(),
        }
    }
}

/// Connect to `options.host:options.port`, running the TLS handshake
/// inline for [`Transport::Tls`]. The TCP connect and the TLS
/// handshake are each bounded by `options.connection_timeout`.
pub(crate) async fn connect(options: &ClientOptions) -> Result<TransportStream, Error> {
    let deadline = options.connection_timeout;

    let tcp = timeout(deadline, TcpStream::connect((options.host.as_str(), options.port)))
        .await
        .map_err(|_| connect_timeout())?
        .map_err(|err| Error::ConnectFailed(err.into()))?;

    if options.tcp_nodelay {
        if let Err(err) = tcp.set_nodelay(true) {
            log::debug!(target: "gannet::client", "cannot set TCP_NODELAY: {err}");
        }
    }

    match options.transport {
        Transport::Tcp => Ok(TransportStream {
            inner: Inner::Tcp(tcp),
        }),

        Transport::Tls => {
            let config = tls_client_config(options.ca_certificate_bundle_path.as_deref())?;
            let server_name = ServerName::try_from(options.host.clone())
                .map_err(|err| Error::ConnectFailed(err.into()))?;

            let tls = timeout(deadline, TlsConnector::from(config).connect(server_name, tcp))
                .await
                .map_err(|_| connect_timeout())?
                .map_err(|err| Error::ConnectFailed(err.into()))?;

            Ok(TransportStream {
                inner: Inner::Tls(Box::new(tls)),
            })
        }
    }
}

fn connect_timeout() -> Error {
    Error::ConnectFailed(Box::new(io::Error::new(
        io::ErrorKind::TimedOut,
        "connection timed out",
    )))
}

/// Build the rustls client configuration.
///
/// When a CA bundle path is set, its PEM certificates form the root
/// set; otherwise the bundled webpki roots are used.
fn tls_client_config(ca_bundle: Option<&Path>) -> Result<Arc<rustls::ClientConfig>, Error> {
    let mut roots = rustls::RootCertStore::empty();

    match ca_bundle {
        Some(path) => {
            let file = File::open(path).map_err(|err| {
                Error::ConnectFailed(format!("cannot open CA bundle {path:?}: {err}").into())
            })?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|err| {
                    Error::ConnectFailed(format!("cannot read CA bundle {path:?}: {err}").into())
                })?;
                roots
                    .add(cert)
                    .map_err(|err| Error::ConnectFailed(err.into()))?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            Inner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Inner::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
