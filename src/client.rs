//! Client connection: one task per connection, driving the
//! request/response cycle over a single transport stream.

use std::io::{self, Read as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use flate2::read::GzDecoder;
use http::StatusCode;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};

use crate::connect::{self, Transport, TransportStream};
use crate::error::Error;
use crate::finalize::finalize_request;
use crate::h1;
use crate::header::HeaderSet;
use crate::logger::RequestLog;
use crate::pool::PoolId;
use crate::protocol::{Protocol, Upgraded};
use crate::request::Request;
use crate::response::Response;

/// Identifier of a client connection, unique within the process.
pub(crate) type ClientId = u64;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Credentials injected as an `Authorization` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { user: String, password: String },
}

/// Options for a single client connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    /// Bounds connection establishment, TLS handshake included.
    pub connection_timeout: Duration,
    /// Bounds each individual socket read, not the whole response.
    pub read_timeout: Duration,
    pub tcp_nodelay: bool,
    /// Default fields prepended to every request.
    pub header: HeaderSet,
    /// Advertise and transparently decode gzip bodies.
    pub compression: bool,
    pub log_requests: bool,
    /// Owning pool id, for log context.
    pub pool: Option<PoolId>,
    pub credentials: Option<Credentials>,
    /// PEM bundle used as the TLS root set instead of the built-in
    /// webpki roots.
    pub ca_certificate_bundle_path: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            host: "localhost".into(),
            port: 80,
            transport: Transport::Tcp,
            connection_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            tcp_nodelay: true,
            header: HeaderSet::new(),
            compression: false,
            log_requests: true,
            pool: None,
            credentials: None,
            ca_certificate_bundle_path: None,
        }
    }
}

pub(crate) enum ClientMsg {
    SendRequest {
        req: Request,
        protocol: Option<Arc<dyn Protocol>>,
        reply: oneshot::Sender<Result<ClientReply, Error>>,
    },
}

#[derive(Debug)]
pub(crate) enum ClientReply {
    Response(Response),
    Upgraded(Response, Upgraded),
}

/// Termination notice sent to the owning pool.
#[derive(Debug)]
pub(crate) struct ClientExit {
    pub id: ClientId,
    pub reason: ExitReason,
}

#[derive(Debug)]
pub(crate) enum ExitReason {
    Normal,
    Failed(String),
}

/// Outcome of delegating a request to a client handle.
#[derive(Debug)]
pub(crate) enum Delegated {
    Reply(Result<ClientReply, Error>),
    /// The client was gone before it accepted the request; the
    /// request is returned for delegation elsewhere.
    Gone(Request),
}

/// Sending half of a client task.
#[derive(Debug, Clone)]
pub(crate) struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<ClientMsg>,
}

impl ClientHandle {
    pub(crate) fn id(&self) -> ClientId {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) async fn send_request(
        &self,
        req: Request,
        protocol: Option<Arc<dyn Protocol>>,
    ) -> Delegated {
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = ClientMsg::SendRequest {
            req,
            protocol,
            reply: reply_tx,
        };

        if let Err(mpsc::error::SendError(ClientMsg::SendRequest { req, .. })) =
            self.tx.send(msg).await
        {
            return Delegated::Gone(req);
        }

        match reply_rx.await {
            Ok(result) => Delegated::Reply(result),
            Err(_) => Delegated::Reply(Err(Error::ClientError(
                "client terminated during request".into(),
            ))),
        }
    }
}

/// Connect and spawn the client task.
///
/// `exit_tx`, when given, receives a [`ClientExit`] notice once the
/// task terminates.
pub(crate) async fn open(
    options: ClientOptions,
    exit_tx: Option<mpsc::Sender<ClientExit>>,
) -> Result<ClientHandle, Error> {
    let stream = connect::connect(&options).await?;
    let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::channel(1);

    let task = ClientTask {
        id,
        options,
        stream: Some(stream),
        buf: BytesMut::with_capacity(8 * 1024),
        rx,
        exit_tx,
    };
    tokio::spawn(task.run());

    Ok(ClientHandle { id, tx })
}

struct ClientTask {
    id: ClientId,
    options: ClientOptions,
    /// `None` once the connection has been handed off.
    stream: Option<TransportStream>,
    /// Read buffer; bytes beyond the current response stay here.
    buf: BytesMut,
    rx: mpsc::Receiver<ClientMsg>,
    exit_tx: Option<mpsc::Sender<ClientExit>>,
}

enum Idle {
    Msg(Option<ClientMsg>),
    Read(io::Result<usize>),
}

enum Next {
    Idle,
    Stop(ExitReason),
}

enum Driven {
    Response { resp: Response, close: bool },
    Upgraded { resp: Response, upgraded: Upgraded },
    /// The caller abandoned the request mid-flight.
    Cancelled,
}

impl ClientTask {
    async fn run(mut self) {
        let reason = self.serve().await;
        match &reason {
            ExitReason::Normal => {
                log::trace!(target: "gannet::client", "client {} closing", self.id);
            }
            ExitReason::Failed(err) => {
                log::debug!(target: "gannet::client", "client {} failed: {err}", self.id);
            }
        }
        if let Some(exit_tx) = &self.exit_tx {
            let _ = exit_tx
                .send(ClientExit {
                    id: self.id,
                    reason,
                })
                .await;
        }
    }

    async fn serve(&mut self) -> ExitReason {
        loop {
            let event = {
                let stream = self.stream.as_mut().expect("stream owned while serving");
                let mut probe = [0u8; 4096];
                tokio::select! {
                    biased;
                    msg = self.rx.recv() => Idle::Msg(msg),
                    res = stream.read(&mut probe) => Idle::Read(res),
                }
            };

            match event {
                // owner dropped every handle
                Idle::Msg(None) => return ExitReason::Normal,

                Idle::Msg(Some(ClientMsg::SendRequest {
                    req,
                    protocol,
                    reply,
                })) => match self.handle_request(req, protocol, reply).await {
                    Next::Idle => {}
                    Next::Stop(reason) => return reason,
                },

                // peer closed between requests
                Idle::Read(Ok(0)) => return ExitReason::Normal,

                // nothing may arrive while no request is in flight
                Idle::Read(Ok(_)) => {
                    return ExitReason::Failed("unsolicited data received while idle".into())
                }

                Idle::Read(Err(err)) => {
                    return ExitReason::Failed(format!("idle socket error: {err}"))
                }
            }
        }
    }

    async fn handle_request(
        &mut self,
        req: Request,
        protocol: Option<Arc<dyn Protocol>>,
        reply: oneshot::Sender<Result<ClientReply, Error>>,
    ) -> Next {
        let mut reply = reply;
        match self.drive_request(req, protocol, &mut reply).await {
            Ok(Driven::Response { resp, close }) => {
                let delivered = reply.send(Ok(ClientReply::Response(resp))).is_ok();
                if close || !delivered {
                    Next::Stop(ExitReason::Normal)
                } else {
                    Next::Idle
                }
            }

            Ok(Driven::Upgraded { resp, upgraded }) => {
                let _ = reply.send(Ok(ClientReply::Upgraded(resp, upgraded)));
                Next::Stop(ExitReason::Normal)
            }

            // the connection may hold a half-written request or a
            // half-read response, it cannot be reused
            Ok(Driven::Cancelled) => Next::Stop(ExitReason::Normal),

            Err(err) => {
                let reason = ExitReason::Failed(err.to_string());
                let _ = reply.send(Err(err));
                Next::Stop(reason)
            }
        }
    }

    async fn drive_request(
        &mut self,
        req: Request,
        protocol: Option<Arc<dyn Protocol>>,
        reply: &mut oneshot::Sender<Result<ClientReply, Error>>,
    ) -> Result<Driven, Error> {
        let started = Instant::now();

        let mut req = req;
        if let Some(protocol) = &protocol {
            protocol.prepare_request(&mut req);
        }
        let req = finalize_request(req, &self.options);
        let bytes = h1::encode_request(&req);

        {
            let stream = self.stream.as_mut().expect("stream owned while serving");
            tokio::select! {
                res = timeout(self.options.read_timeout, stream.write_all(&bytes)) => match res {
                    Err(_) => return Err(Error::WriteTimeout),
                    Ok(Err(err)) => return Err(write_error(err)),
                    Ok(Ok(())) => {}
                },
                _ = reply.closed() => return Ok(Driven::Cancelled),
            }
        }

        let mut decoder = h1::ResponseDecoder::new(&req.method);
        let mut resp = loop {
            if let Some(resp) = decoder
                .decode(&mut self.buf)
                .map_err(|err| Error::InvalidData(Box::new(err)))?
            {
                break resp;
            }

            let stream = self.stream.as_mut().expect("stream owned while serving");
            tokio::select! {
                res = timeout(self.options.read_timeout, stream.read_buf(&mut self.buf)) => match res {
                    Err(_) => return Err(Error::ReadTimeout),
                    Ok(Err(err)) => return Err(read_error(err)),
                    Ok(Ok(0)) => return Err(Error::ConnectionClosed),
                    Ok(Ok(_)) => {}
                },
                _ = reply.closed() => return Ok(Driven::Cancelled),
            }
        };

        let tail = self.buf.split().freeze();

        decompress_body(&mut resp)?;

        if self.options.log_requests {
            RequestLog {
                method: &req.method,
                target: &req.target,
                status: resp.status,
                duration: started.elapsed(),
                body_size: resp.reported_body_size(),
                pool: self.options.pool.as_ref(),
            }
            .emit();
        }

        if let Some(protocol) = &protocol {
            if resp.status == StatusCode::SWITCHING_PROTOCOLS {
                protocol.validate_response(&resp)?;
                let stream = self.stream.take().expect("stream owned while serving");
                return Ok(Driven::Upgraded {
                    resp,
                    upgraded: Upgraded { stream, tail },
                });
            }
        }

        // nothing may follow a response on a connection that was not
        // upgraded: there is no pipelining
        if !tail.is_empty() {
            return Err(Error::InvalidData("unexpected data after response".into()));
        }

        let close = resp.header.has_connection_close();
        Ok(Driven::Response { resp, close })
    }
}

/// Decode a gzip body in place, keeping the on-wire size for logging.
fn decompress_body(resp: &mut Response) -> Result<(), Error> {
    if resp.body.is_empty() || resp.header.content_encoding() != ["gzip"] {
        return Ok(());
    }

    let mut decoded = Vec::new();
    GzDecoder::new(resp.body.as_ref())
        .read_to_end(&mut decoded)
        .map_err(|err| Error::InvalidData(Box::new(err)))?;

    resp.internal.original_body_size = Some(resp.body.len());
    resp.body = decoded.into();
    Ok(())
}

fn write_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::WriteZero => Error::ConnectionClosed,
        io::ErrorKind::TimedOut => Error::WriteTimeout,
        _ => Error::Send(err),
    }
}

fn read_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
        io::ErrorKind::TimedOut => Error::ReadTimeout,
        _ => Error::Recv(err),
    }
}
