//! Error types surfaced by the client, the pool and the upgrade
//! handshake.

use std::io;

use derive_more::Display;

/// Boxed opaque cause carried by transport and parser errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while sending a request through a
/// pool or a single client connection.
#[derive(Debug, Display)]
#[non_exhaustive]
pub enum Error {
    /// Establishing the TCP connection or the TLS handshake failed.
    #[display("failed to connect: {}", _0)]
    ConnectFailed(BoxError),

    /// The peer closed the connection.
    #[display("connection closed")]
    ConnectionClosed,

    /// A socket read did not complete within the read timeout.
    #[display("read timeout")]
    ReadTimeout,

    /// A socket write did not complete within the timeout.
    #[display("write timeout")]
    WriteTimeout,

    /// The peer violated the HTTP/1.1 protocol.
    #[display("invalid data: {}", _0)]
    InvalidData(BoxError),

    /// The request target could not be resolved to an absolute URI.
    #[display("invalid target: {}", _0)]
    InvalidTarget(String),

    /// The redirection budget was exhausted.
    #[display("too many redirections")]
    TooManyRedirections,

    /// A client terminated while a request was in flight.
    #[display("client error: {}", _0)]
    ClientError(BoxError),

    /// Error writing the request.
    #[display("send error: {}", _0)]
    Send(io::Error),

    /// Error reading the response.
    #[display("receive error: {}", _0)]
    Recv(io::Error),

    /// The protocol upgrade handshake failed.
    #[display("websocket error: {}", _0)]
    WebSocket(WsError),
}

impl std::error::Error for Error {}

impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        Error::WebSocket(err)
    }
}

/// Errors of the WebSocket upgrade handshake.
#[derive(Debug, Display)]
#[non_exhaustive]
pub enum WsError {
    /// The 101 response did not carry a `Sec-WebSocket-Accept` field.
    #[display("missing Sec-WebSocket-Accept header field")]
    MissingAccept,

    /// The `Sec-WebSocket-Accept` value did not match the nonce.
    #[display("Sec-WebSocket-Accept mismatch")]
    AcceptMismatch,

    /// A protocol endpoint could not take over the connection.
    #[display("failed to start protocol endpoint: {}", _0)]
    StartFailed(BoxError),

    /// The request target is not a `ws` or `wss` URI.
    #[display("invalid target scheme for a websocket upgrade")]
    InvalidScheme,
}

impl std::error::Error for WsError {}
