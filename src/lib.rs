//! A small HTTP/1.1 client.
//!
//! Each connection runs in its own task and serves one request at a
//! time; a [`Pool`] maps request URIs to a bounded set of reusable
//! connections keyed by `(host, port, transport)`, transparently
//! follows redirections, and hands the raw connection over after a
//! successful protocol upgrade such as a WebSocket handshake.
//!
//! The easiest entry point is the process-global registry:
//!
//! ```no_run
//! use gannet::{send_request, Request, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gannet::Error> {
//!     let outcome =
//!         send_request(Request::get("http://example.com/"), RequestOptions::default()).await?;
//!     let resp = outcome.into_response();
//!     println!("{} {}", resp.status, resp.reason);
//!     Ok(())
//! }
//! ```
//!
//! Upgrading to WebSocket:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gannet::{send_request, ws, Outcome, Request, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), gannet::Error> {
//!     let options = RequestOptions {
//!         protocol: Some(Arc::new(ws::WebSocket::new())),
//!         ..RequestOptions::default()
//!     };
//!     match send_request(Request::get("ws://example.com/chat"), options).await? {
//!         Outcome::Upgraded(resp, upgraded) => {
//!             // `upgraded.stream` and `upgraded.tail` now belong to
//!             // the WebSocket endpoint
//!             let _ = (resp, upgraded);
//!         }
//!         Outcome::Response(resp) => panic!("upgrade refused: {}", resp.status),
//!     }
//!     Ok(())
//! }
//! ```

mod client;
mod connect;
mod error;
mod finalize;
mod h1;
mod header;
mod logger;
mod netrc;
mod pool;
mod protocol;
mod registry;
mod request;
mod response;
mod uri;
pub mod ws;

pub use http::{Method, StatusCode, Version};

pub use client::{ClientOptions, Credentials};
pub use connect::{Transport, TransportStream};
pub use error::{BoxError, Error, WsError};
pub use header::{BodyFraming, ContentLengthError, FramingError, HeaderSet};
pub use pool::{ClientKey, Outcome, Pool, PoolId, PoolOptions, PoolStats, RequestOptions};
pub use protocol::{Protocol, Upgraded};
pub use registry::{pool, send_request, set_ca_certificate_bundle_path, start_pool, stop_pool};
pub use request::Request;
pub use response::{Response, ResponseInternal};
