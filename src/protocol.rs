//! Protocol upgrade plumbing.
//!
//! A [`Protocol`] shapes the upgrade handshake: it mutates the
//! outgoing request, validates the `101 Switching Protocols`
//! response, and receives the connection once the HTTP client has
//! relinquished it.

use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::connect::TransportStream;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// An upgrade protocol selected through request options.
pub trait Protocol: fmt::Debug + Send + Sync {
    /// Reject targets the protocol cannot be spoken over.
    fn validate_target(&self, url: &Url) -> Result<(), Error> {
        let _ = url;
        Ok(())
    }

    /// Mutate the request into an upgrade handshake.
    fn prepare_request(&self, req: &mut Request);

    /// Validate a `101 Switching Protocols` response.
    fn validate_response(&self, resp: &Response) -> Result<(), Error>;
}

/// A connection handed off after a successful upgrade.
///
/// The HTTP client no longer owns the socket; `tail` holds the bytes
/// that arrived together with the 101 head but belong to the upgraded
/// protocol stream, and must be processed before reading from
/// `stream`.
#[derive(Debug)]
pub struct Upgraded {
    pub stream: TransportStream,
    pub tail: Bytes,
}
