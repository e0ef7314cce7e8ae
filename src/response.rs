//! Response message type.

use bytes::Bytes;
use http::{StatusCode, Version};

use crate::header::HeaderSet;

/// An HTTP response as produced by a client connection.
#[derive(Debug, Clone)]
pub struct Response {
    pub version: Version,
    pub status: StatusCode,
    pub reason: String,
    pub header: HeaderSet,
    pub body: Bytes,
    pub internal: ResponseInternal,
}

/// Out-of-band response metadata attached by the client.
#[derive(Debug, Clone, Default)]
pub struct ResponseInternal {
    /// On-wire body size before content decoding, when the body was
    /// decompressed.
    pub original_body_size: Option<usize>,
}

impl Response {
    /// Body size for logging: the on-wire size when the body was
    /// decompressed, the delivered size otherwise.
    pub fn reported_body_size(&self) -> usize {
        self.internal.original_body_size.unwrap_or(self.body.len())
    }
}
