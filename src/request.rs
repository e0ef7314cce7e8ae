//! Request message type.

use bytes::Bytes;
use http::Method;

use crate::header::HeaderSet;

/// An HTTP request as constructed by the caller.
///
/// `target` is a URI reference: absolute (`http://host/path`) when
/// handed to a pool, origin-form (`/path?query`) once the pool has
/// rewritten it for the wire. An empty body means "no body".
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub header: HeaderSet,
    pub body: Bytes,
}

impl Request {
    /// A bodyless GET request for `target`.
    pub fn get(target: impl Into<String>) -> Request {
        Request {
            method: Method::GET,
            target: target.into(),
            header: HeaderSet::new(),
            body: Bytes::new(),
        }
    }

    pub fn new(method: Method, target: impl Into<String>) -> Request {
        Request {
            method,
            target: target.into(),
            header: HeaderSet::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Request {
        self.header.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Request {
        self.body = body.into();
        self
    }
}
