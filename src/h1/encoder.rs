//! Request encoder.

use bytes::{BufMut as _, BytesMut};

use crate::request::Request;

const AVERAGE_HEADER_SIZE: usize = 30;

/// Serialize a finalized request.
///
/// The request line uses `target` verbatim; the caller is expected to
/// have rewritten it to origin-form. Header fields are written in
/// order with their stored casing.
pub(crate) fn encode_request(req: &Request) -> BytesMut {
    let mut dst = BytesMut::with_capacity(
        req.method.as_str().len()
            + req.target.len()
            + 12
            + req.header.len() * AVERAGE_HEADER_SIZE
            + req.body.len(),
    );

    dst.extend_from_slice(req.method.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.extend_from_slice(req.target.as_bytes());
    dst.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in req.header.iter() {
        dst.extend_from_slice(name.as_bytes());
        dst.extend_from_slice(b": ");
        dst.extend_from_slice(value.as_bytes());
        dst.extend_from_slice(b"\r\n");
    }

    dst.extend_from_slice(b"\r\n");
    dst.extend_from_slice(&req.body);

    dst
}
