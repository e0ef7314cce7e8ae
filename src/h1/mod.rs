//! HTTP/1.1 wire codec: request encoding and incremental response
//! decoding.

use derive_more::Display;

use crate::header::FramingError;

mod chunked;
mod decoder;
mod encoder;

pub(crate) use decoder::ResponseDecoder;
pub(crate) use encoder::encode_request;

/// Protocol violations detected while decoding a response.
#[derive(Debug, Display)]
pub(crate) enum DecodeError {
    #[display("invalid response head: {}", _0)]
    Head(httparse::Error),

    #[display("invalid response status code")]
    Status,

    #[display("response head too large")]
    HeadTooLarge,

    #[display("{}", _0)]
    Framing(FramingError),

    #[display("invalid chunked body: {}", _0)]
    Chunk(&'static str),
}

impl std::error::Error for DecodeError {}

impl From<FramingError> for DecodeError {
    fn from(err: FramingError) -> Self {
        DecodeError::Framing(err)
    }
}
