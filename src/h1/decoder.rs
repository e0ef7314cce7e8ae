//! Incremental response decoder.

use bytes::{Buf as _, BytesMut};
use http::{Method, StatusCode, Version};

use super::chunked::Dechunker;
use super::DecodeError;
use crate::header::{BodyFraming, HeaderSet};
use crate::response::{Response, ResponseInternal};

const MAX_HEADERS: usize = 96;
const MAX_HEAD_SIZE: usize = 131_072;

/// Decoder for one response message.
///
/// Call [`decode`](Self::decode) with the connection's read buffer
/// after every read; `None` means more input is needed. Once a
/// response is returned, bytes left in the buffer belong to whatever
/// follows the message (the upgraded protocol stream after a 101).
#[derive(Debug)]
pub(crate) struct ResponseDecoder {
    state: State,
    head: Option<Head>,
    body: BytesMut,
    head_request: bool,
}

#[derive(Debug)]
struct Head {
    version: Version,
    status: StatusCode,
    reason: String,
    header: HeaderSet,
}

#[derive(Debug)]
enum State {
    Head,
    FixedBody { remaining: u64 },
    ChunkedBody(Dechunker),
    Done,
}

impl ResponseDecoder {
    /// Decoder for the response to a request with the given method.
    /// Responses to HEAD requests never carry a body.
    pub(crate) fn new(request_method: &Method) -> ResponseDecoder {
        ResponseDecoder {
            state: State::Head,
            head: None,
            body: BytesMut::new(),
            head_request: *request_method == Method::HEAD,
        }
    }

    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, DecodeError> {
        loop {
            match &mut self.state {
                State::Head => {
                    let Some((head, head_len)) = parse_head(src)? else {
                        if src.len() > MAX_HEAD_SIZE {
                            return Err(DecodeError::HeadTooLarge);
                        }
                        return Ok(None);
                    };
                    src.advance(head_len);

                    let framing = self.framing_for(&head)?;
                    self.head = Some(head);
                    self.state = match framing {
                        BodyFraming::None => State::Done,
                        BodyFraming::ContentLength(0) => State::Done,
                        BodyFraming::ContentLength(len) => State::FixedBody { remaining: len },
                        BodyFraming::Chunked => State::ChunkedBody(Dechunker::new()),
                    };
                }

                State::FixedBody { remaining } => {
                    let take = (*remaining as usize).min(src.len());
                    self.body.extend_from_slice(&src[..take]);
                    src.advance(take);
                    *remaining -= take as u64;
                    if *remaining > 0 {
                        return Ok(None);
                    }
                    self.state = State::Done;
                }

                State::ChunkedBody(dechunker) => {
                    if !dechunker.decode(src, &mut self.body)? {
                        return Ok(None);
                    }
                    self.state = State::Done;
                }

                State::Done => {
                    let head = self.head.take().expect("decoded head");
                    return Ok(Some(Response {
                        version: head.version,
                        status: head.status,
                        reason: head.reason,
                        header: head.header,
                        body: self.body.split().freeze(),
                        internal: ResponseInternal::default(),
                    }));
                }
            }
        }
    }

    /// RFC 7230 §3.3.3: some responses never carry a body regardless
    /// of their header fields.
    fn framing_for(&self, head: &Head) -> Result<BodyFraming, DecodeError> {
        if self.head_request
            || head.status.is_informational()
            || head.status == StatusCode::NO_CONTENT
            || head.status == StatusCode::NOT_MODIFIED
        {
            return Ok(BodyFraming::None);
        }
        Ok(head.header.body_framing()?)
    }
}

fn parse_head(src: &[u8]) -> Result<Option<(Head, usize)>, DecodeError> {
    let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut parsed);

    let head_len = match res.parse(src) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(err) => return Err(DecodeError::Head(err)),
    };

    let version = match res.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let status =
        StatusCode::from_u16(res.code.unwrap_or(0)).map_err(|_| DecodeError::Status)?;
    let reason = res.reason.unwrap_or("").to_string();

    let mut header = HeaderSet::new();
    for field in res.headers.iter() {
        header.append(field.name, String::from_utf8_lossy(field.value).into_owned());
    }

    Ok(Some((
        Head {
            version,
            status,
            reason,
            header,
        },
        head_len,
    )))
}
