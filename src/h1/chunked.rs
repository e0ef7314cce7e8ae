//! Incremental decoder for the chunked transfer coding.

use bytes::{Buf as _, BytesMut};

use super::DecodeError;

/// Byte-at-a-time chunked body decoder.
///
/// Feed it input as it arrives; decoded chunk data accumulates in the
/// caller's output buffer. Trailer fields are consumed and discarded.
#[derive(Debug)]
pub(crate) struct Dechunker {
    state: State,
    size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    SizeWs,
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    Trailer,
    TrailerSkip,
    TrailerSkipLf,
    FinalLf,
    Ended,
}

impl Dechunker {
    pub(crate) fn new() -> Dechunker {
        Dechunker {
            state: State::Size,
            size: 0,
        }
    }

    /// Consume as much of `src` as possible, appending decoded data
    /// to `dst`. Returns `true` once the terminating chunk and any
    /// trailer section have been fully consumed; remaining bytes in
    /// `src` then belong to the next message.
    pub(crate) fn decode(&mut self, src: &mut BytesMut, dst: &mut BytesMut) -> Result<bool, DecodeError> {
        while !src.is_empty() && self.state != State::Ended {
            if self.state == State::Data {
                let take = (self.size as usize).min(src.len());
                dst.extend_from_slice(&src[..take]);
                src.advance(take);
                self.size -= take as u64;
                if self.size == 0 {
                    self.state = State::DataCr;
                }
                continue;
            }

            let byte = src[0];
            src.advance(1);
            self.state = self.step(byte)?;
        }

        Ok(self.state == State::Ended)
    }

    fn step(&mut self, byte: u8) -> Result<State, DecodeError> {
        match self.state {
            State::Size => match byte {
                b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F' => {
                    let digit = (byte as char).to_digit(16).unwrap() as u64;
                    self.size = self
                        .size
                        .checked_mul(16)
                        .and_then(|size| size.checked_add(digit))
                        .ok_or(DecodeError::Chunk("chunk size overflow"))?;
                    Ok(State::Size)
                }
                b' ' | b'\t' => Ok(State::SizeWs),
                b';' => Ok(State::Extension),
                b'\r' => Ok(State::SizeLf),
                _ => Err(DecodeError::Chunk("invalid chunk size")),
            },

            // whitespace may pad the size, but no further digits
            State::SizeWs => match byte {
                b' ' | b'\t' => Ok(State::SizeWs),
                b';' => Ok(State::Extension),
                b'\r' => Ok(State::SizeLf),
                _ => Err(DecodeError::Chunk("invalid chunk size padding")),
            },

            // chunk extensions are skipped, not interpreted
            State::Extension => match byte {
                b'\r' => Ok(State::SizeLf),
                b'\n' | 0x00..=0x08 | 0x0b..=0x1f | 0x7f => {
                    Err(DecodeError::Chunk("invalid chunk extension"))
                }
                _ => Ok(State::Extension),
            },

            State::SizeLf => match byte {
                b'\n' if self.size > 0 => Ok(State::Data),
                b'\n' => Ok(State::Trailer),
                _ => Err(DecodeError::Chunk("missing chunk size line feed")),
            },

            State::Data => unreachable!("bulk-copied in decode"),

            State::DataCr => match byte {
                b'\r' => Ok(State::DataLf),
                _ => Err(DecodeError::Chunk("missing carriage return after chunk data")),
            },

            State::DataLf => match byte {
                b'\n' => Ok(State::Size),
                _ => Err(DecodeError::Chunk("missing line feed after chunk data")),
            },

            // after the zero-size chunk: either the final CRLF or
            // trailer field lines to discard
            State::Trailer => match byte {
                b'\r' => Ok(State::FinalLf),
                _ => Ok(State::TrailerSkip),
            },

            State::TrailerSkip => match byte {
                b'\r' => Ok(State::TrailerSkipLf),
                _ => Ok(State::TrailerSkip),
            },

            State::TrailerSkipLf => match byte {
                b'\n' => Ok(State::Trailer),
                _ => Err(DecodeError::Chunk("missing line feed after trailer field")),
            },

            State::FinalLf => match byte {
                b'\n' => Ok(State::Ended),
                _ => Err(DecodeError::Chunk("missing final line feed")),
            },

            State::Ended => unreachable!("decode stops at Ended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Result<(BytesMut, BytesMut), DecodeError> {
        let mut src = BytesMut::from(input);
        let mut dst = BytesMut::new();
        let mut dechunker = Dechunker::new();
        let done = dechunker.decode(&mut src, &mut dst)?;
        assert!(done, "input should contain a complete chunked body");
        Ok((dst, src))
    }

    #[test]
    fn decodes_single_chunk() {
        let (body, rest) = decode_all(b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        assert_eq!(&body[..], b"hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn decodes_split_input() {
        let mut dechunker = Dechunker::new();
        let mut dst = BytesMut::new();

        for piece in [&b"4\r"[..], b"\nwi", b"ki\r\n5\r\npedia", b"\r\n0\r\n\r\n"] {
            let mut src = BytesMut::from(piece);
            let done = dechunker.decode(&mut src, &mut dst).unwrap();
            assert!(src.is_empty());
            if piece.ends_with(b"0\r\n\r\n") {
                assert!(done);
            }
        }

        assert_eq!(&dst[..], b"wikipedia");
    }

    #[test]
    fn skips_extensions_and_trailers() {
        let (body, rest) =
            decode_all(b"3;name=value\r\nabc\r\n0\r\nExpires: never\r\nX-T: 1\r\n\r\n").unwrap();
        assert_eq!(&body[..], b"abc");
        assert!(rest.is_empty());
    }

    #[test]
    fn preserves_bytes_after_the_body() {
        let (body, rest) = decode_all(b"1\r\nx\r\n0\r\n\r\ntail").unwrap();
        assert_eq!(&body[..], b"x");
        assert_eq!(&rest[..], b"tail");
    }

    #[test]
    fn rejects_invalid_size() {
        let mut src = BytesMut::from(&b"zz\r\n"[..]);
        let mut dst = BytesMut::new();
        let err = Dechunker::new().decode(&mut src, &mut dst).unwrap_err();
        assert!(matches!(err, DecodeError::Chunk(_)));
    }

    #[test]
    fn rejects_oversized_chunk() {
        let mut src = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        let mut dst = BytesMut::new();
        let err = Dechunker::new().decode(&mut src, &mut dst).unwrap_err();
        assert!(matches!(err, DecodeError::Chunk("chunk size overflow")));
    }
}
