//! Wire protocol between frame clients and the server.
//!
//! ```text
//! client → server   i32 LE request code, one of -1, 0, 1, 2, 3
//! server → client   (code 1 only) u32 LE length L, then L payload bytes
//! ```
//!
//! [`RequestCodec`] is the server half, [`ResponseCodec`] the client
//! half; both plug into `tokio_util::codec::Framed`.

use std::ops::Range;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;

/// Size of a request code on the wire.
pub const REQUEST_LEN: usize = 4;

/// Size of the length prefix in front of a frame response.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Accepted request codes.
pub const VALID_CODES: Range<i32> = -1..4;

// ── Request ──────────────────────────────────────────────────────

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// `-1`: the client is done; close the connection.
    Close,
    /// `0`: liveness ping, no reply.
    Ping,
    /// `1`: send the current compressed frame.
    SendFrame,
    /// `2` and `3`: accepted and ignored.
    Reserved(i32),
}

impl Request {
    /// Map a wire code to a request.
    pub fn from_code(code: i32) -> Result<Self, StreamError> {
        match code {
            -1 => Ok(Self::Close),
            0 => Ok(Self::Ping),
            1 => Ok(Self::SendFrame),
            c if VALID_CODES.contains(&c) => Ok(Self::Reserved(c)),
            c => Err(StreamError::InvalidRequest(c)),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Close => -1,
            Self::Ping => 0,
            Self::SendFrame => 1,
            Self::Reserved(c) => c,
        }
    }
}

// ── RequestCodec (server side) ───────────────────────────────────

/// Decodes request codes and encodes length-prefixed frame payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCodec;

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < REQUEST_LEN {
            return Ok(None);
        }
        let code = src.get_i32_le();
        Request::from_code(code).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(request) => Ok(Some(request)),
            None if src.is_empty() => Ok(None),
            None => Err(StreamError::TruncatedRequest {
                received: src.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for RequestCodec {
    type Error = StreamError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = u32::try_from(payload.len()).map_err(|_| StreamError::ResponseTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        dst.reserve(LENGTH_PREFIX_LEN + payload.len());
        dst.put_u32_le(len);
        dst.extend_from_slice(&payload);
        Ok(())
    }
}

// ── ResponseCodec (client side) ──────────────────────────────────

/// Default cap on a single frame response.
pub const DEFAULT_MAX_RESPONSE: usize = 16 * 1024 * 1024;

/// Encodes request codes and decodes length-prefixed frame payloads.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCodec {
    max_response: usize,
}

impl ResponseCodec {
    pub fn new(max_response: usize) -> Self {
        Self { max_response }
    }
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RESPONSE)
    }
}

impl Decoder for ResponseCodec {
    type Item = Bytes;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        let len = u32::from_le_bytes(prefix) as usize;

        if len > self.max_response {
            return Err(StreamError::ResponseTooLarge {
                size: len,
                max: self.max_response,
            });
        }
        if src.len() < LENGTH_PREFIX_LEN + len {
            src.reserve(LENGTH_PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Request> for ResponseCodec {
    type Error = StreamError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_i32_le(request.code());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_range() {
        for code in -1..4 {
            assert_eq!(Request::from_code(code).unwrap().code(), code);
        }
        assert!(matches!(Request::from_code(-2), Err(StreamError::InvalidRequest(-2))));
        assert!(matches!(Request::from_code(4), Err(StreamError::InvalidRequest(4))));
        assert_eq!(Request::from_code(2).unwrap(), Request::Reserved(2));
    }

    #[test]
    fn decodes_requests_across_reads() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[1, 0]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Request::SendFrame));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Request::Close));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_request_at_eof() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&[7u8, 0][..]);
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, StreamError::TruncatedRequest { received: 2 }));

        let mut empty = BytesMut::new();
        assert_eq!(codec.decode_eof(&mut empty).unwrap(), None);
    }

    #[test]
    fn invalid_code_is_an_error() {
        let mut codec = RequestCodec;
        let mut buf = BytesMut::from(&4i32.to_le_bytes()[..]);
        assert!(matches!(codec.decode(&mut buf), Err(StreamError::InvalidRequest(4))));
    }

    #[test]
    fn response_is_length_prefixed() {
        let mut server = RequestCodec;
        let mut wire = BytesMut::new();
        server.encode(Bytes::from_static(b"abc"), &mut wire).unwrap();
        assert_eq!(&wire[..], &[3, 0, 0, 0, b'a', b'b', b'c']);

        let mut client = ResponseCodec::default();
        let mut partial = wire.split_to(5);
        assert_eq!(client.decode(&mut partial).unwrap(), None);
        partial.unsplit(wire);
        assert_eq!(client.decode(&mut partial).unwrap().unwrap(), Bytes::from_static(b"abc"));
    }

    #[test]
    fn oversized_response_rejected() {
        let mut client = ResponseCodec::new(10);
        let mut buf = BytesMut::new();
        buf.put_u32_le(11);
        assert!(matches!(
            client.decode(&mut buf),
            Err(StreamError::ResponseTooLarge { size: 11, max: 10 })
        ));
    }

    #[test]
    fn client_encodes_codes() {
        let mut client = ResponseCodec::default();
        let mut buf = BytesMut::new();
        client.encode(Request::Close, &mut buf).unwrap();
        client.encode(Request::Reserved(3), &mut buf).unwrap();
        assert_eq!(&buf[..], &[0xFF, 0xFF, 0xFF, 0xFF, 3, 0, 0, 0]);
    }
}
