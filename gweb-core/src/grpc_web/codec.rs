//! # gRPC-Web Frame Codec
//!
//! Every gRPC-Web request and response body is a sequence of frames:
//!
//! ```text
//! [flag:1][length:4 big-endian][payload:length]
//! ```
//!
//! The high bit of `flag` marks a trailer frame, whose payload is a block of
//! `key: value` lines carrying the call status. All other flag bits are reserved
//! and ignored while decoding.
//!
//! [`GrpcWebCodec`] implements `tokio_util`'s `Decoder`/`Encoder` so the same code
//! drives both the incremental decoding of an HTTP body stream
//! (`FramedRead<StreamReader<..>, GrpcWebCodec>`) and the in-memory helpers
//! [`decode_all`] and [`decode_response`].
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

/// Default limit for a single frame payload (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Size of the `[flag][length]` prefix of every frame.
pub const FRAME_HEADER_SIZE: usize = 5;

const TRAILER_FLAG: u8 = 0x80;

pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error while reading frames: '{0}'")]
    Io(#[from] std::io::Error),

    #[error("Frame header truncated: got {0} of 5 bytes")]
    TruncatedHeader(usize),

    #[error("Corrupt frame: declared {expected} payload bytes but the stream ended after {received}")]
    TruncatedPayload { expected: usize, received: usize },

    #[error("Message size {size} exceeds limit {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// Frames decoded before an error, plus the error itself.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode frames after {} complete frame(s): '{source}'", .frames.len())]
pub struct DecodeAllError {
    pub frames: Vec<Frame>,
    #[source]
    pub source: FrameError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Trailer,
}

impl FrameKind {
    fn from_flag(flag: u8) -> Self {
        if flag & TRAILER_FLAG != 0 {
            FrameKind::Trailer
        } else {
            FrameKind::Data
        }
    }

    fn flag(self) -> u8 {
        match self {
            FrameKind::Data => 0x00,
            FrameKind::Trailer => TRAILER_FLAG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Data,
            payload: payload.into(),
        }
    }

    pub fn trailer(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Trailer,
            payload: payload.into(),
        }
    }
}

/// The status of a completed call, as reported by the `grpc-status` and
/// `grpc-message` trailers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Human readable code name (e.g. `NotFound`).
    pub fn code_name(&self) -> String {
        format!("{:?}", tonic::Code::from_i32(self.code))
    }
}

/// A fully decoded response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Data frame payloads in arrival order.
    pub messages: Vec<Bytes>,
    /// Trailer entries with lower-cased keys, last write wins.
    pub trailers: HashMap<String, String>,
    /// Present only if a trailer carried `grpc-status` or `grpc-message`.
    pub status: Option<Status>,
}

impl DecodedResponse {
    /// Folds one decoded frame into the response.
    pub fn push(&mut self, frame: Frame) {
        match frame.kind {
            FrameKind::Data => self.messages.push(frame.payload),
            FrameKind::Trailer => self.push_trailer(&frame.payload),
        }
    }

    fn push_trailer(&mut self, payload: &[u8]) {
        for (key, value) in parse_trailers(payload) {
            match key.as_str() {
                GRPC_STATUS => {
                    self.status.get_or_insert_with(Status::default).code =
                        parse_status_code(&value)
                }
                GRPC_MESSAGE => {
                    self.status.get_or_insert_with(Status::default).message = value.clone()
                }
                _ => {}
            }
            self.trailers.insert(key, value);
        }
    }

    /// The call status; a response without a trailer frame counts as OK.
    pub fn status_or_ok(&self) -> Status {
        self.status.clone().unwrap_or_default()
    }
}

/// Decoder/encoder for gRPC-Web frames.
///
/// The decoder never consumes a partial frame: bytes stay in the buffer until the whole
/// frame is available, so a stream that ends mid-frame is detected in `decode_eof`.
#[derive(Debug, Clone)]
pub struct GrpcWebCodec {
    max_message_size: usize,
}

impl Default for GrpcWebCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl GrpcWebCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Decoder for GrpcWebCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let flag = src[0];
        let length = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

        // Checked before waiting for (or reserving) the payload.
        if length > self.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: length,
                max: self.max_message_size,
            });
        }

        let frame_len = FRAME_HEADER_SIZE + length;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        Ok(Some(Frame {
            kind: FrameKind::from_flag(flag),
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        match src.len() {
            0 => Ok(None),
            n if n < FRAME_HEADER_SIZE => Err(FrameError::TruncatedHeader(n)),
            n => {
                let expected = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
                Err(FrameError::TruncatedPayload {
                    expected,
                    received: n - FRAME_HEADER_SIZE,
                })
            }
        }
    }
}

impl Encoder<Frame> for GrpcWebCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let length = u32::try_from(frame.payload.len())
            .map_err(|_| FrameError::PayloadTooLarge(frame.payload.len()))?;

        dst.reserve(FRAME_HEADER_SIZE + frame.payload.len());
        dst.put_u8(frame.kind.flag());
        dst.put_u32(length);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

/// Encodes a single data frame carrying `message`.
pub fn encode_message(message: &[u8]) -> Result<Bytes, FrameError> {
    encode_frame(Frame::data(Bytes::copy_from_slice(message)))
}

/// Encodes a trailer frame, one `key: value\r\n` line per entry.
pub fn encode_trailer<'a>(
    trailers: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Bytes, FrameError> {
    let mut payload = BytesMut::new();
    for (key, value) in trailers {
        payload.put_slice(key.as_bytes());
        payload.put_slice(b": ");
        payload.put_slice(value.as_bytes());
        payload.put_slice(b"\r\n");
    }
    encode_frame(Frame::trailer(payload.freeze()))
}

pub fn encode_frame(frame: Frame) -> Result<Bytes, FrameError> {
    let mut dst = BytesMut::new();
    GrpcWebCodec::default().encode(frame, &mut dst)?;
    Ok(dst.freeze())
}

/// Decodes every frame in `data`.
///
/// On failure the frames decoded before the error are returned inside [`DecodeAllError`].
pub fn decode_all(data: &[u8], max_message_size: usize) -> Result<Vec<Frame>, DecodeAllError> {
    let mut codec = GrpcWebCodec::new(max_message_size);
    let mut buf = BytesMut::from(data);
    let mut frames = Vec::new();

    loop {
        match codec.decode_eof(&mut buf) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => return Ok(frames),
            Err(source) => return Err(DecodeAllError { frames, source }),
        }
    }
}

/// Decodes a complete response body, separating data payloads from trailers.
pub fn decode_response(data: &[u8]) -> Result<DecodedResponse, DecodeAllError> {
    let frames = decode_all(data, DEFAULT_MAX_MESSAGE_SIZE)?;

    let mut response = DecodedResponse::default();
    for frame in frames {
        response.push(frame);
    }
    Ok(response)
}

/// Parses a trailer block into lower-cased keys and trimmed values.
///
/// Blank lines and lines without a colon are skipped.
pub fn parse_trailers(payload: &[u8]) -> Vec<(String, String)> {
    String::from_utf8_lossy(payload)
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Reads the leading integer of a `grpc-status` value, `0` if there is none.
pub fn parse_status_code(value: &str) -> i32 {
    let value = value.trim_start();
    let sign_len = usize::from(value.starts_with(['-', '+']));
    let digits_len = value[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();

    value[..sign_len + digits_len].parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(frames: &[Frame]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|f| encode_frame(f.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_message_encodes_to_header_only() {
        assert_eq!(encode_message(&[]).unwrap().as_ref(), &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_layout() {
        let encoded = encode_message(b"abc").unwrap();
        assert_eq!(encoded.as_ref(), &[0x00, 0, 0, 0, 3, b'a', b'b', b'c']);

        let trailer = encode_trailer([("grpc-status", "0")]).unwrap();
        assert_eq!(trailer[0], 0x80);
        assert_eq!(&trailer[5..], b"grpc-status: 0\r\n");
    }

    #[test]
    fn test_data_frame_round_trip() {
        let payload: Vec<u8> = (0..=255).collect();
        let frames = decode_all(&encode_message(&payload).unwrap(), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();

        assert_eq!(frames, vec![Frame::data(payload)]);
    }

    #[test]
    fn test_decode_response_with_trailers() {
        let data = body(&[
            Frame::data(&b"one"[..]),
            Frame::data(&b"two"[..]),
            Frame::trailer(&b"Grpc-Status: 5\r\ngrpc-message: not found\r\nx-extra: v\r\n"[..]),
        ]);

        let response = decode_response(&data).unwrap();

        assert_eq!(response.messages, vec![Bytes::from("one"), Bytes::from("two")]);
        assert_eq!(response.trailers.get("grpc-status").map(String::as_str), Some("5"));
        assert_eq!(response.trailers.get("x-extra").map(String::as_str), Some("v"));
        assert_eq!(
            response.status,
            Some(Status {
                code: 5,
                message: "not found".to_string()
            })
        );
    }

    #[test]
    fn test_missing_status_means_ok() {
        let data = body(&[Frame::data(&b"x"[..])]);
        let response = decode_response(&data).unwrap();

        assert_eq!(response.status, None);
        assert!(response.status_or_ok().is_ok());

        let data = body(&[Frame::trailer(&b"x-only: 1\r\n"[..])]);
        let response = decode_response(&data).unwrap();
        assert_eq!(response.status, None);
        assert_eq!(response.trailers.get("x-only").map(String::as_str), Some("1"));

        let data = body(&[Frame::trailer(&b"grpc-message: partial\r\n"[..])]);
        let response = decode_response(&data).unwrap();
        assert_eq!(
            response.status,
            Some(Status {
                code: 0,
                message: "partial".to_string()
            })
        );
    }

    #[test]
    fn test_reserved_flag_bits_are_tolerated() {
        let mut data = body(&[Frame::trailer(&b"grpc-status: 0\r\n"[..])]);
        data[0] = 0x81;
        data.extend_from_slice(&[0x01, 0, 0, 0, 1, b'z']);

        let frames = decode_all(&data, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(frames[0].kind, FrameKind::Trailer);
        assert_eq!(frames[1], Frame::data(&b"z"[..]));
    }

    #[test]
    fn test_oversized_frame_is_rejected_before_payload() {
        // Declares 1 KiB but carries nothing: the limit must trip first.
        let data = [0x00, 0x00, 0x00, 0x04, 0x00];

        let err = decode_all(&data, 16).unwrap_err();
        assert!(matches!(
            err.source,
            FrameError::MessageTooLarge { size: 1024, max: 16 }
        ));
    }

    #[test]
    fn test_empty_stream_is_a_clean_end() {
        let frames = decode_all(&[], DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert!(frames.is_empty());

        let response = decode_response(&[]).unwrap();
        assert_eq!(response, DecodedResponse::default());
    }

    #[test]
    fn test_truncated_header_and_payload() {
        let err = decode_all(&[0x00, 0x00, 0x00], DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err.source, FrameError::TruncatedHeader(3)));

        let err = decode_all(&[0x00, 0, 0, 0, 4, b'a'], DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(
            err.source,
            FrameError::TruncatedPayload { expected: 4, received: 1 }
        ));
    }

    #[test]
    fn test_decode_all_keeps_frames_before_error() {
        let mut data = body(&[Frame::data(&b"ok"[..])]);
        data.extend_from_slice(&[0x00, 0x00]);

        let err = decode_all(&data, DEFAULT_MAX_MESSAGE_SIZE).unwrap_err();
        assert_eq!(err.frames, vec![Frame::data(&b"ok"[..])]);
        assert!(matches!(err.source, FrameError::TruncatedHeader(2)));
    }

    #[test]
    fn test_trailer_parsing_rules() {
        let parsed = parse_trailers(b"A: 1\r\n\r\nno-colon\r\nb:  two words \r\na: 3\r\n");
        assert_eq!(
            parsed,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two words".to_string()),
                ("a".to_string(), "3".to_string()),
            ]
        );

        let mut response = DecodedResponse::default();
        response.push(Frame::trailer(&b"A: 1\r\na: 3\r\n"[..]));
        assert_eq!(response.trailers.get("a").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_status_code_parsing() {
        assert_eq!(parse_status_code("14"), 14);
        assert_eq!(parse_status_code(" 7 trailing"), 7);
        assert_eq!(parse_status_code("abc"), 0);
        assert_eq!(parse_status_code(""), 0);
    }
}
