//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::message::LENGTH_PREFIX_SIZE;
use crate::{FrameError, MESSAGE_SIZE, Message};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// One unit decoded from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A complete frame whose payload fit within the size limit.
    Message(Message),
    /// A frame that declared more than the size limit. Exactly `declared`
    /// payload bytes were consumed and thrown away, keeping the stream aligned.
    Discarded {
        /// Length the peer declared in the header
        declared: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderState {
    Header,
    Payload { length: usize },
    Discarding { declared: usize, remaining: usize },
}

/// Codec for `u32` big-endian length-prefixed frames.
///
/// Each frame on the wire is a 4 byte header holding the payload length
/// followed by exactly that many payload bytes. The header is not part of
/// the decoded [`Message`]; it is stripped on decode and added on encode.
///
/// Frames larger than the configured limit are never buffered. The decoder
/// skips their payload as it arrives and then reports [`Frame::Discarded`].
///
/// # Example
/// ```
/// use broadsock_codec::{Frame, FrameCodec, Message};
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = FrameCodec::new();
/// let mut message = Message::new();
/// message.write_str("hi").unwrap();
///
/// let mut wire = BytesMut::new();
/// codec.encode(&message, &mut wire).unwrap();
/// assert_eq!(&wire[..4], &[0, 0, 0, 6]);
///
/// let decoded = codec.decode(&mut wire).unwrap();
/// assert_eq!(decoded, Some(Frame::Message(message)));
/// ```
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_message_size: usize,
    state: DecoderState,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new()
    }
}

impl FrameCodec {
    /// Creates a codec limited to [`MESSAGE_SIZE`] byte payloads.
    pub fn new() -> FrameCodec {
        FrameCodec::with_max_message_size(MESSAGE_SIZE)
    }

    /// Creates a codec limited to `max_message_size` byte payloads.
    pub fn with_max_message_size(max_message_size: usize) -> FrameCodec {
        FrameCodec {
            max_message_size,
            state: DecoderState::Header,
        }
    }

    /// Largest payload accepted in either direction.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encodes `message` into a standalone wire frame.
    ///
    /// Used to encode once and write the same bytes to many recipients.
    pub fn encode_frame(&self, message: &Message) -> Result<Bytes, FrameError> {
        let mut dst = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + message.len());
        self.write_frame(message.as_bytes(), &mut dst)?;
        Ok(dst.freeze())
    }

    fn write_frame(&self, payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
        if payload.len() > self.max_message_size {
            return Err(FrameError::CapacityExceeded {
                required: payload.len(),
                limit: self.max_message_size,
            });
        }
        dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecoderState::Header => {
                    if src.len() < LENGTH_PREFIX_SIZE {
                        src.reserve(LENGTH_PREFIX_SIZE - src.len());
                        return Ok(None);
                    }
                    let length = src.get_u32() as usize;
                    if length > self.max_message_size {
                        warn!(
                            declared = length,
                            limit = self.max_message_size,
                            "Discarding oversized frame"
                        );
                        self.state = DecoderState::Discarding {
                            declared: length,
                            remaining: length,
                        };
                    } else {
                        trace!(length, "Frame header decoded");
                        src.reserve(length.saturating_sub(src.len()));
                        self.state = DecoderState::Payload { length };
                    }
                }
                DecoderState::Payload { length } => {
                    if src.len() < length {
                        return Ok(None);
                    }
                    let payload = src.split_to(length);
                    self.state = DecoderState::Header;
                    let message = Message::from_payload(&payload, self.max_message_size)?;
                    return Ok(Some(Frame::Message(message)));
                }
                DecoderState::Discarding {
                    declared,
                    remaining,
                } => {
                    let skip = remaining.min(src.len());
                    src.advance(skip);
                    let remaining = remaining - skip;
                    if remaining == 0 {
                        self.state = DecoderState::Header;
                        return Ok(Some(Frame::Discarded { declared }));
                    }
                    self.state = DecoderState::Discarding {
                        declared,
                        remaining,
                    };
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let state = std::mem::replace(&mut self.state, DecoderState::Header);
        match state {
            DecoderState::Header if src.is_empty() => Ok(None),
            DecoderState::Header => {
                let available = src.len();
                src.clear();
                Err(FrameError::TruncatedMessage {
                    declared: LENGTH_PREFIX_SIZE,
                    available,
                })
            }
            DecoderState::Payload { length } => {
                let available = src.len();
                src.clear();
                Err(FrameError::TruncatedMessage {
                    declared: length,
                    available,
                })
            }
            DecoderState::Discarding {
                declared,
                remaining,
            } => Err(FrameError::TruncatedMessage {
                declared,
                available: declared - remaining,
            }),
        }
    }
}

impl Encoder<&Message> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write_frame(item.as_bytes(), dst)
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.write_frame(item.as_bytes(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn wire(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn test_decode_partial_header() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.put_slice(&[0, 2, b'o', b'k']);
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Message(message)) => assert_eq!(message.as_bytes(), b"ok"),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_payload() {
        let mut codec = FrameCodec::new();
        let mut full = wire(b"hello");
        let mut buf = full.split_to(6);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.unsplit(full);
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Message(_))
        ));
    }

    #[test]
    fn test_decode_zero_length_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = wire(b"");
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Message(message)) => assert!(message.is_empty()),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    #[traced_test]
    fn test_oversized_frame_is_discarded_in_pieces() {
        let mut codec = FrameCodec::with_max_message_size(4);
        let mut buf = BytesMut::new();
        buf.put_u32(6);
        buf.put_slice(b"abc");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());

        buf.put_slice(b"def");
        buf.extend_from_slice(&wire(b"ok"));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Discarded { declared: 6 })
        );
        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Message(message)) => assert_eq!(message.as_bytes(), b"ok"),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(logs_contain("Discarding oversized frame"));
    }

    #[test]
    fn test_decode_eof_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_eof_mid_payload() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_slice(b"abc");
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::TruncatedMessage {
                declared: 10,
                available: 3
            })
        ));
    }

    #[test]
    fn test_decode_eof_mid_discard() {
        let mut codec = FrameCodec::with_max_message_size(2);
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_slice(b"ab");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::TruncatedMessage {
                declared: 5,
                available: 2
            })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut codec = FrameCodec::with_max_message_size(2);
        let message = Message::from_payload(b"abc", 16).unwrap();
        let mut dst = BytesMut::new();
        assert!(codec.encode(&message, &mut dst).is_err());
        assert!(dst.is_empty());
        assert!(codec.encode_frame(&message).is_err());
    }

    #[test]
    fn test_encode_frame_matches_encoder() {
        let mut codec = FrameCodec::new();
        let mut message = Message::new();
        message.write_number(11u64).unwrap();
        message.write_str("DISCONNECT").unwrap();

        let mut dst = BytesMut::new();
        codec.encode(&message, &mut dst).unwrap();
        assert_eq!(codec.encode_frame(&message).unwrap(), dst.freeze());
    }
}
