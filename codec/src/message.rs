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

use crate::{FrameError, FrameResult, MESSAGE_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the big-endian length header placed in front of every field.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// A bounded, growable message buffer with independent write and read cursors.
///
/// A `Message` is the payload of one frame on the wire: a sequence of
/// length-prefixed fields. Numbers are written as their decimal text so that
/// every field is a self-describing byte string.
///
/// Writes append at the end of the buffer and fail with
/// [`FrameError::CapacityExceeded`] instead of growing past the message limit.
/// Reads advance a separate cursor which [`Message::rewind`] resets, allowing a
/// handler to peek at a leading tag and hand the message on untouched.
///
/// # Example
/// ```
/// use broadsock_codec::Message;
///
/// let mut message = Message::new();
/// message.write_number(10u64).unwrap();
/// message.write_str("CONNECT_SELF").unwrap();
///
/// assert_eq!(message.read_string().unwrap(), "10");
/// message.rewind();
/// assert_eq!(message.read_string().unwrap(), "10");
/// assert_eq!(message.read_string().unwrap(), "CONNECT_SELF");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    buffer: BytesMut,
    cursor: usize,
    limit: usize,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Creates an empty message limited to [`MESSAGE_SIZE`] bytes.
    pub fn new() -> Message {
        Message::with_limit(MESSAGE_SIZE)
    }

    /// Creates an empty message limited to `limit` bytes.
    pub fn with_limit(limit: usize) -> Message {
        Message {
            buffer: BytesMut::new(),
            cursor: 0,
            limit,
        }
    }

    /// Wraps a received payload. The read cursor starts at the beginning.
    pub fn from_payload(payload: impl AsRef<[u8]>, limit: usize) -> FrameResult<Message> {
        let mut message = Message::with_limit(limit);
        message.write_raw(payload.as_ref())?;
        Ok(message)
    }

    /// Maximum number of bytes this message may hold.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current read cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// The full written content, independent of the read cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The unread tail of the message.
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    /// Consumes the message and returns its content.
    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Resets the read cursor to the start without touching the content.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn ensure_capacity(&self, additional: usize) -> FrameResult<()> {
        let required = self.buffer.len().saturating_add(additional);
        if required > self.limit {
            return Err(FrameError::CapacityExceeded {
                required,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Appends `value` as 4 big-endian bytes.
    pub fn write_u32(&mut self, value: u32) -> FrameResult<()> {
        self.ensure_capacity(LENGTH_PREFIX_SIZE)?;
        self.buffer.put_u32(value);
        Ok(())
    }

    /// Appends raw bytes without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> FrameResult<()> {
        self.ensure_capacity(bytes.len())?;
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Appends a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> FrameResult<()> {
        let length = u32::try_from(bytes.len()).map_err(|_| FrameError::CapacityExceeded {
            required: self.buffer.len().saturating_add(bytes.len()),
            limit: self.limit,
        })?;
        self.ensure_capacity(LENGTH_PREFIX_SIZE + bytes.len())?;
        self.buffer.put_u32(length);
        self.buffer.put_slice(bytes);
        Ok(())
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> FrameResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Appends a number as its base 10 text, length-prefixed.
    pub fn write_number<N: Into<i128>>(&mut self, value: N) -> FrameResult<()> {
        self.write_str(&value.into().to_string())
    }

    /// Reads 4 big-endian bytes.
    pub fn read_u32(&mut self) -> FrameResult<u32> {
        let available = self.remaining();
        if available < LENGTH_PREFIX_SIZE {
            return Err(FrameError::TruncatedMessage {
                declared: LENGTH_PREFIX_SIZE,
                available,
            });
        }
        let mut raw = [0u8; LENGTH_PREFIX_SIZE];
        raw.copy_from_slice(&self.buffer[self.cursor..self.cursor + LENGTH_PREFIX_SIZE]);
        self.cursor += LENGTH_PREFIX_SIZE;
        Ok(u32::from_be_bytes(raw))
    }

    /// Reads a length-prefixed byte string.
    ///
    /// On failure the read cursor is left where it was.
    pub fn read_bytes(&mut self) -> FrameResult<Bytes> {
        let start = self.cursor;
        let declared = self.read_u32()? as usize;
        let available = self.remaining();
        if available < declared {
            self.cursor = start;
            return Err(FrameError::TruncatedMessage {
                declared,
                available,
            });
        }
        let field = Bytes::copy_from_slice(&self.buffer[self.cursor..self.cursor + declared]);
        self.cursor += declared;
        Ok(field)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> FrameResult<String> {
        let start = self.cursor;
        let field = self.read_bytes()?;
        match std::str::from_utf8(&field) {
            Ok(value) => Ok(value.to_owned()),
            Err(error) => {
                self.cursor = start;
                Err(FrameError::InvalidUtf8(error))
            }
        }
    }
}
