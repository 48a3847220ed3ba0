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

/// Result Type for Framing Operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors raised while building, parsing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A write would grow the message past its size limit.
    ///
    /// The message is left untouched; no partial field is written.
    #[error("message capacity exceeded (required: {required}, limit: {limit})")]
    CapacityExceeded {
        /// Total bytes the message would have held after the write
        required: usize,
        /// Maximum bytes the message may hold
        limit: usize,
    },

    /// Fewer bytes remain than a length header declared.
    #[error("truncated message (declared: {declared}, available: {available})")]
    TruncatedMessage {
        /// Number of bytes the header promised
        declared: usize,
        /// Number of bytes actually available
        available: usize,
    },

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A numeric field did not hold decimal text.
    #[error("invalid number field: {0:?}")]
    InvalidNumber(String),

    /// An I/O error surfaced through the codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Check whether the peer sent malformed data.
    ///
    /// Malformed peers are dropped rather than answered.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            FrameError::TruncatedMessage { .. }
                | FrameError::InvalidUtf8(_)
                | FrameError::InvalidNumber(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameError::CapacityExceeded {
            required: 9000,
            limit: 8192,
        };
        assert_eq!(
            err.to_string(),
            "message capacity exceeded (required: 9000, limit: 8192)"
        );

        let err = FrameError::TruncatedMessage {
            declared: 10,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "truncated message (declared: 10, available: 3)"
        );
    }

    #[test]
    fn test_is_malformed() {
        assert!(
            FrameError::TruncatedMessage {
                declared: 4,
                available: 0
            }
            .is_malformed()
        );
        assert!(
            !FrameError::CapacityExceeded {
                required: 1,
                limit: 0
            }
            .is_malformed()
        );
        assert!(!FrameError::Io(std::io::ErrorKind::BrokenPipe.into()).is_malformed());
    }
}
