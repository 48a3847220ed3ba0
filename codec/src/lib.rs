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

//! # Broadsock Message Codec
//!
//! Framing primitives shared by the Broadsock hub and its clients.
//!
//! ## Wire Format
//!
//! A frame is a `u32` big-endian payload length followed by the payload. The
//! payload is a sequence of fields, each itself a `u32` big-endian length
//! followed by that many bytes. Numbers travel as decimal text.
//!
//! ```text
//! +------------+-----------+---------+-----------+---------+
//! | frame len  | field len | field   | field len | field   | ...
//! | u32 BE     | u32 BE    | bytes   | u32 BE    | bytes   |
//! +------------+-----------+---------+-----------+---------+
//! ```
//!
//! ## Core Components
//!
//! - [`Message`]: bounded buffer with write and read cursors used to build and
//!   parse payloads.
//! - [`FrameCodec`]: `tokio_util` [`Decoder`](tokio_util::codec::Decoder) and
//!   [`Encoder`](tokio_util::codec::Encoder) for frames. Oversized frames are
//!   drained rather than buffered so the stream stays aligned.
//! - [`protocol`]: control message tags, builders and the client-side
//!   [`ServerNotice`](protocol::ServerNotice) parser.

mod frame;
mod message;
pub mod protocol;
mod result;

pub use frame::{Frame, FrameCodec};
pub use message::{LENGTH_PREFIX_SIZE, Message};
pub use protocol::ServerNotice;
pub use result::{FrameError, FrameResult};

/// Default maximum payload size of a single frame, in bytes.
pub const MESSAGE_SIZE: usize = 8192;
