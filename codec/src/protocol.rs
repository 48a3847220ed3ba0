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

//! Control messages exchanged between the hub and its peers.
//!
//! Every server notification starts with the subject's id as decimal text,
//! followed by a tag field:
//!
//! ```text
//! [uid, "CONNECT_SELF"]
//! [uid, "CONNECT_OTHER", ip, port]
//! [uid, "DISCONNECT"]
//! [uid, "GL_CLAIM_PLAYER_SESSION_SUCCESS" | "GL_CLAIM_PLAYER_SESSION_FAILED"]
//! [uid, <relayed payload>]
//! ```

use crate::{FrameError, FrameResult, Message};
use bytes::Bytes;
use std::net::IpAddr;

/// Tag sent to a new peer carrying its own id.
pub const CONNECT_SELF: &str = "CONNECT_SELF";
/// Tag sent to existing peers when someone joins.
pub const CONNECT_OTHER: &str = "CONNECT_OTHER";
/// Tag sent to remaining peers when someone leaves.
pub const DISCONNECT: &str = "DISCONNECT";
/// Leading tag of a session-claim request.
pub const CLAIM_PLAYER_SESSION: &str = "GL_CLAIM_PLAYER_SESSION";
/// Claim accepted.
pub const CLAIM_PLAYER_SESSION_SUCCESS: &str = "GL_CLAIM_PLAYER_SESSION_SUCCESS";
/// Claim rejected.
pub const CLAIM_PLAYER_SESSION_FAILED: &str = "GL_CLAIM_PLAYER_SESSION_FAILED";

fn notice(uid: u64, tag: &str, limit: usize) -> FrameResult<Message> {
    let mut message = Message::with_limit(limit);
    message.write_number(uid)?;
    message.write_str(tag)?;
    Ok(message)
}

/// `[uid, "CONNECT_SELF"]`
pub fn connect_self(uid: u64, limit: usize) -> FrameResult<Message> {
    notice(uid, CONNECT_SELF, limit)
}

/// `[uid, "CONNECT_OTHER", ip, port]`
pub fn connect_other(uid: u64, ip: IpAddr, port: u16, limit: usize) -> FrameResult<Message> {
    let mut message = notice(uid, CONNECT_OTHER, limit)?;
    message.write_str(&ip.to_string())?;
    message.write_number(port)?;
    Ok(message)
}

/// `[uid, "DISCONNECT"]`
pub fn disconnect(uid: u64, limit: usize) -> FrameResult<Message> {
    notice(uid, DISCONNECT, limit)
}

/// `[uid, "GL_CLAIM_PLAYER_SESSION_SUCCESS" | "GL_CLAIM_PLAYER_SESSION_FAILED"]`
pub fn claim_result(uid: u64, success: bool, limit: usize) -> FrameResult<Message> {
    let tag = if success {
        CLAIM_PLAYER_SESSION_SUCCESS
    } else {
        CLAIM_PLAYER_SESSION_FAILED
    };
    notice(uid, tag, limit)
}

/// `["GL_CLAIM_PLAYER_SESSION", token]`, sent by a client.
pub fn claim_request(token: &str) -> FrameResult<Message> {
    let mut message = Message::new();
    message.write_str(CLAIM_PLAYER_SESSION)?;
    message.write_str(token)?;
    Ok(message)
}

/// Prefixes `payload` with the sender id: `[uid, <payload>]`.
///
/// The payload is spliced in verbatim, so a sender's fields reach the
/// recipients unchanged after the id.
pub fn relay(uid: u64, payload: &Message, limit: usize) -> FrameResult<Message> {
    let mut message = Message::with_limit(limit);
    message.write_number(uid)?;
    message.write_raw(payload.as_bytes())?;
    Ok(message)
}

/// A server notification as seen by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerNotice {
    /// This connection was assigned `uid`.
    ConnectSelf {
        /// Assigned id
        uid: u64,
    },
    /// Another peer joined.
    ConnectOther {
        /// Id of the new peer
        uid: u64,
        /// Remote address of the new peer
        ip: String,
        /// Remote port of the new peer
        port: u16,
    },
    /// A peer left.
    Disconnect {
        /// Id of the departed peer
        uid: u64,
    },
    /// Outcome of this connection's session claim.
    ClaimResult {
        /// Id of the claiming peer
        uid: u64,
        /// Whether the claim was accepted
        success: bool,
    },
    /// A payload relayed from another peer.
    Data {
        /// Id of the sender
        uid: u64,
        /// The sender's original payload
        payload: Bytes,
    },
}

impl ServerNotice {
    /// Parses a notification. Payloads whose second field is not a known
    /// tag are returned as [`ServerNotice::Data`].
    pub fn decode(message: &mut Message) -> FrameResult<ServerNotice> {
        message.rewind();
        let uid = parse_number(&message.read_string()?)?;
        let payload = Bytes::copy_from_slice(message.unread());

        let tag = match message.read_string() {
            Ok(tag) => tag,
            Err(_) => return Ok(ServerNotice::Data { uid, payload }),
        };

        let notice = match tag.as_str() {
            CONNECT_SELF => ServerNotice::ConnectSelf { uid },
            CONNECT_OTHER => {
                let ip = message.read_string()?;
                let port = parse_number(&message.read_string()?)?;
                ServerNotice::ConnectOther { uid, ip, port }
            }
            DISCONNECT => ServerNotice::Disconnect { uid },
            CLAIM_PLAYER_SESSION_SUCCESS => ServerNotice::ClaimResult { uid, success: true },
            CLAIM_PLAYER_SESSION_FAILED => ServerNotice::ClaimResult {
                uid,
                success: false,
            },
            _ => ServerNotice::Data { uid, payload },
        };
        Ok(notice)
    }

    /// Id of the peer the notice is about.
    pub fn uid(&self) -> u64 {
        match self {
            ServerNotice::ConnectSelf { uid }
            | ServerNotice::ConnectOther { uid, .. }
            | ServerNotice::Disconnect { uid }
            | ServerNotice::ClaimResult { uid, .. }
            | ServerNotice::Data { uid, .. } => *uid,
        }
    }
}

fn parse_number<N: std::str::FromStr>(text: &str) -> FrameResult<N> {
    text.parse().map_err(|_| FrameError::InvalidNumber(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MESSAGE_SIZE;

    #[test]
    fn test_connect_other_layout() {
        let mut message =
            connect_other(12, "127.0.0.1".parse().unwrap(), 40000, MESSAGE_SIZE).unwrap();
        assert_eq!(message.read_string().unwrap(), "12");
        assert_eq!(message.read_string().unwrap(), CONNECT_OTHER);
        assert_eq!(message.read_string().unwrap(), "127.0.0.1");
        assert_eq!(message.read_string().unwrap(), "40000");
        assert_eq!(message.remaining(), 0);
    }

    #[test]
    fn test_relay_splices_payload() {
        let mut payload = Message::new();
        payload.write_str("hi").unwrap();
        let mut message = relay(10, &payload, MESSAGE_SIZE).unwrap();
        assert_eq!(message.read_string().unwrap(), "10");
        assert_eq!(message.read_string().unwrap(), "hi");
    }

    #[test]
    fn test_relay_respects_limit() {
        let payload = Message::from_payload(vec![0u8; 8], 8).unwrap();
        assert!(matches!(
            relay(10, &payload, 8),
            Err(FrameError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_decode_notices() {
        let mut message = connect_self(10, MESSAGE_SIZE).unwrap();
        assert_eq!(
            ServerNotice::decode(&mut message).unwrap(),
            ServerNotice::ConnectSelf { uid: 10 }
        );

        let mut message = disconnect(11, MESSAGE_SIZE).unwrap();
        assert_eq!(
            ServerNotice::decode(&mut message).unwrap(),
            ServerNotice::Disconnect { uid: 11 }
        );

        let mut message = claim_result(12, false, MESSAGE_SIZE).unwrap();
        assert_eq!(
            ServerNotice::decode(&mut message).unwrap(),
            ServerNotice::ClaimResult {
                uid: 12,
                success: false
            }
        );

        let mut message =
            connect_other(13, "10.0.0.2".parse().unwrap(), 7, MESSAGE_SIZE).unwrap();
        assert_eq!(
            ServerNotice::decode(&mut message).unwrap(),
            ServerNotice::ConnectOther {
                uid: 13,
                ip: "10.0.0.2".to_string(),
                port: 7
            }
        );
    }

    #[test]
    fn test_decode_data() {
        let mut payload = Message::new();
        payload.write_str("hi").unwrap();
        let mut message = relay(10, &payload, MESSAGE_SIZE).unwrap();
        let notice = ServerNotice::decode(&mut message).unwrap();
        assert_eq!(
            notice,
            ServerNotice::Data {
                uid: 10,
                payload: Bytes::copy_from_slice(payload.as_bytes())
            }
        );
        assert_eq!(notice.uid(), 10);

        let empty = Message::new();
        let mut message = relay(14, &empty, MESSAGE_SIZE).unwrap();
        assert_eq!(
            ServerNotice::decode(&mut message).unwrap(),
            ServerNotice::Data {
                uid: 14,
                payload: Bytes::new()
            }
        );
    }

    #[test]
    fn test_decode_rejects_non_numeric_uid() {
        let mut message = Message::new();
        message.write_str("abc").unwrap();
        message.write_str(DISCONNECT).unwrap();
        assert!(matches!(
            ServerNotice::decode(&mut message),
            Err(FrameError::InvalidNumber(_))
        ));
    }
}
