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

//! Stream-level tests for the frame codec

use broadsock_codec::protocol::{self, ServerNotice};
use broadsock_codec::{Frame, FrameCodec, FrameError, MESSAGE_SIZE, Message};
use futures_util::{SinkExt, StreamExt};
use proptest::prelude::*;
use tokio::io::{AsyncWriteExt, duplex};
use tokio_util::codec::{FramedRead, FramedWrite};

proptest! {
    #[test]
    fn prop_length_prefixed_round_trip(fields in proptest::collection::vec(".{0,64}", 1..8)) {
        let mut message = Message::new();
        for field in &fields {
            message.write_str(field).unwrap();
        }
        message.rewind();
        for field in &fields {
            prop_assert_eq!(&message.read_string().unwrap(), field);
        }
        prop_assert_eq!(message.remaining(), 0);
    }

    #[test]
    fn prop_writes_never_exceed_limit(limit in 0usize..64, chunks in proptest::collection::vec(0usize..24, 0..16)) {
        let mut message = Message::with_limit(limit);
        for size in chunks {
            let before = message.len();
            match message.write_bytes(&vec![b'x'; size]) {
                Ok(()) => prop_assert_eq!(message.len(), before + 4 + size),
                Err(FrameError::CapacityExceeded { .. }) => prop_assert_eq!(message.len(), before),
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            prop_assert!(message.len() <= limit);
        }
    }
}

#[tokio::test]
async fn test_framed_stream_of_notices() {
    let (client, server) = duplex(4096);
    let mut writer = FramedWrite::new(server, FrameCodec::new());
    let mut reader = FramedRead::new(client, FrameCodec::new());

    writer
        .send(protocol::connect_self(10, MESSAGE_SIZE).unwrap())
        .await
        .unwrap();
    writer
        .send(protocol::disconnect(11, MESSAGE_SIZE).unwrap())
        .await
        .unwrap();
    drop(writer);

    let mut notices = Vec::new();
    while let Some(frame) = reader.next().await {
        match frame.unwrap() {
            Frame::Message(mut message) => notices.push(ServerNotice::decode(&mut message).unwrap()),
            Frame::Discarded { declared } => panic!("unexpected discard of {} bytes", declared),
        }
    }
    assert_eq!(
        notices,
        vec![
            ServerNotice::ConnectSelf { uid: 10 },
            ServerNotice::Disconnect { uid: 11 }
        ]
    );
}

#[tokio::test]
async fn test_oversized_frame_keeps_stream_aligned() {
    let (client, mut server) = duplex(64 * 1024);
    let mut reader = FramedRead::new(client, FrameCodec::with_max_message_size(16));

    let declared = 20_000u32;
    server.write_all(&declared.to_be_bytes()).await.unwrap();
    server.write_all(&vec![0xAA; declared as usize]).await.unwrap();

    let mut follow_up = Message::new();
    follow_up.write_str("ok").unwrap();
    let frame = FrameCodec::new().encode_frame(&follow_up).unwrap();
    server.write_all(&frame).await.unwrap();
    drop(server);

    assert_eq!(
        reader.next().await.unwrap().unwrap(),
        Frame::Discarded { declared: 20_000 }
    );
    match reader.next().await.unwrap().unwrap() {
        Frame::Message(mut message) => assert_eq!(message.read_string().unwrap(), "ok"),
        other => panic!("unexpected frame: {:?}", other),
    }
    assert!(reader.next().await.is_none());
}

#[tokio::test]
async fn test_peer_closes_mid_frame() {
    let (client, mut server) = duplex(1024);
    let mut reader = FramedRead::new(client, FrameCodec::new());

    server.write_all(&8u32.to_be_bytes()).await.unwrap();
    server.write_all(b"abc").await.unwrap();
    drop(server);

    let result = reader.next().await.unwrap();
    assert!(matches!(
        result,
        Err(FrameError::TruncatedMessage {
            declared: 8,
            available: 3
        })
    ));
}

#[tokio::test]
async fn test_claim_request_wire_bytes() {
    let message = protocol::claim_request("psess-1").unwrap();
    let frame = FrameCodec::new().encode_frame(&message).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&38u32.to_be_bytes());
    expected.extend_from_slice(&23u32.to_be_bytes());
    expected.extend_from_slice(b"GL_CLAIM_PLAYER_SESSION");
    expected.extend_from_slice(&7u32.to_be_bytes());
    expected.extend_from_slice(b"psess-1");
    assert_eq!(frame.as_ref(), expected.as_slice());
}
