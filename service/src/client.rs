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

//! Server-side record of one live connection

use crate::{ClientId, ClientInfo, ClientState, Result, ServiceError};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, instrument, trace};

/// Capacity of the opaque per-client extension region, in bytes.
pub const CUSTOM_DATA_SIZE: usize = 64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Fixed-capacity byte region owned by extension handlers.
#[derive(Debug)]
struct CustomData {
    bytes: [u8; CUSTOM_DATA_SIZE],
    len: Option<usize>,
}

/// One live connection.
///
/// The client exclusively owns the write half of its socket. The read half
/// belongs to the client's worker, which stops as soon as the client is
/// closed. Once the last `Arc<Client>` is dropped the socket is released.
pub struct Client {
    id: ClientId,
    peer_addr: SocketAddr,
    connected_at: Instant,
    writer: tokio::sync::Mutex<BoxedWriter>,
    closed: CancellationToken,
    state: AtomicU8,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    custom_data: Mutex<CustomData>,
}

impl Client {
    /// Create a client around the write half of its connection.
    pub fn new<W>(id: ClientId, peer_addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            closed: CancellationToken::new(),
            state: AtomicU8::new(ClientState::Connected.as_u8()),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            custom_data: Mutex::new(CustomData {
                bytes: [0; CUSTOM_DATA_SIZE],
                len: None,
            }),
        }
    }

    /// Get the client ID
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get when the client connected
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Get the current state
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `state` unless the client already reached a terminal state.
    pub(crate) fn set_state(&self, state: ClientState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if ClientState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(state.as_u8())
                }
            });
    }

    /// Frames received from this client
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Frames written to this client
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of this client
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id,
            state: self.state(),
            peer_addr: self.peer_addr,
            connected_at: self.connected_at,
            messages_received: self.messages_received(),
            messages_sent: self.messages_sent(),
        }
    }

    /// Store extension data, replacing anything stored before.
    pub fn set_custom_data(&self, data: &[u8]) -> Result<()> {
        if data.len() > CUSTOM_DATA_SIZE {
            return Err(ServiceError::CustomDataTooLarge {
                size: data.len(),
                capacity: CUSTOM_DATA_SIZE,
            });
        }
        let mut custom = self.custom_data.lock().unwrap_or_else(PoisonError::into_inner);
        custom.bytes[..data.len()].copy_from_slice(data);
        custom.len = Some(data.len());
        Ok(())
    }

    /// Extension data, or `None` if no handler has written any.
    pub fn custom_data(&self) -> Option<Bytes> {
        let custom = self.custom_data.lock().unwrap_or_else(PoisonError::into_inner);
        custom
            .len
            .map(|len| Bytes::copy_from_slice(&custom.bytes[..len]))
    }

    /// Write one encoded frame to the socket.
    ///
    /// Any failure, including a timeout, is reported as
    /// [`ServiceError::DeliverySendFailed`].
    #[instrument(skip(self, frame), fields(client_id = %self.id, len = frame.len()))]
    pub async fn write_frame(&self, frame: &Bytes, write_timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(ServiceError::DeliverySendFailed { client_id: self.id });
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.write_all(frame).await?;
            writer.flush().await
        };

        match tokio::time::timeout(write_timeout, write).await {
            Ok(Ok(())) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                trace!("Frame written");
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Frame write failed");
                Err(ServiceError::DeliverySendFailed { client_id: self.id })
            }
            Err(_) => {
                debug!("Frame write timed out");
                Err(ServiceError::DeliverySendFailed { client_id: self.id })
            }
        }
    }

    /// Check whether the client has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the client has been closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    /// Close the client: stop its worker and shut down the write side.
    ///
    /// Idempotent. A writer busy with a stalled send is left to be dropped
    /// with the client instead of waiting for it.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        self.set_state(ClientState::Disconnected);
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
        debug!(client_id = %self.id, "Client closed");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_custom_data() {
        let client = Client::new(ClientId::new(10), addr(), tokio::io::sink());
        assert_eq!(client.custom_data(), None);

        client.set_custom_data(b"psess-1").unwrap();
        assert_eq!(client.custom_data().unwrap().as_ref(), b"psess-1");

        client.set_custom_data(b"").unwrap();
        assert_eq!(client.custom_data().unwrap().as_ref(), b"");

        let err = client.set_custom_data(&[0u8; CUSTOM_DATA_SIZE + 1]).unwrap_err();
        assert!(matches!(err, ServiceError::CustomDataTooLarge { size: 65, .. }));
        assert_eq!(client.custom_data().unwrap().as_ref(), b"");
    }

    #[tokio::test]
    async fn test_write_frame() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let client = Client::new(ClientId::new(10), addr(), writer);

        let frame = Bytes::from_static(&[0, 0, 0, 2, b'h', b'i']);
        client
            .write_frame(&frame, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(client.messages_sent(), 1);

        let mut buf = [0u8; 6];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, frame.as_ref());
    }

    #[tokio::test]
    async fn test_write_to_dropped_peer_fails() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(reader);
        let client = Client::new(ClientId::new(12), addr(), writer);

        let err = client
            .write_frame(&Bytes::from_static(b"\0\0\0\0"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::DeliverySendFailed { client_id } if client_id == ClientId::new(12)
        ));
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        let (writer, _reader) = tokio::io::duplex(4);
        let client = Client::new(ClientId::new(13), addr(), writer);

        let frame = Bytes::from(vec![0u8; 64]);
        let result = client.write_frame(&frame, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(ServiceError::DeliverySendFailed { .. })));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (writer, mut reader) = tokio::io::duplex(64);
        let client = Client::new(ClientId::new(11), addr(), writer);

        client.close().await;
        client.close().await;
        assert!(client.is_closed());
        assert_eq!(client.state(), ClientState::Disconnected);
        client.closed().await;

        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).await.unwrap(), 0);

        let result = client
            .write_frame(&Bytes::from_static(b"\0\0\0\0"), Duration::from_secs(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disconnected_state_is_terminal() {
        let client = Client::new(ClientId::new(14), addr(), tokio::io::sink());
        client.set_state(ClientState::Reading);
        assert_eq!(client.state(), ClientState::Reading);

        client.close().await;
        client.set_state(ClientState::Reading);
        client.set_state(ClientState::Dispatching);
        assert_eq!(client.state(), ClientState::Disconnected);
        assert_eq!(client.info().state, ClientState::Disconnected);
    }
}
