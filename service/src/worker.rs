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

//! Client worker implementation
//!
//! Every registered client gets one worker task which owns the read half of
//! its socket. The worker:
//! - Reads one frame at a time and hands it to the message handler
//! - Drops oversized frames after the codec has drained them
//! - Evicts its client on EOF, read error, truncation or idle timeout
//! - Stops as soon as its client is closed by anyone else

use crate::{Client, ClientState, Dispatcher, MessageHandler, Result, ServerMetrics, ServiceError};
use broadsock_codec::{Frame, FrameCodec, FrameError};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::select;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, instrument, warn};

/// Reads frames from one client until it goes away
pub struct ClientWorker<R> {
    client: Arc<Client>,
    reader: FramedRead<R, FrameCodec>,
    dispatcher: Arc<Dispatcher>,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<ServerMetrics>,
    idle_timeout: Option<Duration>,
}

impl<R> ClientWorker<R>
where
    R: AsyncRead + Send + Unpin,
{
    /// Create a worker for a registered client
    pub fn new(
        client: Arc<Client>,
        reader: R,
        dispatcher: Arc<Dispatcher>,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<ServerMetrics>,
        idle_timeout: Option<Duration>,
    ) -> Self {
        let codec = FrameCodec::with_max_message_size(dispatcher.max_message_size());
        Self {
            client,
            reader: FramedRead::new(reader, codec),
            dispatcher,
            handler,
            metrics,
            idle_timeout,
        }
    }

    /// Run the worker until the client disconnects or is closed
    #[instrument(skip(self), fields(client_id = %self.client.id()))]
    pub async fn run(mut self) {
        self.handler.on_connect(&self.dispatcher, &self.client).await;

        match self.event_loop().await {
            Ok(()) => debug!("Client worker finished"),
            Err(e) if e.is_disconnect() => debug!(error = %e, "Client connection lost"),
            Err(e) => warn!(error = %e, "Client worker failed"),
        }

        self.dispatcher.evict(self.client.id()).await;
        self.handler
            .on_disconnect(&self.dispatcher, &self.client)
            .await;
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            self.client.set_state(ClientState::Reading);

            let next = select! {
                _ = self.client.closed() => return Ok(()),
                next = Self::next_frame(&mut self.reader, self.idle_timeout) => next?,
            };

            match next {
                None => return Ok(()),
                Some(Frame::Message(message)) => {
                    self.client.set_state(ClientState::Dispatching);
                    self.client.record_received();
                    self.metrics.message_received();

                    if let Err(e) = self
                        .handler
                        .on_message(&self.dispatcher, &self.client, message)
                        .await
                    {
                        self.metrics.protocol_error();
                        warn!(error = %e, "Message dropped");
                    }
                }
                Some(Frame::Discarded { declared }) => {
                    self.metrics.frame_discarded();
                    warn!(declared, "Oversized message dropped");
                }
            }
        }
    }

    async fn next_frame(
        reader: &mut FramedRead<R, FrameCodec>,
        idle_timeout: Option<Duration>,
    ) -> Result<Option<Frame>> {
        let next = match idle_timeout {
            Some(limit) => timeout(limit, reader.next())
                .await
                .map_err(|_| ServiceError::Timeout)?,
            None => reader.next().await,
        };
        match next {
            None => Ok(None),
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(FrameError::Io(e))) => Err(ServiceError::Io(e)),
            Some(Err(e)) => Err(ServiceError::Frame(e)),
        }
    }
}

impl<R> std::fmt::Debug for ClientWorker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientWorker")
            .field("client", &self.client)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
