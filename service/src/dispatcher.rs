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

//! Broadcast dispatcher
//!
//! The dispatcher turns one [`Message`] into writes to a set of registered
//! clients chosen by a [`DeliveryPolicy`]:
//! - The message is framed once per dispatch and the same bytes are
//!   written to every recipient concurrently.
//! - Delivery is best effort. Every recipient whose write fails or times
//!   out is evicted once the fan-out has finished.
//! - Eviction notifies the remaining peers, which can fail in turn. Those
//!   follow-up evictions are worked off in a queue, never recursively.

use crate::{Client, ClientId, ConnectionRegistry, Result, ServerMetrics, SessionLifecycle};
use broadsock_codec::{FrameCodec, Message, protocol};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which registered clients receive a dispatch
#[derive(Debug, Clone, Copy)]
pub enum DeliveryPolicy<'a> {
    /// Everyone except the given id
    AllExcept(ClientId),
    /// Everyone
    All,
    /// Only the given client record, if it is still registered
    Origin(&'a Client),
    /// Only the client with the given id, if any
    To(ClientId),
}

impl DeliveryPolicy<'_> {
    fn admits(&self, client: &Arc<Client>) -> bool {
        match self {
            DeliveryPolicy::AllExcept(id) => client.id() != *id,
            DeliveryPolicy::All => true,
            DeliveryPolicy::Origin(origin) => std::ptr::eq(Arc::as_ptr(client), *origin),
            DeliveryPolicy::To(id) => client.id() == *id,
        }
    }
}

/// Result of a dispatch
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Number of recipients attempted
    pub total: usize,
    /// Number of successful writes
    pub succeeded: usize,
    /// Number of failed writes
    pub failed: usize,
    /// Recipients whose write failed, with the error message
    pub errors: Vec<(ClientId, String)>,
}

impl BroadcastResult {
    /// Check if every write succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    /// Ids of the recipients whose write failed
    pub fn failed_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.errors.iter().map(|(id, _)| *id)
    }
}

/// Writes messages to registered clients and evicts the ones that fail
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
    lifecycle: Arc<dyn SessionLifecycle>,
    codec: FrameCodec,
    write_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher over a registry
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<ServerMetrics>,
        lifecycle: Arc<dyn SessionLifecycle>,
        max_message_size: usize,
        write_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            metrics,
            lifecycle,
            codec: FrameCodec::with_max_message_size(max_message_size),
            write_timeout,
        }
    }

    /// The registry this dispatcher writes to
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The session lifecycle notified on eviction
    pub fn lifecycle(&self) -> &Arc<dyn SessionLifecycle> {
        &self.lifecycle
    }

    /// Largest payload this dispatcher frames
    pub fn max_message_size(&self) -> usize {
        self.codec.max_message_size()
    }

    /// Write one message to one client
    ///
    /// The client is not evicted on failure; that is left to the caller.
    pub async fn send_to(&self, client: &Client, message: &Message) -> Result<()> {
        let frame = self.codec.encode_frame(message)?;
        let result = client.write_frame(&frame, self.write_timeout).await;
        match result {
            Ok(()) => self.metrics.message_sent(frame.len()),
            Err(_) => self.metrics.send_failed(),
        }
        result
    }

    /// Send to everyone except `excluded`
    pub async fn broadcast_except(
        &self,
        message: &Message,
        excluded: ClientId,
    ) -> Result<BroadcastResult> {
        self.dispatch(message, DeliveryPolicy::AllExcept(excluded))
            .await
    }

    /// Send to everyone
    pub async fn broadcast_all(&self, message: &Message) -> Result<BroadcastResult> {
        self.dispatch(message, DeliveryPolicy::All).await
    }

    /// Send only to the client a message came from
    pub async fn reply_to_origin(
        &self,
        message: &Message,
        origin: &Client,
    ) -> Result<BroadcastResult> {
        self.dispatch(message, DeliveryPolicy::Origin(origin)).await
    }

    /// Send to one id; a stale id is a no-op
    pub async fn send_to_id(&self, message: &Message, target: ClientId) -> Result<BroadcastResult> {
        self.dispatch(message, DeliveryPolicy::To(target)).await
    }

    /// Frame `message` once and write it to every client the policy admits
    ///
    /// Fails only if the message cannot be framed. Recipients that could
    /// not be written to are evicted before this returns.
    pub async fn dispatch(
        &self,
        message: &Message,
        policy: DeliveryPolicy<'_>,
    ) -> Result<BroadcastResult> {
        let frame = self.codec.encode_frame(message)?;
        let recipients = self.recipients(&policy);
        let result = self.fan_out(&frame, &recipients).await;

        if !result.all_succeeded() {
            debug!(
                total = result.total,
                failed = result.failed,
                "Dispatch had failed recipients"
            );
            self.evict_all(result.failed_ids().collect()).await;
        }
        Ok(result)
    }

    /// Remove a client, close it and tell the others it left
    ///
    /// Returns `false` if the client was already gone.
    pub async fn evict(&self, id: ClientId) -> bool {
        self.evict_all(VecDeque::from([id])).await > 0
    }

    async fn evict_all(&self, mut pending: VecDeque<ClientId>) -> usize {
        let mut evicted = 0;
        while let Some(id) = pending.pop_front() {
            let Some(client) = self.registry.remove_by_id(id) else {
                continue;
            };
            evicted += 1;

            client.close().await;
            self.metrics
                .client_disconnected(client.connected_at().elapsed());
            info!(
                client_id = %id,
                peer_addr = %client.peer_addr(),
                "Client disconnected"
            );

            match protocol::disconnect(id.as_u64(), self.codec.max_message_size())
                .and_then(|notice| self.codec.encode_frame(&notice))
            {
                Ok(frame) => {
                    let remaining = self.registry.clients();
                    let result = self.fan_out(&frame, &remaining).await;
                    pending.extend(result.failed_ids());
                }
                Err(error) => warn!(client_id = %id, %error, "Failed to build disconnect notice"),
            }

            if self.registry.is_empty() {
                self.lifecycle.on_session_empty().await;
            }
        }
        evicted
    }

    fn recipients(&self, policy: &DeliveryPolicy<'_>) -> Vec<Arc<Client>> {
        match policy {
            DeliveryPolicy::To(id) => self.registry.get(*id).into_iter().collect(),
            DeliveryPolicy::Origin(origin) => self
                .registry
                .get(origin.id())
                .filter(|client| policy.admits(client))
                .into_iter()
                .collect(),
            _ => {
                let mut recipients = Vec::with_capacity(self.registry.count());
                self.registry.for_each(|client| {
                    if policy.admits(client) {
                        recipients.push(client.clone());
                    }
                });
                recipients
            }
        }
    }

    async fn fan_out(&self, frame: &Bytes, recipients: &[Arc<Client>]) -> BroadcastResult {
        let mut result = BroadcastResult {
            total: recipients.len(),
            ..Default::default()
        };

        let sends = recipients.iter().map(|client| async move {
            (client.id(), client.write_frame(frame, self.write_timeout).await)
        });

        for (id, outcome) in futures_util::future::join_all(sends).await {
            match outcome {
                Ok(()) => {
                    result.succeeded += 1;
                    self.metrics.message_sent(frame.len());
                }
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((id, e.to_string()));
                    self.metrics.send_failed();
                }
            }
        }

        result
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("max_message_size", &self.codec.max_message_size())
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
