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

//! Message handler traits and implementations

use crate::{CUSTOM_DATA_SIZE, Client, Dispatcher, Result};
use async_trait::async_trait;
use broadsock_codec::{Message, protocol};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-deployment message logic
///
/// The server hands every complete frame a client sends to
/// [`MessageHandler::on_message`]. Handlers decide who sees it through the
/// [`Dispatcher`].
///
/// # Example
///
/// ```no_run
/// use broadsock_service::{Client, Dispatcher, MessageHandler, Result};
/// use broadsock_codec::Message;
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn on_message(
///         &self,
///         dispatcher: &Dispatcher,
///         client: &Arc<Client>,
///         message: Message,
///     ) -> Result<()> {
///         dispatcher.reply_to_origin(&message, client).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Called once the client is registered and has been told its id
    async fn on_connect(&self, _dispatcher: &Dispatcher, _client: &Arc<Client>) {}

    /// Called for every complete frame within the size limit
    ///
    /// An error is logged and the client stays connected.
    async fn on_message(
        &self,
        dispatcher: &Dispatcher,
        client: &Arc<Client>,
        message: Message,
    ) -> Result<()>;

    /// Called after the client has been evicted
    async fn on_disconnect(&self, _dispatcher: &Dispatcher, _client: &Arc<Client>) {}
}

/// Relays every message to everyone but its sender, prefixed with the
/// sender's id
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastHandler;

#[async_trait]
impl MessageHandler for BroadcastHandler {
    async fn on_message(
        &self,
        dispatcher: &Dispatcher,
        client: &Arc<Client>,
        message: Message,
    ) -> Result<()> {
        let relayed = protocol::relay(
            client.id().as_u64(),
            &message,
            dispatcher.max_message_size(),
        )?;
        dispatcher.broadcast_except(&relayed, client.id()).await?;
        Ok(())
    }
}

/// Intercepts player session claims and passes everything else on
///
/// A message whose first field is `GL_CLAIM_PLAYER_SESSION` is consumed
/// here: its token goes to the session lifecycle and only the sender hears
/// back, with either `GL_CLAIM_PLAYER_SESSION_SUCCESS` or
/// `GL_CLAIM_PLAYER_SESSION_FAILED`. A granted token is kept in the
/// client's custom data. Any other message reaches the wrapped handler
/// unread.
#[derive(Debug, Default, Clone)]
pub struct ClaimSessionHandler<H = BroadcastHandler> {
    inner: H,
}

impl<H: MessageHandler> ClaimSessionHandler<H> {
    /// Wrap `inner`
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// The wrapped handler
    pub fn inner(&self) -> &H {
        &self.inner
    }

    async fn claim(&self, dispatcher: &Dispatcher, client: &Client, message: &mut Message) -> bool {
        let token = match message.read_string() {
            Ok(token) => token,
            Err(error) => {
                debug!(client_id = %client.id(), %error, "Claim without a readable token");
                return false;
            }
        };

        if token.len() > CUSTOM_DATA_SIZE {
            warn!(
                client_id = %client.id(),
                len = token.len(),
                "Player session token too long"
            );
            return false;
        }

        match dispatcher.lifecycle().accept_player_session(&token).await {
            Ok(()) => match client.set_custom_data(token.as_bytes()) {
                Ok(()) => {
                    info!(client_id = %client.id(), "Player session claimed");
                    true
                }
                Err(error) => {
                    warn!(client_id = %client.id(), %error, "Failed to store player session");
                    false
                }
            },
            Err(error) => {
                info!(client_id = %client.id(), %error, "Player session claim refused");
                false
            }
        }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for ClaimSessionHandler<H> {
    async fn on_connect(&self, dispatcher: &Dispatcher, client: &Arc<Client>) {
        self.inner.on_connect(dispatcher, client).await
    }

    async fn on_message(
        &self,
        dispatcher: &Dispatcher,
        client: &Arc<Client>,
        mut message: Message,
    ) -> Result<()> {
        let is_claim = matches!(
            message.read_string(),
            Ok(tag) if tag == protocol::CLAIM_PLAYER_SESSION
        );
        if !is_claim {
            message.rewind();
            return self.inner.on_message(dispatcher, client, message).await;
        }

        let success = self.claim(dispatcher, client, &mut message).await;
        let reply = protocol::claim_result(
            client.id().as_u64(),
            success,
            dispatcher.max_message_size(),
        )?;
        dispatcher.reply_to_origin(&reply, client).await?;
        Ok(())
    }

    async fn on_disconnect(&self, dispatcher: &Dispatcher, client: &Arc<Client>) {
        self.inner.on_disconnect(dispatcher, client).await
    }
}
