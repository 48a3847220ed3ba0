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

//! Error types for the Broadsock hub

use crate::types::ClientId;
use broadsock_codec::FrameError;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Broadsock service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the codec layer
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Every registry slot is taken
    #[error("Registry full ({0} slots)")]
    RegistryFull(usize),

    /// A client with this ID is already registered
    #[error("Client {0} already registered")]
    DuplicateClient(ClientId),

    /// Client with the given ID was not found
    #[error("Client {0} not found")]
    ClientNotFound(ClientId),

    /// Writing a frame to a client failed or timed out
    #[error("Delivery to {client_id} failed")]
    DeliverySendFailed {
        /// Recipient whose socket rejected the write
        client_id: ClientId,
    },

    /// Client extension data does not fit its fixed region
    #[error("Custom data of {size} bytes exceeds capacity of {capacity}")]
    CustomDataTooLarge {
        /// Bytes offered
        size: usize,
        /// Bytes available
        capacity: usize,
    },

    /// The session lifecycle collaborator reported a failure
    #[error("Session lifecycle error: {0}")]
    Lifecycle(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Server is already running
    #[error("Server already running")]
    ServerAlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Server was shut down and cannot be started again
    #[error("Server has been shut down")]
    ServerStopped,
}

impl ServiceError {
    /// Check if the error means the peer is gone
    ///
    /// Disconnects are resolved by evicting the client, never by retrying.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ServiceError::Io(_)
                | ServiceError::DeliverySendFailed { .. }
                | ServiceError::Frame(FrameError::TruncatedMessage { .. })
                | ServiceError::Frame(FrameError::Io(_))
        )
    }

    /// Check if the server can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ServiceError::InvalidConfig(_)
                | ServiceError::ServerAlreadyRunning
                | ServiceError::ServerStopped
        )
    }
}
