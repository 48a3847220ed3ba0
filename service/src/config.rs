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

//! Server configuration

use crate::{Result, ServiceError};
use broadsock_codec::MESSAGE_SIZE;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default size of the client table.
pub const MAX_CLIENTS: usize = 5;

/// Id handed to the first client; later clients count up from here.
pub const FIRST_CLIENT_ID: u64 = 10;

/// Server configuration
///
/// Use the builder pattern methods to customize the configuration.
///
/// # Example
///
/// ```
/// use broadsock_service::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_max_clients(16)
///     .with_max_message_size(4096)
///     .with_write_timeout(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Size of the client table
    ///
    /// One slot is always held back: a connection that would fill the last
    /// slot is rejected, so at most `max_clients - 1` clients are live.
    pub max_clients: usize,

    /// Largest frame payload accepted or produced, in bytes
    pub max_message_size: usize,

    /// Id assigned to the first accepted client
    pub first_client_id: u64,

    /// Timeout for writing one frame to one client
    ///
    /// A write that does not finish in time counts as a failed send and the
    /// recipient is evicted.
    pub write_timeout: Duration,

    /// Disconnect clients that send nothing for this long (None waits forever)
    pub idle_timeout: Option<Duration>,

    /// Timeout for graceful shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_clients: MAX_CLIENTS,
            max_message_size: MESSAGE_SIZE,
            first_client_id: FIRST_CLIENT_ID,
            write_timeout: Duration::from_secs(10),
            idle_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the given bind address
    ///
    /// All other settings will use their default values.
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the size of the client table
    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Set the maximum frame payload size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the id of the first client
    pub fn with_first_client_id(mut self, id: u64) -> Self {
        self.first_client_id = id;
        self
    }

    /// Set the per-recipient write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the idle timeout
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the shutdown timeout duration
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Number of clients that may be live at once
    pub fn client_limit(&self) -> usize {
        self.max_clients.saturating_sub(1)
    }

    /// Validate the configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_clients < 2 {
            return Err(ServiceError::InvalidConfig(
                "max_clients must be at least 2".to_string(),
            ));
        }

        // Leaves room for the id and tag of the largest control message.
        if self.max_message_size < 64 {
            return Err(ServiceError::InvalidConfig(
                "max_message_size must be at least 64".to_string(),
            ));
        }

        if self.max_message_size > u32::MAX as usize {
            return Err(ServiceError::InvalidConfig(
                "max_message_size must fit in a u32 length header".to_string(),
            ));
        }

        if self.write_timeout.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "write_timeout must be greater than 0".to_string(),
            ));
        }

        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ServiceError::InvalidConfig(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }

        if self.shutdown_timeout.is_zero() {
            return Err(ServiceError::InvalidConfig(
                "shutdown_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
