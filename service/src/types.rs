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

//! Core types for the Broadsock hub

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Exit status used when the session lifecycle asks the process to terminate.
pub const TERMINATION_EXIT_CODE: i32 = 0xDEAD;

/// Unique identifier for a client (monotonically increasing, never reused)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a new client ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Client state (stored as atomic u8 for lock-free state management)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Registered and waiting for the next frame
    Connected = 0,
    /// A frame is being read
    Reading = 1,
    /// A frame is being handled and fanned out
    Dispatching = 2,
    /// Evicted; terminal
    Disconnected = 3,
}

impl ClientState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connected,
            1 => Self::Reading,
            2 => Self::Dispatching,
            _ => Self::Disconnected,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if the client is in its terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Reading => write!(f, "reading"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Client information snapshot (for non-blocking queries)
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Client ID
    pub id: ClientId,
    /// Current state
    pub state: ClientState,
    /// Peer address
    pub peer_addr: SocketAddr,
    /// When the client connected
    pub connected_at: Instant,
    /// Frames received from this client
    pub messages_received: u64,
    /// Frames written to this client
    pub messages_sent: u64,
}

impl ClientInfo {
    /// Get the connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Why a server stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `shutdown()` was called locally
    Shutdown,
    /// The session lifecycle requested termination
    Terminated,
}

impl ExitReason {
    /// Process exit status for this reason
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::Shutdown => 0,
            ExitReason::Terminated => TERMINATION_EXIT_CODE,
        }
    }
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of live clients
    pub active_clients: usize,
    /// Total clients accepted since server start
    pub total_clients: u64,
    /// Connections rejected because the hub was full
    pub rejected_clients: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
    /// Server start time
    pub started_at: Instant,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BroadsockServer {{ active: {}, total: {}, rejected: {}, addr: {}, uptime: {:?} }}",
            self.active_clients,
            self.total_clients,
            self.rejected_clients,
            self.bind_address,
            self.uptime
        )
    }
}
