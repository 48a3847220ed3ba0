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

//! Broadsock connection hub
//!
//! A TCP hub that relays every framed message a client sends to all other
//! connected clients, prefixed with the sender's id. Clients are told when
//! peers join and leave.
//!
//! - Lock-free client registry shared by the accept loop and all workers
//! - One worker task per client, so a slow reader never stalls the others
//! - Encode-once concurrent fan-out with per-recipient write timeouts
//! - Failed recipients are evicted, never retried
//! - Pluggable message handling and session lifecycle hooks
//!
//! # Architecture
//!
//! ```text
//! BroadsockServer (accept loop)
//!     ↓
//! ConnectionRegistry ← Dispatcher ← MessageHandler
//!     ↓                    ↑
//! ClientWorker (one per client)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use broadsock_service::{
//!     BroadcastHandler, BroadsockServer, ClaimSessionHandler, LocalSessionLifecycle, ServerConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let lifecycle = Arc::new(LocalSessionLifecycle::new());
//!     lifecycle.reserve_player_session("psess-1");
//!
//!     let server = BroadsockServer::with_lifecycle(ServerConfig::default(), lifecycle).await?;
//!     server
//!         .start(Arc::new(ClaimSessionHandler::new(BroadcastHandler)))
//!         .await?;
//!
//!     let reason = server.wait().await;
//!     std::process::exit(reason.exit_code());
//! }
//! ```

mod client;
mod config;
mod dispatcher;
mod error;
mod handler;
mod lifecycle;
mod metrics;
mod registry;
mod server;
mod types;
mod worker;

pub use client::{CUSTOM_DATA_SIZE, Client};
pub use config::{DEFAULT_PORT, FIRST_CLIENT_ID, MAX_CLIENTS, ServerConfig};
pub use dispatcher::{BroadcastResult, DeliveryPolicy, Dispatcher};
pub use error::{Result, ServiceError};
pub use handler::{BroadcastHandler, ClaimSessionHandler, MessageHandler};
pub use lifecycle::{ClaimError, LocalSessionLifecycle, SessionLifecycle};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use registry::ConnectionRegistry;
pub use server::BroadsockServer;
pub use types::{
    ClientId, ClientInfo, ClientState, ExitReason, ServerSnapshot, TERMINATION_EXIT_CODE,
};
pub use worker::ClientWorker;
