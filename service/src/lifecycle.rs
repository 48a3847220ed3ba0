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

//! Session lifecycle collaborator
//!
//! A hosting platform that places players into sessions talks to the hub
//! through [`SessionLifecycle`]. The server calls it when the process is
//! ready, when the first client arrives, when a client redeems a player
//! session token, when the hub empties, and on the way out. The platform in
//! turn may ask the process to terminate by resolving
//! [`SessionLifecycle::terminated`].
//!
//! [`LocalSessionLifecycle`] is an in-process implementation that keeps its
//! reserved tokens in memory.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a player session claim was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// No session has been activated on this process
    #[error("No active session")]
    NoActiveSession,

    /// The token was never reserved for this session
    #[error("Unknown player session {0}")]
    UnknownSession(String),

    /// The token was already redeemed
    #[error("Player session {0} already claimed")]
    AlreadyClaimed(String),

    /// The collaborator refused the claim for its own reasons
    #[error("Claim rejected: {0}")]
    Rejected(String),
}

/// Hooks the server calls at fixed points of its lifecycle
///
/// Only [`SessionLifecycle::accept_player_session`] has no default.
#[async_trait]
pub trait SessionLifecycle: Send + Sync + 'static {
    /// The listener is bound and the process can host a session
    async fn process_ready(&self, _port: u16) -> Result<()> {
        Ok(())
    }

    /// The first client has connected
    async fn activate_session(&self) -> Result<()> {
        Ok(())
    }

    /// Redeem a player session token presented by a client
    async fn accept_player_session(&self, token: &str) -> std::result::Result<(), ClaimError>;

    /// Answer a health probe
    ///
    /// Called synchronously by the platform and must return promptly.
    fn health_check(&self) -> bool {
        true
    }

    /// Resolves when the platform asks the process to terminate
    async fn terminated(&self) {
        std::future::pending::<()>().await
    }

    /// The last client has left
    async fn on_session_empty(&self) {}

    /// The process is about to exit
    async fn process_ending(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process session lifecycle
#[derive(Debug, Default)]
pub struct LocalSessionLifecycle {
    reserved: Mutex<HashSet<String>>,
    claimed: Mutex<HashSet<String>>,
    accept_any: AtomicBool,
    active: AtomicBool,
    ready_port: Mutex<Option<u16>>,
    ended: AtomicBool,
    empty_events: AtomicU64,
    termination: CancellationToken,
}

impl LocalSessionLifecycle {
    /// Create a lifecycle that refuses every token until some are reserved
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lifecycle that accepts every non-empty token once
    pub fn accepting_any() -> Self {
        let lifecycle = Self::default();
        lifecycle.accept_any.store(true, Ordering::Relaxed);
        lifecycle
    }

    /// Reserve a token that one client may redeem
    pub fn reserve_player_session(&self, token: impl Into<String>) {
        let token = token.into();
        debug!(token = %token, "Player session reserved");
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token);
    }

    /// Ask the server to terminate
    pub fn request_termination(&self) {
        info!("Termination requested");
        self.termination.cancel();
    }

    /// Check whether a session has been activated
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Port reported by [`SessionLifecycle::process_ready`]
    pub fn ready_port(&self) -> Option<u16> {
        *self.ready_port.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check whether [`SessionLifecycle::process_ending`] has run
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Number of times the hub has emptied
    pub fn empty_events(&self) -> u64 {
        self.empty_events.load(Ordering::Relaxed)
    }

    /// Tokens redeemed so far
    pub fn claimed_sessions(&self) -> Vec<String> {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionLifecycle for LocalSessionLifecycle {
    async fn process_ready(&self, port: u16) -> Result<()> {
        *self.ready_port.lock().unwrap_or_else(PoisonError::into_inner) = Some(port);
        info!(port, "Process ready");
        Ok(())
    }

    async fn activate_session(&self) -> Result<()> {
        if !self.active.swap(true, Ordering::AcqRel) {
            info!("Session activated");
        }
        Ok(())
    }

    async fn accept_player_session(&self, token: &str) -> std::result::Result<(), ClaimError> {
        if !self.is_active() {
            return Err(ClaimError::NoActiveSession);
        }

        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(token) {
            return Err(ClaimError::AlreadyClaimed(token.to_string()));
        }

        let reserved = self
            .reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
        let accept_any = self.accept_any.load(Ordering::Relaxed) && !token.is_empty();
        if !reserved && !accept_any {
            return Err(ClaimError::UnknownSession(token.to_string()));
        }

        claimed.insert(token.to_string());
        Ok(())
    }

    fn health_check(&self) -> bool {
        !self.termination.is_cancelled()
    }

    async fn terminated(&self) {
        self.termination.cancelled().await
    }

    async fn on_session_empty(&self) {
        self.empty_events.fetch_add(1, Ordering::Relaxed);
        info!("All clients have disconnected");
    }

    async fn process_ending(&self) -> Result<()> {
        if self.ended.swap(true, Ordering::AcqRel) {
            warn!("Process ending reported twice");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_claims_need_active_session() {
        let lifecycle = LocalSessionLifecycle::new();
        lifecycle.reserve_player_session("psess-1");

        assert_eq!(
            lifecycle.accept_player_session("psess-1").await,
            Err(ClaimError::NoActiveSession)
        );

        lifecycle.activate_session().await.unwrap();
        assert!(lifecycle.is_active());
        assert_eq!(lifecycle.accept_player_session("psess-1").await, Ok(()));
    }

    #[tokio::test]
    async fn test_reserved_tokens_are_single_use() {
        let lifecycle = LocalSessionLifecycle::new();
        lifecycle.activate_session().await.unwrap();
        lifecycle.reserve_player_session("psess-1");

        assert!(lifecycle.accept_player_session("psess-1").await.is_ok());
        assert_eq!(
            lifecycle.accept_player_session("psess-1").await,
            Err(ClaimError::AlreadyClaimed("psess-1".to_string()))
        );
        assert_eq!(
            lifecycle.accept_player_session("psess-2").await,
            Err(ClaimError::UnknownSession("psess-2".to_string()))
        );
        assert_eq!(lifecycle.claimed_sessions(), vec!["psess-1".to_string()]);
    }

    #[tokio::test]
    async fn test_accept_any() {
        let lifecycle = LocalSessionLifecycle::accepting_any();
        lifecycle.activate_session().await.unwrap();

        assert!(lifecycle.accept_player_session("anything").await.is_ok());
        assert!(lifecycle.accept_player_session("").await.is_err());
        assert!(lifecycle.accept_player_session("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_termination() {
        let lifecycle = LocalSessionLifecycle::new();
        assert!(lifecycle.health_check());

        let pending = tokio::time::timeout(Duration::from_millis(20), lifecycle.terminated()).await;
        assert!(pending.is_err());

        lifecycle.request_termination();
        assert!(!lifecycle.health_check());
        tokio::time::timeout(Duration::from_secs(1), lifecycle.terminated())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_process_bookkeeping() {
        let lifecycle = LocalSessionLifecycle::new();
        lifecycle.process_ready(5000).await.unwrap();
        lifecycle.on_session_empty().await;
        lifecycle.process_ending().await.unwrap();

        assert_eq!(lifecycle.ready_port(), Some(5000));
        assert_eq!(lifecycle.empty_events(), 1);
        assert!(lifecycle.has_ended());
    }
}
