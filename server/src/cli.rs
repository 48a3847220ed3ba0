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

//! Command line options

use broadsock_codec::MESSAGE_SIZE;
use broadsock_service::{
    BroadcastHandler, ClaimSessionHandler, DEFAULT_PORT, LocalSessionLifecycle, MAX_CLIENTS,
    MessageHandler, ServerConfig,
};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

/// Relay framed messages between TCP peers
#[derive(Parser, Debug, Clone)]
#[command(name = "broadsock", author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Size of the client table; one slot is always kept free
    #[arg(long, default_value_t = MAX_CLIENTS)]
    pub max_clients: usize,

    /// Largest message payload in bytes
    #[arg(long, default_value_t = MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Disconnect clients silent for this many seconds
    #[arg(long, value_name = "SECS")]
    pub idle_timeout: Option<u64>,

    /// Player session token a client may claim (repeatable)
    #[arg(long = "reserve-token", value_name = "TOKEN")]
    pub reserve_tokens: Vec<String>,

    /// Grant every non-empty player session token once
    #[arg(long)]
    pub accept_any_token: bool,

    /// Relay claim requests like any other message
    #[arg(long, conflicts_with_all = ["reserve_tokens", "accept_any_token"])]
    pub no_claims: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Server configuration from the options
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(SocketAddr::new(self.bind, self.port))
            .with_max_clients(self.max_clients)
            .with_max_message_size(self.max_message_size)
            .with_idle_timeout(self.idle_timeout.map(Duration::from_secs))
    }

    /// In-process session lifecycle seeded with the reserved tokens
    pub fn lifecycle(&self) -> LocalSessionLifecycle {
        let lifecycle = if self.accept_any_token {
            LocalSessionLifecycle::accepting_any()
        } else {
            LocalSessionLifecycle::new()
        };
        for token in &self.reserve_tokens {
            lifecycle.reserve_player_session(token.clone());
        }
        lifecycle
    }

    /// Message handler selected by the options
    pub fn handler(&self) -> Arc<dyn MessageHandler> {
        if self.no_claims {
            Arc::new(BroadcastHandler)
        } else {
            Arc::new(ClaimSessionHandler::new(BroadcastHandler))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["broadsock"]).unwrap();
        let config = cli.server_config();

        assert_eq!(config.bind_address, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.max_clients, 5);
        assert_eq!(config.max_message_size, 8192);
        assert_eq!(config.idle_timeout, None);
        assert_eq!(cli.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_options() {
        let cli = Cli::try_parse_from([
            "broadsock",
            "--bind",
            "127.0.0.1",
            "-p",
            "7000",
            "--max-clients",
            "16",
            "--idle-timeout",
            "30",
            "--reserve-token",
            "psess-1",
            "--reserve-token",
            "psess-2",
        ])
        .unwrap();
        let config = cli.server_config();

        assert_eq!(config.bind_address, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.client_limit(), 15);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cli.reserve_tokens, vec!["psess-1", "psess-2"]);
    }

    #[tokio::test]
    async fn test_lifecycle_from_options() {
        use broadsock_service::SessionLifecycle;

        let cli = Cli::try_parse_from(["broadsock", "--reserve-token", "psess-1"]).unwrap();
        let lifecycle = cli.lifecycle();
        lifecycle.activate_session().await.unwrap();

        assert!(lifecycle.accept_player_session("psess-1").await.is_ok());
        assert!(lifecycle.accept_player_session("other").await.is_err());
    }

    #[test]
    fn test_no_claims_conflicts_with_tokens() {
        let result = Cli::try_parse_from(["broadsock", "--no-claims", "--accept-any-token"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["broadsock", "--no-claims"]).unwrap();
        assert!(cli.no_claims);
    }
}
