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

use broadsock_server::Cli;
use broadsock_service::{BroadsockServer, ExitReason, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{debug, error, info};

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt().with_env_filter(filter).try_init();
}

async fn run(cli: Cli) -> Result<ExitReason> {
    let lifecycle = Arc::new(cli.lifecycle());
    let server = BroadsockServer::with_lifecycle(cli.server_config(), lifecycle).await?;
    server.start(cli.handler()).await?;
    info!(address = %server.bind_address(), "Broadsock listening");

    tokio::select! {
        reason = server.wait() => Ok(reason),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            if let Err(err) = server.shutdown().await {
                debug!(error = %err, "Shutdown after interrupt");
            }
            Ok(server.wait().await)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(cli).await {
        Ok(reason) => {
            info!(?reason, "Broadsock stopped");
            reason.exit_code()
        }
        Err(err) => {
            error!(error = %err, "Broadsock failed");
            1
        }
    };
    std::process::exit(code);
}
