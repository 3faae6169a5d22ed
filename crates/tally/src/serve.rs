// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tally serve`: run the HTTP gateway until a shutdown signal arrives.

use tally_config::TallyConfig;
use tally_core::TallyError;
use tally_gateway::{GatewayState, start_server};
use tracing::info;

use crate::app::App;
use crate::shutdown::install_signal_handler;

pub async fn run_serve(config: TallyConfig) -> Result<(), TallyError> {
    info!("starting tally serve");
    let app = App::start(config).await?;

    let state = GatewayState::new(app.orchestrator.clone(), app.ledger.clone())
        .with_shutdown(install_signal_handler());
    let result = start_server(&app.config.gateway, state).await;

    app.shutdown().await;
    info!("tally serve stopped");
    result
}
