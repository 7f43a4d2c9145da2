//! AAMI control-plane binary: loads configuration, wires `AppState`, and serves the
//! HTTP control surface (§6) behind the host framework's middleware stack.

mod handlers;
mod routes;

use aami_service::config::Config;
use aami_service::error::Result;
use aami_service::observability::{init_tracing, shutdown_tracing};
use aami_service::server::Server;
use aami_service::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "starting aami-server"
    );

    #[cfg(feature = "database")]
    let state = AppState::new(config.clone(), None);
    #[cfg(not(feature = "database"))]
    let state = AppState::new(config.clone());

    let app = routes::build(state);

    let result = Server::new(config).serve(app).await;

    shutdown_tracing();
    result
}
