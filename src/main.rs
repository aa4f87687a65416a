use std::{net::SocketAddr, process::ExitCode, sync::Arc};

use recipe_catalog::{
    actions::RecipeStore, config::Config, jwt::SessionKeys, postgres::PostgresGateway,
    routes::routes,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    log::debug!("Loaded {config:?}");

    let gateway = PostgresGateway::connect(&config.database_url, config.max_connections).await?;
    gateway.migrate().await?;

    let keys = Arc::new(SessionKeys::new(config.secret_key.as_bytes())?);
    let store = Arc::new(RecipeStore::new(gateway));
    let routes = routes(store, keys, config.client_url.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Recipes service listening on {addr}");
    warp::serve(routes).run(addr).await;

    Ok(())
}
