use gateway_core::accelerator;
use gateway_server::config::GatewayConfig;
use gateway_server::{build_service, logging};
use salvo::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    logging::init(config.debug);
    logging::lifecycle::server_startup(env!("CARGO_PKG_VERSION"));
    logging::lifecycle::config_loaded(&config.host, config.port, config.debug);

    let accelerator = accelerator::probe()?;
    match accelerator.delegate_lib_path() {
        Some(path) => logging::accelerator::present(&path.display().to_string()),
        None => logging::accelerator::absent(),
    }

    let address = format!("{}:{}", config.host, config.port);
    let service = build_service(config, accelerator);

    logging::lifecycle::server_binding(&address);
    let acceptor = TcpListener::new(&address).bind().await;
    Server::new(acceptor).serve(service).await;

    logging::lifecycle::server_shutdown("normal exit");
    Ok(())
}
