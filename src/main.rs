//! Remote-state server binary entry point.

use std::sync::Arc;

use remote_state::api::{serve, AppState, ServerConfig};
use remote_state::session::MemoryStore;
use remote_state::{cli, logging, Config};
use tracing::info;

#[tokio::main]
async fn main() -> remote_state::Result<()> {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {}", err);
            eprintln!("run with --help for usage");
            std::process::exit(2);
        }
    };

    if args.help {
        cli::print_help();
        return Ok(());
    }

    if args.version {
        cli::print_version();
        return Ok(());
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(2);
        }
    };

    logging::init_with_level(config.log_filter());

    info!("remote-state v{}", env!("CARGO_PKG_VERSION"));
    info!(
        ttl_secs = config.session.ttl_secs,
        "session store initialized"
    );

    let state = AppState::with_store(Arc::new(MemoryStore::new()), config.session_ttl());
    let server = ServerConfig::new(config.server.host.clone(), config.server.port);

    serve(server, state).await
}
