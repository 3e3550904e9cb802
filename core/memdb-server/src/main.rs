//! memdb-server — TCP front end for memdb.
//!
//! Usage: `memdb-server [config.json]`. Environment variables (`MEMDB_*`)
//! override the file.

mod server;

use memdb_core::{Database, MemDbResult, ServerConfig, logging};
use server::Server;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

fn load_config() -> MemDbResult<ServerConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::load_from_file(Path::new(&path))?,
        None => ServerConfig::default(),
    };
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn run(config: &ServerConfig) -> MemDbResult<()> {
    let db = Arc::new(Database::with_config(config)?);
    let server = Server::bind(&config.bind_addr, db)?;
    server.serve()
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("memdb-server: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_with_level(&config.log_level);
    tracing::info!(
        bind = %config.bind_addr,
        lock_timeout_ms = config.lock_timeout_ms,
        durability = config.durability.as_str(),
        "starting memdb server"
    );

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}
