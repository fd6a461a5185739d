use std::process::ExitCode;

use mmapkv::config::ServerConfig;
use mmapkv::{server, Store};

fn main() -> ExitCode {
    env_logger::init();
    let config = ServerConfig::default();

    let store = match Store::open_with_capacity(&config.db_path, config.region_size) {
        Ok(store) => store,
        Err(err) => {
            log::error!("failed to open {}: {err}", config.db_path.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = server::run(&config.bind_addr, store) {
        log::error!("server error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
